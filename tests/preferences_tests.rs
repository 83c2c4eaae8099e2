/// Integration tests for persisted UI preferences.
use tempfile::NamedTempFile;

#[path = "../src/models.rs"]
mod models;

#[path = "../src/preferences.rs"]
mod preferences;

#[path = "../src/context.rs"]
mod context;

use context::{AssetClassContext, ThemeContext, UiContext, ASSET_CLASS_KEY, THEME_KEY};
use models::{AssetClass, Theme};
use preferences::PreferenceStore;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn temp_path() -> (NamedTempFile, String) {
    let file = NamedTempFile::new().expect("temp file");
    let path = file.path().to_string_lossy().to_string();
    (file, path)
}

fn ui(prefs: &Arc<PreferenceStore>) -> UiContext {
    UiContext::load(Arc::clone(prefs), Duration::from_secs(4), 5)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[test]
fn values_survive_reopen() {
    let (_file, path) = temp_path();
    {
        let store = PreferenceStore::open(&path).unwrap();
        store.set(ASSET_CLASS_KEY, &AssetClass::Forex).unwrap();
        store.set("watchlist", &vec!["BTC/USDT", "ETH/USDT"]).unwrap();
    }

    let store = PreferenceStore::open(&path).unwrap();
    assert_eq!(store.get(ASSET_CLASS_KEY, AssetClass::Crypto), AssetClass::Forex);
    assert_eq!(
        store.get::<Vec<String>>("watchlist", Vec::new()),
        vec!["BTC/USDT", "ETH/USDT"]
    );
}

#[test]
fn missing_key_yields_default() {
    let store = PreferenceStore::open_in_memory().unwrap();
    assert_eq!(store.get(THEME_KEY, Theme::Light), Theme::Light);
    assert!(!store.remove(THEME_KEY).unwrap());
}

#[test]
fn update_reads_modifies_and_writes() {
    let store = PreferenceStore::open_in_memory().unwrap();
    assert_eq!(store.update("launches", 0u32, |n| n + 1).unwrap(), 1);
    assert_eq!(store.update("launches", 0u32, |n| n + 1).unwrap(), 2);
    assert_eq!(store.get("launches", 0u32), 2);

    assert!(store.remove("launches").unwrap());
    assert_eq!(store.get("launches", 0u32), 0);
}

// ---------------------------------------------------------------------------
// Context persistence
// ---------------------------------------------------------------------------

#[test]
fn selections_restore_across_sessions() {
    let (_file, path) = temp_path();
    {
        let prefs = Arc::new(PreferenceStore::open(&path).unwrap());
        let mut ctx = ui(&prefs);
        assert_eq!(ctx.asset_class(), AssetClass::Crypto);
        assert_eq!(ctx.theme(), Theme::Dark);

        ctx.set_asset_class(AssetClass::Equity);
        assert_eq!(ctx.toggle_theme(), Theme::Light);
    }

    let prefs = Arc::new(PreferenceStore::open(&path).unwrap());
    let ctx = ui(&prefs);
    assert_eq!(ctx.asset_class(), AssetClass::Equity);
    assert_eq!(ctx.theme(), Theme::Light);
}

#[test]
fn unreadable_stored_value_falls_back() {
    let prefs = Arc::new(PreferenceStore::open_in_memory().unwrap());
    prefs.set(ASSET_CLASS_KEY, &"commodities").unwrap();
    prefs.set(THEME_KEY, &42).unwrap();

    let ctx = ui(&prefs);
    assert_eq!(ctx.asset_class(), AssetClass::Crypto);
    assert_eq!(ctx.theme(), Theme::Dark);
}
