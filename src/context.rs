/// context.rs – Cross-cutting UI state shared by every dashboard panel.
///
/// Responsibilities:
///  - Selected asset class (persisted)
///  - Colour theme (persisted)
///  - Transient toast notifications with expiry and a visible cap
///
/// Panels depend on the narrow capability traits rather than on
/// [`UiContext`] itself.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::models::{AssetClass, Theme};
use crate::preferences::PreferenceStore;

pub const ASSET_CLASS_KEY: &str = "asset_class";
pub const THEME_KEY: &str = "theme";

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

pub trait AssetClassContext {
    fn asset_class(&self) -> AssetClass;
    fn set_asset_class(&mut self, asset_class: AssetClass);
}

pub trait ThemeContext {
    fn theme(&self) -> Theme;
    /// Switch between dark and light; returns the new theme.
    fn toggle_theme(&mut self) -> Theme;
}

pub trait Toaster {
    fn toast(&mut self, level: ToastLevel, message: impl Into<String>);

    fn success(&mut self, message: impl Into<String>) {
        self.toast(ToastLevel::Success, message);
    }

    fn error(&mut self, message: impl Into<String>) {
        self.toast(ToastLevel::Error, message);
    }

    fn info(&mut self, message: impl Into<String>) {
        self.toast(ToastLevel::Info, message);
    }
}

// ---------------------------------------------------------------------------
// Toasts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: Instant,
}

// ---------------------------------------------------------------------------
// UiContext
// ---------------------------------------------------------------------------

pub struct UiContext {
    asset_class: AssetClass,
    theme: Theme,
    toasts: VecDeque<Toast>,
    toast_ttl: Duration,
    max_toasts: usize,
    next_toast_id: u64,
    prefs: Option<Arc<PreferenceStore>>,
}

impl UiContext {
    /// Context with defaults and no persistence.
    pub fn new(toast_ttl: Duration, max_toasts: usize) -> Self {
        Self {
            asset_class: AssetClass::default(),
            theme: Theme::default(),
            toasts: VecDeque::new(),
            toast_ttl,
            max_toasts: max_toasts.max(1),
            next_toast_id: 1,
            prefs: None,
        }
    }

    /// Context restored from *prefs*; later selections are written back.
    pub fn load(prefs: Arc<PreferenceStore>, toast_ttl: Duration, max_toasts: usize) -> Self {
        let mut ctx = Self::new(toast_ttl, max_toasts);
        ctx.asset_class = prefs.get(ASSET_CLASS_KEY, AssetClass::default());
        ctx.theme = prefs.get(THEME_KEY, Theme::default());
        info!(
            "Restored preferences – asset class: {}, theme: {:?}",
            ctx.asset_class, ctx.theme
        );
        ctx.prefs = Some(prefs);
        ctx
    }

    fn persist<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Some(prefs) = &self.prefs {
            if let Err(e) = prefs.set(key, value) {
                warn!("Saving preference '{key}' failed: {e:#}");
            }
        }
    }

    /// Toasts still within their TTL at *now*, oldest first.
    pub fn visible_toasts(&self, now: Instant) -> impl Iterator<Item = &Toast> {
        let ttl = self.toast_ttl;
        self.toasts
            .iter()
            .filter(move |t| now.saturating_duration_since(t.created_at) < ttl)
    }

    /// Drop expired toasts. Returns how many were removed.
    pub fn prune_toasts(&mut self, now: Instant) -> usize {
        let before = self.toasts.len();
        let ttl = self.toast_ttl;
        self.toasts
            .retain(|t| now.saturating_duration_since(t.created_at) < ttl);
        before - self.toasts.len()
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        before != self.toasts.len()
    }

    fn push_toast(&mut self, level: ToastLevel, message: String, created_at: Instant) -> u64 {
        let id = self.next_toast_id;
        self.next_toast_id += 1;
        self.toasts.push_back(Toast {
            id,
            level,
            message,
            created_at,
        });
        while self.toasts.len() > self.max_toasts {
            self.toasts.pop_front();
        }
        id
    }
}

impl AssetClassContext for UiContext {
    fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    fn set_asset_class(&mut self, asset_class: AssetClass) {
        self.asset_class = asset_class;
        self.persist(ASSET_CLASS_KEY, &asset_class);
    }
}

impl ThemeContext for UiContext {
    fn theme(&self) -> Theme {
        self.theme
    }

    fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.persist(THEME_KEY, &self.theme);
        self.theme
    }
}

impl Toaster for UiContext {
    fn toast(&mut self, level: ToastLevel, message: impl Into<String>) {
        self.push_toast(level, message.into(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_after_ttl() {
        let mut ctx = UiContext::new(Duration::from_secs(4), 5);
        let t0 = Instant::now();
        ctx.push_toast(ToastLevel::Success, "Saved".into(), t0);
        assert_eq!(ctx.visible_toasts(t0 + Duration::from_secs(3)).count(), 1);
        assert_eq!(ctx.visible_toasts(t0 + Duration::from_secs(4)).count(), 0);
        assert_eq!(ctx.prune_toasts(t0 + Duration::from_secs(5)), 1);
    }

    #[test]
    fn toast_queue_is_capped() {
        let mut ctx = UiContext::new(Duration::from_secs(4), 5);
        for i in 0..7 {
            ctx.info(format!("toast {i}"));
        }
        let now = Instant::now();
        let visible: Vec<_> = ctx.visible_toasts(now).map(|t| t.message.clone()).collect();
        assert_eq!(visible.len(), 5);
        assert_eq!(visible[0], "toast 2");
    }

    #[test]
    fn dismiss_removes_by_id() {
        let mut ctx = UiContext::new(Duration::from_secs(4), 5);
        let id = ctx.push_toast(ToastLevel::Error, "Failed".into(), Instant::now());
        assert!(ctx.dismiss(id));
        assert!(!ctx.dismiss(id));
    }

    #[test]
    fn selections_persist_across_loads() {
        let prefs = Arc::new(PreferenceStore::open_in_memory().unwrap());
        let mut ctx = UiContext::load(prefs.clone(), Duration::from_secs(4), 5);
        ctx.set_asset_class(AssetClass::Forex);
        assert_eq!(ctx.toggle_theme(), Theme::Light);

        let restored = UiContext::load(prefs, Duration::from_secs(4), 5);
        assert_eq!(restored.asset_class(), AssetClass::Forex);
        assert_eq!(restored.theme(), Theme::Light);
    }
}
