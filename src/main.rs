/// main.rs – Entry point for Investor Desk.
///
/// With no subcommand (or `watch`) it runs the live portfolio view: the
/// portfolio query, a ticker poller for held symbols, the streaming price
/// feed and the ratatui dashboard. Other subcommands run one request each.
mod analytics;
mod api;
mod cache;
mod commands;
mod config;
mod context;
mod dashboard;
mod errors;
mod feed;
mod format;
mod forms;
mod models;
mod preferences;
mod pricing;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::EventStream;
use futures_util::StreamExt;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api::ApiClient;
use cache::{CacheOptions, Poller, QueryCache, QueryKey, QueryState};
use commands::Command;
use config::Settings;
use context::{AssetClassContext, ThemeContext, Toaster, UiContext};
use dashboard::{DashboardAction, DashboardState};
use errors::{error_message, FALLBACK_MESSAGE};
use feed::{FeedOptions, SystemEvent};
use models::{Portfolio, TickerSnapshot};
use preferences::PreferenceStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "investor-desk",
    about = "Terminal client for the trading platform – live portfolio valuation, risk and workflows",
    version
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Watch without the interactive dashboard; log updates instead.
    #[arg(long, default_value_t = false)]
    no_dashboard: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let watching = matches!(cli.command, None | Some(Command::Watch));
    let dashboard_on = watching && !cli.no_dashboard;
    init_tracing(&settings, dashboard_on)?;

    let client = ApiClient::new(
        &settings.api.base_url,
        settings.api_token.clone(),
        settings.request_timeout(),
    )
    .context("building API client")?;
    let prefs = Arc::new(PreferenceStore::open(&settings.app.prefs_path)?);

    match cli.command {
        None | Some(Command::Watch) => run_watch(&settings, client, prefs, dashboard_on).await,
        Some(cmd) => commands::run(cmd, &client, &prefs).await,
    }
}

/// Logging – `RUST_LOG` wins, else `app.log_level`. While the dashboard
/// owns the terminal, output goes to `app.log_file`.
fn init_tracing(settings: &Settings, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.app.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if to_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.app.log_file)
            .with_context(|| format!("opening log file {}", settings.app.log_file))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watch loop
// ---------------------------------------------------------------------------

/// Results of background requests, delivered back to the loop.
enum Notice {
    Portfolios(QueryState<Vec<Portfolio>>),
    Deleted(i64, Result<(), String>),
}

async fn run_watch(
    settings: &Settings,
    client: ApiClient,
    prefs: Arc<PreferenceStore>,
    dashboard_on: bool,
) -> Result<()> {
    let mut ctx = UiContext::load(prefs, settings.toast_ttl(), settings.ui.max_toasts);
    let cache = QueryCache::new(CacheOptions {
        retries: settings.api.retries,
        stale_after: None,
    });
    let portfolios_key = QueryKey::from(["portfolios"]);
    let tickers_key = QueryKey::from(["tickers"]);

    let feed = feed::start(FeedOptions {
        ws_url: settings.api.ws_url.clone(),
        symbols: settings.feed.symbols.clone(),
        reconnect_initial: settings.reconnect_initial(),
        reconnect_max: settings.reconnect_max(),
    });
    let mut status_rx = feed.status_receiver();
    let mut events_rx = feed.subscribe();

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Notice>();
    spawn_portfolios(&cache, &client, &portfolios_key, false, &notice_tx);

    let mut state = DashboardState::default();
    state.connection = feed.status();
    let mut ticker_poller: Option<Poller<Vec<TickerSnapshot>>> = None;
    let mut polled_symbols: Vec<String> = Vec::new();

    let mut terminal = if dashboard_on {
        Some(dashboard::setup_terminal()?)
    } else {
        None
    };
    let mut dash_ticker = tokio::time::interval(settings.refresh_interval());
    let mut event_stream = EventStream::new();

    info!("Watching portfolios at {}", client.base_url());

    let outcome = async {
        loop {
            state.stream = feed.stream.snapshot();
            state.refreshing = cache.is_fetching(&portfolios_key);
            ctx.prune_toasts(Instant::now());
            if let Some(ref mut term) = terminal {
                term.draw(|f| dashboard::render(f, &state, &ctx))?;
            }

            tokio::select! {
                // ── Keyboard ──────────────────────────────────────────────
                Some(Ok(event)) = event_stream.next(), if terminal.is_some() => {
                    let confirming = state.confirm.pending().is_some();
                    match dashboard::handle_event(&event, confirming) {
                        Some(DashboardAction::Quit) => break,
                        Some(DashboardAction::Retry) => {
                            spawn_portfolios(&cache, &client, &portfolios_key, true, &notice_tx);
                            cache.invalidate(&tickers_key);
                            // A new poller fetches immediately.
                            polled_symbols.clear();
                            ticker_poller = None;
                            sync_ticker_poller(
                                &cache, &client, &state, &mut polled_symbols,
                                &mut ticker_poller, settings,
                            );
                        }
                        Some(DashboardAction::ToggleTheme) => {
                            ctx.toggle_theme();
                        }
                        Some(DashboardAction::CycleAssetClass) => {
                            let next = ctx.asset_class().next();
                            ctx.set_asset_class(next);
                            ctx.info(format!("Asset class: {next}"));
                        }
                        Some(DashboardAction::NextPortfolio) => state.select_next(),
                        Some(DashboardAction::PrevPortfolio) => state.select_prev(),
                        Some(DashboardAction::RequestDelete) => {
                            if let Some(id) = state.selected_portfolio().map(|p| p.id) {
                                state.confirm.request(id);
                            }
                        }
                        Some(DashboardAction::ConfirmDelete) => {
                            if let Some(id) = state.confirm.confirm() {
                                spawn_delete(&cache, &client, &portfolios_key, id, &notice_tx);
                            }
                        }
                        Some(DashboardAction::CancelDelete) => state.confirm.cancel(),
                        Some(DashboardAction::DismissToast) => {
                            let newest = ctx.visible_toasts(Instant::now()).last().map(|t| t.id);
                            if let Some(id) = newest {
                                ctx.dismiss(id);
                            }
                        }
                        None => {}
                    }
                }

                // ── Redraw tick ───────────────────────────────────────────
                _ = dash_ticker.tick() => {}

                // ── Background request results ────────────────────────────
                Some(notice) = notice_rx.recv() => match notice {
                    Notice::Portfolios(result) => {
                        if let Some(msg) = result.error() {
                            state.add_log(format!("ERROR loading portfolios: {msg}"));
                        }
                        state.set_portfolios(result);
                        sync_ticker_poller(
                            &cache, &client, &state, &mut polled_symbols,
                            &mut ticker_poller, settings,
                        );
                        if terminal.is_none() {
                            log_valuation(&state);
                        }
                    }
                    Notice::Deleted(id, Ok(())) => {
                        ctx.success("Portfolio deleted");
                        state.add_log(format!("Deleted portfolio #{id}"));
                        spawn_portfolios(&cache, &client, &portfolios_key, false, &notice_tx);
                    }
                    Notice::Deleted(id, Err(msg)) => {
                        ctx.error(format!("Delete failed: {msg}"));
                        state.add_log(format!("ERROR deleting portfolio #{id}: {msg}"));
                    }
                },

                // ── Ticker poll ───────────────────────────────────────────
                alive = next_poll(&mut ticker_poller) => {
                    match (alive, ticker_poller.as_ref()) {
                        (true, Some(poller)) => {
                            state.set_tickers(
                                poller.current(),
                                cache.last_data(poller.key()),
                            );
                            if terminal.is_none() {
                                log_valuation(&state);
                            }
                        }
                        _ => ticker_poller = None,
                    }
                }

                // ── Feed connection status ────────────────────────────────
                Ok(()) = status_rx.changed() => {
                    let status = *status_rx.borrow_and_update();
                    if status.is_connected && !state.connection.is_connected {
                        state.add_log("Live prices connected");
                    } else if status.is_reconnecting && state.connection.is_connected {
                        state.add_log("Live prices disconnected – reconnecting");
                    }
                    state.connection = status;
                }

                // ── System events from the feed ───────────────────────────
                event = events_rx.recv() => match event {
                    Ok(event) => apply_system_event(&mut state, &mut ctx, event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Dropped {n} system event(s) – consumer too slow");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("System event channel closed");
                        break;
                    }
                },

                // ── Ctrl-C when there is no raw-mode terminal ─────────────
                _ = tokio::signal::ctrl_c(), if terminal.is_none() => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    // Tear down on every exit path; background tasks stop when their handles drop.
    if let Some(ref mut term) = terminal {
        dashboard::teardown_terminal(term)?;
    }
    drop(ticker_poller);
    drop(feed);
    info!("Watch session ended");
    outcome
}

async fn next_poll<T: Clone>(poller: &mut Option<Poller<T>>) -> bool {
    match poller {
        Some(p) => p.changed().await,
        None => std::future::pending().await,
    }
}

/// Fetch (or refetch) the portfolio list in the background.
fn spawn_portfolios(
    cache: &QueryCache,
    client: &ApiClient,
    key: &QueryKey,
    force: bool,
    tx: &mpsc::UnboundedSender<Notice>,
) {
    let cache = cache.clone();
    let client = client.clone();
    let key = key.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let fetcher = move || {
            let client = client.clone();
            async move { client.list_portfolios().await }
        };
        let state = if force {
            cache.refetch(&key, fetcher).await
        } else {
            cache.fetch(&key, fetcher).await
        };
        let _ = tx.send(Notice::Portfolios(state));
    });
}

fn spawn_delete(
    cache: &QueryCache,
    client: &ApiClient,
    portfolios_key: &QueryKey,
    id: i64,
    tx: &mpsc::UnboundedSender<Notice>,
) {
    let cache = cache.clone();
    let client = client.clone();
    let key = portfolios_key.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = cache
            .mutate(client.delete_portfolio(id), std::slice::from_ref(&key))
            .await
            .map_err(|e| error_message(Some(&e), FALLBACK_MESSAGE));
        let _ = tx.send(Notice::Deleted(id, result));
    });
}

/// Keep exactly one ticker poller, keyed by the current set of held symbols.
fn sync_ticker_poller(
    cache: &QueryCache,
    client: &ApiClient,
    state: &DashboardState,
    polled_symbols: &mut Vec<String>,
    poller: &mut Option<Poller<Vec<TickerSnapshot>>>,
    settings: &Settings,
) {
    let symbols = state.held_symbols();
    if symbols.is_empty() {
        *poller = None;
        polled_symbols.clear();
        return;
    }
    if poller.is_some() && *polled_symbols == symbols {
        return;
    }

    let key = QueryKey::from(["tickers"]).with(symbols.join(","));
    let client = client.clone();
    let fetch_symbols = symbols.clone();
    let next = cache.poll(key, settings.ticker_interval(), move || {
        let client = client.clone();
        let symbols = fetch_symbols.clone();
        async move { client.market_tickers(&symbols).await }
    });
    info!("Polling {} every {:?}", next.key(), settings.ticker_interval());
    *poller = Some(next);
    *polled_symbols = symbols;
}

fn apply_system_event(state: &mut DashboardState, ctx: &mut UiContext, event: SystemEvent) {
    match event {
        SystemEvent::Halt(halt) => {
            if halt.is_halted {
                warn!("Trading halted: {}", halt.halt_reason);
                state.add_log(format!("HALT: {}", halt.halt_reason));
                ctx.error(format!("Trading halted: {}", halt.halt_reason));
            } else if state.halt.as_ref().is_some_and(|h| h.is_halted) {
                state.add_log("Trading resumed");
                ctx.success("Trading resumed");
            }
            state.halt = Some(halt);
        }
        SystemEvent::OrderUpdate(order) => {
            state.add_log(format!(
                "Order #{} {} {} {} – {}",
                order.id, order.side, order.amount, order.symbol, order.status
            ));
        }
        SystemEvent::RiskAlert(alert) => {
            warn!("Risk alert ({}): {}", alert.severity, alert.message);
            state.add_log(format!("Risk alert [{}]: {}", alert.severity, alert.message));
            ctx.toast(
                if alert.severity == "critical" || alert.severity == "high" {
                    context::ToastLevel::Error
                } else {
                    context::ToastLevel::Info
                },
                alert.message,
            );
        }
    }
}

/// Headless mode: one line per update instead of a dashboard frame.
fn log_valuation(state: &DashboardState) {
    let Some(list) = state.portfolios.data() else {
        return;
    };
    let prices = state.price_map();
    let totals = analytics::aggregate_metrics(list, &prices);
    info!(
        "{} portfolio(s) – value {} – P&L {} ({})",
        list.len(),
        format::format_usd(totals.total_value),
        format::format_signed_usd(totals.unrealized_pnl),
        format::format_pct(totals.pnl_pct),
    );
    if state.prices_unavailable() {
        warn!("Live prices unavailable – some holdings valued at cost basis");
    }
}
