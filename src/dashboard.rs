/// dashboard.rs – ratatui live portfolio view.
///
/// Layout:
///  ┌─ Header ──────────────────────────────────────────────────────────┐
///  │ Investor Desk │ ● Live │ Total │ P&L │ asset class │ theme │ keys │
///  ├─ Notices (reconnecting / halted / live prices unavailable) ───────┤
///  ├─ Portfolio ───────────────────────────┬─ Notifications ───────────┤
///  │ summary cards                         │ toasts                    │
///  │ holdings table                        ├─ Activity ────────────────┤
///  │                                       │ timestamped event lines   │
///  └───────────────────────────────────────┴───────────────────────────┘
///
/// Each panel is drawn inside a panic guard so one failing panel is
/// replaced by a fallback message while the rest keep rendering.
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Stdout};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::error;

use crate::analytics::{aggregate_metrics, portfolio_metrics, value_holdings};
use crate::cache::QueryState;
use crate::context::{AssetClassContext, ThemeContext, ToastLevel, UiContext};
use crate::feed::{ConnectionStatus, HaltStatus};
use crate::format::{format_pct, format_price, format_signed_usd, format_usd};
use crate::forms::ConfirmDelete;
use crate::models::{Portfolio, Theme, TickerSnapshot};
use crate::pricing::{live_prices_unavailable, reconcile, PriceMap};

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

const MAX_LOG_LINES: usize = 200;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the view needs for one frame. Owned by the main loop and
/// updated from cache, poller and feed notifications.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub portfolios: QueryState<Vec<Portfolio>>,
    pub tickers: QueryState<Vec<TickerSnapshot>>,
    /// Last successful HTTP poll, kept while a later poll is failing.
    pub polled: Vec<TickerSnapshot>,
    /// Held symbols of the last successful portfolio load.
    held: Vec<String>,
    pub stream: HashMap<String, TickerSnapshot>,
    pub connection: ConnectionStatus,
    /// A portfolio request is in flight.
    pub refreshing: bool,
    pub halt: Option<HaltStatus>,
    pub selected: usize,
    pub confirm: ConfirmDelete,
    pub logs: VecDeque<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            portfolios: QueryState::Loading,
            tickers: QueryState::Loading,
            polled: Vec::new(),
            held: Vec::new(),
            stream: HashMap::new(),
            connection: ConnectionStatus::default(),
            refreshing: false,
            halt: None,
            selected: 0,
            confirm: ConfirmDelete::default(),
            logs: VecDeque::new(),
        }
    }
}

impl DashboardState {
    pub fn add_log(&mut self, msg: impl Into<String>) {
        let line = format!("{} {}", chrono::Local::now().format("%H:%M:%S"), msg.into());
        self.logs.push_front(line);
        self.logs.truncate(MAX_LOG_LINES);
    }

    pub fn set_portfolios(&mut self, state: QueryState<Vec<Portfolio>>) {
        if let QueryState::Data(list) = &state {
            self.selected = self.selected.min(list.len().saturating_sub(1));
            let mut symbols: Vec<String> = list
                .iter()
                .flat_map(|p| p.holdings.iter().map(|h| h.symbol.clone()))
                .collect();
            symbols.sort();
            symbols.dedup();
            self.held = symbols;
        }
        self.portfolios = state;
    }

    /// Record the latest poll outcome. *last_good* is the cache's last
    /// successful value for the polled key; a failed poll leaves prices
    /// from earlier polls in place when the cache has none.
    pub fn set_tickers(
        &mut self,
        state: QueryState<Vec<TickerSnapshot>>,
        last_good: Option<Vec<TickerSnapshot>>,
    ) {
        if let Some(list) = last_good {
            self.polled = list;
        }
        self.tickers = state;
    }

    /// Reconciled price per symbol from the last good poll and the stream.
    pub fn price_map(&self) -> PriceMap {
        reconcile(&self.polled, &self.stream)
    }

    pub fn selected_portfolio(&self) -> Option<&Portfolio> {
        self.portfolios.data()?.get(self.selected)
    }

    /// Distinct held symbols across all portfolios, sorted. A failed
    /// refresh keeps the symbols of the last successful load.
    pub fn held_symbols(&self) -> Vec<String> {
        self.held.clone()
    }

    pub fn select_next(&mut self) {
        let n = self.portfolios.data().map_or(0, Vec::len);
        if n > 0 {
            self.selected = (self.selected + 1) % n;
        }
    }

    pub fn select_prev(&mut self) {
        let n = self.portfolios.data().map_or(0, Vec::len);
        if n > 0 {
            self.selected = (self.selected + n - 1) % n;
        }
    }

    /// True when some holding is valued at cost because no price is known.
    pub fn prices_unavailable(&self) -> bool {
        let prices = self.price_map();
        self.portfolios
            .data()
            .map(|list| {
                list.iter()
                    .any(|p| live_prices_unavailable(&p.holdings, &prices))
            })
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    // Panics inside panel renders are caught; keep their report off the
    // alternate screen and in the log file instead.
    panic::set_hook(Box::new(|info| error!("panic: {info}")));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    // Restores the default hook.
    drop(panic::take_hook());

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key event handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardAction {
    Quit,
    Retry,
    ToggleTheme,
    CycleAssetClass,
    NextPortfolio,
    PrevPortfolio,
    RequestDelete,
    ConfirmDelete,
    CancelDelete,
    DismissToast,
}

/// Map a terminal event to an action. While a delete is awaiting
/// confirmation only y / n / Esc (and quit) are recognised.
pub fn handle_event(event: &Event, confirming: bool) -> Option<DashboardAction> {
    let Event::Key(key) = event else {
        return None;
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(DashboardAction::Quit);
    }

    if confirming {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(DashboardAction::ConfirmDelete),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                Some(DashboardAction::CancelDelete)
            }
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(DashboardAction::Quit),
        KeyCode::Char('r') => Some(DashboardAction::Retry),
        KeyCode::Char('t') => Some(DashboardAction::ToggleTheme),
        KeyCode::Char('a') => Some(DashboardAction::CycleAssetClass),
        KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') => Some(DashboardAction::NextPortfolio),
        KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') => {
            Some(DashboardAction::PrevPortfolio)
        }
        KeyCode::Char('d') => Some(DashboardAction::RequestDelete),
        KeyCode::Char('x') => Some(DashboardAction::DismissToast),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

struct Palette {
    text: Color,
    muted: Color,
    accent: Color,
    table_header: Color,
    positive: Color,
    negative: Color,
    warning: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            text: Color::White,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            table_header: Color::DarkGray,
            positive: Color::Green,
            negative: Color::Red,
            warning: Color::Yellow,
        },
        Theme::Light => Palette {
            text: Color::Black,
            muted: Color::Gray,
            accent: Color::Blue,
            table_header: Color::Gray,
            positive: Color::Rgb(0, 128, 0),
            negative: Color::Rgb(180, 0, 0),
            warning: Color::Rgb(160, 100, 0),
        },
    }
}

fn pnl_color(p: &Palette, value: f64) -> Color {
    if value >= 0.0 {
        p.positive
    } else {
        p.negative
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, state: &DashboardState, ctx: &UiContext) {
    let area = frame.size();
    let p = palette(ctx.theme());
    let notices = notice_lines(state, &p);

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(notices.len() as u16),
            Constraint::Min(0),
        ])
        .split(area);

    guarded(frame, outer[0], "header", |f, a| render_header(f, a, state, ctx, &p));
    if !notices.is_empty() {
        frame.render_widget(Paragraph::new(notices), outer[1]);
    }

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(outer[2]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(body[1]);

    guarded(frame, body[0], "portfolio", |f, a| {
        render_portfolio(f, a, state, ctx, &p)
    });
    guarded(frame, right[0], "notifications", |f, a| {
        render_toasts(f, a, ctx, &p)
    });
    guarded(frame, right[1], "activity", |f, a| render_logs(f, a, state, &p));
}

/// Draw one panel, replacing it with a fallback message if it panics.
fn guarded<F>(frame: &mut Frame, area: Rect, name: &str, draw: F)
where
    F: FnOnce(&mut Frame, Rect),
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| draw(&mut *frame, area)));
    if outcome.is_err() {
        let fallback = Paragraph::new(Line::from(Span::styled(
            "Something went wrong rendering this panel.",
            Style::default().fg(Color::Red),
        )))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(format!(" {name} ")));
        frame.render_widget(Clear, area);
        frame.render_widget(fallback, area);
    }
}

/// Inline rendering for a panel that is not showing data.
fn query_placeholder<T>(query: &QueryState<T>, what: &str, p: &Palette) -> Option<Paragraph<'static>> {
    match query {
        QueryState::Data(_) => None,
        QueryState::Loading => Some(Paragraph::new(Span::styled(
            format!("Loading {what}…"),
            Style::default().fg(p.muted),
        ))),
        QueryState::Error(msg) => Some(Paragraph::new(vec![
            Line::from(Span::styled(
                format!("Failed to load {what}: {msg}"),
                Style::default().fg(p.negative),
            )),
            Line::from(Span::styled("[r] retry", Style::default().fg(p.muted))),
        ])
        .wrap(Wrap { trim: true })),
    }
}

// ---------------------------------------------------------------------------
// Header + notices
// ---------------------------------------------------------------------------

fn render_header(
    frame: &mut Frame,
    area: Rect,
    state: &DashboardState,
    ctx: &UiContext,
    p: &Palette,
) {
    let status = &state.connection;
    let live = if status.is_connected {
        Span::styled("● Live", Style::default().fg(p.positive))
    } else if status.is_reconnecting {
        Span::styled("● Reconnecting", Style::default().fg(p.warning))
    } else {
        Span::styled("○ Offline", Style::default().fg(p.negative))
    };

    let mut spans = vec![
        Span::styled(
            "  Investor Desk  │ ",
            Style::default().fg(p.accent).add_modifier(Modifier::BOLD),
        ),
        live,
        Span::raw("  │ "),
    ];
    if state.refreshing || state.portfolios.is_loading() {
        spans.push(Span::styled("⟳ ", Style::default().fg(p.muted)));
    }

    if let Some(list) = state.portfolios.data() {
        let totals = aggregate_metrics(list, &state.price_map());
        spans.push(Span::styled(
            format!("Total: {}  │ ", format_usd(totals.total_value)),
            Style::default().fg(p.text),
        ));
        spans.push(Span::styled(
            format!(
                "P&L: {} ({})  │ ",
                format_signed_usd(totals.unrealized_pnl),
                format_pct(totals.pnl_pct)
            ),
            Style::default()
                .fg(pnl_color(p, totals.unrealized_pnl))
                .add_modifier(Modifier::BOLD),
        ));
    }

    spans.push(Span::styled(
        format!("{}  │ {:?}", ctx.asset_class(), ctx.theme()),
        Style::default().fg(p.text),
    ));
    spans.push(Span::styled(
        "  [q] quit [r] retry [t] theme [a] class [←/→] portfolio [d] delete [x] dismiss",
        Style::default().fg(p.muted),
    ));

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Investor Desk "));
    frame.render_widget(header, area);
}

fn notice_lines(state: &DashboardState, p: &Palette) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if state.connection.is_reconnecting {
        lines.push(Line::from(Span::styled(
            format!(
                " Reconnecting to live prices (attempt {})…",
                state.connection.reconnect_attempt
            ),
            Style::default().fg(p.warning),
        )));
    }
    if let Some(halt) = state.halt.as_ref().filter(|h| h.is_halted) {
        let reason = if halt.halt_reason.is_empty() {
            String::new()
        } else {
            format!(": {}", halt.halt_reason)
        };
        lines.push(Line::from(Span::styled(
            format!(" TRADING HALTED{reason}"),
            Style::default().fg(p.negative).add_modifier(Modifier::BOLD),
        )));
    }
    if state.prices_unavailable() {
        lines.push(Line::from(Span::styled(
            " Live prices unavailable – some holdings are shown at cost basis.",
            Style::default().fg(p.warning),
        )));
    }
    if let Some(id) = state.confirm.pending() {
        lines.push(Line::from(Span::styled(
            format!(" Delete portfolio #{id}? [y] confirm  [n] cancel"),
            Style::default().fg(p.negative).add_modifier(Modifier::BOLD),
        )));
    }
    lines
}

// ---------------------------------------------------------------------------
// Portfolio: summary cards + holdings
// ---------------------------------------------------------------------------

fn render_portfolio(
    frame: &mut Frame,
    area: Rect,
    state: &DashboardState,
    ctx: &UiContext,
    p: &Palette,
) {
    let block = Block::default().borders(Borders::ALL).title(" Portfolio ");
    if let Some(placeholder) = query_placeholder(&state.portfolios, "portfolios", p) {
        frame.render_widget(placeholder.block(block), area);
        return;
    }
    let count = state.portfolios.data().map_or(0, Vec::len);
    let Some(portfolio) = state.selected_portfolio() else {
        let empty = Paragraph::new(Span::styled(
            "No portfolios yet – create one with `investor-desk portfolios create <name>`.",
            Style::default().fg(p.muted),
        ))
        .wrap(Wrap { trim: true })
        .block(block);
        frame.render_widget(empty, area);
        return;
    };

    let title = format!(
        " {} ({}/{}) ",
        portfolio.name,
        state.selected + 1,
        count
    );
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(inner);

    render_summary(frame, rows[0], state, portfolio, p);
    render_holdings(frame, rows[1], state, portfolio, ctx, p);
}

fn render_summary(
    frame: &mut Frame,
    area: Rect,
    state: &DashboardState,
    portfolio: &Portfolio,
    p: &Palette,
) {
    let m = portfolio_metrics(&portfolio.holdings, &state.price_map());
    let cards = [
        ("Total Value", format_usd(m.total_value), p.text),
        ("Total Cost", format_usd(m.total_cost), p.text),
        (
            "Unrealized P&L",
            format_signed_usd(m.unrealized_pnl),
            pnl_color(p, m.unrealized_pnl),
        ),
        ("P&L %", format_pct(m.pnl_pct), pnl_color(p, m.pnl_pct)),
    ];

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    for ((label, value, color), col) in cards.into_iter().zip(cols.iter()) {
        let card = Paragraph::new(Span::styled(
            value,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .block(Block::default().borders(Borders::ALL).title(format!(" {label} ")));
        frame.render_widget(card, *col);
    }
}

fn render_holdings(
    frame: &mut Frame,
    area: Rect,
    state: &DashboardState,
    portfolio: &Portfolio,
    ctx: &UiContext,
    p: &Palette,
) {
    let header_cells = ["Symbol", "Amount", "Avg Cost", "Price", "Value", "P&L", "P&L %"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(p.table_header))
        .height(1);

    let ac = ctx.asset_class();
    let rows: Vec<Row> = value_holdings(&portfolio.holdings, &state.price_map())
        .into_iter()
        .map(|v| {
            let price = match v.price {
                Some(price) => Cell::from(format_price(price, ac)),
                None => Cell::from("—").style(Style::default().fg(p.muted)),
            };
            let color = pnl_color(p, v.pnl);
            // Unpriced rows are valued at cost.
            let value_style = if v.priced() {
                Style::default()
            } else {
                Style::default().fg(p.muted)
            };
            Row::new(vec![
                Cell::from(v.symbol.clone()),
                Cell::from(format!("{:.4}", v.amount)),
                Cell::from(format_price(v.avg_buy_price, ac)),
                price,
                Cell::from(format_usd(v.value)).style(value_style),
                Cell::from(format_signed_usd(v.pnl)).style(Style::default().fg(color)),
                Cell::from(format_pct(v.pnl_pct))
                    .style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
            ])
        })
        .collect();

    let title = match &state.tickers {
        QueryState::Error(msg) => format!(" Holdings – price poll failed: {msg} [r] retry "),
        _ => format!(" Holdings ({}) ", portfolio.holdings.len()),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Min(9),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Toasts + activity log
// ---------------------------------------------------------------------------

fn render_toasts(frame: &mut Frame, area: Rect, ctx: &UiContext, p: &Palette) {
    let items: Vec<ListItem> = ctx
        .visible_toasts(Instant::now())
        .map(|t| {
            let (icon, color) = match t.level {
                ToastLevel::Success => ("✓", p.positive),
                ToastLevel::Error => ("✗", p.negative),
                ToastLevel::Info => ("ℹ", p.accent),
            };
            ListItem::new(Line::from(Span::styled(
                format!("{icon} {}", t.message),
                Style::default().fg(color),
            )))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Notifications "));
    frame.render_widget(list, area);
}

fn render_logs(frame: &mut Frame, area: Rect, state: &DashboardState, p: &Palette) {
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .take(area.height as usize)
        .map(|line| {
            let color = if line.contains("ERROR") || line.contains("HALT") {
                p.negative
            } else if line.contains("alert") {
                p.warning
            } else {
                p.text
            };
            ListItem::new(Line::from(Span::styled(line.clone(), Style::default().fg(color))))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Activity "));
    frame.render_widget(list, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetClass, Holding};
    use crossterm::event::KeyEvent;
    use ratatui::backend::TestBackend;
    use std::time::Duration;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn portfolio(symbols: &[&str]) -> Portfolio {
        Portfolio {
            id: 1,
            name: "Main".into(),
            exchange_id: "binance".into(),
            description: String::new(),
            holdings: symbols
                .iter()
                .map(|s| Holding {
                    id: 0,
                    portfolio_id: 1,
                    symbol: s.to_string(),
                    amount: 1.0,
                    avg_buy_price: 100.0,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .collect(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn ticker(symbol: &str, price: f64) -> TickerSnapshot {
        TickerSnapshot {
            symbol: symbol.into(),
            price,
            volume_24h: 0.0,
            change_24h: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }
    }

    fn screen_text(state: &DashboardState) -> String {
        screen_text_with(state, &UiContext::new(Duration::from_secs(4), 5))
    }

    fn screen_text_with(state: &DashboardState, ctx: &UiContext) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| render(f, state, ctx)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(handle_event(&key(KeyCode::Char('q')), false), Some(DashboardAction::Quit));
        assert_eq!(handle_event(&key(KeyCode::Char('r')), false), Some(DashboardAction::Retry));
        assert_eq!(handle_event(&key(KeyCode::Char('y')), false), None);
        assert_eq!(
            handle_event(&key(KeyCode::Char('y')), true),
            Some(DashboardAction::ConfirmDelete)
        );
        assert_eq!(handle_event(&key(KeyCode::Char('q')), true), None);
        assert_eq!(
            handle_event(&key(KeyCode::Char('x')), false),
            Some(DashboardAction::DismissToast)
        );
        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(handle_event(&ctrl_c, true), Some(DashboardAction::Quit));
    }

    #[test]
    fn failed_poll_keeps_last_good_prices() {
        let mut state = DashboardState::default();
        let good = vec![ticker("BTC", 10.0)];
        state.set_tickers(QueryState::Data(good.clone()), Some(good.clone()));
        state.set_tickers(QueryState::Error("Network error: timeout".into()), Some(good));
        assert_eq!(state.price_map().get("BTC"), Some(&10.0));

        // A new key with no successful poll yet leaves earlier prices alone.
        state.set_tickers(QueryState::Error("Network error: timeout".into()), None);
        assert_eq!(state.price_map().get("BTC"), Some(&10.0));
        assert!(state.tickers.error().is_some());
    }

    #[test]
    fn failed_refresh_keeps_held_symbols() {
        let mut state = DashboardState::default();
        state.set_portfolios(QueryState::Data(vec![portfolio(&["BTC"])]));
        state.set_portfolios(QueryState::Error("Network error: timeout".into()));
        assert_eq!(state.held_symbols(), vec!["BTC".to_string()]);
    }

    #[test]
    fn totals_render_in_dollars_for_forex() {
        let mut ctx = UiContext::new(Duration::from_secs(4), 5);
        ctx.set_asset_class(AssetClass::Forex);
        let mut state = DashboardState::default();
        state.set_portfolios(QueryState::Data(vec![portfolio(&["EUR/USD"])]));
        state.stream.insert("EUR/USD".into(), ticker("EUR/USD", 25000.0));

        let text = screen_text_with(&state, &ctx);
        assert!(text.contains("Total: $25,000.00"));
    }

    #[test]
    fn held_symbols_are_distinct() {
        let mut state = DashboardState::default();
        state.set_portfolios(QueryState::Data(vec![
            portfolio(&["ETH", "BTC"]),
            portfolio(&["BTC"]),
        ]));
        assert_eq!(state.held_symbols(), vec!["BTC".to_string(), "ETH".to_string()]);
    }

    #[test]
    fn selection_wraps_and_clamps() {
        let mut state = DashboardState::default();
        state.set_portfolios(QueryState::Data(vec![portfolio(&[]), portfolio(&[])]));
        state.select_prev();
        assert_eq!(state.selected, 1);
        state.select_next();
        assert_eq!(state.selected, 0);
        state.selected = 1;
        state.set_portfolios(QueryState::Data(vec![portfolio(&[])]));
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn error_renders_inline_with_retry_hint() {
        let mut state = DashboardState::default();
        state.set_portfolios(QueryState::Error("Network error: connection refused".into()));
        let text = screen_text(&state);
        assert!(text.contains("connection refused"));
        assert!(text.contains("[r] retry"));
    }

    #[test]
    fn unpriced_holding_shows_notice() {
        let mut state = DashboardState::default();
        state.set_portfolios(QueryState::Data(vec![portfolio(&["BTC"])]));
        assert!(state.prices_unavailable());
        assert!(screen_text(&state).contains("Live prices unavailable"));

        state.stream.insert("BTC".into(), ticker("BTC", 120.0));
        assert!(!state.prices_unavailable());
    }

    #[test]
    fn reconnecting_banner_shows_attempt() {
        let mut state = DashboardState::default();
        state.connection = ConnectionStatus::default().dropped().dropped();
        assert!(screen_text(&state).contains("attempt 2"));
    }

    #[test]
    fn panicking_panel_is_contained() {
        let mut terminal = Terminal::new(TestBackend::new(60, 10)).unwrap();
        terminal
            .draw(|f| {
                let area = f.size();
                guarded(f, area, "broken", |_, _| panic!("boom"));
            })
            .unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("Something went wrong"));
    }
}
