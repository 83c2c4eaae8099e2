/// commands.rs – One-shot subcommands: each sends one or a few requests,
/// prints the result and exits.
use anyhow::{bail, Result};
use clap::Subcommand;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::analytics::{aggregate_metrics, portfolio_metrics, value_holdings};
use crate::api::ApiClient;
use crate::context::{ASSET_CLASS_KEY, THEME_KEY};
use crate::format::{format_pct, format_price, format_signed_usd, format_usd, format_volume};
use crate::forms::{ConfirmDelete, LimitField, LimitsEditor, OrderDraft};
use crate::models::{
    AssetClass, NewPortfolio, Order, OrderSide, Portfolio, PositionSizeRequest, RiskLimits,
    Theme, TradeCheckRequest,
};
use crate::preferences::PreferenceStore;
use crate::pricing::{reconcile, unpriced_symbols};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Live portfolio dashboard (the default).
    Watch,
    /// List, inspect, create or delete portfolios.
    #[command(subcommand)]
    Portfolios(PortfolioCommand),
    /// Place an order. Giving --price makes it a limit order.
    Order {
        symbol: String,
        amount: String,
        #[arg(long, default_value = "buy")]
        side: String,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
    },
    /// Recent orders, or one order by id.
    Orders {
        #[command(subcommand)]
        cmd: Option<OrdersCommand>,
    },
    /// Price history candles for one symbol.
    Ohlcv {
        symbol: String,
        #[arg(long, default_value = "1h")]
        timeframe: String,
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=1000))]
        limit: u32,
    },
    /// Risk status, limits and calculators for a portfolio.
    #[command(subcommand)]
    Risk(RiskCommand),
    /// Automation workflows and their runs.
    #[command(subcommand)]
    Workflows(WorkflowCommand),
    /// Headline dashboard KPIs; defaults to the saved asset class.
    Kpis {
        #[arg(long)]
        asset_class: Option<AssetClass>,
        /// Print the whole KPI object as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Markets for the held symbols of every portfolio.
    Tickers,
    /// Supported exchanges.
    Exchanges,
    /// Saved UI selections shared with the dashboard.
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Subcommand, Debug)]
pub enum OrdersCommand {
    List,
    Show { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show,
    /// Save the asset class used by `kpis`, formatting and the dashboard.
    AssetClass { value: AssetClass },
    ToggleTheme,
    /// Forget saved selections so defaults apply again.
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum PortfolioCommand {
    List,
    Show {
        id: i64,
    },
    Create {
        name: String,
        #[arg(long)]
        exchange: Option<String>,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RiskCommand {
    Status {
        portfolio: i64,
    },
    Limits {
        portfolio: i64,
    },
    /// Change limits, e.g. `--set max_daily_loss=0.03`. Only changed
    /// fields are sent.
    SetLimits {
        portfolio: i64,
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        set: Vec<(LimitField, String)>,
    },
    /// Prompt for each limit in turn; `q` cancels without saving.
    EditLimits {
        portfolio: i64,
    },
    Var {
        portfolio: i64,
        #[arg(long, default_value = "historical")]
        method: String,
    },
    HeatCheck {
        portfolio: i64,
    },
    ResetDaily {
        portfolio: i64,
    },
    PositionSize {
        portfolio: i64,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        stop: f64,
        #[arg(long)]
        risk: Option<f64>,
    },
    CheckTrade {
        portfolio: i64,
        symbol: String,
        #[arg(long, default_value = "buy")]
        side: OrderSide,
        #[arg(long)]
        size: f64,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        stop: Option<f64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    List {
        #[arg(long)]
        asset_class: Option<AssetClass>,
    },
    /// A workflow with its steps in run order.
    Show {
        id: String,
    },
    Trigger {
        id: String,
    },
    Enable {
        id: String,
    },
    Disable {
        id: String,
    },
    Runs {
        id: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// One run with the outcome of each step.
    Run {
        run_id: String,
    },
    CancelRun {
        run_id: String,
    },
    /// Step kinds the workflow engine supports.
    Steps,
}

/// Headline numbers shown by `kpis`, as dotted paths into the KPI object.
const KPI_HEADLINES: [(&str, &str); 7] = [
    ("Portfolios", "portfolio.count"),
    ("Total value", "portfolio.total_value"),
    ("Unrealized P&L", "portfolio.unrealized_pnl"),
    ("Trades", "trading.total_trades"),
    ("Win rate %", "trading.win_rate"),
    ("Daily P&L", "risk.daily_pnl"),
    ("Drawdown", "risk.drawdown"),
];

fn parse_assignment(s: &str) -> Result<(LimitField, String), String> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{s}'"))?;
    let field = field.trim().parse::<LimitField>().map_err(|e| e.to_string())?;
    Ok((field, value.trim().to_string()))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn run(cmd: Command, client: &ApiClient, prefs: &PreferenceStore) -> Result<()> {
    let asset_class: AssetClass = prefs.get(ASSET_CLASS_KEY, AssetClass::default());
    match cmd {
        Command::Watch => bail!("watch is handled by the main loop"),
        Command::Portfolios(cmd) => run_portfolios(cmd, client, asset_class).await,
        Command::Order {
            symbol,
            amount,
            side,
            price,
            exchange,
        } => {
            let draft = OrderDraft {
                symbol,
                side,
                amount,
                price: price.unwrap_or_default(),
                exchange_id: exchange,
            };
            let order = client.create_order(&draft.build()?).await?;
            info!("Order #{} submitted", order.id);
            println!(
                "Order #{}: {} {} {} ({}) – {}",
                order.id, order.side, order.amount, order.symbol, order.order_type, order.status
            );
            Ok(())
        }
        Command::Orders { cmd } => match cmd.unwrap_or(OrdersCommand::List) {
            OrdersCommand::List => {
                let orders = client.list_orders().await?;
                println!(
                    "{:<6} {:<12} {:<5} {:<7} {:>12} {:>14} {:<10}",
                    "ID", "Symbol", "Side", "Type", "Amount", "Price", "Status"
                );
                for o in &orders {
                    print_order_row(o, asset_class);
                }
                Ok(())
            }
            OrdersCommand::Show { id } => {
                let o = match client.get_order(id).await {
                    Ok(o) => o,
                    Err(e) if e.status_code() == Some(404) => bail!("Order #{id} not found"),
                    Err(e) => return Err(e.into()),
                };
                print_order_row(&o, asset_class);
                println!("  filled {:.6}  exchange {} {}", o.filled, o.exchange_id, o.exchange_order_id);
                println!("  created {}  updated {}", o.created_at, o.updated_at);
                Ok(())
            }
        },
        Command::Ohlcv {
            symbol,
            timeframe,
            limit,
        } => {
            let bars = client.market_ohlcv(&symbol, &timeframe, limit).await?;
            println!(
                "{:<20} {:>14} {:>14} {:>14} {:>14} {:>8}",
                "Time", "Open", "High", "Low", "Close", "Volume"
            );
            for b in &bars {
                let time = chrono::DateTime::from_timestamp_millis(b.timestamp)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| b.timestamp.to_string());
                println!(
                    "{:<20} {:>14} {:>14} {:>14} {:>14} {:>8}",
                    time,
                    format_price(b.open, asset_class),
                    format_price(b.high, asset_class),
                    format_price(b.low, asset_class),
                    format_price(b.close, asset_class),
                    format_volume(b.volume)
                );
            }
            if let Some(change) = period_change_pct(&bars) {
                println!("{symbol} {timeframe} over {} bars: {}", bars.len(), format_pct(change));
            }
            Ok(())
        }
        Command::Risk(cmd) => run_risk(cmd, client).await,
        Command::Workflows(cmd) => run_workflows(cmd, client).await,
        Command::Kpis {
            asset_class: ac,
            json,
        } => {
            let ac = ac.unwrap_or(asset_class);
            let kpis = client.dashboard_kpis(Some(ac)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kpis)?);
                return Ok(());
            }
            println!("KPIs ({ac})");
            for (label, path) in KPI_HEADLINES {
                if let Some(value) = kpis.number(path) {
                    println!("  {label:<16} {value}");
                }
            }
            Ok(())
        }
        Command::Tickers => {
            let portfolios = client.list_portfolios().await?;
            let mut symbols: Vec<String> = portfolios
                .iter()
                .flat_map(|p| p.holdings.iter().map(|h| h.symbol.clone()))
                .collect();
            symbols.sort();
            symbols.dedup();
            for t in client.market_tickers(&symbols).await? {
                println!(
                    "{:<12} {:>16} {:>+8.2}% vol {}",
                    t.symbol,
                    format_price(t.price, asset_class),
                    t.change_24h,
                    format_volume(t.volume_24h)
                );
            }
            Ok(())
        }
        Command::Exchanges => {
            for ex in client.list_exchanges().await? {
                println!("{:<12} {}", ex.id, ex.name);
            }
            Ok(())
        }
        Command::Prefs(cmd) => run_prefs(cmd, prefs),
    }
}

fn print_order_row(o: &Order, asset_class: AssetClass) {
    println!(
        "{:<6} {:<12} {:<5} {:<7} {:>12.6} {:>14} {:<10}",
        o.id,
        o.symbol,
        o.side,
        o.order_type,
        o.amount,
        format_price(o.price, asset_class),
        o.status
    );
}

/// Close-to-close change across *bars*, in percent.
fn period_change_pct(bars: &[crate::models::OhlcvBar]) -> Option<f64> {
    let first = bars.first()?.close;
    let last = bars.last()?.close;
    (first != 0.0).then(|| (last - first) / first * 100.0)
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

fn run_prefs(cmd: PrefsCommand, prefs: &PreferenceStore) -> Result<()> {
    match cmd {
        PrefsCommand::Show => {}
        PrefsCommand::AssetClass { value } => prefs.set(ASSET_CLASS_KEY, &value)?,
        PrefsCommand::ToggleTheme => {
            prefs.update(THEME_KEY, Theme::default(), Theme::toggled)?;
        }
        PrefsCommand::Reset => {
            for key in [ASSET_CLASS_KEY, THEME_KEY] {
                if prefs.remove(key)? {
                    info!("Preference '{key}' cleared");
                }
            }
        }
    }
    let asset_class: AssetClass = prefs.get(ASSET_CLASS_KEY, AssetClass::default());
    let theme: Theme = prefs.get(THEME_KEY, Theme::default());
    println!("asset_class  {asset_class}");
    println!("theme        {theme:?}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Portfolios
// ---------------------------------------------------------------------------

async fn run_portfolios(
    cmd: PortfolioCommand,
    client: &ApiClient,
    asset_class: AssetClass,
) -> Result<()> {
    match cmd {
        PortfolioCommand::List => {
            let portfolios = client.list_portfolios().await?;
            let prices = polled_prices(client, &portfolios).await;
            for p in &portfolios {
                let m = portfolio_metrics(&p.holdings, &prices);
                println!(
                    "#{:<4} {:<24} value {:>16}  P&L {:>14} ({})",
                    p.id,
                    p.name,
                    format_usd(m.total_value),
                    format_signed_usd(m.unrealized_pnl),
                    format_pct(m.pnl_pct)
                );
            }
            let totals = aggregate_metrics(&portfolios, &prices);
            println!(
                "Total value {}  P&L {} ({})",
                format_usd(totals.total_value),
                format_signed_usd(totals.unrealized_pnl),
                format_pct(totals.pnl_pct)
            );
            Ok(())
        }
        PortfolioCommand::Show { id } => {
            let portfolio = match client.get_portfolio(id).await {
                Ok(p) => p,
                Err(e) if e.status_code() == Some(404) => bail!("Portfolio #{id} not found"),
                Err(e) => return Err(e.into()),
            };
            let prices = polled_prices(client, std::slice::from_ref(&portfolio)).await;
            println!("#{} {} ({})", portfolio.id, portfolio.name, portfolio.exchange_id);
            for v in value_holdings(&portfolio.holdings, &prices) {
                let price = v
                    .price
                    .map(|p| format_price(p, asset_class))
                    .unwrap_or_else(|| "—".into());
                println!(
                    "  {:<12} {:>14.6} @ {:>14}  value {:>16}  P&L {:>14} ({})",
                    v.symbol,
                    v.amount,
                    price,
                    format_usd(v.value),
                    format_signed_usd(v.pnl),
                    format_pct(v.pnl_pct)
                );
            }
            let missing = unpriced_symbols(&portfolio.holdings, &prices);
            if !missing.is_empty() {
                println!("Live prices unavailable for {} – valued at cost.", missing.join(", "));
            }
            Ok(())
        }
        PortfolioCommand::Create { name, exchange } => {
            if name.trim().is_empty() {
                bail!("Portfolio name is required");
            }
            let created = client
                .create_portfolio(&NewPortfolio {
                    name: name.trim().to_string(),
                    exchange_id: exchange,
                })
                .await?;
            println!("Created portfolio #{} {}", created.id, created.name);
            Ok(())
        }
        PortfolioCommand::Delete { id, yes } => {
            let mut confirm = ConfirmDelete::default();
            confirm.request(id);
            if !yes && !prompt_yes(&format!("Delete portfolio #{id}? [y/N] "))? {
                confirm.cancel();
            }
            match confirm.confirm() {
                Some(id) => {
                    client.delete_portfolio(id).await?;
                    println!("Deleted portfolio #{id}");
                }
                None => println!("Cancelled"),
            }
            Ok(())
        }
    }
}

/// Latest polled prices for every held symbol. A failed poll degrades to an
/// empty map so holdings are shown at cost.
async fn polled_prices(
    client: &ApiClient,
    portfolios: &[Portfolio],
) -> HashMap<String, f64> {
    let mut symbols: Vec<String> = portfolios
        .iter()
        .flat_map(|p| p.holdings.iter().map(|h| h.symbol.clone()))
        .collect();
    symbols.sort();
    symbols.dedup();
    match client.market_tickers(&symbols).await {
        Ok(tickers) => reconcile(&tickers, &HashMap::new()),
        Err(e) => {
            warn!("Ticker fetch failed: {e}");
            HashMap::new()
        }
    }
}

fn prompt_yes(question: &str) -> Result<bool> {
    print!("{question}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

async fn run_risk(cmd: RiskCommand, client: &ApiClient) -> Result<()> {
    match cmd {
        RiskCommand::Status { portfolio } => {
            let s = client.risk_status(portfolio).await?;
            println!("Equity        {:.2} (peak {:.2})", s.equity, s.peak_equity);
            println!("Drawdown      {:.2}%", s.drawdown * 100.0);
            println!("Daily P&L     {}", format_signed_usd(s.daily_pnl));
            println!("Total P&L     {}", format_signed_usd(s.total_pnl));
            println!("Open          {}", s.open_positions);
            if s.is_halted {
                println!("HALTED        {}", s.halt_reason);
            }
        }
        RiskCommand::Limits { portfolio } => {
            print_limits(&client.risk_limits(portfolio).await?);
        }
        RiskCommand::SetLimits { portfolio, set } => {
            let current = client.risk_limits(portfolio).await?;
            let mut editor = LimitsEditor::default();
            editor.start(&current);
            for (field, value) in &set {
                editor.set_field(*field, value)?;
            }
            save_limits(client, portfolio, &mut editor, &current).await?;
        }
        RiskCommand::EditLimits { portfolio } => {
            let current = client.risk_limits(portfolio).await?;
            let mut editor = LimitsEditor::default();
            editor.start(&current);
            println!("Enter a new value, leave empty to keep it, or q to cancel.");
            edit_limits_interactively(&mut editor, &current, &mut io::stdin().lock())?;
            if editor.is_editing() {
                save_limits(client, portfolio, &mut editor, &current).await?;
            } else {
                println!("Cancelled");
            }
        }
        RiskCommand::Var { portfolio, method } => {
            let v = client.value_at_risk(portfolio, &method).await?;
            println!(
                "{} VaR over {} days: 95% {:.2}  99% {:.2}  CVaR 95% {:.2}  99% {:.2}",
                v.method, v.window_days, v.var_95, v.var_99, v.cvar_95, v.cvar_99
            );
        }
        RiskCommand::HeatCheck { portfolio } => {
            let h = client.heat_check(portfolio).await?;
            println!("{}", if h.healthy { "Healthy" } else { "Issues found" });
            for issue in &h.issues {
                println!("  - {issue}");
            }
            println!(
                "Drawdown {:.2}%  daily P&L {}  open {}  max corr {:.2}  max conc {:.2}",
                h.drawdown * 100.0,
                format_signed_usd(h.daily_pnl),
                h.open_positions,
                h.max_correlation,
                h.max_concentration
            );
        }
        RiskCommand::ResetDaily { portfolio } => {
            let s = client.reset_daily(portfolio).await?;
            println!("Daily counters reset – daily P&L {}", format_signed_usd(s.daily_pnl));
        }
        RiskCommand::PositionSize {
            portfolio,
            entry,
            stop,
            risk,
        } => {
            let r = client
                .position_size(
                    portfolio,
                    &PositionSizeRequest {
                        entry_price: entry,
                        stop_loss_price: stop,
                        risk_per_trade: risk,
                    },
                )
                .await?;
            println!(
                "Size {:.6}  risk {:.2}  position value {:.2}",
                r.size, r.risk_amount, r.position_value
            );
        }
        RiskCommand::CheckTrade {
            portfolio,
            symbol,
            side,
            size,
            entry,
            stop,
        } => {
            let r = client
                .check_trade(
                    portfolio,
                    &TradeCheckRequest {
                        symbol,
                        side,
                        size,
                        entry_price: entry,
                        stop_loss_price: stop,
                    },
                )
                .await?;
            let verdict = if r.approved { "Approved" } else { "Rejected" };
            println!("{verdict}: {}", r.reason);
        }
    }
    Ok(())
}

async fn save_limits(
    client: &ApiClient,
    portfolio: i64,
    editor: &mut LimitsEditor,
    current: &RiskLimits,
) -> Result<()> {
    match editor.save(current) {
        Some(update) => {
            let saved = client.update_risk_limits(portfolio, &update).await?;
            println!("Risk limits updated");
            print_limits(&saved);
        }
        None => println!("No changes"),
    }
    Ok(())
}

/// Walk every limit field, reading one answer per prompt from *input*.
/// Invalid values are re-asked; `q` (or end of input) cancels the edit.
fn edit_limits_interactively(
    editor: &mut LimitsEditor,
    current: &RiskLimits,
    input: &mut impl BufRead,
) -> Result<()> {
    for field in LimitField::ALL {
        loop {
            print!("{} [{}]: ", field.label(), field.get(current));
            io::stdout().flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                editor.cancel();
                return Ok(());
            }
            match line.trim() {
                "" => break,
                "q" => {
                    editor.cancel();
                    return Ok(());
                }
                value => match editor.set_field(field, value) {
                    Ok(()) => break,
                    Err(e) => println!("  {e:#}"),
                },
            }
        }
    }
    Ok(())
}

fn print_limits(limits: &RiskLimits) {
    for field in LimitField::ALL {
        println!("{:<20} {:<24} {}", field.label(), field.key(), field.get(limits));
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

async fn run_workflows(cmd: WorkflowCommand, client: &ApiClient) -> Result<()> {
    match cmd {
        WorkflowCommand::List { asset_class } => {
            for w in client.list_workflows(asset_class).await? {
                let schedule = match (w.schedule_enabled, w.schedule_interval_seconds) {
                    (true, Some(secs)) => format!("every {secs}s"),
                    (true, None) => "scheduled".to_string(),
                    (false, _) => "manual".to_string(),
                };
                println!(
                    "{:<36} {:<28} {:>2} steps  {:>4} runs  {}",
                    w.id, w.name, w.step_count, w.run_count, schedule
                );
            }
        }
        WorkflowCommand::Show { id } => {
            let w = client.get_workflow(&id).await?;
            println!("{} – {}", w.summary.id, w.summary.name);
            if !w.summary.description.is_empty() {
                println!("{}", w.summary.description);
            }
            for step in w.ordered_steps() {
                let condition = step
                    .condition
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .map(|c| format!("  if: {c}"))
                    .unwrap_or_default();
                println!("  {:>2}. {:<28} {}{}", step.order, step.name, step.step_type, condition);
            }
        }
        WorkflowCommand::Trigger { id } => {
            let t = client.trigger_workflow(&id).await?;
            println!("Run {} queued (job {})", t.workflow_run_id, t.job_id);
        }
        WorkflowCommand::Enable { id } => {
            println!("{}", client.enable_workflow(&id).await?.status);
        }
        WorkflowCommand::Disable { id } => {
            println!("{}", client.disable_workflow(&id).await?.status);
        }
        WorkflowCommand::Runs { id, limit } => {
            for r in client.workflow_runs(&id, limit).await? {
                println!(
                    "{:<36} {:<10} {}/{}  {}{}",
                    r.id,
                    r.status,
                    r.current_step,
                    r.total_steps,
                    r.started_at.as_deref().unwrap_or("—"),
                    if r.error.is_empty() {
                        String::new()
                    } else {
                        format!("  error: {}", r.error)
                    }
                );
            }
        }
        WorkflowCommand::Run { run_id } => {
            let run = client.get_workflow_run(&run_id).await?;
            println!(
                "{} {} ({}) step {}/{}",
                run.summary.id,
                run.summary.status,
                run.summary.trigger,
                run.summary.current_step,
                run.summary.total_steps
            );
            for sr in run.ordered_step_runs() {
                let duration = sr
                    .duration_seconds
                    .map(|d| format!("{d:.1}s"))
                    .unwrap_or_default();
                let note = if !sr.condition_met {
                    "skipped".to_string()
                } else {
                    sr.error.clone()
                };
                println!(
                    "  {:<10} {:<28} {:<16} {:>7}  {}",
                    sr.status, sr.step_name, sr.step_type, duration, note
                );
            }
            if !run.summary.error.is_empty() {
                println!("Error: {}", run.summary.error);
            }
        }
        WorkflowCommand::CancelRun { run_id } => {
            println!("{}", client.cancel_workflow_run(&run_id).await?.status);
        }
        WorkflowCommand::Steps => {
            for st in client.workflow_step_types().await? {
                println!("{:<24} {}", st.step_type, st.description);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_parses_field_and_value() {
        let (field, value) = parse_assignment("max_daily_loss = 0.03").unwrap();
        assert_eq!(field, LimitField::MaxDailyLoss);
        assert_eq!(value, "0.03");
        assert!(parse_assignment("max_daily_loss").is_err());
        assert!(parse_assignment("nope=1").is_err());
    }

    fn limits() -> RiskLimits {
        serde_json::from_str(
            r#"{"max_portfolio_drawdown":0.2,"max_single_trade_risk":0.02,"max_daily_loss":0.05,
                "max_open_positions":10,"max_position_size_pct":0.25,"max_correlation":0.7,
                "min_risk_reward":2.0,"max_leverage":1.0}"#,
        )
        .unwrap()
    }

    #[test]
    fn interactive_edit_keeps_blank_answers_and_reasks_invalid_ones() {
        let current = limits();
        let mut editor = LimitsEditor::default();
        editor.start(&current);
        // Drawdown kept, trade risk re-asked after "abc", daily loss changed.
        let mut input = io::Cursor::new("\nabc\n0.03\n0.04\n");
        edit_limits_interactively(&mut editor, &current, &mut input).unwrap();

        // Input ran out before the last field, which cancels.
        assert!(!editor.is_editing());

        let mut editor = LimitsEditor::default();
        editor.start(&current);
        let answers = format!("\n\n0.03{}", "\n".repeat(LimitField::ALL.len()));
        let mut input = io::Cursor::new(answers);
        edit_limits_interactively(&mut editor, &current, &mut input).unwrap();
        assert!(editor.is_editing());
        let update = editor.save(&current).unwrap();
        assert_eq!(update.max_daily_loss, Some(0.03));
        assert_eq!(update.max_single_trade_risk, None);
    }

    #[test]
    fn q_cancels_interactive_edit() {
        let current = limits();
        let mut editor = LimitsEditor::default();
        editor.start(&current);
        let mut input = io::Cursor::new("0.3\nq\n");
        edit_limits_interactively(&mut editor, &current, &mut input).unwrap();
        assert!(!editor.is_editing());
        assert!(editor.save(&current).is_none());
    }

    #[test]
    fn ohlcv_change_is_close_to_close() {
        let bar = |close: f64| crate::models::OhlcvBar {
            timestamp: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        };
        assert_eq!(period_change_pct(&[bar(100.0), bar(90.0), bar(110.0)]), Some(10.0));
        assert_eq!(period_change_pct(&[]), None);
    }

    #[test]
    fn prefs_reset_restores_defaults() {
        let prefs = PreferenceStore::open_in_memory().unwrap();
        run_prefs(PrefsCommand::AssetClass { value: AssetClass::Forex }, &prefs).unwrap();
        run_prefs(PrefsCommand::ToggleTheme, &prefs).unwrap();
        assert_eq!(prefs.get(ASSET_CLASS_KEY, AssetClass::default()), AssetClass::Forex);
        assert_eq!(prefs.get(THEME_KEY, Theme::default()), Theme::Light);

        run_prefs(PrefsCommand::Reset, &prefs).unwrap();
        assert_eq!(prefs.get(ASSET_CLASS_KEY, AssetClass::default()), AssetClass::default());
        assert_eq!(prefs.get(THEME_KEY, Theme::default()), Theme::Dark);
    }
}
