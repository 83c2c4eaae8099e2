/// forms.rs – Explicit state machines behind the interactive widgets.
///
///  - `LimitsEditor`  – view / edit risk limits, submitting only changes
///  - `ConfirmDelete` – two-step destructive action
///  - `OrderDraft`    – text inputs → validated order request
use anyhow::{anyhow, bail, Context, Result};
use std::str::FromStr;

use crate::models::{NewOrder, OrderSide, OrderType, RiskLimits, RiskLimitsUpdate};

// ---------------------------------------------------------------------------
// Risk limits editor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitField {
    MaxPortfolioDrawdown,
    MaxSingleTradeRisk,
    MaxDailyLoss,
    MaxOpenPositions,
    MaxPositionSizePct,
    MaxCorrelation,
    MinRiskReward,
    MaxLeverage,
}

impl LimitField {
    pub const ALL: [LimitField; 8] = [
        LimitField::MaxPortfolioDrawdown,
        LimitField::MaxSingleTradeRisk,
        LimitField::MaxDailyLoss,
        LimitField::MaxOpenPositions,
        LimitField::MaxPositionSizePct,
        LimitField::MaxCorrelation,
        LimitField::MinRiskReward,
        LimitField::MaxLeverage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            LimitField::MaxPortfolioDrawdown => "max_portfolio_drawdown",
            LimitField::MaxSingleTradeRisk => "max_single_trade_risk",
            LimitField::MaxDailyLoss => "max_daily_loss",
            LimitField::MaxOpenPositions => "max_open_positions",
            LimitField::MaxPositionSizePct => "max_position_size_pct",
            LimitField::MaxCorrelation => "max_correlation",
            LimitField::MinRiskReward => "min_risk_reward",
            LimitField::MaxLeverage => "max_leverage",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LimitField::MaxPortfolioDrawdown => "Max Drawdown",
            LimitField::MaxSingleTradeRisk => "Max Trade Risk",
            LimitField::MaxDailyLoss => "Max Daily Loss",
            LimitField::MaxOpenPositions => "Max Positions",
            LimitField::MaxPositionSizePct => "Max Position Size",
            LimitField::MaxCorrelation => "Max Correlation",
            LimitField::MinRiskReward => "Min Risk/Reward",
            LimitField::MaxLeverage => "Max Leverage",
        }
    }

    pub fn get(self, limits: &RiskLimits) -> f64 {
        match self {
            LimitField::MaxPortfolioDrawdown => limits.max_portfolio_drawdown,
            LimitField::MaxSingleTradeRisk => limits.max_single_trade_risk,
            LimitField::MaxDailyLoss => limits.max_daily_loss,
            LimitField::MaxOpenPositions => f64::from(limits.max_open_positions),
            LimitField::MaxPositionSizePct => limits.max_position_size_pct,
            LimitField::MaxCorrelation => limits.max_correlation,
            LimitField::MinRiskReward => limits.min_risk_reward,
            LimitField::MaxLeverage => limits.max_leverage,
        }
    }

    fn set(self, limits: &mut RiskLimits, value: f64) {
        match self {
            LimitField::MaxPortfolioDrawdown => limits.max_portfolio_drawdown = value,
            LimitField::MaxSingleTradeRisk => limits.max_single_trade_risk = value,
            LimitField::MaxDailyLoss => limits.max_daily_loss = value,
            LimitField::MaxOpenPositions => limits.max_open_positions = value as u32,
            LimitField::MaxPositionSizePct => limits.max_position_size_pct = value,
            LimitField::MaxCorrelation => limits.max_correlation = value,
            LimitField::MinRiskReward => limits.min_risk_reward = value,
            LimitField::MaxLeverage => limits.max_leverage = value,
        }
    }
}

impl FromStr for LimitField {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        LimitField::ALL
            .into_iter()
            .find(|f| f.key() == s)
            .ok_or_else(|| anyhow!("Unknown risk limit: {s}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LimitsEditor {
    #[default]
    Viewing,
    Editing { draft: RiskLimits },
}

impl LimitsEditor {
    /// Enter edit mode with a draft copied from *limits*.
    pub fn start(&mut self, limits: &RiskLimits) {
        *self = LimitsEditor::Editing {
            draft: limits.clone(),
        };
    }

    pub fn is_editing(&self) -> bool {
        matches!(self, LimitsEditor::Editing { .. })
    }

    /// Parse *input* into the draft. Negative or non-numeric values are
    /// rejected and leave the draft untouched.
    pub fn set_field(&mut self, field: LimitField, input: &str) -> Result<()> {
        let LimitsEditor::Editing { draft } = self else {
            bail!("Not editing");
        };
        let value: f64 = input
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number", field.label()))?;
        if !value.is_finite() || value < 0.0 {
            bail!("{} must be a non-negative number", field.label());
        }
        if field == LimitField::MaxOpenPositions && value.fract() != 0.0 {
            bail!("{} must be a whole number", field.label());
        }
        field.set(draft, value);
        Ok(())
    }

    pub fn cancel(&mut self) {
        *self = LimitsEditor::Viewing;
    }

    /// Leave edit mode, returning the fields that differ from *current*.
    /// `None` when nothing changed or the editor was not editing.
    pub fn save(&mut self, current: &RiskLimits) -> Option<RiskLimitsUpdate> {
        let LimitsEditor::Editing { draft } = std::mem::take(self) else {
            return None;
        };
        let update = changed_limits(current, &draft);
        (!update.is_empty()).then_some(update)
    }
}

/// Fields of *draft* that differ from *current*.
pub fn changed_limits(current: &RiskLimits, draft: &RiskLimits) -> RiskLimitsUpdate {
    fn diff(a: f64, b: f64) -> Option<f64> {
        (a != b).then_some(b)
    }
    RiskLimitsUpdate {
        max_portfolio_drawdown: diff(current.max_portfolio_drawdown, draft.max_portfolio_drawdown),
        max_single_trade_risk: diff(current.max_single_trade_risk, draft.max_single_trade_risk),
        max_daily_loss: diff(current.max_daily_loss, draft.max_daily_loss),
        max_open_positions: (current.max_open_positions != draft.max_open_positions)
            .then_some(draft.max_open_positions),
        max_position_size_pct: diff(current.max_position_size_pct, draft.max_position_size_pct),
        max_correlation: diff(current.max_correlation, draft.max_correlation),
        min_risk_reward: diff(current.min_risk_reward, draft.min_risk_reward),
        max_leverage: diff(current.max_leverage, draft.max_leverage),
    }
}

// ---------------------------------------------------------------------------
// Delete confirmation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfirmDelete {
    #[default]
    Idle,
    Confirming(i64),
}

impl ConfirmDelete {
    pub fn request(&mut self, id: i64) {
        *self = ConfirmDelete::Confirming(id);
    }

    /// The id awaiting confirmation, if any; always returns to `Idle`.
    pub fn confirm(&mut self) -> Option<i64> {
        match std::mem::take(self) {
            ConfirmDelete::Confirming(id) => Some(id),
            ConfirmDelete::Idle => None,
        }
    }

    pub fn cancel(&mut self) {
        *self = ConfirmDelete::Idle;
    }

    pub fn pending(&self) -> Option<i64> {
        match self {
            ConfirmDelete::Confirming(id) => Some(*id),
            ConfirmDelete::Idle => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Order entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct OrderDraft {
    pub symbol: String,
    pub side: String,
    pub amount: String,
    /// Empty for a market order.
    pub price: String,
    pub exchange_id: Option<String>,
}

impl OrderDraft {
    pub fn build(&self) -> Result<NewOrder> {
        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            bail!("Symbol is required");
        }
        let side: OrderSide = self.side.trim().parse()?;
        let amount = parse_positive(&self.amount, "Amount")?;

        let price = match self.price.trim() {
            "" => None,
            p => Some(parse_positive(p, "Price")?),
        };
        let order_type = if price.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        };

        Ok(NewOrder {
            symbol: symbol.to_uppercase(),
            side,
            order_type: Some(order_type),
            amount,
            price,
            exchange_id: self.exchange_id.clone(),
        })
    }
}

fn parse_positive(input: &str, what: &str) -> Result<f64> {
    let value: f64 = input
        .trim()
        .parse()
        .with_context(|| format!("{what} must be a number"))?;
    if !value.is_finite() || value <= 0.0 {
        bail!("{what} must be greater than zero");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_portfolio_drawdown: 0.2,
            max_single_trade_risk: 0.02,
            max_daily_loss: 0.05,
            max_open_positions: 10,
            max_position_size_pct: 0.25,
            max_correlation: 0.7,
            min_risk_reward: 2.0,
            max_leverage: 1.0,
        }
    }

    #[test]
    fn save_submits_only_changed_fields() {
        let current = limits();
        let mut editor = LimitsEditor::default();
        editor.start(&current);
        editor.set_field(LimitField::MaxDailyLoss, "0.03").unwrap();
        editor.set_field(LimitField::MaxOpenPositions, "12").unwrap();

        let update = editor.save(&current).unwrap();
        assert_eq!(update.max_daily_loss, Some(0.03));
        assert_eq!(update.max_open_positions, Some(12));
        assert_eq!(update.max_leverage, None);
        assert_eq!(editor, LimitsEditor::Viewing);

        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[test]
    fn unchanged_save_returns_none() {
        let current = limits();
        let mut editor = LimitsEditor::default();
        editor.start(&current);
        editor.set_field(LimitField::MaxLeverage, "1").unwrap();
        assert!(editor.save(&current).is_none());
        assert!(!editor.is_editing());
    }

    #[test]
    fn invalid_input_keeps_draft() {
        let mut editor = LimitsEditor::default();
        assert!(editor.set_field(LimitField::MaxLeverage, "2").is_err());
        editor.start(&limits());
        assert!(editor.set_field(LimitField::MaxLeverage, "abc").is_err());
        assert!(editor.set_field(LimitField::MaxLeverage, "-1").is_err());
        assert!(editor.set_field(LimitField::MaxOpenPositions, "2.5").is_err());
        assert!(editor.save(&limits()).is_none());
    }

    #[test]
    fn limit_field_parses_from_key() {
        assert_eq!(
            "max_daily_loss".parse::<LimitField>().unwrap(),
            LimitField::MaxDailyLoss
        );
        assert!("max_anything".parse::<LimitField>().is_err());
    }

    #[test]
    fn confirm_delete_flow() {
        let mut confirm = ConfirmDelete::default();
        assert_eq!(confirm.confirm(), None);
        confirm.request(42);
        assert_eq!(confirm.pending(), Some(42));
        assert_eq!(confirm.confirm(), Some(42));
        assert_eq!(confirm, ConfirmDelete::Idle);
        confirm.request(7);
        confirm.cancel();
        assert_eq!(confirm.confirm(), None);
    }

    #[test]
    fn order_type_follows_price() {
        let mut draft = OrderDraft {
            symbol: "btc/usdt".into(),
            side: "buy".into(),
            amount: "0.5".into(),
            ..OrderDraft::default()
        };
        let order = draft.build().unwrap();
        assert_eq!(order.symbol, "BTC/USDT");
        assert_eq!(order.order_type, Some(OrderType::Market));
        assert_eq!(order.price, None);

        draft.price = "50000".into();
        let order = draft.build().unwrap();
        assert_eq!(order.order_type, Some(OrderType::Limit));
        assert_eq!(order.price, Some(50000.0));
    }

    #[test]
    fn order_rejects_bad_amounts() {
        let mut draft = OrderDraft {
            symbol: "ETH/USDT".into(),
            side: "sell".into(),
            amount: "0".into(),
            ..OrderDraft::default()
        };
        assert!(draft.build().is_err());
        draft.amount = "lots".into();
        assert!(draft.build().is_err());
        draft.amount = "1".into();
        draft.side = "hold".into();
        assert!(draft.build().is_err());
    }
}
