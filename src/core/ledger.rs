//! Trade-driven state transitions over an account snapshot.
//!
//! `apply_trade` is pure: it validates a [`TradeRequest`], returns the new
//! snapshot and the trade row to append, and lists which rows changed so the
//! caller can persist them as one unit of work.
use crate::core::model::{
    CashBalance, ExchangeDirection, Holding, Market, RealizedPnl, Trade, TradeKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Tolerance for floating point residue when comparing quantities.
const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Invalid market: {0}")]
    InvalidMarket(String),

    #[error("Invalid {field}: {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("No holding for {code} in {market}")]
    HoldingNotFound { market: Market, code: String },

    #[error("Insufficient quantity for {code}: holding {held}, requested {requested}")]
    InsufficientQuantity {
        code: String,
        held: f64,
        requested: f64,
    },

    #[error("No cash balance for {0}")]
    CashNotFound(Market),

    #[error("Order is missing an instrument code")]
    MissingCode,

    #[error("Invalid trade date: {0}")]
    InvalidDate(String),
}

/// Holdings, cash and realized profit of one account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub holdings: Vec<Holding>,
    pub cash: Vec<CashBalance>,
    pub realized: RealizedPnl,
}

impl Snapshot {
    pub fn holding(&self, market: Market, code: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.is_key(market, code))
    }

    fn holding_mut(&mut self, market: Market, code: &str) -> Option<&mut Holding> {
        self.holdings.iter_mut().find(|h| h.is_key(market, code))
    }

    pub fn cash(&self, market: Market) -> Option<&CashBalance> {
        self.cash.iter().find(|c| c.market == market)
    }

    fn cash_mut(&mut self, market: Market) -> Option<&mut CashBalance> {
        self.cash.iter_mut().find(|c| c.market == market)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub market: Market,
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Only used when the buy opens a new holding.
    #[serde(default)]
    pub sector: Option<String>,
    pub price: f64,
    pub qty: f64,
    /// Overrides the holding's last observed price.
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashRequest {
    pub market: Market,
    pub amount: f64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub direction: ExchangeDirection,
    pub from_amount: f64,
    pub to_amount: f64,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TradeRequest {
    Buy(OrderRequest),
    Sell(OrderRequest),
    Deposit(CashRequest),
    Withdraw(CashRequest),
    Exchange(ExchangeRequest),
}

impl TradeRequest {
    pub fn kind(&self) -> TradeKind {
        match self {
            TradeRequest::Buy(_) => TradeKind::Buy,
            TradeRequest::Sell(_) => TradeKind::Sell,
            TradeRequest::Deposit(_) => TradeKind::Deposit,
            TradeRequest::Withdraw(_) => TradeKind::Withdraw,
            TradeRequest::Exchange(_) => TradeKind::Exchange,
        }
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            TradeRequest::Buy(o) | TradeRequest::Sell(o) => o.date,
            TradeRequest::Deposit(c) | TradeRequest::Withdraw(c) => c.date,
            TradeRequest::Exchange(e) => e.date,
        }
    }
}

/// Rows touched by a transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub holding: Option<(Market, String)>,
    pub cash: Vec<Market>,
    pub realized_delta: Option<(Market, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTrade {
    pub snapshot: Snapshot,
    pub trade: Trade,
    pub changes: Changes,
}

fn ensure_amount(field: &'static str, value: f64) -> Result<(), LedgerError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount { field, value })
    }
}

fn validate(request: &TradeRequest) -> Result<(), LedgerError> {
    match request {
        TradeRequest::Buy(o) | TradeRequest::Sell(o) => {
            ensure_amount("price", o.price)?;
            ensure_amount("qty", o.qty)?;
            if let Some(p) = o.current_price {
                ensure_amount("current price", p)?;
            }
            if o.code.trim().is_empty() {
                return Err(LedgerError::MissingCode);
            }
        }
        TradeRequest::Deposit(c) | TradeRequest::Withdraw(c) => ensure_amount("amount", c.amount)?,
        TradeRequest::Exchange(e) => {
            ensure_amount("from amount", e.from_amount)?;
            ensure_amount("to amount", e.to_amount)?;
        }
    }
    Ok(())
}

/// Applies `request` to `snapshot` for `account_id`.
///
/// Buys re-average the cost basis, sells realize profit against the running
/// average and never delete the holding. Requests are validated before
/// anything is changed, so an error leaves no partial state.
pub fn apply_trade(
    snapshot: &Snapshot,
    account_id: &str,
    request: &TradeRequest,
) -> Result<AppliedTrade, LedgerError> {
    validate(request)?;

    let mut next = snapshot.clone();
    let date = request.date().unwrap_or_else(Utc::now);
    let mut trade = Trade::new(account_id, request.kind(), date);
    let mut changes = Changes::default();

    match request {
        TradeRequest::Buy(order) => {
            buy(&mut next, order);
            fill_order(&mut trade, order);
            trade.name = Some(next.holding(order.market, &order.code).map_or_else(
                || order.code.clone(),
                |h| h.name.clone(),
            ));
            changes.holding = Some((order.market, order.code.clone()));
        }
        TradeRequest::Sell(order) => {
            let (pnl, buy_price) = sell(&mut next, order)?;
            fill_order(&mut trade, order);
            trade.name = next
                .holding(order.market, &order.code)
                .map(|h| h.name.clone());
            trade.pnl = Some(pnl);
            trade.buy_price = Some(buy_price);
            next.realized.adjust(order.market, pnl);
            changes.holding = Some((order.market, order.code.clone()));
            changes.realized_delta = Some((order.market, pnl));
        }
        TradeRequest::Deposit(c) => {
            match next.cash_mut(c.market) {
                Some(balance) => balance.amount += c.amount,
                None => next.cash.push(CashBalance {
                    amount: c.amount,
                    ..CashBalance::zeroed(c.market)
                }),
            }
            trade.market = Some(c.market);
            trade.amount = Some(c.amount);
            changes.cash.push(c.market);
        }
        TradeRequest::Withdraw(c) => {
            let balance = next
                .cash_mut(c.market)
                .ok_or(LedgerError::CashNotFound(c.market))?;
            balance.amount -= c.amount;
            trade.market = Some(c.market);
            trade.amount = Some(c.amount);
            changes.cash.push(c.market);
        }
        TradeRequest::Exchange(e) => {
            let (from, to) = e.direction.legs();
            if next.cash(to).is_none() {
                return Err(LedgerError::CashNotFound(to));
            }
            next.cash_mut(from)
                .ok_or(LedgerError::CashNotFound(from))?
                .amount -= e.from_amount;
            if let Some(balance) = next.cash_mut(to) {
                balance.amount += e.to_amount;
            }
            trade.direction = Some(e.direction);
            trade.from_amount = Some(e.from_amount);
            trade.to_amount = Some(e.to_amount);
            trade.rate = e.rate;
            changes.cash.extend([from, to]);
        }
    }

    debug!(kind = %trade.kind, id = %trade.id, "Applied trade to snapshot");
    Ok(AppliedTrade {
        snapshot: next,
        trade,
        changes,
    })
}

fn fill_order(trade: &mut Trade, order: &OrderRequest) {
    trade.market = Some(order.market);
    trade.code = Some(order.code.clone());
    trade.price = Some(order.price);
    trade.qty = Some(order.qty);
    trade.amount = Some(order.price * order.qty);
}

fn buy(snapshot: &mut Snapshot, order: &OrderRequest) {
    match snapshot.holding_mut(order.market, &order.code) {
        Some(existing) => {
            if order.qty > 0.0 {
                let total_cost =
                    existing.buy_price * existing.holding_qty + order.price * order.qty;
                let total_qty = existing.holding_qty + order.qty;
                existing.buy_price = if total_qty > 0.0 {
                    total_cost / total_qty
                } else {
                    order.price
                };
                existing.holding_qty = total_qty;
            }
            if let Some(price) = order.current_price {
                existing.current_price = price;
            }
        }
        None => {
            let mut holding = Holding::new(order.market, &order.code);
            if let Some(name) = &order.name {
                holding.name = name.clone();
            }
            if let Some(sector) = &order.sector {
                holding.sector = sector.clone();
            }
            holding.buy_price = order.price;
            holding.holding_qty = order.qty;
            holding.current_price = order.current_price.unwrap_or(order.price);
            snapshot.holdings.push(holding);
        }
    }
}

/// Returns (realized pnl, average cost it was realized against).
fn sell(snapshot: &mut Snapshot, order: &OrderRequest) -> Result<(f64, f64), LedgerError> {
    let existing = snapshot
        .holding_mut(order.market, &order.code)
        .ok_or_else(|| LedgerError::HoldingNotFound {
            market: order.market,
            code: order.code.clone(),
        })?;

    if order.qty > existing.holding_qty + QTY_EPSILON {
        return Err(LedgerError::InsufficientQuantity {
            code: order.code.clone(),
            held: existing.holding_qty,
            requested: order.qty,
        });
    }

    let buy_price = existing.buy_price;
    let pnl = (order.price - buy_price) * order.qty;

    let remaining = existing.holding_qty - order.qty;
    existing.holding_qty = if remaining <= QTY_EPSILON {
        0.0
    } else {
        remaining
    };
    if let Some(price) = order.current_price {
        existing.current_price = price;
    }
    Ok((pnl, buy_price))
}

/// Undoes the realized profit of a deleted sell. Holdings and average cost are
/// left as they are for every trade kind.
pub fn reverse_trade(snapshot: &Snapshot, trade: &Trade) -> (Snapshot, Changes) {
    let mut next = snapshot.clone();
    let mut changes = Changes::default();
    if let (TradeKind::Sell, Some(pnl), Some(market)) = (trade.kind, trade.pnl, trade.market) {
        next.realized.adjust(market, -pnl);
        changes.realized_delta = Some((market, -pnl));
    }
    (next, changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(holding: Holding) -> Snapshot {
        Snapshot {
            holdings: vec![holding],
            cash: Market::ALL.iter().map(|m| CashBalance::zeroed(*m)).collect(),
            realized: RealizedPnl::default(),
        }
    }

    fn order(market: Market, code: &str, price: f64, qty: f64) -> OrderRequest {
        OrderRequest {
            market,
            code: code.to_string(),
            name: None,
            sector: None,
            price,
            qty,
            current_price: None,
            date: None,
        }
    }

    fn held(buy_price: f64, qty: f64, current: f64) -> Holding {
        Holding {
            buy_price,
            holding_qty: qty,
            current_price: current,
            ..Holding::new(Market::Kr, "005930")
        }
    }

    #[test]
    fn test_buy_creates_new_holding() {
        let snapshot = Snapshot::default();
        let mut o = order(Market::Us, "AAPL", 150.0, 3.0);
        o.sector = Some("BIGTECH".to_string());
        o.name = Some("Apple".to_string());
        let applied = apply_trade(&snapshot, "main", &TradeRequest::Buy(o)).unwrap();

        let h = applied.snapshot.holding(Market::Us, "AAPL").unwrap();
        assert_eq!(h.buy_price, 150.0);
        assert_eq!(h.current_price, 150.0);
        assert_eq!(h.holding_qty, 3.0);
        assert_eq!(h.sector, "BIGTECH");
        assert_eq!(applied.trade.kind, TradeKind::Buy);
        assert_eq!(applied.trade.pnl, None);
        assert_eq!(applied.trade.amount, Some(450.0));
        assert_eq!(applied.trade.name.as_deref(), Some("Apple"));
        assert_eq!(
            applied.changes.holding,
            Some((Market::Us, "AAPL".to_string()))
        );
    }

    #[test]
    fn test_buy_new_holding_defaults_sector() {
        let applied = apply_trade(
            &Snapshot::default(),
            "main",
            &TradeRequest::Buy(order(Market::Kr, "035420", 200_000.0, 1.0)),
        )
        .unwrap();
        assert_eq!(applied.snapshot.holdings[0].sector, "ETC");
    }

    #[test]
    fn test_buy_recomputes_weighted_average() {
        let snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Buy(order(Market::Kr, "005930", 200.0, 10.0)),
        )
        .unwrap();
        let h = applied.snapshot.holding(Market::Kr, "005930").unwrap();
        assert_eq!(h.buy_price, 150.0);
        assert_eq!(h.holding_qty, 20.0);
        // Last observed price is untouched unless passed.
        assert_eq!(h.current_price, 120.0);
    }

    #[test]
    fn test_buy_zero_qty_is_a_no_op() {
        for existing in [held(100.0, 10.0, 120.0), held(100.0, 0.0, 120.0)] {
            let snapshot = snapshot_with(existing.clone());
            let applied = apply_trade(
                &snapshot,
                "main",
                &TradeRequest::Buy(order(Market::Kr, "005930", 9999.0, 0.0)),
            )
            .unwrap();
            let h = applied.snapshot.holding(Market::Kr, "005930").unwrap();
            assert_eq!(h.buy_price, existing.buy_price);
            assert_eq!(h.holding_qty, existing.holding_qty);
        }
    }

    #[test]
    fn test_buy_into_flat_holding_takes_new_price() {
        let snapshot = snapshot_with(held(100.0, 0.0, 120.0));
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Buy(order(Market::Kr, "005930", 130.0, 5.0)),
        )
        .unwrap();
        let h = applied.snapshot.holding(Market::Kr, "005930").unwrap();
        assert_eq!(h.buy_price, 130.0);
        assert_eq!(h.holding_qty, 5.0);
    }

    #[test]
    fn test_sell_realizes_against_average_cost() {
        let snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Sell(order(Market::Kr, "005930", 150.0, 4.0)),
        )
        .unwrap();

        assert_eq!(applied.trade.pnl, Some(200.0));
        assert_eq!(applied.trade.buy_price, Some(100.0));
        let h = applied.snapshot.holding(Market::Kr, "005930").unwrap();
        assert_eq!(h.holding_qty, 6.0);
        assert_eq!(h.buy_price, 100.0);
        assert_eq!(applied.snapshot.realized.get(Market::Kr), 200.0);
        assert_eq!(applied.changes.realized_delta, Some((Market::Kr, 200.0)));
    }

    #[test]
    fn test_repeated_partial_sells_use_same_average() {
        let mut snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        for _ in 0..2 {
            snapshot = apply_trade(
                &snapshot,
                "main",
                &TradeRequest::Sell(order(Market::Kr, "005930", 90.0, 5.0)),
            )
            .unwrap()
            .snapshot;
        }
        assert_eq!(snapshot.realized.get(Market::Kr), -100.0);
    }

    #[test]
    fn test_full_liquidation_keeps_row_at_zero() {
        let snapshot = snapshot_with(Holding {
            target_weight: 15.0,
            sector: "AI".to_string(),
            ..held(100.0, 10.0, 120.0)
        });
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Sell(order(Market::Kr, "005930", 120.0, 10.0)),
        )
        .unwrap();
        let h = applied.snapshot.holding(Market::Kr, "005930").unwrap();
        assert_eq!(h.holding_qty, 0.0);
        assert_eq!(h.target_weight, 15.0);
        assert_eq!(h.sector, "AI");
        assert_eq!(applied.snapshot.holdings.len(), 1);
    }

    #[test]
    fn test_sell_float_residue_clamps_to_zero() {
        let snapshot = snapshot_with(held(100.0, 0.3, 100.0));
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Sell(order(Market::Kr, "005930", 100.0, 0.1 + 0.2)),
        )
        .unwrap();
        assert_eq!(
            applied.snapshot.holding(Market::Kr, "005930").unwrap().holding_qty,
            0.0
        );
    }

    #[test]
    fn test_oversell_is_rejected() {
        let snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        let err = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Sell(order(Market::Kr, "005930", 150.0, 11.0)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientQuantity {
                code: "005930".to_string(),
                held: 10.0,
                requested: 11.0,
            }
        );
    }

    #[test]
    fn test_sell_without_holding_is_rejected() {
        let err = apply_trade(
            &Snapshot::default(),
            "main",
            &TradeRequest::Sell(order(Market::Us, "TSLA", 150.0, 1.0)),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::HoldingNotFound { .. }));
    }

    #[test]
    fn test_negative_inputs_are_rejected() {
        let snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        let err = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Buy(order(Market::Kr, "005930", -1.0, 1.0)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidAmount {
                field: "price",
                value: -1.0
            }
        );
        let err = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Deposit(CashRequest {
                market: Market::Kr,
                amount: f64::NAN,
                date: None,
            }),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { field: "amount", .. }));
    }

    #[test]
    fn test_deposit_and_withdraw_adjust_cash() {
        let snapshot = Snapshot::default();
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Deposit(CashRequest {
                market: Market::Kr,
                amount: 1_000_000.0,
                date: None,
            }),
        )
        .unwrap();
        assert_eq!(applied.snapshot.cash(Market::Kr).unwrap().amount, 1_000_000.0);

        let applied = apply_trade(
            &applied.snapshot,
            "main",
            &TradeRequest::Withdraw(CashRequest {
                market: Market::Kr,
                amount: 1_500_000.0,
                date: None,
            }),
        )
        .unwrap();
        // No balance guard on withdrawals.
        assert_eq!(applied.snapshot.cash(Market::Kr).unwrap().amount, -500_000.0);
        assert_eq!(applied.changes.cash, vec![Market::Kr]);
    }

    #[test]
    fn test_withdraw_requires_cash_row() {
        let err = apply_trade(
            &Snapshot::default(),
            "main",
            &TradeRequest::Withdraw(CashRequest {
                market: Market::Us,
                amount: 1.0,
                date: None,
            }),
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::CashNotFound(Market::Us));
    }

    #[test]
    fn test_exchange_moves_both_legs() {
        let mut snapshot = snapshot_with(held(1.0, 1.0, 1.0));
        snapshot.cash[0].amount = 2_700_000.0;
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Exchange(ExchangeRequest {
                direction: ExchangeDirection::KrToUs,
                from_amount: 1_350_000.0,
                to_amount: 1000.0,
                rate: Some(1350.0),
                date: None,
            }),
        )
        .unwrap();
        assert_eq!(applied.snapshot.cash(Market::Kr).unwrap().amount, 1_350_000.0);
        assert_eq!(applied.snapshot.cash(Market::Us).unwrap().amount, 1000.0);
        assert_eq!(applied.trade.direction, Some(ExchangeDirection::KrToUs));
        assert_eq!(applied.trade.rate, Some(1350.0));
        assert_eq!(applied.changes.cash, vec![Market::Kr, Market::Us]);
    }

    #[test]
    fn test_exchange_missing_leg_changes_nothing() {
        let snapshot = Snapshot {
            cash: vec![CashBalance {
                amount: 100.0,
                ..CashBalance::zeroed(Market::Us)
            }],
            ..Snapshot::default()
        };
        let err = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Exchange(ExchangeRequest {
                direction: ExchangeDirection::UsToKr,
                from_amount: 50.0,
                to_amount: 67_500.0,
                rate: None,
                date: None,
            }),
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::CashNotFound(Market::Kr));
    }

    #[test]
    fn test_backdated_trade_keeps_date() {
        let date = "2024-03-04T01:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let applied = apply_trade(
            &Snapshot::default(),
            "main",
            &TradeRequest::Deposit(CashRequest {
                market: Market::Us,
                amount: 10.0,
                date: Some(date),
            }),
        )
        .unwrap();
        assert_eq!(applied.trade.date, date);
    }

    #[test]
    fn test_reverse_sell_restores_realized_only() {
        let snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Sell(order(Market::Kr, "005930", 150.0, 4.0)),
        )
        .unwrap();
        let (reversed, changes) = reverse_trade(&applied.snapshot, &applied.trade);
        assert_eq!(reversed.realized.get(Market::Kr), 0.0);
        assert_eq!(
            reversed.holding(Market::Kr, "005930").unwrap().holding_qty,
            6.0
        );
        assert_eq!(changes.realized_delta, Some((Market::Kr, -200.0)));
    }

    #[test]
    fn test_reverse_buy_changes_nothing() {
        let snapshot = snapshot_with(held(100.0, 10.0, 120.0));
        let applied = apply_trade(
            &snapshot,
            "main",
            &TradeRequest::Buy(order(Market::Kr, "005930", 200.0, 10.0)),
        )
        .unwrap();
        let (reversed, changes) = reverse_trade(&applied.snapshot, &applied.trade);
        assert_eq!(reversed, applied.snapshot);
        assert_eq!(changes, Changes::default());
    }

    #[test]
    fn test_request_deserializes_from_tagged_json() {
        let json = r#"{"type":"sell","market":"US","code":"AAPL","price":180.5,"qty":2}"#;
        let request: TradeRequest = serde_json::from_str(json).unwrap();
        match request {
            TradeRequest::Sell(o) => {
                assert_eq!(o.market, Market::Us);
                assert_eq!(o.qty, 2.0);
            }
            other => panic!("Expected a sell, got {other:?}"),
        }
        let bad = r#"{"type":"sell","market":"JP","code":"7203","price":1,"qty":1}"#;
        assert!(serde_json::from_str::<TradeRequest>(bad).is_err());
    }
}
