//! Typed model of the bot state pushed over the live feed and served by
//! `GET /data`, shared across the entire workspace.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Monetary values on the wire arrive as JSON numbers.
pub type Price = Decimal;

/// Exit reason the bot assigns to a closed position it could not confirm the
/// broker ever executed. Positions carrying it are ghosts: kept in the state
/// for display, excluded from every P&L and win-rate computation.
pub const RECONCILIATION_MISSING: &str = "RECONCILIATION_MISSING";

/// Setup grade the bot assigns to positions adopted from the broker rather
/// than opened by its own scanner.
pub const ORPHAN_GRADE: &str = "ORPHAN";

/// Lifecycle of a single position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" | "open" => Ok(Self::Open),
            "CLOSED" | "closed" => Ok(Self::Closed),
            other => Err(format!("unsupported position status '{other}'")),
        }
    }
}

/// One instrument's current or historical trade as the bot reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub status: PositionStatus,
    pub entry_price: Price,
    #[serde(default)]
    pub qty: u32,
    /// Stop loss level.
    #[serde(default)]
    pub sl: Price,
    /// Profit target level.
    #[serde(default)]
    pub target: Price,
    /// Latest traded price the bot has seen; absent until its first tick.
    #[serde(default)]
    pub current_ltp: Option<Price>,
    #[serde(default)]
    pub entry_time: String,
    #[serde(default)]
    pub exit_time: Option<String>,
    #[serde(default)]
    pub exit_price: Option<Price>,
    #[serde(default)]
    pub exit_reason: Option<String>,
    #[serde(default)]
    pub setup_grade: Option<String>,
    /// True for positions adopted from the broker during reconciliation.
    #[serde(default)]
    pub is_orphaned: bool,
}

impl Position {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// A closed position the bot could not confirm was genuinely executed.
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        self.status == PositionStatus::Closed
            && self.exit_reason.as_deref() == Some(RECONCILIATION_MISSING)
    }

    /// Whether this position counts toward P&L, win rate, and trade totals:
    /// closed, not a ghost, and resolved with a positive exit price.
    #[must_use]
    pub fn is_countable(&self) -> bool {
        self.status == PositionStatus::Closed
            && !self.is_ghost()
            && self.exit_price.is_some_and(|price| price > Decimal::ZERO)
    }

    /// Absolute realized P&L, `None` unless the position is countable.
    #[must_use]
    pub fn realized_pnl(&self) -> Option<Price> {
        if !self.is_countable() {
            return None;
        }
        let exit = self.exit_price?;
        Some((exit - self.entry_price) * Decimal::from(self.qty))
    }

    /// Percent P&L relative to entry, `None` unless countable with a
    /// non-zero entry. Distinct from [`Self::realized_pnl`]; the journal
    /// shows both.
    #[must_use]
    pub fn pnl_pct(&self) -> Option<Decimal> {
        if !self.is_countable() || self.entry_price == Decimal::ZERO {
            return None;
        }
        let exit = self.exit_price?;
        Some((exit - self.entry_price) / self.entry_price * Decimal::from(100))
    }

    /// Calendar date parsed from `entry_time`. The bot emits full timestamps
    /// in history records but only a wall-clock time for intraday entries,
    /// so this is `None` for time-only or sentinel values.
    #[must_use]
    pub fn entry_date(&self) -> Option<NaiveDate> {
        parse_wire_date(&self.entry_time)
    }
}

/// A detected trade opportunity, not necessarily acted on. The bot gives no
/// uniqueness guarantee, so consumers must render these strictly in wire
/// order and never key them by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub time: String,
    pub symbol: String,
    pub price: Price,
    pub message: String,
    #[serde(default)]
    pub sector: String,
}

/// One sector's percentage move as scraped by the bot, positive movers only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    #[serde(default)]
    pub key: String,
    pub change: f64,
}

/// Broad market index quote, auxiliary display data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub name: String,
    pub ltp: Price,
    #[serde(default)]
    pub change: f64,
}

/// Trading guardrails currently in force on the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_trades_day: u32,
    pub max_trades_stock: u32,
    pub trading_start_time: String,
    pub trading_end_time: String,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_trades_day: 0,
            max_trades_stock: 0,
            trading_start_time: String::new(),
            trading_end_time: String::new(),
        }
    }
}

/// The complete bot state at one instant.
///
/// A snapshot is immutable once received: the bot always pushes the whole
/// state and consumers replace their copy wholesale, never patch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Snapshot {
    /// Kill-switch flag; false halts new entries without touching open
    /// positions.
    pub is_trading_allowed: bool,
    pub is_running: bool,
    pub status: String,
    pub last_update: Option<String>,
    pub positions: BTreeMap<String, Position>,
    /// Newest first, capped by the bot; rendered in wire order.
    pub signals: Vec<Signal>,
    /// Preformatted log lines, capped by the bot.
    pub logs: Vec<String>,
    pub top_sectors: Vec<Sector>,
    pub indices: Vec<IndexQuote>,
    pub limits: Limits,
    pub total_trades_today: u32,
    pub stock_trade_counts: BTreeMap<String, u32>,
}

impl Snapshot {
    /// Symbol/position pairs currently open, in symbol order.
    pub fn open_positions(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.positions
            .iter()
            .filter(|(_, position)| position.is_open())
            .map(|(symbol, position)| (symbol.as_str(), position))
    }

    /// Symbol/position pairs that count toward aggregate metrics.
    pub fn countable_positions(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.positions
            .iter()
            .filter(|(_, position)| position.is_countable())
            .map(|(symbol, position)| (symbol.as_str(), position))
    }
}

/// Connection-level health, independent of snapshot content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub connected: bool,
}

/// Parse the date part of a bot timestamp. Accepts full timestamps
/// (`2026-08-21 10:15:00`, ISO-8601 variants) and bare dates; returns `None`
/// for time-only strings and sentinels like `RECONCILED`.
#[must_use]
pub fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.split(&[' ', 'T']).next()?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// The bot's persisted settings document, round-tripped through
/// `GET/POST /config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotConfig {
    pub risk: RiskConfig,
    pub limits: LimitsConfig,
    pub general: GeneralConfig,
    pub position_sizing: PositionSizingConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_pct: f64,
    pub target_pct: f64,
    pub trail_be_trigger: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.01,
            target_pct: 0.02,
            trail_be_trigger: 0.012,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_trades_per_day: u32,
    pub max_trades_per_stock: u32,
    pub trading_start_time: String,
    pub trading_end_time: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_trades_per_day: 3,
            max_trades_per_stock: 2,
            trading_start_time: "09:30".into(),
            trading_end_time: "14:45".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub quantity: u32,
    pub check_interval: u64,
    pub dry_run: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            quantity: 1,
            check_interval: 300,
            dry_run: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSizingConfig {
    pub mode: String,
    pub risk_per_trade_pct: f64,
    pub max_position_size_pct: f64,
    pub min_sl_distance_pct: f64,
    pub paper_trading_balance: f64,
}

impl Default for PositionSizingConfig {
    fn default() -> Self {
        Self {
            mode: "fixed".into(),
            risk_per_trade_pct: 1.0,
            max_position_size_pct: 25.0,
            min_sl_distance_pct: 0.5,
            paper_trading_balance: 100_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_id: String,
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn closed(entry: Price, exit: Price, qty: u32, reason: &str) -> Position {
        Position {
            status: PositionStatus::Closed,
            entry_price: entry,
            qty,
            sl: Decimal::ZERO,
            target: Decimal::ZERO,
            current_ltp: None,
            entry_time: "10:05".into(),
            exit_time: None,
            exit_price: Some(exit),
            exit_reason: Some(reason.into()),
            setup_grade: Some("A".into()),
            is_orphaned: false,
        }
    }

    #[test]
    fn countable_position_reports_pnl() {
        let position = closed(dec!(100), dec!(110), 10, "TARGET_HIT");
        assert!(position.is_countable());
        assert_eq!(position.realized_pnl(), Some(dec!(100)));
        assert_eq!(position.pnl_pct(), Some(dec!(10)));
    }

    #[test]
    fn ghost_position_is_excluded_but_visible() {
        let position = closed(dec!(100), dec!(0), 10, RECONCILIATION_MISSING);
        assert!(position.is_ghost());
        assert!(!position.is_countable());
        assert_eq!(position.realized_pnl(), None);
    }

    #[test]
    fn zero_exit_price_is_unresolved_not_a_loss() {
        let position = closed(dec!(100), dec!(0), 10, "EXIT");
        assert!(!position.is_ghost());
        assert!(!position.is_countable());
        assert_eq!(position.realized_pnl(), None);
    }

    #[test]
    fn entry_date_handles_bot_timestamp_shapes() {
        let mut position = closed(dec!(100), dec!(110), 1, "TARGET_HIT");
        position.entry_time = "2026-08-21 10:15:00".into();
        assert_eq!(
            position.entry_date(),
            NaiveDate::from_ymd_opt(2026, 8, 21)
        );
        position.entry_time = "2026-08-21T10:15:00.123".into();
        assert_eq!(
            position.entry_date(),
            NaiveDate::from_ymd_opt(2026, 8, 21)
        );
        position.entry_time = "10:15".into();
        assert_eq!(position.entry_date(), None);
        position.entry_time = "RECONCILED".into();
        assert_eq!(position.entry_date(), None);
    }

    #[test]
    fn snapshot_deserializes_bot_payload() {
        let raw = r#"{
            "is_running": true,
            "is_trading_allowed": false,
            "status": "RUNNING",
            "last_update": "10:30:00",
            "positions": {
                "RELIANCE": {
                    "status": "OPEN",
                    "entry_price": 2850.5,
                    "qty": 2,
                    "sl": 2822.0,
                    "target": 2907.5,
                    "entry_time": "09:42",
                    "setup_grade": "A+"
                }
            },
            "signals": [
                {"time": "2026-08-21 09:41:55", "symbol": "RELIANCE",
                 "price": 2850.5, "message": "Breakout above open range",
                 "sector": "NIFTY_ENERGY"}
            ],
            "logs": ["09:41:55 - INFO - scan pass complete"],
            "top_sectors": [{"name": "NIFTY_IT", "key": "it", "change": 3.34}],
            "limits": {"max_trades_day": 3, "max_trades_stock": 2,
                       "trading_start_time": "09:30",
                       "trading_end_time": "14:45"},
            "total_trades_today": 1,
            "stock_trade_counts": {"RELIANCE": 1}
        }"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert!(!snapshot.is_trading_allowed);
        assert_eq!(snapshot.positions.len(), 1);
        let position = &snapshot.positions["RELIANCE"];
        assert!(position.is_open());
        assert_eq!(position.entry_price, dec!(2850.5));
        assert_eq!(snapshot.top_sectors[0].change, 3.34);
        assert!(snapshot.indices.is_empty());
    }

    #[test]
    fn unknown_wire_fields_are_ignored() {
        let raw = r#"{"is_running": false, "orders": {"abc": 1}}"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert!(!snapshot.is_running);
        assert!(snapshot.positions.is_empty());
    }

    #[test]
    fn bot_config_round_trips() {
        let config = BotConfig::default();
        let raw = serde_json::to_string(&config).unwrap();
        let back: BotConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(config, back);
        assert_eq!(back.limits.max_trades_per_day, 3);
        assert!(back.general.dry_run);
    }
}
