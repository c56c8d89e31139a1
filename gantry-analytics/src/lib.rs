//! Pure derivations over a bot snapshot: realized P&L, win rate, journal
//! rows, calendar buckets, sector ranking. Every function here is
//! deterministic over its inputs and does no I/O, so any number of consumer
//! views can derive the same metrics from the same snapshot.

use std::fmt;

use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;

use gantry_core::{Position, Price, Sector, Snapshot};

/// Absolute realized P&L summed over the countable positions.
///
/// Ghost trades and closed positions without a positive exit price
/// contribute nothing; open positions are ignored entirely.
pub fn realized_pnl<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Price {
    positions
        .into_iter()
        .filter_map(Position::realized_pnl)
        .sum()
}

/// Win rate in percent over the countable positions, `0.0` for an empty
/// population. A break-even trade counts toward the total but not the wins.
pub fn win_rate_pct<'a>(positions: impl IntoIterator<Item = &'a Position>) -> f64 {
    let pnls: Vec<Price> = positions
        .into_iter()
        .filter_map(Position::realized_pnl)
        .collect();
    let total = pnls.len();
    if total == 0 {
        return 0.0;
    }
    let wins = pnls.iter().filter(|pnl| **pnl > Decimal::ZERO).count();
    (wins as f64 / total as f64) * 100.0
}

/// Headline numbers for the dashboard cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeSummary {
    pub open_positions: usize,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub realized_pnl: Price,
    pub win_rate_pct: f64,
}

impl TradeSummary {
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let open_positions = snapshot.open_positions().count();
        let pnls: Vec<Price> = snapshot
            .countable_positions()
            .filter_map(|(_, position)| position.realized_pnl())
            .collect();
        let total_trades = pnls.len();
        let wins = pnls.iter().filter(|pnl| **pnl > Decimal::ZERO).count();
        let win_rate_pct = if total_trades > 0 {
            (wins as f64 / total_trades as f64) * 100.0
        } else {
            0.0
        };
        Self {
            open_positions,
            total_trades,
            wins,
            losses: total_trades - wins,
            realized_pnl: pnls.iter().copied().sum(),
            win_rate_pct,
        }
    }
}

impl fmt::Display for TradeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} {}", "Open Positions", self.open_positions)?;
        writeln!(f, "{:<20} {}", "Closed Trades", self.total_trades)?;
        writeln!(f, "{:<20} {} / {}", "Wins / Losses", self.wins, self.losses)?;
        let mut pnl = self.realized_pnl.round_dp(2);
        pnl.rescale(2);
        writeln!(f, "{:<20} {}", "Realized P&L", pnl)?;
        writeln!(f, "{:<20} {:.1}%", "Win Rate", self.win_rate_pct)
    }
}

/// One resolved trade as shown in the journal. Only countable positions
/// produce a record.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_price: Price,
    pub exit_price: Price,
    pub qty: u32,
    /// Absolute P&L in account currency.
    pub pnl: Price,
    /// Percent P&L relative to entry; independent of `pnl`, never a
    /// substitute for it.
    pub pnl_pct: Option<Decimal>,
    pub entry_time: String,
    pub exit_time: Option<String>,
    /// Calendar day the trade was entered. Intraday snapshots carry
    /// time-only entry stamps, so callers supply the session date as a
    /// fallback.
    pub entry_date: NaiveDate,
    pub exit_reason: String,
    pub setup_grade: Option<String>,
}

impl TradeRecord {
    /// Build a record from a snapshot position, or `None` when the position
    /// does not count (open, ghost, or unresolved exit).
    #[must_use]
    pub fn from_position(symbol: &str, position: &Position, session: NaiveDate) -> Option<Self> {
        let pnl = position.realized_pnl()?;
        Some(Self {
            symbol: symbol.to_string(),
            entry_price: position.entry_price,
            exit_price: position.exit_price.unwrap_or_default(),
            qty: position.qty,
            pnl,
            pnl_pct: position.pnl_pct(),
            entry_time: position.entry_time.clone(),
            exit_time: position.exit_time.clone(),
            entry_date: position.entry_date().unwrap_or(session),
            exit_reason: position.exit_reason.clone().unwrap_or_default(),
            setup_grade: position.setup_grade.clone(),
        })
    }

    #[must_use]
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}

/// Journal rows for every countable position, in symbol order.
#[must_use]
pub fn journal(snapshot: &Snapshot, session: NaiveDate) -> Vec<TradeRecord> {
    snapshot
        .countable_positions()
        .filter_map(|(symbol, position)| TradeRecord::from_position(symbol, position, session))
        .collect()
}

/// The trades entered on one calendar day and their aggregate P&L.
/// Bucketing is keyed on the entry date; where the exit fell is irrelevant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayBucket {
    pub pnl: Price,
    pub count: usize,
    pub trades: Vec<TradeRecord>,
}

/// Select the trades entered on `day`.
#[must_use]
pub fn day_bucket(trades: &[TradeRecord], day: NaiveDate) -> DayBucket {
    let selected: Vec<TradeRecord> = trades
        .iter()
        .filter(|trade| trade.entry_date == day)
        .cloned()
        .collect();
    DayBucket {
        pnl: selected.iter().map(|trade| trade.pnl).sum(),
        count: selected.len(),
        trades: selected,
    }
}

/// A whole month of day buckets plus totals, for the calendar screen.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    /// One bucket per day of the month, in order; empty days included.
    pub days: Vec<(NaiveDate, DayBucket)>,
    pub total_pnl: Price,
    pub total_count: usize,
}

/// Bucket the trades across every day of the given month.
#[must_use]
pub fn month_view(trades: &[TradeRecord], year: i32, month: u32) -> MonthView {
    let days: Vec<(NaiveDate, DayBucket)> = days_of_month(year, month)
        .map(|day| (day, day_bucket(trades, day)))
        .collect();
    let total_pnl = days.iter().map(|(_, bucket)| bucket.pnl).sum();
    let total_count = days.iter().map(|(_, bucket)| bucket.count).sum();
    MonthView {
        year,
        month,
        days,
        total_pnl,
        total_count,
    }
}

fn days_of_month(year: i32, month: u32) -> impl Iterator<Item = NaiveDate> {
    (1..=31).filter_map(move |day| NaiveDate::from_ymd_opt(year, month, day))
}

/// One row of the sector ranking with its render-ready bar width.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorBar {
    pub name: String,
    pub change: f64,
    /// Linear share of the strongest sector's move, clamped to `0..=100`.
    pub width_pct: f64,
}

/// Rank sectors by percentage change descending and scale bar widths
/// against the leader.
#[must_use]
pub fn sector_bars(sectors: &[Sector]) -> Vec<SectorBar> {
    let ranked: Vec<&Sector> = sectors
        .iter()
        .sorted_by(|a, b| b.change.total_cmp(&a.change))
        .collect();
    let top = ranked.first().map_or(0.0, |sector| sector.change);
    ranked
        .into_iter()
        .map(|sector| {
            let width_pct = if top > 0.0 {
                (sector.change / top * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };
            SectorBar {
                name: sector.name.clone(),
                change: sector.change,
                width_pct,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{PositionStatus, RECONCILIATION_MISSING};
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
            setup_grade: None,
            is_orphaned: false,
        }
    }

    fn open(entry: Price) -> Position {
        Position {
            status: PositionStatus::Open,
            entry_price: entry,
            qty: 1,
            sl: Decimal::ZERO,
            target: Decimal::ZERO,
            current_ltp: None,
            entry_time: "09:45".into(),
            exit_time: None,
            exit_price: None,
            exit_reason: None,
            setup_grade: None,
            is_orphaned: false,
        }
    }

    #[test]
    fn win_rate_of_empty_population_is_zero() {
        assert_eq!(win_rate_pct([]), 0.0);
    }

    #[test]
    fn win_rate_splits_even_book() {
        let positions = [
            closed(dec!(10), dec!(11), 1, "TARGET_HIT"),
            closed(dec!(10), dec!(9), 1, "SL_HIT"),
        ];
        assert_eq!(win_rate_pct(&positions), 50.0);
    }

    #[test]
    fn single_winner_scenario() {
        let mut snapshot = Snapshot::default();
        snapshot
            .positions
            .insert("AAA".into(), closed(dec!(100), dec!(110), 10, "TARGET_HIT"));
        let summary = TradeSummary::from_snapshot(&snapshot);
        assert_eq!(summary.realized_pnl, dec!(100));
        assert_eq!(summary.win_rate_pct, 100.0);
        assert_eq!(summary.total_trades, 1);
    }

    #[test]
    fn winner_plus_loser_scenario() {
        let mut snapshot = Snapshot::default();
        snapshot
            .positions
            .insert("AAA".into(), closed(dec!(100), dec!(110), 10, "TARGET_HIT"));
        snapshot
            .positions
            .insert("BBB".into(), closed(dec!(50), dec!(40), 5, "SL_HIT"));
        let summary = TradeSummary::from_snapshot(&snapshot);
        assert_eq!(summary.realized_pnl, dec!(50));
        assert_eq!(summary.win_rate_pct, 50.0);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
    }

    #[test]
    fn ghost_trades_are_excluded_everywhere() {
        let mut snapshot = Snapshot::default();
        snapshot
            .positions
            .insert("AAA".into(), closed(dec!(100), dec!(110), 10, "TARGET_HIT"));
        snapshot.positions.insert(
            "GONE".into(),
            closed(dec!(200), dec!(0), 4, RECONCILIATION_MISSING),
        );
        let summary = TradeSummary::from_snapshot(&snapshot);
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.realized_pnl, dec!(100));
        assert_eq!(summary.win_rate_pct, 100.0);
        // The ghost stays visible in the raw state.
        assert_eq!(snapshot.positions.len(), 2);
    }

    #[test]
    fn open_positions_count_but_do_not_aggregate() {
        let mut snapshot = Snapshot::default();
        snapshot.positions.insert("LIVE".into(), open(dec!(500)));
        let summary = TradeSummary::from_snapshot(&snapshot);
        assert_eq!(summary.open_positions, 1);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn journal_reports_both_absolute_and_percent_pnl() {
        let mut snapshot = Snapshot::default();
        snapshot
            .positions
            .insert("AAA".into(), closed(dec!(100), dec!(110), 10, "TARGET_HIT"));
        let session = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();
        let rows = journal(&snapshot, session);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pnl, dec!(100));
        assert_eq!(rows[0].pnl_pct, Some(dec!(10)));
        assert_eq!(rows[0].entry_date, session);
    }

    #[test]
    fn calendar_buckets_by_entry_date_not_exit_date() {
        let session = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();
        let mut same_day_exit = closed(dec!(10), dec!(12), 1, "TARGET_HIT");
        same_day_exit.entry_time = "2026-08-21 09:40:00".into();
        same_day_exit.exit_time = Some("2026-08-21 11:00:00".into());
        let mut overnight_exit = closed(dec!(10), dec!(9), 1, "EXIT");
        overnight_exit.entry_time = "2026-08-21 14:30:00".into();
        overnight_exit.exit_time = Some("2026-08-22 09:20:00".into());

        let trades: Vec<TradeRecord> = [("AAA", same_day_exit), ("BBB", overnight_exit)]
            .iter()
            .filter_map(|(symbol, position)| {
                TradeRecord::from_position(symbol, position, session)
            })
            .collect();

        let bucket = day_bucket(&trades, session);
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.pnl, dec!(1));
        let next_day = day_bucket(&trades, session.succ_opt().unwrap());
        assert_eq!(next_day.count, 0);
    }

    #[test]
    fn month_view_covers_every_day_and_totals() {
        let session = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let mut trade = closed(dec!(10), dec!(12), 2, "TARGET_HIT");
        trade.entry_time = "2026-02-10 10:00:00".into();
        let trades =
            vec![TradeRecord::from_position("AAA", &trade, session).unwrap()];
        let view = month_view(&trades, 2026, 2);
        assert_eq!(view.days.len(), 28);
        assert_eq!(view.total_count, 1);
        assert_eq!(view.total_pnl, dec!(4));
        let (day, bucket) = &view.days[9];
        assert_eq!(*day, session);
        assert_eq!(bucket.count, 1);
    }

    #[test]
    fn sector_bars_rank_and_clamp() {
        let sectors = vec![
            Sector {
                name: "NIFTY_PHARMA".into(),
                key: "pharma".into(),
                change: 1.1,
            },
            Sector {
                name: "NIFTY_IT".into(),
                key: "it".into(),
                change: 3.34,
            },
        ];
        let bars = sector_bars(&sectors);
        assert_eq!(bars[0].name, "NIFTY_IT");
        assert_eq!(bars[0].width_pct, 100.0);
        assert!(bars[1].width_pct < 100.0 && bars[1].width_pct > 0.0);
    }

    #[test]
    fn sector_bars_handle_empty_and_flat_input() {
        assert!(sector_bars(&[]).is_empty());
        let flat = vec![Sector {
            name: "NIFTY_FMCG".into(),
            key: "fmcg".into(),
            change: 0.0,
        }];
        assert_eq!(sector_bars(&flat)[0].width_pct, 0.0);
    }
}
