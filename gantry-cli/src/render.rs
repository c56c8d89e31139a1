//! Plain-text reports for the one-shot commands. Each report is a Display
//! wrapper so callers can print it or capture it in tests.

use std::fmt;

use gantry_analytics::{MonthView, SectorBar, TradeRecord, TradeSummary};
use gantry_client::CommandAck;
use gantry_core::{Price, Signal, Snapshot};

const SECTOR_BAR_WIDTH: usize = 40;

/// Money always shows two decimal places.
pub(crate) fn money(value: Price) -> String {
    let mut rounded = value.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

/// Bot state, trade summary, and the open book at a glance.
pub struct StatusReport<'a>(pub &'a Snapshot);

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        let bot = if snapshot.is_running {
            "RUNNING"
        } else {
            "STOPPED"
        };
        let trading = if snapshot.is_trading_allowed {
            "ALLOWED"
        } else {
            "HALTED"
        };
        writeln!(f, "{:<20} {}", "Bot", bot)?;
        writeln!(f, "{:<20} {}", "Trading", trading)?;
        if !snapshot.status.is_empty() {
            writeln!(f, "{:<20} {}", "Status", snapshot.status)?;
        }
        if let Some(last_update) = &snapshot.last_update {
            writeln!(f, "{:<20} {}", "Last Update", last_update)?;
        }
        writeln!(
            f,
            "{:<20} {} / {}",
            "Trades Today", snapshot.total_trades_today, snapshot.limits.max_trades_day
        )?;
        writeln!(f)?;
        write!(f, "{}", TradeSummary::from_snapshot(snapshot))?;

        let open: Vec<_> = snapshot.open_positions().collect();
        if !open.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<12} {:>5} {:>10} {:>10} {:>10} {:>10}  {}",
                "SYMBOL", "QTY", "ENTRY", "LTP", "SL", "TARGET", "GRADE"
            )?;
            for (symbol, position) in open {
                let ltp = position
                    .current_ltp
                    .map_or_else(|| "-".to_string(), money);
                writeln!(
                    f,
                    "{:<12} {:>5} {:>10} {:>10} {:>10} {:>10}  {}",
                    symbol,
                    position.qty,
                    money(position.entry_price),
                    ltp,
                    money(position.sl),
                    money(position.target),
                    position.setup_grade.as_deref().unwrap_or("-"),
                )?;
            }
        }
        Ok(())
    }
}

/// Closed trades with per-trade percent moves and day totals.
pub struct JournalTable<'a>(pub &'a [TradeRecord]);

impl fmt::Display for JournalTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No closed trades.");
        }
        writeln!(
            f,
            "{:<12} {:>5} {:>10} {:>10} {:>10} {:>8}  {:<18} {}",
            "SYMBOL", "QTY", "ENTRY", "EXIT", "P&L", "P&L%", "REASON", "GRADE"
        )?;
        for record in self.0 {
            let pct = record
                .pnl_pct
                .map_or_else(|| "-".to_string(), |pct| format!("{}%", pct.round_dp(2)));
            writeln!(
                f,
                "{:<12} {:>5} {:>10} {:>10} {:>10} {:>8}  {:<18} {}",
                record.symbol,
                record.qty,
                money(record.entry_price),
                money(record.exit_price),
                money(record.pnl),
                pct,
                record.exit_reason,
                record.setup_grade.as_deref().unwrap_or("-"),
            )?;
        }
        let total: Price = self.0.iter().map(|record| record.pnl).sum();
        let wins = self.0.iter().filter(|record| record.is_win()).count();
        writeln!(f)?;
        writeln!(f, "{:<20} {}", "Trades", self.0.len())?;
        writeln!(f, "{:<20} {} / {}", "Wins / Losses", wins, self.0.len() - wins)?;
        writeln!(f, "{:<20} {}", "Total P&L", money(total))
    }
}

/// Month calendar of realized P&L, one line per day that traded.
pub struct Calendar<'a>(pub &'a MonthView);

impl fmt::Display for Calendar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.0;
        writeln!(f, "{:04}-{:02}", view.year, view.month)?;
        let mut traded = false;
        for (day, bucket) in &view.days {
            if bucket.count == 0 {
                continue;
            }
            traded = true;
            writeln!(
                f,
                "{:<12} {:>3} {:>12}",
                day.to_string(),
                bucket.count,
                money(bucket.pnl),
            )?;
        }
        if !traded {
            writeln!(f, "No trades this month.")?;
        }
        writeln!(f)?;
        writeln!(f, "{:<20} {}", "Month Trades", view.total_count)?;
        writeln!(f, "{:<20} {}", "Month P&L", money(view.total_pnl))
    }
}

/// Sector strength bars scaled against the day's leader.
pub struct SectorTable<'a>(pub &'a [SectorBar]);

impl fmt::Display for SectorTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No sector data.");
        }
        for bar in self.0 {
            let cells = ((bar.width_pct / 100.0) * SECTOR_BAR_WIDTH as f64).round() as usize;
            writeln!(
                f,
                "{:<16} {:<width$} {:>6.2}%",
                bar.name,
                "#".repeat(cells),
                bar.change,
                width = SECTOR_BAR_WIDTH,
            )?;
        }
        Ok(())
    }
}

/// Scanner signals in the order the bot reported them.
pub struct SignalTable<'a>(pub &'a [Signal]);

impl fmt::Display for SignalTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No signals yet.");
        }
        writeln!(
            f,
            "{:<20} {:<12} {:>10}  {}",
            "TIME", "SYMBOL", "PRICE", "SIGNAL"
        )?;
        for signal in self.0 {
            writeln!(
                f,
                "{:<20} {:<12} {:>10}  {}",
                signal.time,
                signal.symbol,
                money(signal.price),
                signal.message,
            )?;
        }
        Ok(())
    }
}

/// One line for a control-plane acknowledgement.
#[must_use]
pub fn describe_ack(ack: &CommandAck) -> String {
    if ack.message.is_empty() {
        ack.status.clone()
    } else {
        format!("{}: {}", ack.status, ack.message)
    }
}
