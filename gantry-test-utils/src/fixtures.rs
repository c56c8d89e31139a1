//! Canned wire-shaped data for tests.

use rust_decimal::Decimal;

use gantry_core::{Position, PositionStatus, Price, Snapshot, ORPHAN_GRADE, RECONCILIATION_MISSING};

/// An intraday open position with the bot's stock 1% stop and 2% target.
pub fn open_position(entry_price: Price, qty: u32) -> Position {
    Position {
        status: PositionStatus::Open,
        entry_price,
        qty,
        sl: entry_price * Decimal::new(99, 0) / Decimal::ONE_HUNDRED,
        target: entry_price * Decimal::new(102, 0) / Decimal::ONE_HUNDRED,
        current_ltp: Some(entry_price),
        entry_time: "10:15".to_string(),
        exit_time: None,
        exit_price: None,
        exit_reason: None,
        setup_grade: Some("A".to_string()),
        is_orphaned: false,
    }
}

/// A finished trade; exit reason follows the sign of the move.
pub fn closed_position(entry_price: Price, exit_price: Price, qty: u32) -> Position {
    let exit_reason = if exit_price >= entry_price {
        "TARGET"
    } else {
        "STOP LOSS"
    };
    Position {
        status: PositionStatus::Closed,
        exit_price: Some(exit_price),
        exit_reason: Some(exit_reason.to_string()),
        exit_time: Some("14:02".to_string()),
        current_ltp: Some(exit_price),
        ..open_position(entry_price, qty)
    }
}

/// A position the reconciler closed because the broker no longer knew it.
pub fn ghost_position(entry_price: Price, qty: u32) -> Position {
    Position {
        status: PositionStatus::Closed,
        exit_price: Some(Decimal::ZERO),
        exit_reason: Some(RECONCILIATION_MISSING.to_string()),
        ..open_position(entry_price, qty)
    }
}

/// A position adopted from the broker during reconciliation.
pub fn orphan_position(entry_price: Price, qty: u32) -> Position {
    Position {
        entry_time: "RECONCILED".to_string(),
        setup_grade: Some(ORPHAN_GRADE.to_string()),
        is_orphaned: true,
        ..open_position(entry_price, qty)
    }
}

/// A running-bot snapshot holding the given positions.
pub fn snapshot_with_positions(
    positions: impl IntoIterator<Item = (&'static str, Position)>,
) -> Snapshot {
    let mut snapshot = Snapshot {
        is_running: true,
        is_trading_allowed: true,
        last_update: Some("10:30:00".to_string()),
        ..Snapshot::default()
    };
    for (symbol, position) in positions {
        snapshot.positions.insert(symbol.to_string(), position);
    }
    snapshot.total_trades_today = snapshot.positions.len() as u32;
    snapshot
}
