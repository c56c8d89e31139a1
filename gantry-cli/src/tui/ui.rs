use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame,
};
use rust_decimal::Decimal;

use gantry_analytics::{sector_bars, TradeSummary};
use gantry_core::Position;

use super::app::{ActivityKind, CommandOverlay, MonitorView};
use crate::render::money;

pub fn draw(f: &mut Frame<'_>, view: &MonitorView) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(12),
            Constraint::Length(10),
        ])
        .split(f.area());

    render_header(f, layout[0], view);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(56), Constraint::Percentage(44)])
        .split(layout[1]);

    let book_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[0]);
    render_positions(f, book_chunks[0], view);
    render_signals(f, book_chunks[1], view);

    let side_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),
            Constraint::Min(5),
            Constraint::Length(6),
        ])
        .split(main_chunks[1]);
    render_summary(f, side_chunks[0], view);
    render_sectors(f, side_chunks[1], view);
    render_indices(f, side_chunks[2], view);

    let footer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(5)])
        .split(layout[2]);
    let feed_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(footer[0]);
    render_bot_log(f, feed_chunks[0], view);
    render_activity(f, feed_chunks[1], view);
    render_help(f, footer[1]);

    render_overlay(f, f.area(), view);
}

fn render_header(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let snapshot = view.snapshot();
    let running = snapshot.map(|s| s.is_running).unwrap_or(false);
    let trading = snapshot.map(|s| s.is_trading_allowed).unwrap_or(false);
    let bot_clock = snapshot
        .and_then(|s| s.last_update.clone())
        .unwrap_or_else(|| "--".to_string());
    let trades_text = snapshot
        .map(|s| format!("{} / {}", s.total_trades_today, s.limits.max_trades_day))
        .unwrap_or_else(|| "--".to_string());
    let refresh_text = relative_time(view.last_refresh_at());

    let mut lines = Vec::new();
    lines.push(Line::from(vec![
        label("Bot"),
        if running {
            Span::styled("RUNNING", Style::default().fg(Color::Green))
        } else {
            Span::styled(
                "STOPPED",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )
        },
        Span::raw("  "),
        label("Trading"),
        if trading {
            Span::styled("ALLOWED", Style::default().fg(Color::Green))
        } else {
            Span::styled(
                "HALTED",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )
        },
        Span::raw("  "),
        label("Stream"),
        if view.connected() {
            Span::styled("ONLINE", Style::default().fg(Color::Green))
        } else {
            Span::styled("OFFLINE", Style::default().fg(Color::Yellow))
        },
        Span::raw("  "),
        label("Feed"),
        if view.paused() {
            Span::styled("PAUSED", Style::default().fg(Color::Yellow))
        } else {
            Span::styled("LIVE", Style::default().fg(Color::Green))
        },
    ]));
    lines.push(Line::from(vec![
        label("Bot Url"),
        value(view.bot_url()),
        Span::raw("  "),
        label("Refreshed"),
        value(&refresh_text),
        Span::raw("  "),
        label("Bot Clock"),
        value(&bot_clock),
        Span::raw("  "),
        label("Trades"),
        value(&trades_text),
    ]));

    let header = Paragraph::new(lines)
        .block(Block::default().title("Bot Monitor").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(header, area);
}

fn render_positions(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let Some(snapshot) = view.snapshot() else {
        placeholder(f, area, "Positions", "Waiting for data...");
        return;
    };
    if snapshot.positions.is_empty() {
        placeholder(f, area, "Positions", "No positions");
        return;
    }

    let rows = snapshot.positions.iter().map(|(symbol, position)| {
        let pnl = position_pnl(position);
        let style = match pnl {
            Some(v) if v > Decimal::ZERO => Style::default().fg(Color::Green),
            Some(v) if v < Decimal::ZERO => Style::default().fg(Color::Red),
            _ => Style::default(),
        };
        let status = if position.is_open() { "OPEN" } else { "CLOSED" };
        let ltp = position
            .current_ltp
            .map_or_else(|| "-".to_string(), money);
        Row::new(vec![
            Cell::from(symbol.clone()),
            Cell::from(status),
            Cell::from(position.qty.to_string()),
            Cell::from(money(position.entry_price)),
            Cell::from(ltp),
            Cell::from(money(position.sl)),
            Cell::from(money(position.target)),
            Cell::from(pnl.map_or_else(|| "-".to_string(), money)),
            Cell::from(position.setup_grade.clone().unwrap_or_default()),
        ])
        .style(style)
    });

    let widths = [
        Constraint::Length(11),
        Constraint::Length(6),
        Constraint::Length(5),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(10),
        Constraint::Min(5),
    ];
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec![
                "Symbol", "St", "Qty", "Entry", "LTP", "SL", "Target", "P&L", "Grade",
            ])
            .style(Style::default().fg(Color::Gray)),
        )
        .block(Block::default().title("Positions").borders(Borders::ALL))
        .column_spacing(1);
    f.render_widget(table, area);
}

fn render_signals(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let Some(snapshot) = view.snapshot() else {
        placeholder(f, area, "Signals", "Waiting for data...");
        return;
    };
    if snapshot.signals.is_empty() {
        placeholder(f, area, "Signals", "No signals yet");
        return;
    }

    let capacity = area.height.saturating_sub(3).max(1) as usize;
    let rows = snapshot.signals.iter().take(capacity).map(|signal| {
        Row::new(vec![
            Cell::from(signal.time.clone()),
            Cell::from(signal.symbol.clone()),
            Cell::from(money(signal.price)),
            Cell::from(signal.message.clone()),
        ])
    });

    let widths = [
        Constraint::Length(10),
        Constraint::Length(11),
        Constraint::Length(9),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec!["Time", "Symbol", "Price", "Signal"])
                .style(Style::default().fg(Color::Gray)),
        )
        .block(Block::default().title("Signals").borders(Borders::ALL))
        .column_spacing(1);
    f.render_widget(table, area);
}

fn render_summary(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let Some(snapshot) = view.snapshot() else {
        placeholder(f, area, "Today", "Waiting for data...");
        return;
    };
    let summary = TradeSummary::from_snapshot(snapshot);
    let pnl_style = if summary.realized_pnl > Decimal::ZERO {
        Style::default().fg(Color::Green)
    } else if summary.realized_pnl < Decimal::ZERO {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::White)
    };

    let lines = vec![
        Line::from(vec![
            label("Realized P&L"),
            Span::styled(money(summary.realized_pnl), pnl_style),
        ]),
        Line::from(vec![
            label("Win Rate"),
            value(&format!("{:.1}%", summary.win_rate_pct)),
        ]),
        Line::from(vec![
            label("Wins / Losses"),
            value(&format!("{} / {}", summary.wins, summary.losses)),
        ]),
        Line::from(vec![
            label("Open Positions"),
            value(&summary.open_positions.to_string()),
        ]),
        Line::from(vec![
            label("Closed Trades"),
            value(&summary.total_trades.to_string()),
        ]),
        Line::from(vec![
            label("Status"),
            value(if snapshot.status.is_empty() {
                "--"
            } else {
                snapshot.status.as_str()
            }),
        ]),
    ];
    let paragraph = Paragraph::new(lines)
        .block(Block::default().title("Today").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_sectors(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let Some(snapshot) = view.snapshot() else {
        placeholder(f, area, "Sector Strength", "Waiting for data...");
        return;
    };
    if snapshot.top_sectors.is_empty() {
        placeholder(f, area, "Sector Strength", "No sector data");
        return;
    }

    let bar_room = area.width.saturating_sub(2 + 15 + 8).max(4) as f64;
    let bars = sector_bars(&snapshot.top_sectors);
    let items: Vec<ListItem> = bars
        .iter()
        .map(|bar| {
            let cells = ((bar.width_pct / 100.0) * bar_room).round() as usize;
            let style = if bar.change > 0.0 {
                Style::default().fg(Color::Green)
            } else if bar.change < 0.0 {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(Line::from(vec![
                value(&format!("{:<15}", bar.name)),
                Span::styled("█".repeat(cells), style),
                Span::styled(format!(" {:+.2}%", bar.change), style),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Sector Strength")
            .borders(Borders::ALL),
    );
    f.render_widget(list, area);
}

fn render_indices(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let Some(snapshot) = view.snapshot() else {
        placeholder(f, area, "Indices", "Waiting for data...");
        return;
    };
    if snapshot.indices.is_empty() {
        placeholder(f, area, "Indices", "No index data");
        return;
    }

    let rows = snapshot.indices.iter().map(|quote| {
        let style = if quote.change > 0.0 {
            Style::default().fg(Color::Green)
        } else if quote.change < 0.0 {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(quote.name.clone()),
            Cell::from(money(quote.ltp)),
            Cell::from(format!("{:+.2}%", quote.change)),
        ])
        .style(style)
    });
    let widths = [
        Constraint::Length(14),
        Constraint::Length(12),
        Constraint::Min(8),
    ];
    let table = Table::new(rows, widths)
        .header(Row::new(vec!["Index", "LTP", "Change"]).style(Style::default().fg(Color::Gray)))
        .block(Block::default().title("Indices").borders(Borders::ALL))
        .column_spacing(1);
    f.render_widget(table, area);
}

fn render_bot_log(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let capacity = area.height.saturating_sub(2).max(1) as usize;
    let items: Vec<ListItem> = match view.snapshot() {
        Some(snapshot) if !snapshot.logs.is_empty() => snapshot
            .logs
            .iter()
            .take(capacity)
            .map(|line| {
                ListItem::new(Line::from(Span::styled(
                    line.clone(),
                    Style::default().fg(Color::Gray),
                )))
            })
            .collect(),
        _ => vec![ListItem::new(Line::from(Span::styled(
            "No bot logs yet...",
            Style::default().fg(Color::DarkGray),
        )))],
    };

    let list = List::new(items).block(Block::default().title("Bot Log").borders(Borders::ALL));
    f.render_widget(list, area);
}

fn render_activity(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    let capacity = area.height.saturating_sub(2).max(1) as usize;
    let mut rows: Vec<_> = view.activity().rev().take(capacity).cloned().collect();
    rows.reverse();

    let items: Vec<ListItem> = if rows.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "Waiting for events...",
            Style::default().fg(Color::DarkGray),
        )))]
    } else {
        rows.into_iter()
            .map(|entry| {
                let content = vec![
                    Span::styled(
                        format!("[{}] ", entry.timestamp_short()),
                        Style::default().fg(Color::Gray),
                    ),
                    Span::styled(entry.message.clone(), color_for(entry.kind)),
                ];
                ListItem::new(Line::from(content))
            })
            .collect()
    };

    let list = List::new(items).block(Block::default().title("Activity").borders(Borders::ALL));
    f.render_widget(list, area);
}

fn render_help(f: &mut Frame<'_>, area: Rect) {
    let lines = vec![
        Line::from(vec![
            key_hint("q"),
            Span::raw(" Quit   "),
            key_hint("p"),
            Span::raw(" Pause/resume feed   "),
            key_hint("c"),
            Span::raw(" Reconnect now   "),
            key_hint("m"),
            Span::raw(" Command palette"),
        ]),
        Line::from(vec![
            Span::styled("In palette: ", Style::default().fg(Color::Gray)),
            key_hint("c"),
            Span::raw(" Close position   "),
            key_hint("k"),
            Span::raw(" Kill switch   "),
            key_hint("r"),
            Span::raw(" Resume entries   "),
            key_hint("b"),
            Span::raw(" Restart bot   "),
            key_hint("Esc"),
            Span::raw(" Close"),
        ]),
        Line::from(vec![
            Span::styled("Guarded commands: ", Style::default().fg(Color::Gray)),
            Span::raw("type the shown phrase, then press "),
            key_hint("Enter"),
        ]),
    ];
    let help = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help & Shortcuts"),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(help, area);
}

fn render_overlay(f: &mut Frame<'_>, area: Rect, view: &MonitorView) {
    match view.overlay() {
        CommandOverlay::Hidden => {}
        CommandOverlay::Palette => {
            let chunk = centered_rect(60, 30, area);
            let block = Block::default()
                .title("Command Palette")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Black));
            let lines = vec![
                Line::from("Press 'c' to close a position at market."),
                Line::from("Press 'k' to halt new entries, 'r' to resume them."),
                Line::from("Press 'b' to restart the bot process."),
                Line::from("Press Esc (or 'm') to close this panel."),
            ];
            let paragraph = Paragraph::new(lines)
                .alignment(Alignment::Left)
                .wrap(Wrap { trim: true })
                .block(block);
            f.render_widget(paragraph, chunk);
        }
        CommandOverlay::SymbolPrompt { .. } => {
            let chunk = centered_rect(60, 30, area);
            let mut lines = vec![
                Line::from("Type the symbol to close at market, then press Enter."),
                Line::from("The book updates when the bot pushes fresh state."),
                Line::from(""),
            ];
            push_input_lines(&mut lines, view);
            let block = Block::default()
                .title("Close Position")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Black));
            let paragraph = Paragraph::new(lines)
                .alignment(Alignment::Left)
                .wrap(Wrap { trim: true })
                .block(block);
            f.render_widget(paragraph, chunk);
        }
        CommandOverlay::Confirm { action, .. } => {
            let chunk = centered_rect(70, 35, area);
            let mut lines = vec![
                Line::from(vec![
                    Span::raw("Type '"),
                    Span::styled(action.phrase(), Style::default().fg(Color::Yellow)),
                    Span::raw("' and press Enter to confirm."),
                ]),
                Line::from(action.warning()),
                Line::from(""),
            ];
            push_input_lines(&mut lines, view);
            let block = Block::default()
                .title(format!("Confirm {}", action.title()))
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Black));
            let paragraph = Paragraph::new(lines)
                .alignment(Alignment::Left)
                .wrap(Wrap { trim: true })
                .block(block);
            f.render_widget(paragraph, chunk);
        }
    }
}

fn push_input_lines(lines: &mut Vec<Line<'_>>, view: &MonitorView) {
    let input = view.overlay_buffer().unwrap_or_default();
    lines.push(Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Gray)),
        Span::styled(input.to_string(), Style::default().fg(Color::White)),
    ]));
    if let Some(err) = view.overlay_error() {
        lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(Color::Red),
        )));
    }
}

fn placeholder(f: &mut Frame<'_>, area: Rect, title: &str, text: &str) {
    let block = Paragraph::new(text)
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(block, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    vertical[1]
}

/// Unrealized P&L for open rows, realized for closed ones. Ghost rows and
/// open rows without a quote come back as `None`.
fn position_pnl(position: &Position) -> Option<Decimal> {
    if position.is_open() {
        let ltp = position.current_ltp?;
        Some((ltp - position.entry_price) * Decimal::from(position.qty))
    } else {
        position.realized_pnl()
    }
}

fn color_for(kind: ActivityKind) -> Style {
    match kind {
        ActivityKind::Command => Style::default().fg(Color::Blue),
        ActivityKind::Ack => Style::default().fg(Color::Green),
        ActivityKind::Stream => Style::default().fg(Color::Yellow),
        ActivityKind::Error => Style::default().fg(Color::Red),
    }
}

fn relative_time(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(value) => {
            let delta = Utc::now() - value;
            if delta.num_seconds() <= 0 {
                "just now".to_string()
            } else if delta.num_seconds() < 60 {
                format!("{}s ago", delta.num_seconds())
            } else if delta.num_minutes() < 60 {
                format!("{}m ago", delta.num_minutes())
            } else {
                format!("{}h ago", delta.num_hours())
            }
        }
        None => "--".to_string(),
    }
}

fn label(text: &str) -> Span<'_> {
    Span::styled(format!("{text}: "), Style::default().fg(Color::DarkGray))
}

fn value(text: &str) -> Span<'static> {
    Span::styled(text.to_string(), Style::default().fg(Color::White))
}

fn key_hint(text: &str) -> Span<'_> {
    Span::styled(
        format!("[{text}]"),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
}
