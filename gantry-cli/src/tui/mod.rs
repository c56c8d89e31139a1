//! Terminal lifecycle and event loop for the live dashboard.

mod app;
mod ui;

pub use app::{ActivityEntry, ActivityKind, CommandOverlay, GuardedAction, MonitorView};

use std::future::Future;
use std::io;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use gantry_client::{ClientResult, CommandAck};

use crate::monitor::{MonitorSession, ShutdownSignal};
use crate::render::describe_ack;

/// Result of a fire-and-forget control command, reported back to the
/// activity feed. State is never mutated locally; the next push shows
/// whatever the bot actually did.
struct CommandOutcome {
    ok: bool,
    message: String,
}

/// Run the dashboard until the operator quits or shutdown fires.
///
/// Polls the terminal on the calling thread; the sync manager and metrics
/// tasks keep running on the runtime's other workers.
pub fn run_monitor(session: &MonitorSession, shutdown: &ShutdownSignal) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = event_loop(&mut terminal, session, shutdown);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn event_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    session: &MonitorSession,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let mut view = MonitorView::new(session.rest_url().to_string());
    let reader = session.store().subscribe();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

    while !view.should_quit() && !shutdown.triggered() {
        if event::poll(session.tick_rate())? {
            if let Event::Key(key) = event::read()? {
                handle_key(&mut view, session, &outcome_tx, key);
            }
        }
        while let Ok(outcome) = outcome_rx.try_recv() {
            let kind = if outcome.ok {
                ActivityKind::Ack
            } else {
                ActivityKind::Error
            };
            view.record_activity(kind, outcome.message);
        }
        view.absorb(&reader.current());
        terminal.draw(|f| ui::draw(f, &view))?;
    }
    Ok(())
}

fn handle_key(
    view: &mut MonitorView,
    session: &MonitorSession,
    outcomes: &mpsc::UnboundedSender<CommandOutcome>,
    key: KeyEvent,
) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        view.request_quit();
        return;
    }
    match view.overlay().clone() {
        CommandOverlay::Hidden => match key.code {
            KeyCode::Char('q') => view.request_quit(),
            KeyCode::Char('p') => {
                let paused = view.toggle_pause();
                session.set_visibility(!paused);
                if paused {
                    view.record_activity(ActivityKind::Stream, "Feed paused; reconnects on hold");
                } else {
                    view.record_activity(ActivityKind::Stream, "Feed live again");
                }
            }
            KeyCode::Char('c') => {
                session.connect();
                view.record_activity(ActivityKind::Command, "Reconnect requested");
            }
            KeyCode::Char('m') => view.toggle_command_palette(),
            _ => {}
        },
        CommandOverlay::Palette => match key.code {
            KeyCode::Char('c') => view.begin_symbol_prompt(),
            KeyCode::Char('k') => view.begin_confirmation(GuardedAction::KillSwitch),
            KeyCode::Char('b') => view.begin_confirmation(GuardedAction::Restart),
            KeyCode::Char('r') => {
                let api = session.api().clone();
                dispatch(view, outcomes, "Resume", async move { api.resume().await });
                view.close_overlay();
            }
            KeyCode::Esc | KeyCode::Char('m') => view.close_overlay(),
            _ => {}
        },
        CommandOverlay::SymbolPrompt { .. } => match key.code {
            KeyCode::Enter => {
                let symbol = view
                    .overlay_buffer()
                    .unwrap_or_default()
                    .trim()
                    .to_uppercase();
                if symbol.is_empty() {
                    view.set_overlay_error("Symbol required");
                } else {
                    let api = session.api().clone();
                    let request_label = format!("Close {symbol}");
                    dispatch(view, outcomes, &request_label, async move {
                        api.close_position(&symbol).await
                    });
                    view.close_overlay();
                }
            }
            KeyCode::Esc => view.close_overlay(),
            KeyCode::Backspace => view.backspace_overlay(),
            KeyCode::Char(ch) => view.append_overlay_char(ch),
            _ => {}
        },
        CommandOverlay::Confirm { action, .. } => match key.code {
            KeyCode::Enter => {
                if view.confirmation_matches() {
                    let api = session.api().clone();
                    match action {
                        GuardedAction::KillSwitch => {
                            dispatch(view, outcomes, "Kill switch", async move {
                                api.kill_switch().await
                            });
                        }
                        GuardedAction::Restart => {
                            dispatch(view, outcomes, "Restart", async move {
                                api.restart().await
                            });
                        }
                    }
                    view.close_overlay();
                } else {
                    view.set_overlay_error(format!("Type '{}' to confirm", action.phrase()));
                }
            }
            KeyCode::Esc => view.close_overlay(),
            KeyCode::Backspace => view.backspace_overlay(),
            KeyCode::Char(ch) => view.append_overlay_char(ch),
            _ => {}
        },
    }
}

/// Send a control command in the background and surface its ack later.
fn dispatch<F>(
    view: &mut MonitorView,
    outcomes: &mpsc::UnboundedSender<CommandOutcome>,
    request_label: &str,
    request: F,
) where
    F: Future<Output = ClientResult<CommandAck>> + Send + 'static,
{
    view.record_activity(ActivityKind::Command, format!("{request_label} sent"));
    let outcomes = outcomes.clone();
    let request_label = request_label.to_string();
    tokio::spawn(async move {
        let outcome = match request.await {
            Ok(ack) => CommandOutcome {
                ok: true,
                message: format!("{request_label}: {}", describe_ack(&ack)),
            },
            Err(err) => CommandOutcome {
                ok: false,
                message: format!("{request_label} failed: {err}"),
            },
        };
        let _ = outcomes.send(outcome);
    });
}
