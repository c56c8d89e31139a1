//! View state for the live dashboard. The event loop folds store updates
//! into this struct and the widgets render from it.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use gantry_client::SyncState;
use gantry_core::Snapshot;

const ACTIVITY_CAPACITY: usize = 200;

pub struct MonitorView {
    bot_url: String,
    snapshot: Option<Arc<Snapshot>>,
    connected: bool,
    paused: bool,
    last_refresh_at: Option<DateTime<Utc>>,
    activity: VecDeque<ActivityEntry>,
    overlay: CommandOverlay,
    overlay_error: Option<String>,
    should_quit: bool,
}

impl MonitorView {
    pub fn new(bot_url: String) -> Self {
        Self {
            bot_url,
            snapshot: None,
            connected: false,
            paused: false,
            last_refresh_at: None,
            activity: VecDeque::with_capacity(ACTIVITY_CAPACITY),
            overlay: CommandOverlay::Hidden,
            overlay_error: None,
            should_quit: false,
        }
    }

    pub fn bot_url(&self) -> &str {
        &self.bot_url
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.snapshot.as_ref()
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.last_refresh_at
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn request_quit(&mut self) {
        self.should_quit = true;
    }

    /// Fold the latest store state into the view, noting stream flips and
    /// fresh snapshots as they land.
    pub fn absorb(&mut self, state: &SyncState) {
        if state.connectivity.connected != self.connected {
            self.connected = state.connectivity.connected;
            if self.connected {
                self.record_activity(ActivityKind::Stream, "Stream connected");
            } else {
                self.record_activity(ActivityKind::Error, "Stream offline");
            }
        }
        let fresh = match (&self.snapshot, &state.snapshot) {
            (Some(current), Some(incoming)) => !Arc::ptr_eq(current, incoming),
            (None, Some(_)) => true,
            _ => false,
        };
        if fresh {
            self.last_refresh_at = Some(Utc::now());
        }
        self.snapshot = state.snapshot.clone();
    }

    /// Flip the paused flag; the caller mirrors it into stream visibility.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn record_activity(&mut self, kind: ActivityKind, message: impl Into<String>) {
        if self.activity.len() == ACTIVITY_CAPACITY {
            self.activity.pop_front();
        }
        self.activity.push_back(ActivityEntry {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        });
    }

    pub fn activity(&self) -> impl DoubleEndedIterator<Item = &ActivityEntry> {
        self.activity.iter()
    }

    pub fn overlay(&self) -> &CommandOverlay {
        &self.overlay
    }

    pub fn overlay_error(&self) -> Option<&str> {
        self.overlay_error.as_deref()
    }

    pub fn set_overlay_error(&mut self, message: impl Into<String>) {
        self.overlay_error = Some(message.into());
    }

    pub fn toggle_command_palette(&mut self) {
        self.overlay = match self.overlay {
            CommandOverlay::Hidden => CommandOverlay::Palette,
            _ => CommandOverlay::Hidden,
        };
        self.overlay_error = None;
    }

    pub fn close_overlay(&mut self) {
        self.overlay = CommandOverlay::Hidden;
        self.overlay_error = None;
    }

    pub fn begin_symbol_prompt(&mut self) {
        self.overlay = CommandOverlay::SymbolPrompt {
            buffer: String::new(),
        };
        self.overlay_error = None;
    }

    pub fn begin_confirmation(&mut self, action: GuardedAction) {
        self.overlay = CommandOverlay::Confirm {
            action,
            buffer: String::new(),
        };
        self.overlay_error = None;
    }

    pub fn append_overlay_char(&mut self, ch: char) {
        match &mut self.overlay {
            CommandOverlay::SymbolPrompt { buffer } | CommandOverlay::Confirm { buffer, .. } => {
                buffer.push(ch);
                self.overlay_error = None;
            }
            _ => {}
        }
    }

    pub fn backspace_overlay(&mut self) {
        match &mut self.overlay {
            CommandOverlay::SymbolPrompt { buffer } | CommandOverlay::Confirm { buffer, .. } => {
                buffer.pop();
            }
            _ => {}
        }
    }

    pub fn overlay_buffer(&self) -> Option<&str> {
        match &self.overlay {
            CommandOverlay::SymbolPrompt { buffer } | CommandOverlay::Confirm { buffer, .. } => {
                Some(buffer)
            }
            _ => None,
        }
    }

    pub fn confirmation_action(&self) -> Option<GuardedAction> {
        match &self.overlay {
            CommandOverlay::Confirm { action, .. } => Some(*action),
            _ => None,
        }
    }

    pub fn confirmation_matches(&self) -> bool {
        match &self.overlay {
            CommandOverlay::Confirm { action, buffer } => {
                buffer.trim().eq_ignore_ascii_case(action.phrase())
            }
            _ => false,
        }
    }
}

/// Colour bucket for an activity line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    Command,
    Ack,
    Stream,
    Error,
}

#[derive(Clone, Debug)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub message: String,
}

impl ActivityEntry {
    pub fn timestamp_short(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

/// Modal state layered over the dashboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOverlay {
    Hidden,
    Palette,
    /// Collecting a symbol for a close request.
    SymbolPrompt { buffer: String },
    /// Destructive actions require their phrase typed back.
    Confirm {
        action: GuardedAction,
        buffer: String,
    },
}

/// Commands gated behind a typed confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardedAction {
    KillSwitch,
    Restart,
}

impl GuardedAction {
    pub fn title(&self) -> &'static str {
        match self {
            Self::KillSwitch => "Kill switch",
            Self::Restart => "Restart bot",
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            Self::KillSwitch => "halt",
            Self::Restart => "restart",
        }
    }

    pub fn warning(&self) -> &'static str {
        match self {
            Self::KillSwitch => "Blocks new entries until resume; open positions stay live.",
            Self::Restart => "Restarts the bot process; the stream will drop and recover.",
        }
    }
}
