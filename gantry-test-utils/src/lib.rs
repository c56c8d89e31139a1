//! Utilities for standing up a mock trading bot that exercises Gantry
//! end-to-end flows.

pub mod bot;
pub mod fixtures;
pub mod rest;
pub mod state;
pub mod stream;

pub use bot::MockBot;
pub use state::{BotCommand, MockBotState};
