//! Command-line console for the trading bot: a live terminal dashboard
//! plus one-shot commands for inspecting state and steering the bot.

pub mod app;
pub mod monitor;
pub mod render;
pub mod telemetry;
pub mod tui;

pub use app::run as run_app;
