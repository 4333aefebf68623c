//! CLI Interface: User input and terminal rendering
//!
//! # Components
//! - `input.rs`: Keystroke and line capture using crossterm
//! - `display.rs`: Terminal rendering and UI
//! - `log_writer.rs`: Raw-mode-safe log output

pub mod display;
pub mod input;
pub mod log_writer;

pub use display::Display;
pub use input::InputHandler;
