//! Keystroke input handling using crossterm
//!
//! Features:
//! - Single-key menu selection
//! - Line editing with a prefilled placeholder
//! - Ctrl+C / Esc graceful exit

use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use super::log_writer;
use std::io::{stdout, Result as IoResult, Write};
use std::time::Duration;

/// Handles user input from terminal
pub struct InputHandler {
    /// Timeout for poll operations (milliseconds)
    poll_timeout: Duration,
}

impl InputHandler {
    /// Create new input handler with default timeout (50ms for responsive input)
    pub fn new() -> Self {
        InputHandler {
            poll_timeout: Duration::from_millis(50),
        }
    }

    /// Enable raw mode for terminal input
    pub fn enable_raw_mode() -> IoResult<()> {
        crossterm::terminal::enable_raw_mode()?;
        log_writer::set_raw_mode(true);
        Ok(())
    }

    /// Poll for keystroke with timeout (non-blocking)
    /// Returns Some(KeyEvent) if a key was pressed, None on timeout
    pub fn read_key(&self) -> Result<Option<KeyEvent>, Box<dyn std::error::Error>> {
        if event::poll(self.poll_timeout)? {
            match event::read()? {
                event::Event::Key(key_event) if key_event.kind != KeyEventKind::Release => {
                    Ok(Some(key_event))
                }
                _ => Ok(None),
            }
        } else {
            Ok(None)
        }
    }

    /// Block until a key is pressed
    pub fn wait_key(&self) -> Result<KeyEvent, Box<dyn std::error::Error>> {
        loop {
            if let Some(key) = self.read_key()? {
                return Ok(key);
            }
        }
    }

    /// Read one line, echoing as the user types.
    ///
    /// The placeholder is shown dimmed; submitting an empty line returns it.
    /// Returns `None` when the user cancels with Esc or Ctrl+C.
    pub fn read_line(&self, placeholder: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let mut stdout = stdout();
        let mut buffer = String::new();

        if Self::placeholder_visible(&buffer, placeholder) {
            Self::draw_placeholder(placeholder)?;
        }
        stdout.flush()?;

        loop {
            let key = self.wait_key()?;

            if Self::is_exit(&key) {
                execute!(stdout, Print("\r\n"))?;
                return Ok(None);
            }

            if Self::is_enter(&key) {
                execute!(stdout, Print("\r\n"))?;
                return Ok(Some(Self::submitted(buffer, placeholder)));
            }

            if Self::is_backspace(&key) {
                if buffer.pop().is_some() {
                    execute!(stdout, cursor::MoveLeft(1), Print(' '), cursor::MoveLeft(1))?;
                    if Self::placeholder_visible(&buffer, placeholder) {
                        Self::draw_placeholder(placeholder)?;
                    }
                }
                continue;
            }

            if let Some(c) = Self::key_to_char(&key) {
                if Self::placeholder_visible(&buffer, placeholder) {
                    // first keystroke replaces the dimmed placeholder
                    execute!(
                        stdout,
                        crossterm::terminal::Clear(crossterm::terminal::ClearType::UntilNewLine)
                    )?;
                }
                buffer.push(c);
                execute!(stdout, Print(c))?;
            }
        }
    }

    /// Dimmed placeholder at the start of the input column, cursor left on it
    fn draw_placeholder(placeholder: &str) -> IoResult<()> {
        let mut stdout = stdout();
        execute!(
            stdout,
            cursor::MoveToColumn(2),
            SetForegroundColor(Color::DarkGrey),
            Print(placeholder),
            ResetColor,
            cursor::MoveToColumn(2)
        )
    }

    /// The placeholder shows whenever nothing has been typed
    pub fn placeholder_visible(buffer: &str, placeholder: &str) -> bool {
        buffer.is_empty() && !placeholder.is_empty()
    }

    /// Text a finished line resolves to
    pub fn submitted(buffer: String, placeholder: &str) -> String {
        if buffer.trim().is_empty() {
            placeholder.to_string()
        } else {
            buffer
        }
    }

    /// Check if key event is an exit signal (Ctrl+C or Escape)
    pub fn is_exit(key: &KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
            KeyCode::Esc => true,
            _ => false,
        }
    }

    /// Convert key event to character
    pub fn key_to_char(key: &KeyEvent) -> Option<char> {
        match key.code {
            // Regular character input (including space which is KeyCode::Char(' '))
            KeyCode::Char(c) => {
                // Only return if no special modifiers (not Ctrl, not Alt)
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    Some(c)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Check if key is backspace
    pub fn is_backspace(key: &KeyEvent) -> bool {
        matches!(key.code, KeyCode::Backspace)
    }

    /// Check if key is enter/return
    pub fn is_enter(key: &KeyEvent) -> bool {
        matches!(key.code, KeyCode::Enter)
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}
