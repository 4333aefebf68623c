//! Terminal display and UI rendering
//!
//! Features:
//! - Menu and about panel
//! - Predicted word with its probability or raw score
//! - Colour-coded word sequence (context vs. predicted words)
//! - Generated sentences and quiz feedback
//!
//! Lines end in `\r\n` so output renders the same in raw mode.

use crate::app::prompts::{ABOUT_MODEL, OPENING_LINE};
use crate::app::QuizOutcome;
use crate::llm::model::LayerSummary;
use crate::llm::predict::Prediction;
use super::log_writer;
use crossterm::{
    cursor, execute,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use std::io::{stdout, Write};

type DisplayResult = Result<(), Box<dyn std::error::Error>>;

/// Terminal display manager
pub struct Display {
    /// Whether raw mode was enabled and must be undone on shutdown
    raw_mode: bool,
}

impl Display {
    /// Plain line output, no raw mode
    pub fn simple() -> Self {
        Display { raw_mode: false }
    }

    /// Display for the interactive session, restores the terminal on drop
    pub fn interactive() -> Self {
        Display { raw_mode: true }
    }

    /// Clear screen
    pub fn clear(&self) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            terminal::Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    fn rule(&self) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            SetForegroundColor(Color::Blue),
            Print("─".repeat(50)),
            Print("\r\n"),
            ResetColor
        )?;
        Ok(())
    }

    /// Title banner
    pub fn show_title(&self) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            SetAttribute(Attribute::Bold),
            Print("📚 Next Word Prediction\r\n"),
            SetAttribute(Attribute::Reset),
            ResetColor,
            Print("Based on Franz Kafka's \"The Metamorphosis\". Enter a phrase from the novel\r\n"),
            Print("and the Bi-LSTM predicts what comes next in Gregor Samsa's journey.\r\n"),
        )?;
        self.rule()
    }

    /// Key bindings of the interactive session
    pub fn show_menu(&self) -> DisplayResult {
        let mut stdout = stdout();
        let entries = [
            ("p", "Predict next word"),
            ("g", "Generate a random sentence"),
            ("q", "Test your Kafka knowledge"),
            ("a", "About the model"),
        ];

        for (key, label) in entries {
            execute!(
                stdout,
                SetForegroundColor(Color::Yellow),
                Print(format!("  [{key}] ")),
                ResetColor,
                Print(label),
                Print("\r\n")
            )?;
        }
        execute!(
            stdout,
            SetForegroundColor(Color::DarkGrey),
            Print("  Esc / Ctrl+C to exit\r\n"),
            ResetColor
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Prompt label before a text input
    pub fn show_prompt(&self, label: &str) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            Print("\r\n"),
            SetForegroundColor(Color::Magenta),
            Print(label),
            ResetColor,
            Print("\r\n> ")
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Predicted word with its probability or raw score
    pub fn show_prediction(&self, prediction: &Prediction) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            Print("\r\n"),
            SetForegroundColor(Color::Green),
            Print("The predicted next word is: "),
            SetAttribute(Attribute::Bold),
            Print(&prediction.word),
            SetAttribute(Attribute::Reset),
            ResetColor,
            SetForegroundColor(Color::DarkGrey),
            Print(format!(
                "  (index {}, {})\r\n",
                prediction.index,
                prediction.score_label()
            )),
            ResetColor
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Word sequence strip: context words in blue, predicted words in red
    pub fn show_word_sequence(&self, context: &[String], predicted: &[String]) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            Print("\r\n"),
            SetAttribute(Attribute::Bold),
            Print("Word Sequence\r\n"),
            SetAttribute(Attribute::Reset)
        )?;

        let tagged = context
            .iter()
            .map(|w| (w, Color::Blue))
            .chain(predicted.iter().map(|w| (w, Color::Red)));

        for (word, colour) in tagged {
            execute!(
                stdout,
                SetBackgroundColor(colour),
                SetForegroundColor(Color::White),
                Print(format!(" {word} ")),
                ResetColor,
                Print(" ")
            )?;
        }

        execute!(stdout, Print("\r\n"))?;
        stdout.flush()?;
        Ok(())
    }

    /// Sentence produced by iterative prediction
    pub fn show_generated(&self, text: &str) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            Print("\r\n"),
            SetForegroundColor(Color::Cyan),
            Print("Generated sentence: "),
            ResetColor,
            SetAttribute(Attribute::Bold),
            Print(text),
            SetAttribute(Attribute::Reset),
            Print("\r\n")
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Quiz feedback
    pub fn show_quiz_result(&self, outcome: QuizOutcome) -> DisplayResult {
        let mut stdout = stdout();
        match outcome {
            QuizOutcome::Correct => execute!(
                stdout,
                Print("\r\n"),
                SetForegroundColor(Color::Green),
                Print("Correct! You know your Kafka!\r\n"),
                ResetColor
            )?,
            QuizOutcome::Incorrect { expected } => execute!(
                stdout,
                Print("\r\n"),
                SetForegroundColor(Color::Red),
                Print(format!("Not quite. The correct answer is '{expected}'.\r\n")),
                ResetColor
            )?,
        }
        stdout.flush()?;
        Ok(())
    }

    /// About panel with the novel's opening line
    pub fn show_about(&self) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            Print("\r\n"),
            SetAttribute(Attribute::Bold),
            Print("About the Model\r\n"),
            SetAttribute(Attribute::Reset),
            Print(ABOUT_MODEL),
            Print("\r\n\r\n"),
            SetForegroundColor(Color::DarkGrey),
            Print("Kafka's opening line:\r\n"),
            ResetColor,
            SetAttribute(Attribute::Italic),
            Print(format!("  \"{OPENING_LINE}\"\r\n")),
            SetAttribute(Attribute::Reset)
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Model layers and vocabulary overview
    pub fn show_model_info(
        &self,
        layers: &[LayerSummary],
        parameters: usize,
        input_len: usize,
        vocab_size: usize,
        top_words: &[String],
    ) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            SetAttribute(Attribute::Bold),
            Print("Model\r\n"),
            SetAttribute(Attribute::Reset)
        )?;
        for layer in layers {
            execute!(
                stdout,
                Print(format!(
                    "  {:<24} {:<14} out={}\r\n",
                    layer.name, layer.kind, layer.output_dim
                ))
            )?;
        }
        execute!(
            stdout,
            Print(format!(
                "  input width: {input_len}  |  parameters: {parameters}\r\n"
            )),
            SetAttribute(Attribute::Bold),
            Print("Vocabulary\r\n"),
            SetAttribute(Attribute::Reset),
            Print(format!("  size: {vocab_size} (including <UNK>)\r\n")),
            Print(format!("  most frequent: {}\r\n", top_words.join(", ")))
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Dimmed status line
    pub fn show_hint(&self, text: &str) -> DisplayResult {
        let mut stdout = stdout();
        execute!(
            stdout,
            SetForegroundColor(Color::DarkGrey),
            Print(text),
            Print("\r\n"),
            ResetColor
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Reset terminal state and cleanup
    pub fn shutdown(&self) -> DisplayResult {
        if self.raw_mode {
            terminal::disable_raw_mode()?;
            log_writer::set_raw_mode(false);
            let mut stdout = stdout();
            execute!(stdout, cursor::Show)?;
        }
        Ok(())
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = self.shutdown();
    }
}
