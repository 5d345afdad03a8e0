//! Color and width handling for rendered chart output.

use owo_colors::{colors::css, OwoColorize};

fn colored() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

/// Whether the terminal is too narrow (under 60 columns) to append manager
/// names to tree lines.
pub fn is_narrow() -> bool {
    terminal_size::terminal_size().is_some_and(|(width, _)| width.0 < 60)
}

/// Styling for the pieces of a rendered line.
///
/// Implemented on `str`; `String` callers reach it through deref.
pub trait Colorize {
    /// Confirmation of a completed mutation (green).
    fn success(&self) -> String;
    /// Vacancies and other caveats (amber).
    fn warning(&self) -> String;
    /// Unit codes (blue).
    fn info(&self) -> String;
    /// Secondary detail such as manager names and validity windows.
    fn dim(&self) -> String;
}

impl Colorize for str {
    fn success(&self) -> String {
        if colored() {
            self.fg::<css::Green>().to_string()
        } else {
            self.to_string()
        }
    }

    fn warning(&self) -> String {
        if colored() {
            self.fg::<css::Orange>().to_string()
        } else {
            self.to_string()
        }
    }

    fn info(&self) -> String {
        if colored() {
            self.fg::<css::LightBlue>().to_string()
        } else {
            self.to_string()
        }
    }

    fn dim(&self) -> String {
        if colored() {
            self.dimmed().to_string()
        } else {
            self.to_string()
        }
    }
}
