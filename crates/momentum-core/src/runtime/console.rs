// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Line-oriented I/O used by `print`, `debug` and `input`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// A console shared by every VM of one engine.
pub type SharedConsole = Rc<RefCell<dyn Console>>;

/// Destination for program output and source of `input` lines.
pub trait Console {
    /// Writes one line of output.
    fn print_line(&mut self, line: &str);

    /// Shows `prompt` and reads one line without its terminator.
    /// Returns `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Console bound to the process's stdin/stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn print_line(&mut self, line: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", line);
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        let mut out = io::stdout().lock();
        let _ = write!(out, "{}", prompt);
        let _ = out.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        }
    }
}

/// In-memory console that records output and replays scripted input.
#[derive(Debug, Default)]
pub struct BufferConsole {
    /// Every printed line, in order
    pub output: Vec<String>,
    /// Lines handed out to `input`
    pub input: VecDeque<String>,
}

impl BufferConsole {
    /// Creates an empty console.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a console that answers `input` with the given lines.
    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output: Vec::new(),
            input: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// All output joined with newlines.
    pub fn text(&self) -> String {
        self.output.join("\n")
    }
}

impl Console for BufferConsole {
    fn print_line(&mut self, line: &str) {
        self.output.push(line.to_string());
    }

    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.input.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console() {
        let mut console = BufferConsole::with_input(["42"]);
        console.print_line("a");
        console.print_line("b");
        assert_eq!(console.read_line("? "), Some("42".to_string()));
        assert_eq!(console.read_line("? "), None);
        assert_eq!(console.text(), "a\nb");
    }
}
