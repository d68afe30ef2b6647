// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for Momentum.

use std::borrow::Cow;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use momentum_core::lexer::TokenKind;
use momentum_core::{Engine, StdConsole, Value};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Editor, Helper};

use crate::print_error;

/// REPL configuration constants
const HISTORY_FILE: &str = ".momentum_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
    Globals,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let rest = input.trim().strip_prefix('.')?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            "globals" | "g" => Some((ReplCommand::Globals, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Load and execute a Momentum file"),
            (".globals", "List defined global variables"),
        ]
    }
}

/// Words offered for completion besides the keywords.
const EXTRA_WORDS: &[&str] = &["end if", "end function", "end try", "end switch", "end while"];

/// Helper for rustyline: completion, hints, highlighting and validation
#[derive(Default)]
struct MomentumHelper {
    /// Keywords, builtin names and REPL commands
    words: Vec<String>,
}

impl MomentumHelper {
    fn new(builtins: Vec<&str>) -> Self {
        let mut words: Vec<String> = KEYWORDS.iter().map(|kw| kw.to_string()).collect();
        words.extend(EXTRA_WORDS.iter().map(|w| w.to_string()));
        words.extend(builtins.into_iter().map(String::from));
        words.extend(ReplCommand::all_commands().iter().map(|(cmd, _)| {
            cmd.split_whitespace().next().unwrap_or(cmd).to_string()
        }));
        words.sort();
        words.dedup();
        Self { words }
    }

    fn current_word(line: &str) -> usize {
        line.rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl Completer for MomentumHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::current_word(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for MomentumHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }
        let word = &line[Self::current_word(line)..];
        if word.len() < 2 {
            return None;
        }

        self.words
            .iter()
            .find(|w| w.starts_with(word) && w.len() > word.len())
            .map(|w| (&w[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for MomentumHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.trim_start().starts_with('.') {
            return Cow::Owned(line.magenta().to_string());
        }

        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();
        let mut in_string = None;

        for c in line.chars() {
            if let Some(quote) = in_string {
                result.push_str(&c.green().to_string());
                if c == quote {
                    in_string = None;
                }
                continue;
            }
            if c.is_alphanumeric() || c == '_' || (c == '.' && !current_word.is_empty()) {
                current_word.push(c);
                continue;
            }
            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }
            let colored = match c {
                '"' | '\'' => {
                    in_string = Some(c);
                    c.green().to_string()
                }
                '(' | ')' | '[' | ']' | '{' | '}' => c.yellow().to_string(),
                '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' => c.cyan().to_string(),
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// Keywords shown in completion and highlighted by the REPL.
const KEYWORDS: &[&str] = &[
    "and", "async", "await", "break", "case", "catch", "continue", "data", "debug", "default",
    "dim", "each", "else", "elseif", "end", "false", "finally", "for", "function", "global",
    "if", "import", "in", "input", "let", "native", "next", "none", "not", "or", "print", "raise",
    "read", "restore", "return", "spawn", "step", "switch", "then", "to", "true", "try", "wend",
    "while",
];

fn highlight_word(word: &str) -> String {
    let lower = word.to_lowercase();
    match TokenKind::keyword(&lower) {
        Some(TokenKind::True | TokenKind::False | TokenKind::NoneLiteral) => word.blue().to_string(),
        Some(_) => word.magenta().bold().to_string(),
        None if word.chars().all(|c| c.is_ascii_digit() || c == '.') => word.yellow().to_string(),
        None => word.to_string(),
    }
}

impl Validator for MomentumHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();

        if input.trim_start().starts_with('.') {
            return Ok(ValidationResult::Valid(None));
        }
        if !is_balanced(input) || open_blocks(input) > 0 {
            return Ok(ValidationResult::Incomplete);
        }

        let trimmed = input.trim_end();
        if trimmed.ends_with('\\')
            || trimmed.ends_with('+')
            || trimmed.ends_with('-')
            || trimmed.ends_with('*')
            || trimmed.ends_with('/')
            || trimmed.ends_with('=')
            || trimmed.ends_with(',')
        {
            return Ok(ValidationResult::Incomplete);
        }

        Ok(ValidationResult::Valid(None))
    }
}

/// Check if brackets, braces, and parentheses are balanced
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string = None;
    let mut escape_next = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match in_string {
            Some(_) if c == '\\' => escape_next = true,
            Some(quote) if c == quote => in_string = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => in_string = Some(c),
                '/' if chars.peek() == Some(&'/') => {
                    // Skip the comment up to the end of the line
                    for rest in chars.by_ref() {
                        if rest == '\n' {
                            break;
                        }
                    }
                }
                '(' => stack.push(')'),
                '[' => stack.push(']'),
                '{' => stack.push('}'),
                ')' | ']' | '}' => {
                    if stack.pop() != Some(c) {
                        // Let the parser report it
                        return true;
                    }
                }
                _ => {}
            },
        }
    }

    stack.is_empty() && in_string.is_none()
}

/// Number of block statements opened but not yet closed.
fn open_blocks(input: &str) -> i32 {
    let mut depth = 0;

    for line in input.lines() {
        let lower = line.trim().to_lowercase();
        let mut words = lower.split_whitespace();
        let first = words.next().unwrap_or_default();
        let second = words.next().unwrap_or_default();

        depth += match first {
            "while" | "for" | "function" | "try" | "switch" => 1,
            "async" | "native" if second == "function" => 1,
            // A single-line `if` has a statement after `then`
            "if" if lower.ends_with("then") || !lower.contains(" then ") => 1,
            "end" | "wend" | "next" | "endif" | "endfunction" | "endtry" | "endswitch" => -1,
            _ => 0,
        };
    }

    depth
}

impl Helper for MomentumHelper {}

/// The interactive REPL for Momentum
pub struct Repl {
    engine: Engine,
    editor: Editor<MomentumHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(config: momentum_core::Config) -> rustyline::Result<Self> {
        let engine = Engine::with_console(config, Rc::new(RefCell::new(StdConsole)))
            .map_err(|e| ReadlineError::Io(std::io::Error::other(e.to_string())))?;

        let editor_config = rustyline::Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(editor_config)?;
        editor.set_helper(Some(MomentumHelper::new(engine.vm().builtins().names())));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("momentum")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        Ok(Self {
            engine,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "momentum>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    if self.eval_and_print(&line) == CommandResult::Exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);
        println!();
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "Momentum".white().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{} {}", "momentum".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
            }
            ReplCommand::Load => match arg {
                Some(path) => return self.load_file(Path::new(path)),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
            ReplCommand::Globals => {
                for name in self.engine.vm().global_names() {
                    if let Some(value) = self.engine.vm().global(&name) {
                        println!("  {} = {}", name.cyan(), format_value(value));
                    }
                }
            }
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!();
    }

    fn load_file(&mut self, path: &Path) -> CommandResult {
        let result = self.engine.eval_file(path);
        self.report(result)
    }

    fn eval_and_print(&mut self, input: &str) -> CommandResult {
        let result = self.engine.eval_interactive(input);
        self.report(result)
    }

    /// Globals survive errors; only `exit()` ends the session.
    fn report(&self, result: momentum_core::Result<Value>) -> CommandResult {
        match result {
            Ok(Value::None) => CommandResult::Continue,
            Ok(value) => {
                println!("{}", format_value(&value));
                CommandResult::Continue
            }
            Err(momentum_core::Error::Exit(_)) => CommandResult::Exit,
            Err(e) => {
                print_error(&e);
                CommandResult::Continue
            }
        }
    }
}

/// Result of executing a REPL command
#[derive(Debug, PartialEq, Eq)]
enum CommandResult {
    Continue,
    Exit,
}

/// Format a value for display with syntax coloring
fn format_value(value: &Value) -> String {
    match value {
        Value::None => "none".blue().dimmed().to_string(),
        Value::Int(_) | Value::Float(_) => value.to_string().yellow().to_string(),
        Value::Str(_) => value.repr().green().to_string(),
        Value::Function(_) | Value::Future(_) => value.to_string().magenta().to_string(),
        _ => value.repr(),
    }
}
