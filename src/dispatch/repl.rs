//! Interactive console loop
//!
//! Reads lines until a turn is complete, runs it in the console namespace and
//! echoes the value of a trailing expression. Errors are reported and the loop
//! goes on; `exit()`, `:quit` and end of input end it.

use std::io;
use std::mem;

use tracing::{debug, warn};

use super::console::Console;
use crate::host::{Host, Namespace, TurnOutcome, Value};
use crate::util::config::ReplConfig;

/// Command result
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Leave the console
    Exit,
    /// Continue to next input
    Continue,
}

/// REPL over a [`Console`]
pub struct Repl<'a, C: Console + ?Sized> {
    host: &'a Host,
    console: &'a mut C,
    config: &'a ReplConfig,
    ns: Namespace,
    buffer: String,
    turns: usize,
}

impl<'a, C: Console + ?Sized> Repl<'a, C> {
    pub fn new(
        host: &'a Host,
        console: &'a mut C,
        config: &'a ReplConfig,
        ns: Namespace,
    ) -> Self {
        Self {
            host,
            console,
            config,
            ns,
            buffer: String::new(),
            turns: 0,
        }
    }

    /// Run until the user leaves; returns the number of turns evaluated
    pub fn run(mut self) -> io::Result<usize> {
        if !self.config.banner.is_empty() {
            self.console.write_line(&self.config.banner);
        }

        loop {
            let prompt = if self.buffer.is_empty() {
                &self.config.prompt
            } else {
                &self.config.continuation_prompt
            };

            let line = match self.console.read_line(prompt) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    self.buffer.clear();
                    self.console.write_error("KeyboardInterrupt");
                    continue;
                }
                Err(err) => {
                    self.console.close();
                    return Err(err);
                }
            };

            if self.buffer.is_empty() && line.trim_start().starts_with(':') {
                if self.handle_command(line.trim()) == CommandResult::Exit {
                    break;
                }
                continue;
            }

            self.buffer.push_str(&line);
            self.buffer.push('\n');
            if !is_complete(&self.buffer) {
                continue;
            }

            let source = mem::take(&mut self.buffer);
            if source.trim().is_empty() {
                continue;
            }
            self.turns += 1;
            match self.host.eval_turn(&source, &self.ns) {
                TurnOutcome::Value(Some(Value::Nil)) | TurnOutcome::Value(None) => {}
                TurnOutcome::Value(Some(value)) => self.console.write_line(&value.repr()),
                TurnOutcome::Failed(err) => {
                    warn!("console turn {} failed: {}", self.turns, err);
                    self.console.write_error(&err.to_string());
                }
                TurnOutcome::Stop => break,
            }
        }

        debug!("console closed after {} turn(s)", self.turns);
        self.console.close();
        Ok(self.turns)
    }

    /// Handle a command
    fn handle_command(
        &mut self,
        line: &str,
    ) -> CommandResult {
        let cmd = line.trim_start_matches(':').trim();
        let parts: Vec<&str> = cmd.split_whitespace().collect();

        match parts.first().copied().unwrap_or("") {
            "quit" | "q" => CommandResult::Exit,
            "help" | "h" => {
                self.print_help();
                CommandResult::Continue
            }
            "clear" | "c" => {
                let identity = self.ns.identity();
                self.ns.clear();
                if let Some(identity) = identity {
                    self.ns.set("__name__", Value::str(identity));
                }
                self.console.write_line("Namespace cleared");
                CommandResult::Continue
            }
            "symbols" | "info" | "i" => {
                for name in self.ns.names() {
                    if let Some(value) = self.ns.get(&name) {
                        self.console
                            .write_line(&format!("{} = {}", name, value.repr()));
                    }
                }
                CommandResult::Continue
            }
            "modules" | "m" => {
                for identity in self.host.modules() {
                    self.console.write_line(&identity);
                }
                CommandResult::Continue
            }
            "" => CommandResult::Continue,
            _ => {
                self.console
                    .write_error(&format!("Unknown command: {}", line));
                CommandResult::Continue
            }
        }
    }

    /// Print help message
    fn print_help(&mut self) {
        for line in [
            "Available commands:",
            "  :quit, :q      - Leave the console",
            "  :help, :h      - Show this help",
            "  :clear, :c     - Drop every binding in the console namespace",
            "  :symbols, :i   - List console bindings",
            "  :modules, :m   - List registered modules",
        ] {
            self.console.write_line(line);
        }
    }
}

/// Whether `code` has balanced delimiters and no open string
pub fn is_complete(code: &str) -> bool {
    let code = code.trim();
    if code.is_empty() {
        return true;
    }

    // Count braces, brackets, and parens
    let mut braces = 0usize;
    let mut brackets = 0usize;
    let mut parens = 0usize;
    let mut in_string = false;
    let mut in_comment = false;
    let mut escaped = false;

    for c in code.chars() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        // a stray closer is a syntax error; let the parser report it
        match c {
            '"' => in_string = true,
            '#' => in_comment = true,
            '{' => braces += 1,
            '[' => brackets += 1,
            '(' => parens += 1,
            '}' if braces == 0 => return true,
            ']' if brackets == 0 => return true,
            ')' if parens == 0 => return true,
            '}' => braces -= 1,
            ']' => brackets -= 1,
            ')' => parens -= 1,
            _ => {}
        }
    }

    braces == 0 && brackets == 0 && parens == 0 && !in_string
}
