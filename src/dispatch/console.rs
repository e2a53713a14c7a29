//! Console I/O for interactive mode
//!
//! [`EditorConsole`] is the terminal console backed by rustyline;
//! [`ScriptedConsole`] replays canned input and records what was written.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use owo_colors::OwoColorize;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{CompletionType, EditMode, Editor};
use tracing::{debug, warn};

use crate::util::config::ReplConfig;

/// Line-oriented console
pub trait Console {
    /// Next input line, `None` at end of input. A keyboard interrupt is an
    /// error of kind [`io::ErrorKind::Interrupted`].
    fn read_line(
        &mut self,
        prompt: &str,
    ) -> io::Result<Option<String>>;

    fn write_line(
        &mut self,
        text: &str,
    );

    fn write_error(
        &mut self,
        text: &str,
    );

    /// Called once when the interactive loop ends
    fn close(&mut self) {}
}

impl<C: Console + ?Sized> Console for &mut C {
    fn read_line(
        &mut self,
        prompt: &str,
    ) -> io::Result<Option<String>> {
        (**self).read_line(prompt)
    }

    fn write_line(
        &mut self,
        text: &str,
    ) {
        (**self).write_line(text)
    }

    fn write_error(
        &mut self,
        text: &str,
    ) {
        (**self).write_error(text)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Terminal console with line editing and history
pub struct EditorConsole {
    editor: Editor<(), FileHistory>,
    history_file: Option<PathBuf>,
    colors: bool,
}

impl EditorConsole {
    /// Create an editor configured from `config`, loading history if present
    pub fn new(config: &ReplConfig) -> io::Result<Self> {
        let rl_config = Config::builder()
            .history_ignore_space(true)
            .max_history_size(config.history_size)
            .map_err(readline_to_io)?
            .completion_type(CompletionType::List)
            .edit_mode(if config.vi_mode {
                EditMode::Vi
            } else {
                EditMode::Emacs
            })
            .build();

        let mut editor = Editor::with_config(rl_config).map_err(readline_to_io)?;

        // Load history if file exists
        if let Some(ref history_file) = config.history_file {
            if history_file.exists() {
                if let Err(err) = editor.load_history(history_file) {
                    warn!("could not load history {}: {}", history_file.display(), err);
                }
            }
        }

        Ok(Self {
            editor,
            history_file: config.history_file.clone(),
            colors: config.colors,
        })
    }
}

impl Console for EditorConsole {
    fn read_line(
        &mut self,
        prompt: &str,
    ) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            // Ctrl-D
            Err(ReadlineError::Eof) => Ok(None),
            // Ctrl-C
            Err(ReadlineError::Interrupted) => {
                Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"))
            }
            Err(e) => Err(readline_to_io(e)),
        }
    }

    fn write_line(
        &mut self,
        text: &str,
    ) {
        println!("{}", text);
    }

    fn write_error(
        &mut self,
        text: &str,
    ) {
        if self.colors {
            eprintln!("{}", text.red());
        } else {
            eprintln!("{}", text);
        }
    }

    fn close(&mut self) {
        if let Some(ref history_file) = self.history_file {
            match self.editor.save_history(history_file) {
                Ok(()) => debug!("history saved to {}", history_file.display()),
                Err(err) => warn!("could not save history {}: {}", history_file.display(), err),
            }
        }
    }
}

fn readline_to_io(err: ReadlineError) -> io::Error {
    match err {
        ReadlineError::Io(err) => err,
        other => io::Error::other(format!("readline error: {}", other)),
    }
}

/// What a [`ScriptedConsole`] has seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub prompts: Vec<String>,
    pub output: Vec<String>,
    pub errors: Vec<String>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct Script {
    input: VecDeque<Option<String>>,
    transcript: Transcript,
}

/// Console fed from a fixed list of lines.
///
/// Clones share the same script, so a test can keep one handle and read the
/// transcript after the console has been handed off.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConsole {
    script: Rc<RefCell<Script>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let input = lines.into_iter().map(|line| Some(line.into())).collect();
        Self {
            script: Rc::new(RefCell::new(Script {
                input,
                transcript: Transcript::default(),
            })),
        }
    }

    /// Queue a keyboard interrupt after the lines given so far
    pub fn interrupt(self) -> Self {
        self.script.borrow_mut().input.push_back(None);
        self
    }

    pub fn transcript(&self) -> Transcript {
        self.script.borrow().transcript.clone()
    }
}

impl Console for ScriptedConsole {
    fn read_line(
        &mut self,
        prompt: &str,
    ) -> io::Result<Option<String>> {
        let mut script = self.script.borrow_mut();
        script.transcript.prompts.push(prompt.to_string());
        match script.input.pop_front() {
            Some(Some(line)) => Ok(Some(line)),
            Some(None) => Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted")),
            None => Ok(None),
        }
    }

    fn write_line(
        &mut self,
        text: &str,
    ) {
        self.script
            .borrow_mut()
            .transcript
            .output
            .push(text.to_string());
    }

    fn write_error(
        &mut self,
        text: &str,
    ) {
        self.script
            .borrow_mut()
            .transcript
            .errors
            .push(text.to_string());
    }

    fn close(&mut self) {
        self.script.borrow_mut().transcript.closed = true;
    }
}
