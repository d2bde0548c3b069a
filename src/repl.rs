//! The interactive loop: read a query, generate, confirm, run, repeat.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use indicatif::ProgressBar;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info, warn};

use crate::ai_backend::AiBackend;
use crate::clipboard;
use crate::constants::{CONFIRM_PROMPT, QUERY_PROMPT};
use crate::gate::{ExecutionGate, Shell, TurnOutcome};
use crate::generator::CommandGenerator;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Interrupted,
    Eof,
}

/// Source of user input lines.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Result<Input>;

    /// Called with every accepted query.
    fn remember(&mut self, _line: &str) {}
}

/// Line editor on the controlling terminal. History is kept in memory only.
pub struct Terminal {
    editor: DefaultEditor,
}

impl Terminal {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineReader for Terminal {
    fn read_line(&mut self, prompt: &str) -> Result<Input> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn remember(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            debug!("could not add history entry: {e}");
        }
    }
}

fn is_exit(query: &str) -> bool {
    query.eq_ignore_ascii_case("exit")
}

pub struct Session<B, S> {
    generator: CommandGenerator<B>,
    gate: ExecutionGate<S>,
    copy_to_clipboard: bool,
    show_prompt: bool,
}

impl<B: AiBackend, S: Shell> Session<B, S> {
    pub fn new(generator: CommandGenerator<B>, gate: ExecutionGate<S>) -> Self {
        Self {
            generator,
            gate,
            copy_to_clipboard: false,
            show_prompt: false,
        }
    }

    /// Print every built prompt before it is sent to the backend.
    pub fn with_show_prompt(mut self, show_prompt: bool) -> Self {
        self.show_prompt = show_prompt;
        self
    }

    pub fn with_clipboard(mut self, copy_to_clipboard: bool) -> Self {
        self.copy_to_clipboard = copy_to_clipboard;
        self
    }

    /// Reads queries until `exit`, end of input, or an interrupt. Errors from
    /// a single turn are printed and the loop carries on.
    pub fn run<L: LineReader, W: Write, E: Write>(
        &mut self,
        reader: &mut L,
        out: &mut W,
        err: &mut E,
    ) -> Result<()> {
        loop {
            let query = match reader.read_line(QUERY_PROMPT)? {
                Input::Line(line) => line,
                Input::Interrupted => {
                    writeln!(out, "\nExiting...")?;
                    break;
                }
                Input::Eof => break,
            };
            let query = query.trim();
            if query.is_empty() {
                continue;
            }
            if is_exit(query) {
                break;
            }
            reader.remember(query);

            match self.turn(query, reader, out, err) {
                Ok(Some(outcome)) => debug!("turn finished: {outcome:?}"),
                Ok(None) => {
                    writeln!(out, "\nExiting...")?;
                    break;
                }
                Err(e) => {
                    writeln!(err, "Error: {e:#}")?;
                    err.flush()?;
                }
            }
        }
        info!("leaving the read loop");
        Ok(())
    }

    /// One query through generation and the gate. `None` means the user
    /// interrupted at the confirmation prompt.
    fn turn<L: LineReader, W: Write, E: Write>(
        &mut self,
        query: &str,
        reader: &mut L,
        out: &mut W,
        err: &mut E,
    ) -> Result<Option<TurnOutcome>> {
        let command = self.generate(query, out)?;
        self.gate.present(&command, out)?;
        self.copy(&command);

        match reader.read_line(CONFIRM_PROMPT)? {
            Input::Line(answer) => Ok(Some(self.gate.resolve(&command, &answer, out, err)?)),
            Input::Eof => Ok(Some(TurnOutcome::Declined)),
            Input::Interrupted => Ok(None),
        }
    }

    /// Single non-interactive turn; the answer is read from `input`.
    pub fn run_once<R: BufRead, W: Write, E: Write>(
        &mut self,
        query: &str,
        input: &mut R,
        out: &mut W,
        err: &mut E,
    ) -> Result<TurnOutcome> {
        let command = self.generate(query, out)?;
        self.copy(&command);
        self.gate.confirm_with_io(&command, input, out, err)
    }

    /// Any shown prompt is written before the spinner starts.
    fn generate<W: Write>(&mut self, query: &str, out: &mut W) -> Result<String> {
        let prompt = self.generator.prompt(query);
        if self.show_prompt {
            writeln!(out, "Generated prompt: {prompt}")?;
            out.flush()?;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_message("Generating command...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        let extraction = self.generator.complete(&prompt);
        spinner.finish_and_clear();
        Ok(extraction?.or_fallback())
    }

    fn copy(&self, command: &str) {
        if self.copy_to_clipboard {
            if let Err(e) = clipboard::copy(command) {
                warn!("could not copy command to clipboard: {e:#}");
            }
        }
    }
}
