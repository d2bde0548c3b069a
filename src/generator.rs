use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::ai_backend::AiBackend;
use crate::constants::{COMMAND_MARKER, FALLBACK_COMMAND};
use crate::example_bank::ExampleBank;
use crate::prompt::build_prompt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionFailure {
    NotText,
    MissingMarker,
    EmptyCommand,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionFailure::NotText => write!(f, "generated output is not valid UTF-8"),
            ExtractionFailure::MissingMarker => {
                write!(f, "generated output has no '{COMMAND_MARKER}' marker")
            }
            ExtractionFailure::EmptyCommand => {
                write!(f, "nothing follows the last '{COMMAND_MARKER}' marker")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    Command(String),
    Failed(ExtractionFailure),
}

impl Extraction {
    /// Resolves to the extracted command, or to [`FALLBACK_COMMAND`] when
    /// extraction failed.
    pub fn or_fallback(self) -> String {
        match self {
            Extraction::Command(command) => command,
            Extraction::Failed(reason) => {
                warn!("falling back to the placeholder command: {reason}");
                FALLBACK_COMMAND.to_string()
            }
        }
    }
}

/// Pulls the command out of raw generated output.
///
/// The output echoes the few-shot examples, so only the text after the last
/// `Command:` marker belongs to the user's query.
pub fn extract_command(generated: &[u8]) -> Extraction {
    let Ok(text) = std::str::from_utf8(generated) else {
        return Extraction::Failed(ExtractionFailure::NotText);
    };
    match text.rsplit_once(COMMAND_MARKER) {
        None => Extraction::Failed(ExtractionFailure::MissingMarker),
        Some((_, tail)) => {
            let command = tail.trim();
            if command.is_empty() {
                Extraction::Failed(ExtractionFailure::EmptyCommand)
            } else {
                Extraction::Command(command.to_string())
            }
        }
    }
}

/// Turns a natural-language query into a candidate command using the backend
/// it was constructed with.
pub struct CommandGenerator<B> {
    backend: B,
    bank: ExampleBank,
    max_new_tokens: usize,
}

impl<B: AiBackend> CommandGenerator<B> {
    pub fn new(backend: B, bank: ExampleBank, max_new_tokens: usize) -> Self {
        Self {
            backend,
            bank,
            max_new_tokens,
        }
    }

    pub fn bank(&self) -> &ExampleBank {
        &self.bank
    }

    /// The few-shot prompt that would be sent for `query`.
    pub fn prompt(&self, query: &str) -> String {
        build_prompt(&self.bank, query)
    }

    /// Runs one inference for `query` and returns the extraction result
    /// without applying any fallback. Only backend failures are errors.
    pub fn extract(&mut self, query: &str) -> Result<Extraction> {
        let prompt = self.prompt(query);
        self.complete(&prompt)
    }

    /// Sends an already built prompt to the backend and extracts the command.
    pub fn complete(&mut self, prompt: &str) -> Result<Extraction> {
        debug!("prompt: {prompt:?}");
        let generated = self
            .backend
            .invoke(prompt, self.max_new_tokens)
            .context("text generation failed")?;
        info!("received {} bytes from the backend", generated.len());
        Ok(extract_command(&generated))
    }

    /// Like [`Self::extract`], but a failed extraction yields the inert
    /// fallback command instead.
    pub fn generate(&mut self, query: &str) -> Result<String> {
        Ok(self.extract(query)?.or_fallback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedBackend {
        reply: Vec<u8>,
        prompts: Vec<(String, usize)>,
    }

    impl AiBackend for CannedBackend {
        fn invoke(&mut self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u8>> {
            self.prompts.push((prompt.to_string(), max_new_tokens));
            Ok(self.reply.clone())
        }
    }

    fn canned(reply: &[u8]) -> CannedBackend {
        CannedBackend {
            reply: reply.to_vec(),
            prompts: Vec::new(),
        }
    }

    #[test]
    fn takes_text_after_last_marker() {
        let generated = b"Query: a\nCommand: ls\n\nQuery: b\nCommand:   du -sh .  \n";
        assert_eq!(
            extract_command(generated),
            Extraction::Command("du -sh .".to_string())
        );
    }

    #[test]
    fn missing_marker_fails() {
        assert_eq!(
            extract_command(b"ls -la"),
            Extraction::Failed(ExtractionFailure::MissingMarker)
        );
    }

    #[test]
    fn blank_tail_fails() {
        assert_eq!(
            extract_command(b"Query: x\nCommand:  \n"),
            Extraction::Failed(ExtractionFailure::EmptyCommand)
        );
    }

    #[test]
    fn invalid_utf8_fails() {
        assert_eq!(
            extract_command(&[b'C', 0xff, 0xfe]),
            Extraction::Failed(ExtractionFailure::NotText)
        );
    }

    #[test]
    fn failure_resolves_to_fallback() {
        let extraction = Extraction::Failed(ExtractionFailure::MissingMarker);
        assert_eq!(extraction.or_fallback(), FALLBACK_COMMAND);
    }

    #[test]
    fn generate_passes_prompt_and_budget_to_backend() {
        let mut generator =
            CommandGenerator::new(canned(b"Command: uptime"), ExampleBank::default(), 100);
        let command = generator.generate("how long has this been up").unwrap();
        assert_eq!(command, "uptime");

        let (prompt, budget) = &generator.backend.prompts[0];
        assert_eq!(*budget, 100);
        assert!(prompt.ends_with("Query: how long has this been up\nCommand:"));
    }

    #[test]
    fn complete_sends_the_given_prompt_unchanged() {
        let mut generator = CommandGenerator::new(canned(b"Command: pwd"), ExampleBank::default(), 7);
        let prompt = generator.prompt("where am I");
        let extraction = generator.complete(&prompt).unwrap();

        assert_eq!(extraction, Extraction::Command("pwd".to_string()));
        assert_eq!(generator.backend.prompts, vec![(prompt, 7)]);
    }

    #[test]
    fn generate_without_marker_returns_fallback() {
        let mut generator = CommandGenerator::new(canned(b"no idea"), ExampleBank::default(), 10);
        assert_eq!(generator.generate("whatever").unwrap(), FALLBACK_COMMAND);
    }

    #[test]
    fn backend_error_is_propagated() {
        struct Broken;
        impl AiBackend for Broken {
            fn invoke(&mut self, _: &str, _: usize) -> Result<Vec<u8>> {
                anyhow::bail!("device lost")
            }
        }
        let mut generator = CommandGenerator::new(Broken, ExampleBank::default(), 10);
        let err = generator.generate("x").unwrap_err();
        assert!(format!("{err:#}").contains("device lost"));
    }
}
