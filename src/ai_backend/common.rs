use anyhow::Result;
use clap::ValueEnum;
use serde::Deserialize;

/// A text-generation capability.
///
/// `invoke` returns the raw generated bytes for one prompt. Backends echo the
/// prompt ahead of the continuation, the same layout a completion pipeline
/// produces, and generate at most `max_new_tokens` new tokens.
pub trait AiBackend {
    fn invoke(&mut self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u8>>;
}

impl<B: AiBackend + ?Sized> AiBackend for Box<B> {
    fn invoke(&mut self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u8>> {
        (**self).invoke(prompt, max_new_tokens)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Bedrock,
}
