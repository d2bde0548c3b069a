use crate::token_output_stream;

use anyhow::{Error as E, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{self, Llama};
use candle_transformers::models::phi::Model as Phi;
use candle_transformers::models::phi3::Model as Phi3;
use candle_transformers::models::quantized_mixformer::MixFormerSequentialForCausalLM as QMixFormer;
use token_output_stream::TokenOutputStream;
use tokenizers::Tokenizer;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub enum Model {
    Llama {
        model: Llama,
        cache: llama::Cache,
        config: llama::Config,
        dtype: DType,
    },
    Phi(Phi),
    Phi3(Phi3),
    Quantized(QMixFormer),
}

impl Model {
    /// Drops whatever key/value state the previous prompt left behind.
    fn reset(&mut self, device: &Device) -> Result<()> {
        match self {
            Model::Llama {
                cache,
                config,
                dtype,
                ..
            } => *cache = llama::Cache::new(true, *dtype, config, device)?,
            Model::Phi(m) => m.clear_kv_cache(),
            Model::Phi3(m) => m.clear_kv_cache(),
            Model::Quantized(m) => m.clear_kv_cache(),
        }
        Ok(())
    }

    fn forward(&mut self, input: &Tensor, pos: usize) -> Result<Tensor> {
        Ok(match self {
            Model::Llama { model, cache, .. } => model.forward(input, pos, cache)?,
            Model::Phi(m) => m.forward(input)?,
            Model::Quantized(m) => m.forward(input)?,
            Model::Phi3(m) => m.forward(input, pos)?.i((.., 0, ..))?,
        })
    }
}

/// Sampling knobs for [`TextGeneration`].
#[derive(Clone, Debug)]
pub struct SamplingParams {
    pub seed: u64,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub verbose_prompt: bool,
}

pub struct TextGeneration {
    model: Model,
    device: Device,
    tokenizer: TokenOutputStream,
    logits_processor: LogitsProcessor,
    eos_token: String,
    stop_sequences: Vec<String>,
    repeat_penalty: f32,
    repeat_last_n: usize,
    verbose_prompt: bool,
}

impl TextGeneration {
    pub fn new(
        model: Model,
        tokenizer: Tokenizer,
        eos_token: &str,
        stop_sequences: Vec<String>,
        params: &SamplingParams,
        device: &Device,
    ) -> Self {
        let logits_processor = LogitsProcessor::new(params.seed, params.temperature, params.top_p);
        Self {
            model,
            tokenizer: TokenOutputStream::new(tokenizer),
            logits_processor,
            eos_token: eos_token.to_string(),
            stop_sequences,
            repeat_penalty: params.repeat_penalty,
            repeat_last_n: params.repeat_last_n,
            verbose_prompt: params.verbose_prompt,
            device: device.clone(),
        }
    }

    /// Async runs the text generation model on the given prompt for a specified number of tokens
    ///
    /// The prompt is written to `stream` first, followed by the continuation.
    /// Generation ends at the end-of-text token, after `sample_len` tokens, or
    /// as soon as the continuation contains one of the stop sequences, in which
    /// case the stop sequence and everything after it is not written.
    ///
    /// # Arguments
    /// * `prompt` - The input text prompt to generate from
    /// * `sample_len` - Maximum number of tokens to generate
    /// * `stream` - An async writer that receives the prompt and generated text
    pub async fn run<S>(&mut self, prompt: &str, sample_len: usize, stream: &mut S) -> Result<()>
    where
        S: tokio::io::AsyncWrite + Unpin,
    {
        self.model.reset(&self.device)?;
        self.tokenizer.clear();

        let tokens = self
            .tokenizer
            .tokenizer()
            .encode(prompt, true)
            .map_err(E::msg)?;
        debug!("Encoded {} prompt tokens", tokens.len());
        if tokens.is_empty() {
            anyhow::bail!("Empty prompts are not supported.")
        }

        if self.verbose_prompt {
            for (token, id) in tokens.get_tokens().iter().zip(tokens.get_ids().iter()) {
                let token = token.replace('▁', " ").replace("<0x0A>", "\n");
                println!("{id:7} -> '{token}'");
            }
        }

        let mut tokens = tokens.get_ids().to_vec();
        let mut generated_tokens = 0usize;

        let eos_token = match self.tokenizer.get_token(&self.eos_token) {
            Some(token) => token,
            None => anyhow::bail!("cannot find the {} token", self.eos_token),
        };

        stream.write_all(prompt.as_bytes()).await?;

        let start_gen = std::time::Instant::now();
        let mut pos = 0;
        // Text that has been decoded but not yet written, held back while it
        // could still turn out to be the start of a stop sequence.
        let mut pending = String::new();
        let mut stopped = false;

        for index in 0..sample_len {
            // full context on the first pass, one token afterwards
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;

            let logits = self.model.forward(&input, pos)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if self.repeat_penalty == 1. {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.repeat_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = self.logits_processor.sample(&logits)?;
            tokens.push(next_token);
            generated_tokens += 1;

            if next_token == eos_token {
                break;
            }

            if let Some(t) = self.tokenizer.next_token(next_token)? {
                pending.push_str(&t);
                if let Some(cut) = find_stop(&pending, &self.stop_sequences) {
                    pending.truncate(cut);
                    stopped = true;
                    break;
                }
                let flushable = safe_prefix_len(&pending, &self.stop_sequences);
                stream.write_all(pending[..flushable].as_bytes()).await?;
                pending.replace_range(..flushable, "");
            }
            pos += context_size;
        }

        if !stopped {
            if let Some(rest) = self.tokenizer.decode_rest()? {
                pending.push_str(&rest);
            }
            if let Some(cut) = find_stop(&pending, &self.stop_sequences) {
                pending.truncate(cut);
            }
        }
        stream.write_all(pending.as_bytes()).await?;
        stream.flush().await?;

        let dt = start_gen.elapsed();
        info!(
            "{generated_tokens} tokens generated ({:.2} token/s)",
            generated_tokens as f64 / dt.as_secs_f64(),
        );
        Ok(())
    }
}

/// Byte offset of the earliest stop sequence in `text`.
fn find_stop(text: &str, stop_sequences: &[String]) -> Option<usize> {
    stop_sequences
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Length of the prefix of `text` that cannot be part of a stop sequence
/// completed by later tokens.
fn safe_prefix_len(text: &str, stop_sequences: &[String]) -> usize {
    let mut keep_from = text.len();
    for stop in stop_sequences.iter().filter(|s| !s.is_empty()) {
        for (start, _) in text.char_indices() {
            if stop.starts_with(&text[start..]) {
                keep_from = keep_from.min(start);
                break;
            }
        }
    }
    keep_from
}
