use std::path::PathBuf;

use anyhow::{Error as E, Result};
use clap::ValueEnum;
use serde::Deserialize;
use tracing::info;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache as LlamaCache, Llama, LlamaConfig};
use candle_transformers::models::mixformer::Config;
use candle_transformers::models::phi::{Config as PhiConfig, Model as Phi};
use candle_transformers::models::phi3::{Config as Phi3Config, Model as Phi3};
use candle_transformers::models::quantized_mixformer::MixFormerSequentialForCausalLM as QMixFormer;
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use super::common::AiBackend;
use crate::settings::ModelConfig;
use crate::text_generation::{Model, SamplingParams, TextGeneration};
use crate::{device, hub_load_safetensors};

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhichModel {
    #[value(name = "tinyllama")]
    TinyLlama,
    #[value(name = "phi2")]
    Phi2,
    #[value(name = "phi3")]
    Phi3,
}

impl WhichModel {
    fn default_model_id(self, quantized: bool) -> &'static str {
        match (self, quantized) {
            (WhichModel::Phi2, true) => "lmz/candle-quantized-phi",
            (WhichModel::TinyLlama, _) => "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
            (WhichModel::Phi2, false) => "microsoft/phi-2",
            (WhichModel::Phi3, _) => "microsoft/Phi-3-mini-4k-instruct",
        }
    }

    fn eos_token(self) -> &'static str {
        match self {
            WhichModel::TinyLlama => "</s>",
            WhichModel::Phi2 | WhichModel::Phi3 => "<|endoftext|>",
        }
    }
}

/// Runs a model on this machine. Weights are fetched into `models_dir` on
/// first use and loaded once, when the backend is built.
pub struct LocalAiBackend {
    pipeline: TextGeneration,
    runtime: tokio::runtime::Runtime,
}

impl LocalAiBackend {
    pub fn load(config: &ModelConfig, models_dir: PathBuf) -> Result<Self> {
        info!(
            "avx: {}, neon: {}, simd128: {}, f16c: {}",
            candle_core::utils::with_avx(),
            candle_core::utils::with_neon(),
            candle_core::utils::with_simd128(),
            candle_core::utils::with_f16c()
        );
        info!(
            "temp: {:.2} repeat-penalty: {:.2} repeat-last-n: {}",
            config.temperature.unwrap_or(0.),
            config.repeat_penalty,
            config.repeat_last_n
        );
        let (model, tokenizer, device) = load_local_model(config, models_dir)?;
        let params = SamplingParams {
            seed: config.seed,
            temperature: config.temperature,
            top_p: config.top_p,
            repeat_penalty: config.repeat_penalty,
            repeat_last_n: config.repeat_last_n,
            verbose_prompt: config.verbose_prompt,
        };
        let pipeline = TextGeneration::new(
            model,
            tokenizer,
            config.model.eos_token(),
            config.stop_sequences.clone(),
            &params,
            &device,
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { pipeline, runtime })
    }
}

fn load_local_model(config: &ModelConfig, models_dir: PathBuf) -> Result<(Model, Tokenizer, Device)> {
    let repo = get_repo_for_local_model(config, models_dir)?;
    let tokenizer_filename = match &config.tokenizer {
        Some(file) => PathBuf::from(file),
        None => repo.get("tokenizer.json")?,
    };
    let filenames = match &config.weight_file {
        Some(weight_file) => vec![PathBuf::from(weight_file)],
        None => {
            if config.quantized {
                match config.model {
                    WhichModel::Phi2 => vec![repo.get("model-v2-q4k.gguf")?],
                    WhichModel::TinyLlama | WhichModel::Phi3 => {
                        anyhow::bail!("quantized weights are only available for phi2")
                    }
                }
            } else {
                match config.model {
                    WhichModel::TinyLlama => vec![repo.get("model.safetensors")?],
                    WhichModel::Phi2 | WhichModel::Phi3 => {
                        hub_load_safetensors(&repo, "model.safetensors.index.json")?
                    }
                }
            }
        }
    };
    let tokenizer = Tokenizer::from_file(tokenizer_filename).map_err(E::msg)?;

    let device = device(config.cpu)?;
    let model = if config.quantized {
        let vb = candle_transformers::quantized_var_builder::VarBuilder::from_gguf(
            &filenames[0],
            &device,
        )?;
        match config.model {
            WhichModel::Phi2 => Model::Quantized(QMixFormer::new_v2(&Config::v2(), vb)?),
            WhichModel::TinyLlama | WhichModel::Phi3 => {
                anyhow::bail!("quantized weights are only available for phi2")
            }
        }
    } else {
        let dtype = match &config.dtype {
            Some(dtype) => dtype.parse()?,
            None => {
                if config.model == WhichModel::Phi3 {
                    device.bf16_default_to_f32()
                } else {
                    DType::F32
                }
            }
        };
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&filenames, dtype, &device)? };
        let config_file = std::fs::read_to_string(repo.get("config.json")?)?;
        match config.model {
            WhichModel::TinyLlama => {
                let llama_config: LlamaConfig = serde_json::from_str(&config_file)?;
                let llama_config = llama_config.into_config(false);
                let cache = LlamaCache::new(true, dtype, &llama_config, &device)?;
                let model = Llama::load(vb, &llama_config)?;
                Model::Llama {
                    model,
                    cache,
                    config: llama_config,
                    dtype,
                }
            }
            WhichModel::Phi2 => {
                let phi_config: PhiConfig = serde_json::from_str(&config_file)?;
                Model::Phi(Phi::new(&phi_config, vb)?)
            }
            WhichModel::Phi3 => {
                let phi3_config: Phi3Config = serde_json::from_str(&config_file)?;
                Model::Phi3(Phi3::new(&phi3_config, vb)?)
            }
        }
    };

    info!("loaded the model, device: {:?}", device);
    Ok((model, tokenizer, device))
}

fn get_repo_for_local_model(config: &ModelConfig, models_dir: PathBuf) -> Result<ApiRepo> {
    let api = ApiBuilder::new()
        .with_cache_dir(models_dir)
        .with_progress(true)
        .build()?;
    let model_id = match &config.model_id {
        Some(model_id) => model_id.to_string(),
        None => config.model.default_model_id(config.quantized).to_string(),
    };
    let revision = config.revision.clone().unwrap_or_else(|| "main".to_string());
    info!("Loading model {model_id} revision {revision}");
    Ok(api.repo(Repo::with_revision(model_id, RepoType::Model, revision)))
}

impl AiBackend for LocalAiBackend {
    fn invoke(&mut self, prompt: &str, max_new_tokens: usize) -> Result<Vec<u8>> {
        let start = std::time::Instant::now();
        let mut buffer = Vec::new();
        let pipeline = &mut self.pipeline;
        self.runtime
            .block_on(async { pipeline.run(prompt, max_new_tokens, &mut buffer).await })?;
        info!("generated the output in {:?}", start.elapsed());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_repos_follow_model_choice() {
        assert_eq!(
            WhichModel::TinyLlama.default_model_id(false),
            "TinyLlama/TinyLlama-1.1B-Chat-v1.0"
        );
        assert_eq!(WhichModel::Phi2.default_model_id(true), "lmz/candle-quantized-phi");
        assert_eq!(WhichModel::Phi2.default_model_id(false), "microsoft/phi-2");
    }

    #[test]
    fn llama_models_stop_on_sentence_end_token() {
        assert_eq!(WhichModel::TinyLlama.eos_token(), "</s>");
        assert_eq!(WhichModel::Phi3.eos_token(), "<|endoftext|>");
    }
}
