pub mod ai_backend;
pub mod cli;
pub mod clipboard;
pub mod constants;
pub mod disk;
pub mod example_bank;
pub mod gate;
pub mod generator;
pub mod prompt;
pub mod repl;
pub mod settings;
pub mod text_generation;
pub mod token_output_stream;

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use hf_hub::api::sync::ApiRepo;
use tracing::info;

pub use cli::{WhispererArgs, WhispererCli};
pub use example_bank::{Example, ExampleBank};
pub use gate::{ExecutionGate, ExecutionResult, HostShell, Shell, TurnOutcome};
pub use generator::{CommandGenerator, Extraction, ExtractionFailure};
pub use settings::Settings;

/// Picks the accelerator to run on, falling back to the CPU.
pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        info!("no GPU support compiled in, running on CPU");
        Ok(Device::Cpu)
    }
}

/// Downloads every safetensors shard listed in the `weight_map` of a
/// `model.safetensors.index.json` file.
pub fn hub_load_safetensors(repo: &ApiRepo, json_file: &str) -> Result<Vec<PathBuf>> {
    let json_file = repo.get(json_file)?;
    let json_file = std::fs::File::open(json_file)?;
    let json: serde_json::Value = serde_json::from_reader(&json_file)?;
    let weight_map = match json.get("weight_map") {
        None => bail!("no weight map in {json_file:?}"),
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => bail!("weight map in {json_file:?} is not a map"),
    };
    let safetensors_files: HashSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    safetensors_files
        .into_iter()
        .map(|file| repo.get(file).map_err(anyhow::Error::from))
        .collect()
}
