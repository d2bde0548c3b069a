use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use config::{Config, Environment};
use serde::Deserialize;

use crate::ai_backend::local::WhichModel;
use crate::ai_backend::BackendKind;
use crate::constants::{APP_NAME, DEFAULT_CONFIG_CONTENT};
use crate::example_bank::{Example, ExampleBank};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub verbosity: Option<String>,
    pub ai_backend: BackendKind,
    pub models_dir: Option<String>,
    pub shell: Option<String>,
    pub shell_flag: Option<String>,
    pub model_config: ModelConfig,
    pub aws_settings: AwsSettings,
    #[serde(default)]
    pub examples: Vec<Example>,
}

#[derive(Debug, Deserialize)]
pub struct AwsSettings {
    pub profile: Option<String>,
    pub region: String,
    pub model_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    pub model: WhichModel,
    pub cpu: bool,
    pub quantized: bool,
    pub verbose_prompt: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub sample_len: usize,
    pub model_id: Option<String>,
    pub revision: Option<String>,
    pub weight_file: Option<String>,
    pub tokenizer: Option<String>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub dtype: Option<String>,
    pub stop_sequences: Vec<String>,
}

impl Settings {
    /// Loads `<config dir>/bash-whisperer/config.toml`, writing a commented
    /// default file there first if none exists.
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load_or_create(&Self::config_path())
    }

    /// Like [`Self::load_from`], writing the default file to `path` first if
    /// nothing is there. A failed write goes to stderr and the built-in
    /// defaults are used.
    pub fn load_or_create(path: &Path) -> Result<Self, config::ConfigError> {
        if !path.exists() {
            if let Err(e) = write_default_config(path) {
                eprintln!("Could not write default config to {}: {e}", path.display());
            }
        }
        Self::load_from(path)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|mut path| {
                path.push(APP_NAME);
                path
            })
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Defaults, then the TOML file at `path` if present, then environment
    /// variables prefixed with `BASH_WHISPERER`.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(Environment::with_prefix("BASH_WHISPERER").separator("__"))
            .set_default("verbosity", "warn")?
            .set_default("ai_backend", "local")?
            .set_default("model_config.model", "tinyllama")?
            .set_default("model_config.cpu", false)?
            .set_default("model_config.quantized", false)?
            .set_default("model_config.verbose_prompt", false)?
            .set_default("model_config.temperature", 0.8_f64)?
            .set_default("model_config.top_p", 0.9_f64)?
            .set_default("model_config.seed", rand::random::<u64>())?
            .set_default("model_config.sample_len", 100)?
            .set_default("model_config.repeat_penalty", 1.1)?
            .set_default("model_config.repeat_last_n", 64)?
            .set_default("model_config.dtype", "f32")?
            .set_default("model_config.stop_sequences", vec!["\nQuery:"])?
            .set_default("aws_settings.region", "us-east-1")?
            .build()?;

        settings.try_deserialize()
    }

    /// Configured examples, or the built-in ones when none are configured.
    pub fn example_bank(&self) -> ExampleBank {
        if self.examples.is_empty() {
            ExampleBank::default()
        } else {
            ExampleBank::new(self.examples.clone())
        }
    }

    /// Where downloaded model files are cached. A leading `~` is expanded.
    pub fn models_dir(&self) -> PathBuf {
        match &self.models_dir {
            Some(dir) => expand_home(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(format!(".{APP_NAME}"))
                .join("models"),
        }
    }
}

fn write_default_config(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG_CONTENT)
}

fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if dir == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(dir)),
        _ => PathBuf::from(dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(settings.ai_backend, BackendKind::Local);
        assert_eq!(settings.model_config.model, WhichModel::TinyLlama);
        assert_eq!(settings.model_config.sample_len, 100);
        assert_eq!(settings.model_config.stop_sequences, vec!["\nQuery:".to_string()]);
        assert_eq!(settings.aws_settings.region, "us-east-1");
        assert_eq!(settings.example_bank(), ExampleBank::default());
    }

    #[test]
    fn default_file_content_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, DEFAULT_CONFIG_CONTENT).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.verbosity.as_deref(), Some("warn"));
        assert_eq!(settings.model_config.repeat_last_n, 64);
    }

    #[test]
    fn first_load_writes_the_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/bash-whisperer/config.toml");

        let settings = Settings::load_or_create(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_CONTENT);
        assert_eq!(settings.model_config.sample_len, 100);
    }

    #[test]
    fn unwritable_config_location_still_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("config.toml");

        assert!(write_default_config(&path).is_err());
        let settings = Settings::load_or_create(&path).unwrap();
        assert_eq!(settings.ai_backend, BackendKind::Local);
        assert!(!path.exists());
    }

    #[test]
    fn file_overrides_defaults_and_examples_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
ai_backend = "bedrock"
models_dir = "/opt/models"

[model_config]
model = "phi2"
sample_len = 40

[[examples]]
query = "count lines"
command = "wc -l"

[[examples]]
query = "current directory"
command = "pwd"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.ai_backend, BackendKind::Bedrock);
        assert_eq!(settings.model_config.model, WhichModel::Phi2);
        assert_eq!(settings.model_config.sample_len, 40);
        assert_eq!(settings.models_dir(), PathBuf::from("/opt/models"));

        let bank = settings.example_bank();
        let commands: Vec<&str> = bank.iter().map(|e| e.command.as_str()).collect();
        assert_eq!(commands, vec!["wc -l", "pwd"]);
    }

    #[test]
    fn tilde_is_expanded() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/models"), home.join("models"));
        }
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
    }
}
