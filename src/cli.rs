use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{Level, LogLevel, Verbosity};
use tracing::info;

use crate::ai_backend::local::WhichModel;
use crate::ai_backend::{AiBackend, BackendKind, BedrockAiBackend, LocalAiBackend};
use crate::disk;
use crate::gate::{ExecutionGate, HostShell};
use crate::generator::CommandGenerator;
use crate::repl::{Session, Terminal};
use crate::settings::Settings;

/// Default log level taken from the `verbosity` setting.
#[derive(Clone, Copy, Debug)]
pub struct ConfigLogLevel;

impl LogLevel for ConfigLogLevel {
    fn default() -> Option<Level> {
        let verbosity = Settings::new().ok().and_then(|settings| settings.verbosity);
        Some(parse_level(verbosity.as_deref()))
    }
}

fn parse_level(verbosity: Option<&str>) -> Level {
    match verbosity.unwrap_or("warn") {
        "error" => Level::Error,
        "info" => Level::Info,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        _ => Level::Warn,
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn a plain-English request into a shell command, run only after you confirm it", long_about = None)]
pub struct WhispererArgs {
    /// Run on CPU rather than on GPU.
    #[arg(long)]
    pub cpu: bool,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    pub tracing: bool,

    /// Handle a single query and exit instead of starting the interactive loop.
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long)]
    pub model: Option<WhichModel>,

    #[arg(long)]
    pub quantized: bool,

    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Print the few-shot prompt sent to the model.
    #[arg(long)]
    pub show_prompt: bool,

    /// Copy each generated command to the clipboard.
    #[arg(long)]
    pub copy: bool,

    #[command(flatten)]
    pub verbose: Verbosity<ConfigLogLevel>,
}

impl WhispererArgs {
    /// Command-line flags win over the configuration file.
    fn apply_to(&self, settings: &mut Settings) {
        settings.model_config.cpu |= self.cpu;
        settings.model_config.quantized |= self.quantized;
        if let Some(model) = self.model {
            settings.model_config.model = model;
        }
        if let Some(backend) = self.backend {
            settings.ai_backend = backend;
        }
    }
}

pub struct WhispererCli {
    settings: Settings,
    args: WhispererArgs,
    start: Instant,
}

impl WhispererCli {
    pub fn new(settings: Settings, args: WhispererArgs, start: Option<Instant>) -> Self {
        Self {
            settings,
            args,
            start: start.unwrap_or(Instant::now()),
        }
    }

    pub fn exec(mut self) -> Result<()> {
        self.args.apply_to(&mut self.settings);

        let backend = self.build_backend()?;
        let generator = CommandGenerator::new(
            backend,
            self.settings.example_bank(),
            self.settings.model_config.sample_len,
        );
        let mut session = Session::new(generator, ExecutionGate::new(self.shell()))
            .with_clipboard(self.args.copy)
            .with_show_prompt(self.show_prompt());
        info!("ready in {:?}", self.start.elapsed());

        let mut stdout = io::stdout();
        let mut stderr = io::stderr();
        match &self.args.query {
            Some(query) => {
                let stdin = io::stdin();
                session.run_once(query, &mut stdin.lock(), &mut stdout, &mut stderr)?;
                Ok(())
            }
            None => {
                let mut terminal = Terminal::new()?;
                session.run(&mut terminal, &mut stdout, &mut stderr)
            }
        }
    }

    fn build_backend(&self) -> Result<Box<dyn AiBackend>> {
        match self.settings.ai_backend {
            BackendKind::Local => {
                println!("Initializing Bash Whisperer...");
                println!("This might take a while on first run as the model needs to be downloaded.");
                let models_dir = self.settings.models_dir();
                println!("Loading model from {}...", models_dir.display());
                let backend = LocalAiBackend::load(&self.settings.model_config, models_dir.clone())
                    .context("Error loading model. Please ensure you have an internet connection for the first run")?;
                println!("Model loaded successfully!");
                info!("loaded the model in {:?}", self.start.elapsed());
                println!("Model size on disk: {}", disk::model_size(&models_dir));
                Ok(Box::new(backend))
            }
            BackendKind::Bedrock => {
                let backend = BedrockAiBackend::new(&self.settings.aws_settings)
                    .context("Error creating the Bedrock client")?;
                Ok(Box::new(backend))
            }
        }
    }

    /// `--show-prompt` or `verbose_prompt = true` in the configuration.
    fn show_prompt(&self) -> bool {
        self.args.show_prompt || self.settings.model_config.verbose_prompt
    }

    fn shell(&self) -> HostShell {
        match &self.settings.shell {
            Some(program) => {
                let flag = self.settings.shell_flag.as_deref().unwrap_or("-c");
                HostShell::new(program.as_str(), flag)
            }
            None => HostShell::default(),
        }
    }
}
