#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use anyhow::{Context, Result};
use bash_whisperer::{Settings, WhispererArgs, WhispererCli};
use clap::Parser;
use tracing::info;
use tracing_log::AsTrace;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    use tracing_chrome::ChromeLayerBuilder;
    use tracing_subscriber::prelude::*;

    let start = std::time::Instant::now();

    let args = WhispererArgs::parse();

    let settings = Settings::new().context("failed to load settings")?;
    // -v/-q if given, otherwise the `verbosity` setting
    let log_level_filter = args.verbose.log_level_filter().as_trace();

    // Logs go to stderr so they never mix with command output.
    let _guard = if args.tracing {
        let (chrome_layer, guard) = ChromeLayerBuilder::new().build();
        tracing_subscriber::registry()
            .with(log_level_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(chrome_layer)
            .init();
        Some(guard)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level_filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("setting default subscriber failed")?;
        None
    };
    info!("Initialized args, settings, and logging in {:?}", start.elapsed());

    let cli = WhispererCli::new(settings, args, Some(start));

    cli.exec()
}
