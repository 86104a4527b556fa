mod app;
mod settings;
mod sim;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use app::{App, Options};
use settings::AppSettings;

#[derive(Parser)]
#[command(
    name = "ambex",
    version,
    about = "Ambulatory target-selection experiment, headless session driver"
)]
struct Cli {
    /// JSON settings file; defaults are used when absent
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Overrides the data directory from the settings file
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Participant whose schedule to run
    #[arg(long, default_value_t = 1)]
    participant: i32,
    /// Run with the left hand dominant
    #[arg(long)]
    left_handed: bool,
    /// Pace the loop at 90 Hz wall time instead of fast-forwarding
    #[arg(long)]
    realtime: bool,
    /// Stop after this many completed steps instead of the whole schedule
    #[arg(long)]
    steps: Option<usize>,
    /// Seed for the scripted participant and the experiment randomness
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Verbose tracing output
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt().with_env_filter(level).try_init();

    let settings = match &cli.settings {
        Some(path) => AppSettings::load_or_default(path),
        None => AppSettings::default(),
    };

    let app = App::new(Options {
        settings,
        data_dir: cli.data_dir,
        participant_id: cli.participant,
        left_handed: cli.left_handed,
        realtime: cli.realtime,
        step_limit: cli.steps,
        seed: cli.seed,
    })?;
    app.run()?;

    Ok(())
}
