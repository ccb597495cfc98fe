//! Command-line entry point of the post-processing run.
//!
//! Two log files are written in the working directory for every invocation:
//! `<YYYYmmddHHMM>-<pid>-postprocessing.log` (INFO and above, `RUST_LOG` overrides)
//! and `<YYYYmmddHHMM>-<pid>-postprocessing.err` (errors only).
use std::{fs::File, process::ExitCode, sync::Mutex};

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use surveyjoin::{constants::DEFAULT_INTERM_DB, prelude::*};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Join simulated survey detections with per-object catalogs and pointing metadata"
)]
struct Args {
    #[arg(short = 'l', long, help = "Physical parameters file (H and colour offsets)")]
    params: Utf8PathBuf,

    #[arg(short = 'o', long, help = "Orbit file")]
    orbit: Utf8PathBuf,

    #[arg(short = 'p', long, help = "Ephemeris (detections) file")]
    pointing: Utf8PathBuf,

    #[arg(short = 'c', long, help = "JSON configuration file")]
    config: Utf8PathBuf,

    #[arg(short = 'm', long, help = "Cometary parameters file (comet runs only)")]
    comet: Option<Utf8PathBuf>,

    #[arg(
        short = 'd',
        long,
        help = "Build the intermediate ephemeris database before the run",
        conflicts_with = "reuse_intermediate_db"
    )]
    make_intermediate_db: bool,

    #[arg(
        long,
        default_value = DEFAULT_INTERM_DB,
        help = "Path of the intermediate ephemeris database"
    )]
    intermediate_db: Utf8PathBuf,

    #[arg(long, help = "Reuse an intermediate ephemeris database built by an earlier run")]
    reuse_intermediate_db: bool,

    #[arg(short = 's', long, default_value = "LSST", help = "Survey name")]
    survey: String,
}

impl Args {
    fn check_inputs(&self) -> Result<()> {
        let mut inputs: Vec<(&str, &Utf8Path)> = vec![
            ("--params", self.params.as_path()),
            ("--orbit", self.orbit.as_path()),
            ("--pointing", self.pointing.as_path()),
            ("--config", self.config.as_path()),
        ];
        if let Some(comet) = &self.comet {
            inputs.push(("--comet", comet.as_path()));
        }
        if self.reuse_intermediate_db {
            inputs.push(("--intermediate-db", self.intermediate_db.as_path()));
        }
        for (arg, path) in inputs {
            if !path.is_file() {
                bail!("{arg}: file {path} does not exist");
            }
        }
        Ok(())
    }

    fn input_files(&self) -> InputFiles {
        let intermediate_db = if self.make_intermediate_db {
            IntermediateDbMode::Build(self.intermediate_db.clone())
        } else if self.reuse_intermediate_db {
            IntermediateDbMode::Reuse(self.intermediate_db.clone())
        } else {
            IntermediateDbMode::Disabled
        };
        InputFiles {
            params: self.params.clone(),
            orbit: self.orbit.clone(),
            ephemeris: self.pointing.clone(),
            comet: self.comet.clone(),
            intermediate_db,
        }
    }
}

fn init_logging(run_id: &str) -> Result<()> {
    let log = File::create(format!("{run_id}-postprocessing.log"))
        .context("unable to create the log file")?;
    let err = File::create(format!("{run_id}-postprocessing.err"))
        .context("unable to create the error log file")?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log))
                .with_filter(env_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(err))
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context("unable to install the log subscriber")?;
    Ok(())
}

fn run(args: &Args, ctx: &mut RunContext) -> Result<RunSummary> {
    let raw = RawConfig::from_json_file(&args.config)
        .with_context(|| format!("reading configuration {}", args.config))?;
    let config = PipelineConfig::from_raw(&raw, &args.survey)?;
    config.log_summary(ctx);

    let inputs = args.input_files();
    let summary = Pipeline::new(&config, &inputs)?.run(ctx)?;
    Ok(summary)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let run_id = format!(
        "{}-{}",
        chrono::Local::now().format("%Y%m%d%H%M"),
        std::process::id()
    );

    if let Err(e) = init_logging(&run_id) {
        eprintln!("ERROR: {e:#}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = args.check_inputs() {
        error!("{e:#}");
        eprintln!("ERROR: {e:#}");
        return ExitCode::FAILURE;
    }

    let mut ctx = RunContext::new(run_id);
    match run(&args, &mut ctx) {
        Ok(summary) => {
            info!("Post processing completed.");
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}
