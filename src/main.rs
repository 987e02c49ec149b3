use anyhow::Context;
use clap::{Parser, Subcommand};
use himawari_geoss::io::remote::{self, SourceSettings};
use himawari_geoss::{AcquisitionLoop, DecodePipeline, PipelineConfig, ProcessingSummary};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mirror Himawari gridded granules and convert them to calibrated GeoTIFFs",
    long_about = None,
    arg_required_else_help = true,
    after_help = "Examples:\n  himawari-geoss --config ahi.toml download\n  himawari-geoss --config ahi.toml decode\n  himawari-geoss decode --file data/original/ext_01/202301010100.ext.01.fld.geoss\n"
)]
struct Args {
    /// Configuration file (defaults to the platform config directory, then built-in values)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and decompress every granule on the configured time grid
    Download {
        /// Override acquisition.output_dir
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Calibrate, crop and export granules as GeoTIFF
    Decode {
        /// Override decode.input_dir
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Process a single granule instead of the whole directory
        #[arg(long, conflicts_with = "input_dir")]
        file: Option<PathBuf>,
    },
    /// Print the resolved configuration as TOML
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = PipelineConfig::load_or_default(args.config.as_deref())
        .context("failed to load configuration")?;

    match args.command {
        Command::Download { output_dir } => {
            if let Some(dir) = output_dir {
                config.acquisition.output_dir = dir;
            }
            let source = remote::connect(
                &config.acquisition.remote_root,
                SourceSettings::from(&config.acquisition),
            )?;
            let mut acquisition = AcquisitionLoop::new(config.acquisition.clone(), source);
            let summary = acquisition.run()?;
            report(&summary);
        }
        Command::Decode { input_dir, file } => {
            if let Some(dir) = input_dir {
                config.decode.input_dir = dir;
            }
            let mut pipeline = DecodePipeline::new(&config);
            let summary = match file {
                Some(path) => {
                    let mut summary = ProcessingSummary::default();
                    let result = pipeline.process_file(&path);
                    summary.record(&path.display().to_string(), result);
                    summary
                }
                None => pipeline.run()?,
            };
            report(&summary);
        }
        Command::ShowConfig => {
            let text = toml::to_string_pretty(&config).context("failed to render configuration")?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn report(summary: &ProcessingSummary) {
    log::info!("Done: {}", summary);
    for (item, kind) in &summary.failed {
        log::info!("  failed {} ({})", item, kind);
    }
}
