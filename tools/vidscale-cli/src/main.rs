//! Vidscale CLI: GPU upscaling export for video files.
//!
//! Usage:
//!   vidscale upscale <INPUT>   Upscale a video into a new file
//!   vidscale info <INPUT>      Show the tracks of a video
//!   vidscale check             Check toolkit and accelerator availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vidscale_common::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "vidscale",
    about = "Upscale videos on the GPU while keeping audio, metadata, and stereo layers",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/vidscale/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upscale a video into a new file
    Upscale {
        /// Source video (.mov, .m4v, .mp4)
        input: PathBuf,

        /// Output width; height follows the source aspect ratio
        #[arg(short, long)]
        width: Option<u32>,

        /// Output height; width follows the source aspect ratio
        #[arg(short = 'H', long)]
        height: Option<u32>,

        /// Output codec: source, hevc, prores, h264
        #[arg(long)]
        codec: Option<String>,

        /// Creator name recorded on the output file
        #[arg(long)]
        creator: Option<String>,

        /// Output file (defaults to <input>_upscaled.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a JSON export report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the tracks of a video
    Info {
        /// Source video
        input: PathBuf,

        /// Print the probed asset as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check toolkit and accelerator availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if cli.json_logs {
        logging.json = true;
    }
    vidscale_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Upscale {
            input,
            width,
            height,
            codec,
            creator,
            output,
            report,
        } => {
            commands::upscale::run(
                &config,
                commands::upscale::UpscaleArgs {
                    input,
                    width,
                    height,
                    codec,
                    creator,
                    output,
                    report,
                },
            )
            .await
        }
        Commands::Info { input, json } => commands::info::run(input, json).await,
        Commands::Check => commands::check::run(),
    }
}
