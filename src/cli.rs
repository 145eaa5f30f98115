use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "segmux")]
#[command(author, version, about = "Low-latency HLS segment and part muxer")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    CheckConfig,

    /// Run the synthetic source through the segmenter
    Synth {
        /// Seconds of media to generate (overrides config)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Generate video only
        #[arg(long)]
        no_audio: bool,

        /// Generate audio only
        #[arg(long)]
        no_video: bool,

        /// Output the segment summary as JSON
        #[arg(long)]
        json: bool,

        /// Write the init segment and all media segments to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
