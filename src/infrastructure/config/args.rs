use super::app_config::LogLevel;
use crate::infrastructure::providers::Provider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "sender-avatars",
    version,
    about = "Resolve avatar images for email senders",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Favicon API for company domains (duckduckgo, google, iconhorse, splitbee).
    #[arg(long)]
    pub provider: Option<Provider>,

    /// Skip cache reads.
    #[arg(long)]
    pub disable_cache: Option<bool>,

    /// Avatar cache directory.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory of contact photos named `<email>.<ext>`.
    #[arg(long, value_name = "DIR")]
    pub contacts_dir: Option<PathBuf>,

    /// Maximum concurrent resolutions.
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Wait timeout for in-flight resolutions, in milliseconds.
    #[arg(long)]
    pub wait_timeout_ms: Option<u64>,

    /// Fall back to colored initials when no image is found.
    #[arg(long)]
    pub fallback_to_initials: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the avatar of one or more authors.
    Resolve {
        /// Author strings, e.g. `"Jane Doe <jane@example.com>"`.
        #[arg(required = true)]
        authors: Vec<String>,

        /// Map DuckDuckGo and Proton Pass relay aliases back to the real address.
        #[arg(long)]
        unalias: bool,

        /// Print one JSON object per author.
        #[arg(long)]
        json: bool,

        /// Write each found avatar as PNG into this directory.
        #[arg(long, value_name = "DIR")]
        png: Option<PathBuf>,
    },
    /// Print the total size of the avatar cache.
    CacheSize,
    /// Delete every cached avatar and marker.
    ClearCache,
    /// Convert an image file (raster or SVG) to PNG.
    Convert {
        /// Input image.
        input: PathBuf,

        /// Output PNG path.
        output: PathBuf,

        /// Target width in pixels.
        #[arg(long)]
        width: Option<u32>,

        /// Target height in pixels.
        #[arg(long)]
        height: Option<u32>,
    },
}
