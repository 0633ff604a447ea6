use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::language::{DEFAULT_SOURCE_LANGUAGE, DEFAULT_TARGET_LANGUAGE};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a video, pausing for review of the translated subtitles
    Dub {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Target language (code or name)
        #[arg(short, long, default_value = DEFAULT_TARGET_LANGUAGE)]
        target_lang: String,

        /// Source language of the video (code or name)
        #[arg(short, long, default_value = DEFAULT_SOURCE_LANGUAGE)]
        source_lang: String,

        /// Directory the dubbed video and subtitles are exported to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Approve the machine translation without prompting
        #[arg(long, conflicts_with = "edits")]
        auto_approve: bool,

        /// JSON object of segment index to replacement text, applied and approved
        #[arg(long)]
        edits: Option<PathBuf>,

        /// Keep the run workspace on disk if the run fails
        #[arg(long)]
        keep_workspace: bool,
    },

    /// List supported languages
    Languages,

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(default_value = "dubro.toml")]
        path: PathBuf,
    },

    /// Extract audio from video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,
    },
}
