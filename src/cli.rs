use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "media-recovery")]
#[command(about = "Back up media as it arrives and recover it when deleted", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the media folders until interrupted (default)
    Watch,
    /// List recovered files of one category
    List(ListArgs),
    /// Persist a granted handle for the restricted media area
    Grant {
        /// file:// URI of the mounted restricted root
        uri: String,
    },
    /// Forget the persisted grant
    Revoke,
    /// Print every registered watch target
    Targets,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// primary or secondary
    #[arg(long, default_value = "primary")]
    pub variant: String,
    /// images, videos, gifs, stickers, audio, voice_notes or documents
    #[arg(long)]
    pub category: String,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
