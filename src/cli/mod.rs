use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "relay",
    about = "Media Relay - fetch audio or video from a media URL and deliver it back to the chat",
    version,
    long_about = "Runs /dl and /adl jobs: probes the URL with yt-dlp, enforces duration and size limits, downloads with live progress, tags audio and uploads the result. One job per user at a time."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml or the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory the local transport delivers files to
    #[arg(long, global = true, value_name = "DIR")]
    pub outbox: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read `<user_id> <message>` lines from stdin and dispatch /dl and /adl commands
    Serve,

    /// Download a video once and deliver it
    Dl {
        /// Media URL (YouTube, Instagram or anything yt-dlp supports)
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Download audio as mp3 once and deliver it
    Adl {
        /// Media URL (YouTube, Instagram or anything yt-dlp supports)
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show the current configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that yt-dlp, ffmpeg and ffprobe are installed
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relay", "adl", "https://youtu.be/x", "--verbose", "--outbox", "out"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.outbox, Some(PathBuf::from("out")));
        assert!(matches!(cli.command, Commands::Adl { ref url } if url == "https://youtu.be/x"));
    }

    #[test]
    fn test_dl_requires_url() {
        assert!(Cli::try_parse_from(["relay", "dl"]).is_err());
    }
}
