use clap::Parser;
use std::path::PathBuf;

// Build version with decoder and target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (png, jpeg, gif, webp, bmp)\n",
    "HTTP:   ureq 3\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless video-list browser with cancellable thumbnail loading
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Playlist JSON file
    #[arg(value_name = "PLAYLIST", default_value = "playlist.json")]
    pub playlist: PathBuf,

    /// Rows visible at once
    #[arg(short = 'w', long = "window", value_name = "N", default_value_t = 4)]
    pub window: usize,

    /// Rows scrolled per step
    #[arg(short = 's', long = "step", value_name = "N", default_value_t = 2)]
    pub step: usize,

    /// Time spent on each scroll position, in milliseconds
    #[arg(short = 'd', long = "dwell", value_name = "MS", default_value_t = 250)]
    pub dwell_ms: u64,

    /// Request timeout and final settle time, in seconds (overrides settings)
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Fetch worker threads (overrides settings, 0 = auto)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<u32>,

    /// Print results as JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,

    /// Enable debug logging to file (default: thumbloader.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["thumbloader"]);
        assert_eq!(args.playlist, PathBuf::from("playlist.json"));
        assert_eq!(args.window, 4);
        assert_eq!(args.step, 2);
        assert!(args.log_file.is_none());
        assert_eq!(args.verbosity, 0);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "thumbloader", "list.json", "-w", "6", "--step", "3", "--timeout", "5", "--workers", "8", "-vv", "--log",
        ]);
        assert_eq!(args.playlist, PathBuf::from("list.json"));
        assert_eq!(args.window, 6);
        assert_eq!(args.step, 3);
        assert_eq!(args.timeout, Some(5));
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
    }
}
