use thumbloader::browse::{self, BrowseOptions, RowReport};
use thumbloader::cli::Args;
use thumbloader::config::{self, LoaderSettings};
use thumbloader::core::{CacheManager, HttpTransport, ImageFetchCache, MainQueue, RasterDecoder};
use thumbloader::playlist::{self, LocalJsonPlaylist, PlaylistProvider};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Info) // Suppress per-request spam
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("ureq", log::LevelFilter::Info)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn print_table(reports: &[RowReport]) {
    let width = reports.iter().map(|r| r.title.chars().count()).max().unwrap_or(0).max(5);
    for r in reports {
        println!("{:<width$}  {:>8}  {}", r.title, r.time, r.status, width = width);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    init_logging(&args, &path_config)?;
    info!("thumbloader {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let mut settings = LoaderSettings::load(&path_config).unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        LoaderSettings::default()
    });
    if let Some(workers) = args.workers {
        settings.workers_override = workers;
    }
    if let Some(timeout) = args.timeout {
        settings.request_timeout_secs = timeout;
    }

    let source = LocalJsonPlaylist::new(&args.playlist);
    let mut items = source.load_playlist();
    if let Some(base_dir) = args.playlist.parent() {
        playlist::resolve_local_thumbnails(&mut items, base_dir);
    }
    info!("Playlist {}: {} items", args.playlist.display(), items.len());
    if items.is_empty() {
        println!("No items in {}", args.playlist.display());
        return Ok(());
    }

    let manager = Arc::new(CacheManager::new(
        settings.mem_fraction(),
        settings.reserve_system_memory_gb as f64,
    ));
    let transport = HttpTransport::new(settings.worker_count(), settings.request_timeout())
        .context("Failed to start fetch workers")?
        .with_user_agent(settings.user_agent.clone())
        .with_max_size(settings.max_image_bytes);
    info!("Fetch workers: {}", transport.worker_count());

    // Completions are delivered on this thread via queue.poll()/wait()
    let queue = Arc::new(MainQueue::new());
    let cache = Arc::new(ImageFetchCache::new(
        Arc::new(transport),
        Arc::new(RasterDecoder),
        queue.clone(),
        Arc::clone(&manager),
    ));

    let opts = BrowseOptions {
        visible: args.window,
        step: args.step,
        dwell: Duration::from_millis(args.dwell_ms),
        final_wait: settings.request_timeout(),
    };
    let reports = browse::browse(&items, Arc::clone(&cache), &queue, opts);

    if args.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialize results")?;
        println!("{}", json);
    } else {
        print_table(&reports);
    }

    let stats = cache.stats();
    let (used, limit) = manager.mem();
    info!(
        "Cache: {} images, {} KB / {} MB, hits {} misses {} coalesced {} cancelled {} stale {} (hit rate {:.1}%)",
        cache.len(),
        used / 1024,
        limit / 1024 / 1024,
        stats.hits(),
        stats.misses(),
        stats.coalesced(),
        stats.cancelled(),
        stats.stale(),
        stats.hit_rate() * 100.0
    );
    info!(
        "Failures: {} malformed, {} transfer, {} decode",
        stats.malformed(),
        stats.transfer_failures(),
        stats.decode_failures()
    );

    Ok(())
}
