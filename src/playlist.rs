//! Playlist loading - list items and their thumbnail identifiers.
//!
//! Local JSON format: an array of objects
//! ```json
//! [{
//!   "title": "Intro",
//!   "presenter_name": "Ana",
//!   "video_duration": 754000,
//!   "description": "...",
//!   "video_url": "https://.../intro.mp4",
//!   "thumbnail_url": "https://.../intro.jpg"
//! }]
//! ```
//! Items missing a field (or with a field of the wrong type) are skipped, not
//! fatal. `video_duration` is milliseconds.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One row of the video list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistItem {
    pub title: String,
    pub presenter_name: String,
    /// Formatted duration (`MM:SS` or `HH:MM:SS`)
    pub time: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
}

/// Wire shape of a playlist entry; every field optional so one bad entry
/// doesn't reject the file
#[derive(Debug, Deserialize)]
struct RawItem {
    title: Option<String>,
    presenter_name: Option<String>,
    video_duration: Option<f64>,
    description: Option<String>,
    video_url: Option<String>,
    thumbnail_url: Option<String>,
}

impl RawItem {
    fn into_item(self) -> Option<PlaylistItem> {
        Some(PlaylistItem {
            title: self.title?,
            presenter_name: self.presenter_name?,
            time: format_duration(self.video_duration?)?,
            description: self.description?,
            video_url: self.video_url?,
            thumbnail_url: self.thumbnail_url?,
        })
    }
}

/// Source of list items.
///
/// Failures are absorbed: an unreadable playlist is an empty list.
pub trait PlaylistProvider {
    fn load_playlist(&self) -> Vec<PlaylistItem>;
}

/// Playlist read from a JSON file on disk
#[derive(Debug, Clone)]
pub struct LocalJsonPlaylist {
    path: PathBuf,
}

impl LocalJsonPlaylist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse, surfacing file/JSON errors
    pub fn read(&self) -> Result<Vec<PlaylistItem>> {
        let data = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read playlist: {}", self.path.display()))?;
        parse_playlist(&data)
            .with_context(|| format!("Failed to parse playlist: {}", self.path.display()))
    }
}

impl PlaylistProvider for LocalJsonPlaylist {
    fn load_playlist(&self) -> Vec<PlaylistItem> {
        match self.read() {
            Ok(items) => items,
            Err(e) => {
                warn!("{:#}", e);
                Vec::new()
            }
        }
    }
}

/// Parse playlist JSON. Top level must be an array; bad entries are skipped.
pub fn parse_playlist(data: &[u8]) -> Result<Vec<PlaylistItem>> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(data).context("Playlist is not a JSON array")?;
    let total = entries.len();

    let items: Vec<PlaylistItem> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| {
            let item = serde_json::from_value::<RawItem>(value)
                .ok()
                .and_then(RawItem::into_item);
            if item.is_none() {
                debug!("Skipping playlist entry {}: missing or invalid fields", idx);
            }
            item
        })
        .collect();

    if items.len() < total {
        warn!("Playlist: {} of {} entries skipped", total - items.len(), total);
    }
    Ok(items)
}

/// Rewrite relative thumbnail paths that exist under `base_dir` as `file://`
/// URLs. Absolute URLs and paths that don't exist are left alone.
pub fn resolve_local_thumbnails(items: &mut [PlaylistItem], base_dir: &Path) {
    for item in items.iter_mut() {
        if url::Url::parse(&item.thumbnail_url).is_ok() {
            continue;
        }
        let path = base_dir.join(&item.thumbnail_url);
        if !path.is_file() {
            continue;
        }
        let absolute = path.canonicalize().unwrap_or(path);
        if let Ok(url) = url::Url::from_file_path(&absolute) {
            debug!("Thumbnail {} -> {}", item.thumbnail_url, url);
            item.thumbnail_url = url.to_string();
        }
    }
}

/// Milliseconds → `MM:SS`, or `HH:MM:SS` when at least one hour.
///
/// Fields are floored. Returns None for negative or non-finite input.
pub fn format_duration(duration_ms: f64) -> Option<String> {
    if !duration_ms.is_finite() || duration_ms < 0.0 {
        return None;
    }

    let total = (duration_ms / 1000.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        Some(format!("{:02}:{:02}:{:02}", hours, minutes, seconds))
    } else {
        Some(format!("{:02}:{:02}", minutes, seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {
            "title": "Intro",
            "presenter_name": "Ana",
            "video_duration": 754000,
            "description": "First talk",
            "video_url": "https://x/intro.mp4",
            "thumbnail_url": "https://x/intro.jpg"
        },
        {
            "title": "No thumbnail",
            "presenter_name": "Bo",
            "video_duration": 1000,
            "description": "",
            "video_url": "https://x/b.mp4"
        },
        {
            "title": 42,
            "presenter_name": "Cy",
            "video_duration": 1000,
            "description": "",
            "video_url": "https://x/c.mp4",
            "thumbnail_url": "https://x/c.jpg"
        },
        {
            "title": "Keynote",
            "presenter_name": "Di",
            "video_duration": 3725999.9,
            "description": "Long one",
            "video_url": "https://x/k.mp4",
            "thumbnail_url": "https://x/k.jpg",
            "extra": true
        }
    ]"#;

    #[test]
    fn test_parse_skips_invalid_entries() {
        let items = parse_playlist(SAMPLE.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Intro");
        assert_eq!(items[0].time, "12:34");
        assert_eq!(items[0].thumbnail_url, "https://x/intro.jpg");
        assert_eq!(items[1].title, "Keynote");
        assert_eq!(items[1].time, "01:02:05");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_playlist(br#"{"title": "x"}"#).is_err());
        assert!(parse_playlist(b"not json").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0).as_deref(), Some("00:00"));
        assert_eq!(format_duration(59_999.0).as_deref(), Some("00:59"));
        assert_eq!(format_duration(60_000.0).as_deref(), Some("01:00"));
        assert_eq!(format_duration(3_600_000.0).as_deref(), Some("01:00:00"));
        assert_eq!(format_duration(-1.0), None);
        assert_eq!(format_duration(f64::NAN), None);
    }

    #[test]
    fn test_local_provider_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let provider = LocalJsonPlaylist::new(file.path());
        assert_eq!(provider.load_playlist().len(), 2);
    }

    #[test]
    fn test_resolve_local_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.png"), b"x").unwrap();

        let mut items = parse_playlist(SAMPLE.as_bytes()).unwrap();
        items[0].thumbnail_url = "t.png".to_string();
        items[1].thumbnail_url = "missing.png".to_string();
        resolve_local_thumbnails(&mut items, dir.path());

        assert!(items[0].thumbnail_url.starts_with("file://"));
        assert!(items[0].thumbnail_url.ends_with("/t.png"));
        assert_eq!(items[1].thumbnail_url, "missing.png");
    }

    #[test]
    fn test_missing_file_is_empty_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalJsonPlaylist::new(dir.path().join("playlist.json"));

        assert!(provider.read().is_err());
        assert!(provider.load_playlist().is_empty());
    }
}
