//! Headless list browsing: scroll a viewport over a playlist and report what
//! each row ended up showing.
//!
//! Each step moves the window by `step` rows. Rows that leave are hidden
//! (cancelling their fetch if still running), rows that enter are shown, and
//! the `MainQueue` is pumped for up to `dwell` or until every visible row
//! settled. After the last step the final window gets `final_wait`.

use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{ImageFetchCache, MainQueue, VisibleRows};
use crate::playlist::PlaylistItem;

/// Outcome for one playlist row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThumbStatus {
    Loaded { width: u32, height: u32 },
    Unavailable,
    /// Scrolled away before the thumbnail arrived
    Cancelled,
    /// Still loading when browsing ended
    TimedOut,
    /// Never inside the viewport (step larger than window)
    NotShown,
}

impl std::fmt::Display for ThumbStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbStatus::Loaded { width, height } => write!(f, "{}x{}", width, height),
            ThumbStatus::Unavailable => write!(f, "unavailable"),
            ThumbStatus::Cancelled => write!(f, "cancelled"),
            ThumbStatus::TimedOut => write!(f, "timed out"),
            ThumbStatus::NotShown => write!(f, "not shown"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    pub title: String,
    pub time: String,
    pub thumbnail_url: String,
    #[serde(flatten)]
    pub status: ThumbStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct BrowseOptions {
    /// Rows visible at once
    pub visible: usize,
    /// Rows scrolled per step
    pub step: usize,
    /// Time spent on each intermediate position
    pub dwell: Duration,
    /// Time allowed for the final position to settle
    pub final_wait: Duration,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            visible: 4,
            step: 2,
            dwell: Duration::from_millis(250),
            final_wait: Duration::from_secs(15),
        }
    }
}

/// Status of a visible row right now (None while still loading)
fn row_status(rows: &VisibleRows, row: usize) -> Option<ThumbStatus> {
    if !rows.is_settled(row) {
        return None;
    }
    Some(match rows.image(row) {
        Some(img) => ThumbStatus::Loaded {
            width: img.width(),
            height: img.height(),
        },
        None => ThumbStatus::Unavailable,
    })
}

/// Pump completions until every visible row settled or `budget` runs out
fn settle(queue: &MainQueue, rows: &VisibleRows, budget: Duration) {
    let deadline = Instant::now() + budget;
    queue.poll();
    while rows.pending_count() > 0 {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        queue.wait(deadline - now);
    }
}

/// Scroll through `items` and report each row's final thumbnail status.
pub fn browse(
    items: &[PlaylistItem],
    cache: Arc<ImageFetchCache>,
    queue: &MainQueue,
    opts: BrowseOptions,
) -> Vec<RowReport> {
    let visible = opts.visible.max(1);
    let step = opts.step.max(1);
    let mut statuses: Vec<Option<ThumbStatus>> = vec![None; items.len()];
    let mut rows = VisibleRows::new(cache);

    let last_offset = items.len().saturating_sub(visible);
    let mut offset = 0;

    loop {
        let window = offset..(offset + visible).min(items.len());
        debug!("Viewport rows {}..{}", window.start, window.end);

        // Rows leaving: record what they showed, then release
        for row in rows.rows() {
            if !window.contains(&row) {
                statuses[row] = Some(row_status(&rows, row).unwrap_or(ThumbStatus::Cancelled));
                rows.hide(row);
            }
        }

        for row in window.clone() {
            rows.show(row, &items[row].thumbnail_url);
        }

        if offset >= last_offset {
            settle(queue, &rows, opts.final_wait);
            break;
        }
        settle(queue, &rows, opts.dwell);
        offset = (offset + step).min(last_offset);
    }

    for row in rows.rows() {
        statuses[row] = Some(row_status(&rows, row).unwrap_or(ThumbStatus::TimedOut));
    }
    rows.clear();

    let reports: Vec<RowReport> = items
        .iter()
        .zip(statuses)
        .map(|(item, status)| RowReport {
            title: item.title.clone(),
            time: item.time.clone(),
            thumbnail_url: item.thumbnail_url.clone(),
            status: status.unwrap_or(ThumbStatus::NotShown),
        })
        .collect();

    let loaded = reports
        .iter()
        .filter(|r| matches!(r.status, ThumbStatus::Loaded { .. }))
        .count();
    info!("Browse finished: {}/{} thumbnails loaded", loaded, reports.len());

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CacheManager, HttpTransport, RasterDecoder};
    use image::{ImageFormat, Rgba, RgbaImage};
    use url::Url;

    fn item(title: &str, thumbnail_url: String) -> PlaylistItem {
        PlaylistItem {
            title: title.to_string(),
            presenter_name: "P".to_string(),
            time: "00:01".to_string(),
            description: String::new(),
            video_url: "https://x/v.mp4".to_string(),
            thumbnail_url,
        }
    }

    fn png_url(dir: &std::path::Path, name: &str, w: u32, h: u32) -> String {
        let path = dir.join(name);
        RgbaImage::from_pixel(w, h, Rgba([0, 0, 255, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        Url::from_file_path(&path).unwrap().to_string()
    }

    fn cache(queue: &Arc<MainQueue>) -> Arc<ImageFetchCache> {
        Arc::new(ImageFetchCache::new(
            Arc::new(HttpTransport::new(2, Duration::from_secs(5)).unwrap()),
            Arc::new(RasterDecoder),
            queue.clone(),
            Arc::new(CacheManager::with_limit(usize::MAX)),
        ))
    }

    #[test]
    fn test_browse_single_window() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![
            item("a", png_url(dir.path(), "a.png", 4, 2)),
            item("bad", "not a url".to_string()),
            item("c", png_url(dir.path(), "c.png", 3, 3)),
        ];
        let queue = Arc::new(MainQueue::new());
        let opts = BrowseOptions {
            visible: 3,
            final_wait: Duration::from_secs(10),
            ..BrowseOptions::default()
        };

        let reports = browse(&items, cache(&queue), &queue, opts);
        assert_eq!(reports[0].status, ThumbStatus::Loaded { width: 4, height: 2 });
        assert_eq!(reports[1].status, ThumbStatus::Unavailable);
        assert_eq!(reports[2].status, ThumbStatus::Loaded { width: 3, height: 3 });
    }

    #[test]
    fn test_browse_scrolls_every_row_into_view() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<PlaylistItem> = (0..5)
            .map(|i| item(&format!("r{}", i), png_url(dir.path(), &format!("{}.png", i), 2, 2)))
            .collect();
        let queue = Arc::new(MainQueue::new());
        let opts = BrowseOptions {
            visible: 2,
            step: 1,
            dwell: Duration::from_secs(10),
            final_wait: Duration::from_secs(10),
        };

        let reports = browse(&items, cache(&queue), &queue, opts);
        assert!(reports.iter().all(|r| r.status == ThumbStatus::Loaded { width: 2, height: 2 }));
    }

    #[test]
    fn test_large_step_skips_rows() {
        let items: Vec<PlaylistItem> = (0..6).map(|i| item(&format!("r{}", i), "bad".to_string())).collect();
        let queue = Arc::new(MainQueue::new());
        let opts = BrowseOptions {
            visible: 1,
            step: 3,
            dwell: Duration::from_millis(1),
            final_wait: Duration::from_millis(1),
        };

        let reports = browse(&items, cache(&queue), &queue, opts);
        let statuses: Vec<ThumbStatus> = reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ThumbStatus::Unavailable,
                ThumbStatus::NotShown,
                ThumbStatus::NotShown,
                ThumbStatus::Unavailable,
                ThumbStatus::NotShown,
                ThumbStatus::Unavailable,
            ]
        );
    }
}
