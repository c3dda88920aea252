//! Row ↔ thumbnail binding for a scrolling list.
//!
//! The list calls `show(row, url)` when a row scrolls into view and
//! `hide(row)` when it leaves. Rows are reused with different URLs, so every
//! binding gets its own number and a completion only lands in the row if the
//! binding it was requested for is still current. A late image can never
//! flash into a reused row.
//!
//! Several rows may show the same URL. The fetch is cancelled only when the
//! last of them goes away.

use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::fetch_cache::ImageFetchCache;
use super::image::DecodedImage;

/// Thumbnail state of one visible row
#[derive(Debug, Clone)]
struct RowSlot {
    identifier: String,
    binding: u64,
    image: Option<Arc<DecodedImage>>,
    settled: bool,
}

type Rows = Arc<Mutex<HashMap<usize, RowSlot>>>;

fn lock(rows: &Rows) -> MutexGuard<'_, HashMap<usize, RowSlot>> {
    rows.lock().unwrap_or_else(|e| e.into_inner())
}

/// Visible-row tracker driving `ImageFetchCache::request`/`cancel`
pub struct VisibleRows {
    cache: Arc<ImageFetchCache>,
    rows: Rows,
    next_binding: u64,
}

impl VisibleRows {
    pub fn new(cache: Arc<ImageFetchCache>) -> Self {
        Self {
            cache,
            rows: Arc::new(Mutex::new(HashMap::new())),
            next_binding: 0,
        }
    }

    /// Row became visible showing `identifier`.
    ///
    /// Re-showing the same identifier is a no-op. A different identifier
    /// releases the old one first, and the slot starts empty again.
    pub fn show(&mut self, row: usize, identifier: &str) {
        let previous = lock(&self.rows).get(&row).map(|slot| slot.identifier.clone());
        match previous {
            Some(prev) if prev == identifier => return,
            Some(_) => self.hide(row),
            None => {}
        }

        self.next_binding += 1;
        let binding = self.next_binding;
        lock(&self.rows).insert(
            row,
            RowSlot {
                identifier: identifier.to_string(),
                binding,
                image: None,
                settled: false,
            },
        );
        trace!("Row {} bound to {} (binding {})", row, identifier, binding);

        // Cache hits call back before request() returns: rows lock must be free
        let rows = Arc::clone(&self.rows);
        self.cache.request(identifier, move |image| {
            let mut rows = lock(&rows);
            match rows.get_mut(&row) {
                Some(slot) if slot.binding == binding => {
                    slot.image = image;
                    slot.settled = true;
                }
                _ => trace!("Row {} rebound, dropping result of binding {}", row, binding),
            }
        });
    }

    /// Row left the viewport.
    pub fn hide(&mut self, row: usize) {
        let (removed, still_shown) = {
            let mut rows = lock(&self.rows);
            let Some(slot) = rows.remove(&row) else {
                return;
            };
            let still_shown = rows.values().any(|other| other.identifier == slot.identifier);
            (slot, still_shown)
        };

        trace!("Row {} unbound from {}", row, removed.identifier);
        if !removed.settled && !still_shown {
            self.cache.cancel(&removed.identifier);
        }
    }

    /// Hide every row (e.g. the list is replaced)
    pub fn clear(&mut self) {
        let rows: Vec<usize> = lock(&self.rows).keys().copied().collect();
        for row in rows {
            self.hide(row);
        }
    }

    /// Image currently shown in `row`, if loaded
    pub fn image(&self, row: usize) -> Option<Arc<DecodedImage>> {
        lock(&self.rows).get(&row).and_then(|slot| slot.image.clone())
    }

    pub fn identifier(&self, row: usize) -> Option<String> {
        lock(&self.rows).get(&row).map(|slot| slot.identifier.clone())
    }

    pub fn is_bound(&self, row: usize) -> bool {
        lock(&self.rows).contains_key(&row)
    }

    /// True once the row's request finished, either with an image or with "unavailable"
    pub fn is_settled(&self, row: usize) -> bool {
        lock(&self.rows).get(&row).is_some_and(|slot| slot.settled)
    }

    pub fn visible_count(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Visible rows still waiting on their thumbnail
    pub fn pending_count(&self) -> usize {
        lock(&self.rows).values().filter(|slot| !slot.settled).count()
    }

    /// Sorted indices of visible rows
    pub fn rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = lock(&self.rows).keys().copied().collect();
        rows.sort_unstable();
        rows
    }
}
