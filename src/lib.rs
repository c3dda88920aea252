//! thumbloader - cancellable, coalescing thumbnail loading for scrolling lists
//!
//! Re-exports all modules for use by the binary target.

// Core engine (fetch cache, transport, workers, delivery)
pub mod core;

// App modules
pub mod browse;
pub mod cli;
pub mod config;
pub mod playlist;

// Re-export commonly used types from core
pub use core::cache_man::CacheManager;
pub use core::dispatch::{Dispatcher, ImmediateDispatcher, MainQueue};
pub use core::error::FetchError;
pub use core::fetch_cache::{CacheStats, ImageFetchCache};
pub use core::image::{DecodedImage, ImageDecoder, RasterDecoder};
pub use core::transport::{HttpTransport, Transport};
pub use core::visible_rows::VisibleRows;

pub use playlist::{LocalJsonPlaylist, PlaylistItem, PlaylistProvider};
