//! Core engine modules - fetch cache, transport, decode, delivery, workers
//!
//! These modules form the thumbnail engine, independent of any UI.

pub mod cache_man;
pub mod dispatch;
pub mod error;
pub mod fetch_cache;
pub mod image;
pub mod transport;
pub mod visible_rows;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use cache_man::CacheManager;
pub use dispatch::{Dispatcher, ImmediateDispatcher, MainQueue};
pub use error::FetchError;
pub use fetch_cache::{CacheStats, ImageFetchCache, OnComplete};
pub use image::{DecodedImage, ImageDecoder, RasterDecoder};
pub use transport::{FetchDone, HttpTransport, Transport};
pub use visible_rows::VisibleRows;
pub use workers::{CancelToken, Workers};
