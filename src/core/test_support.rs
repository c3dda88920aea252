//! Fakes shared by unit tests: a transport completed by hand and a trivial
//! decoder, so cache behaviour can be driven step by step without a network.

use std::sync::Mutex;
use url::Url;

use super::error::FetchError;
use super::image::{DecodedImage, ImageDecoder};
use super::transport::{FetchDone, Transport};
use super::workers::CancelToken;

/// Transport that parks fetches until the test completes them
#[derive(Default)]
pub(crate) struct ManualTransport {
    pending: Mutex<Vec<(Url, CancelToken, Option<FetchDone>)>>,
}

impl ManualTransport {
    pub(crate) fn fetch_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub(crate) fn url(&self, idx: usize) -> String {
        self.pending.lock().unwrap()[idx].0.to_string()
    }

    pub(crate) fn token(&self, idx: usize) -> CancelToken {
        self.pending.lock().unwrap()[idx].1.clone()
    }

    /// Finish fetch `idx`. Lock released before `done` runs.
    pub(crate) fn complete(&self, idx: usize, result: Result<Vec<u8>, FetchError>) {
        let done = self.pending.lock().unwrap()[idx].2.take().expect("already completed");
        done(result);
    }
}

impl Transport for ManualTransport {
    fn fetch(&self, url: Url, token: CancelToken, done: FetchDone) {
        self.pending.lock().unwrap().push((url, token, Some(done)));
    }
}

/// 4 bytes -> 1x1 RGBA pixel, anything else fails
pub(crate) struct PixelDecoder;

impl ImageDecoder for PixelDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, FetchError> {
        DecodedImage::from_rgba8(1, 1, bytes.to_vec())
            .ok_or_else(|| FetchError::DecodeFailed(format!("{} bytes", bytes.len())))
    }
}
