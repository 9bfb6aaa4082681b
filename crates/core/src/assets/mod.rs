use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{MixerError, Result};

mod decode;

pub use decode::decode_audio;

#[cfg(test)]
pub(crate) use decode::tests::wav_bytes;

/// Immutable mono waveform at the engine sample rate.
#[derive(Clone, PartialEq)]
pub struct DecodedAsset {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedAsset {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of mono frames in the buffer.
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    /// Returns the playback length at the buffer's sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

impl fmt::Debug for DecodedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedAsset")
            .field("frames", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Which family of sounds an asset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Ambient,
    Melody,
}

/// Decoded buffers keyed by category and logical id.
#[derive(Debug, Default)]
pub struct AssetCache {
    assets: HashMap<(AssetCategory, String), Arc<DecodedAsset>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an asset, returning the buffer it replaced.
    pub fn insert(
        &mut self,
        category: AssetCategory,
        id: &str,
        asset: DecodedAsset,
    ) -> (Arc<DecodedAsset>, Option<Arc<DecodedAsset>>) {
        let asset = Arc::new(asset);
        let previous = self
            .assets
            .insert((category, id.to_string()), asset.clone());
        (asset, previous)
    }

    /// Returns a shared handle on a cached buffer.
    pub fn get(&self, category: AssetCategory, id: &str) -> Option<Arc<DecodedAsset>> {
        self.assets.get(&(category, id.to_string())).cloned()
    }

    /// Drops a buffer from the cache. Voices still holding it keep it alive.
    pub fn remove(&mut self, category: AssetCategory, id: &str) -> Option<Arc<DecodedAsset>> {
        self.assets.remove(&(category, id.to_string()))
    }

    /// Drops every cached buffer.
    pub fn clear(&mut self) {
        self.assets.clear();
    }

    /// Returns the number of cached buffers across both categories.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Retrieves the raw bytes behind a source location.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Resolves locations as paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    /// Creates a fetcher resolving locations relative to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.root.join(location.trim_start_matches("./"));
        std::fs::read(&path).map_err(|err| MixerError::fetch(location, err))
    }
}

/// In-memory fetcher, handy for tests and embedded assets.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(location.into(), bytes);
    }

    /// Builder form of [`Self::insert`].
    pub fn with(mut self, location: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(location, bytes);
        self
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.entries
            .get(location)
            .cloned()
            .ok_or_else(|| MixerError::fetch(location, "not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_by_category() {
        let mut cache = AssetCache::new();
        cache.insert(AssetCategory::Ambient, "rain", DecodedAsset::new(vec![0.0; 4], 4));
        cache.insert(AssetCategory::Melody, "rain", DecodedAsset::new(vec![0.0; 8], 4));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(AssetCategory::Ambient, "rain").unwrap().frames(), 4);
        assert_eq!(cache.get(AssetCategory::Melody, "rain").unwrap().frames(), 8);
    }

    #[test]
    fn insert_reports_replaced_entry() {
        let mut cache = AssetCache::new();
        let (_, previous) =
            cache.insert(AssetCategory::Ambient, "wind", DecodedAsset::new(vec![0.0], 1));
        assert!(previous.is_none());
        let (_, previous) =
            cache.insert(AssetCategory::Ambient, "wind", DecodedAsset::new(vec![0.0; 2], 1));
        assert_eq!(previous.unwrap().frames(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn duration_follows_sample_rate() {
        let asset = DecodedAsset::new(vec![0.0; 4_000], 8_000);
        assert_eq!(asset.duration(), Duration::from_millis(500));
    }

    #[test]
    fn memory_fetcher_reports_missing_locations() {
        let fetcher = MemoryFetcher::new().with("a.wav", vec![1, 2, 3]);
        assert_eq!(fetcher.fetch("a.wav").unwrap(), vec![1, 2, 3]);
        let err = fetcher.fetch("b.wav").unwrap_err();
        assert!(format!("{err}").contains("b.wav"));
    }

    #[test]
    fn file_fetcher_wraps_io_errors() {
        let fetcher = FileFetcher::new(std::env::temp_dir());
        let err = fetcher.fetch("ambient-mixer-does-not-exist.ogg").unwrap_err();
        assert!(matches!(err, MixerError::Fetch { .. }));
    }
}
