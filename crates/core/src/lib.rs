//! Core library for the ambient sound mixer.
//!
//! Each module owns one subsystem: the software mix graph and the engine
//! that drives it, asset fetching and decoding, the playback graph manager
//! (`mixer`), frequency analysis, themes with their background video, and
//! the audio-reactive visualiser. The `controller` ties them together the
//! way an application shell would.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod mixer;
pub mod render;
pub mod theme;
pub mod video;
pub mod visual;

pub use analysis::{FrequencyAnalyzer, FrequencySnapshot};
pub use assets::{AssetFetcher, DecodedAsset, FileFetcher, MemoryFetcher};
pub use audio::{AudioEngine, OutputBackend, RenderHandle};
pub use config::{AppConfig, AudioConfig, VisualConfig};
pub use controller::{Controller, ThemeSwitch};
pub use error::{MixerError, Result};
pub use graph::{EngineState, Topology};
pub use mixer::{MelodySlot, Mixer};
pub use render::{Canvas, PixelCanvas, RecordingCanvas, Rgba};
pub use theme::{load_theme, LoadReport, ManifestSet, Palette, Theme, ThemeManifest};
pub use video::{LoggingVideoElement, VideoBackground, VideoElement};
pub use visual::{FrameOutcome, FrameQueue, FrameScheduler, FrameToken, VisualMode, Visualizer};
