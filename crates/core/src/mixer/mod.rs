//! Playback graph manager.
//!
//! Owns every voice and the shared mix topology. Public operations never
//! fail loudly: fetch, decode and playback errors are logged and surface as
//! `false` or a no-op, matching how the UI layer consumes them.

use crate::{
    analysis::FrequencyAnalyzer,
    assets::{decode_audio, AssetCache, AssetCategory, AssetFetcher, DecodedAsset},
    audio::AudioEngine,
    config::AudioConfig,
    graph::{MixGraph, Topology},
    Result,
};

mod voice;

pub use voice::MelodySlot;
use voice::{Voice, VoiceBank};

/// Playback graph manager: owns every ambient and melody voice and drives
/// them through the engine's shared mix graph.
pub struct Mixer {
    engine: AudioEngine,
    config: AudioConfig,
    fetcher: Box<dyn AssetFetcher>,
    cache: AssetCache,
    voices: VoiceBank,
}

impl Mixer {
    /// Creates a mixer with no voices. Nothing is wired into the graph until
    /// [`Self::initialize`] or the first play call.
    pub fn new(engine: AudioEngine, fetcher: Box<dyn AssetFetcher>, config: AudioConfig) -> Self {
        Self {
            engine,
            config,
            fetcher,
            cache: AssetCache::new(),
            voices: VoiceBank::default(),
        }
    }

    /// Returns the engine that owns the mix graph.
    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    /// Returns the engine mutably, e.g. to attach or suspend a backend.
    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    /// Returns the audio configuration the mixer was created with.
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Returns the decoded buffers of every registered voice.
    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// Installs the master and analysis stages. Repeated calls change
    /// nothing. Returns whether the graph is ready for playback.
    pub fn initialize(&mut self) -> bool {
        let config = &self.config;
        match self.engine.lock_graph() {
            Ok(mut graph) => {
                if graph.install_stages(config) {
                    tracing::info!(
                        fft_size = config.fft_size,
                        master_gain = config.master_gain,
                        "mix graph initialised"
                    );
                }
                true
            }
            Err(err) => {
                tracing::error!(%err, "cannot initialise mix graph");
                false
            }
        }
    }

    /// Wakes a suspended engine. Must complete before playback is audible.
    pub fn resume_if_suspended(&mut self) -> bool {
        match self.engine.resume_if_suspended() {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(%err, "audio engine could not be resumed");
                false
            }
        }
    }

    /// Fetches and decodes an ambient loop, registering it at the default
    /// ambient level. A playing voice with the same id is stopped first. On
    /// failure the previous registration, if any, is left untouched.
    pub fn load_ambient(&mut self, id: &str, location: &str, looping: bool) -> bool {
        let asset = match self.fetch_and_decode(location) {
            Ok(asset) => asset,
            Err(err) => {
                tracing::warn!(id, location, %err, "failed to load ambient");
                return false;
            }
        };
        let duration = asset.duration();
        let (asset, _) = self.cache.insert(AssetCategory::Ambient, id, asset);
        let voice = Voice::new(asset, looping, Some(self.config.ambient_gain));
        let registered = self.with_graph("load_ambient", |voices, graph, _| {
            voices.register_ambient(graph, id, voice);
            Ok(())
        });
        if registered.is_some() {
            tracing::info!(id, location, ?duration, looping, "ambient loaded");
        }
        registered.is_some()
    }

    /// Fetches and decodes a melody. Melodies always loop and play at the
    /// fixed melody level.
    pub fn load_melody(&mut self, id: &str, location: &str) -> bool {
        let asset = match self.fetch_and_decode(location) {
            Ok(asset) => asset,
            Err(err) => {
                tracing::warn!(id, location, %err, "failed to load melody");
                return false;
            }
        };
        let duration = asset.duration();
        let (asset, _) = self.cache.insert(AssetCategory::Melody, id, asset);
        let voice = Voice::new(asset, true, None);
        let registered = self.with_graph("load_melody", |voices, graph, _| {
            voices.register_melody(graph, id, voice);
            Ok(())
        });
        if registered.is_some() {
            tracing::info!(id, location, ?duration, "melody loaded");
        }
        registered.is_some()
    }

    /// Starts an ambient voice. Returns whether it is playing afterwards;
    /// unknown ids report `false`.
    pub fn play_ambient(&mut self, id: &str) -> bool {
        self.with_graph("play_ambient", |voices, graph, config| {
            graph.install_stages(config);
            voices.play_ambient(graph, id)
        })
        .unwrap_or(false)
    }

    /// Stops and disconnects an ambient voice. Unknown or stopped ids are
    /// ignored.
    pub fn stop_ambient(&mut self, id: &str) {
        self.with_graph("stop_ambient", |voices, graph, _| {
            voices.stop_ambient(graph, id);
            Ok(())
        });
    }

    /// Flips an ambient voice and returns the resulting playing state.
    pub fn toggle_ambient(&mut self, id: &str) -> bool {
        if self.is_ambient_playing(id) {
            self.stop_ambient(id);
            self.is_ambient_playing(id)
        } else {
            self.play_ambient(id)
        }
    }

    /// Sets an ambient level from a 0-100 percentage. A playing voice glides
    /// to the new level over the configured ramp. Returns `false` for
    /// unknown ids.
    pub fn set_ambient_volume(&mut self, id: &str, percent: u8) -> bool {
        let level = percent_to_level(percent);
        let ramp = self.config.ramp_samples();
        self.with_graph("set_ambient_volume", |voices, graph, _| {
            voices.set_ambient_level(graph, id, level, ramp)
        })
        .unwrap_or(false)
    }

    /// Returns the configured level of an ambient voice in [0, 1].
    pub fn ambient_volume(&self, id: &str) -> Option<f32> {
        self.voices.ambient(id).and_then(|voice| voice.level())
    }

    /// Sets the master level from a 0-100 percentage, ramped like voices.
    pub fn set_master_volume(&mut self, percent: u8) -> bool {
        let level = percent_to_level(percent);
        let ramp = self.config.ramp_samples();
        self.with_graph("set_master_volume", |_, graph, config| {
            graph.install_stages(config);
            graph.ramp_master(level, ramp)
        })
        .is_some()
    }

    /// Level the master stage is at or ramping towards.
    pub fn master_volume(&self) -> Option<f32> {
        let graph = self.engine.lock_graph().ok()?;
        graph.master_gain().map(|gain| gain.target())
    }

    /// Makes `id` the sole playing melody. Any melody already playing,
    /// including `id` itself, is disconnected before the new one starts.
    pub fn play_melody(&mut self, id: &str) -> bool {
        self.with_graph("play_melody", |voices, graph, config| {
            graph.install_stages(config);
            voices.play_melody(graph, id, config.melody_gain)
        })
        .unwrap_or(false)
    }

    /// Stops `id` if it is the active melody.
    pub fn stop_melody(&mut self, id: &str) {
        self.with_graph("stop_melody", |voices, graph, _| {
            voices.stop_melody(graph, id);
            Ok(())
        });
    }

    /// Stops every ambient voice and the active melody. The shared stages
    /// stay wired for subsequent playback.
    pub fn stop_all(&mut self) {
        self.with_graph("stop_all", |voices, graph, _| {
            voices.stop_all(graph);
            Ok(())
        });
    }

    /// Stops everything, then forgets all voices and decoded buffers.
    pub fn clear(&mut self) {
        self.with_graph("clear", |voices, graph, _| {
            voices.clear(graph);
            Ok(())
        });
        self.cache.clear();
    }

    /// Returns whether the ambient voice is currently connected and playing.
    pub fn is_ambient_playing(&self, id: &str) -> bool {
        self.voices
            .ambient(id)
            .map(|voice| voice.is_playing())
            .unwrap_or(false)
    }

    /// Returns whether `id` is the active melody and still playing.
    pub fn is_melody_playing(&self, id: &str) -> bool {
        self.voices.melody_slot().id() == Some(id)
            && self
                .voices
                .melody(id)
                .map(|voice| voice.is_playing())
                .unwrap_or(false)
    }

    /// Returns the id of the melody currently holding the melody slot.
    pub fn active_melody(&self) -> Option<&str> {
        self.voices.melody_slot().id()
    }

    /// Returns the registered ambient ids in sorted order.
    pub fn ambient_ids(&self) -> Vec<String> {
        self.voices.ambient_ids().map(str::to_string).collect()
    }

    /// Returns the registered melody ids in sorted order.
    pub fn melody_ids(&self) -> Vec<String> {
        self.voices.melody_ids().map(str::to_string).collect()
    }

    pub fn playing_ambients(&self) -> Vec<String> {
        self.voices
            .ambient_ids()
            .filter(|id| self.is_ambient_playing(id))
            .map(str::to_string)
            .collect()
    }

    /// Returns a new read handle on the shared analysis stage.
    pub fn analyzer(&self) -> FrequencyAnalyzer {
        self.engine.analyzer()
    }

    /// Returns a summary of the live graph nodes, or `None` if the graph
    /// lock is poisoned.
    pub fn topology(&self) -> Option<Topology> {
        self.engine.lock_graph().ok().map(|graph| graph.topology())
    }

    fn fetch_and_decode(&self, location: &str) -> Result<DecodedAsset> {
        let bytes = self.fetcher.fetch(location)?;
        decode_audio(bytes, location, self.engine.sample_rate())
    }

    /// Runs `op` against the locked graph, logging any failure.
    fn with_graph<T>(
        &mut self,
        name: &'static str,
        op: impl FnOnce(&mut VoiceBank, &mut MixGraph, &AudioConfig) -> Result<T>,
    ) -> Option<T> {
        let result = self
            .engine
            .lock_graph()
            .and_then(|mut graph| op(&mut self.voices, &mut graph, &self.config));
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(operation = name, %err, "playback operation failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("engine", &self.engine)
            .field("voices", &self.voices)
            .field("cached_assets", &self.cache.len())
            .finish()
    }
}

fn percent_to_level(percent: u8) -> f32 {
    percent.min(100) as f32 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{wav_bytes, MemoryFetcher};

    const RATE: u32 = 8_000;

    fn fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with("rain.wav", wav_bytes(&[0.25; 4_000], 1, RATE))
            .with("chime.wav", wav_bytes(&[0.5; 64], 1, RATE))
            .with("piano.wav", wav_bytes(&[0.1; 2_000], 1, RATE))
            .with("strings.wav", wav_bytes(&[0.2; 2_000], 1, RATE))
            .with("broken.wav", b"RIFF garbage".to_vec())
    }

    fn mixer() -> Mixer {
        let config = AudioConfig {
            sample_rate: RATE,
            channels: 1,
            ..Default::default()
        };
        let mut engine = AudioEngine::new(RATE, 1);
        engine.resume_if_suspended().unwrap();
        let mut mixer = Mixer::new(engine, Box::new(fetcher()), config);
        assert!(mixer.initialize());
        mixer
    }

    fn pump(mixer: &Mixer, frames: usize) -> Vec<f32> {
        mixer.engine().renderer().render_frames(frames)
    }

    #[test]
    fn unknown_ids_are_silent_no_ops() {
        let mut mixer = mixer();
        assert!(!mixer.play_ambient("ghost"));
        mixer.stop_ambient("ghost");
        assert!(!mixer.toggle_ambient("ghost"));
        assert!(!mixer.set_ambient_volume("ghost", 10));
        assert!(!mixer.play_melody("ghost"));
        mixer.stop_melody("ghost");
        assert!(!mixer.is_ambient_playing("ghost"));
        assert_eq!(mixer.topology().unwrap().sources, 0);
    }

    #[test]
    fn failed_loads_leave_id_unregistered() {
        let mut mixer = mixer();
        assert!(!mixer.load_ambient("missing", "nowhere.wav", true));
        assert!(!mixer.load_ambient("broken", "broken.wav", true));
        assert!(!mixer.load_melody("broken", "broken.wav"));
        assert!(mixer.ambient_ids().is_empty());
        assert!(mixer.melody_ids().is_empty());
        assert!(!mixer.play_ambient("broken"));
    }

    #[test]
    fn toggle_alternates_and_reports_state() {
        let mut mixer = mixer();
        assert!(mixer.load_ambient("rain", "rain.wav", true));
        assert_eq!(mixer.ambient_volume("rain"), Some(0.7));

        assert!(mixer.toggle_ambient("rain"));
        assert!(mixer.is_ambient_playing("rain"));
        assert!(!mixer.toggle_ambient("rain"));
        assert!(!mixer.is_ambient_playing("rain"));
        assert!(mixer.toggle_ambient("rain"));
        assert_eq!(mixer.topology().unwrap().sources, 1);
    }

    #[test]
    fn playing_twice_does_not_duplicate_nodes() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        assert!(mixer.play_ambient("rain"));
        assert!(mixer.play_ambient("rain"));
        let topology = mixer.topology().unwrap();
        assert_eq!(topology.sources, 1);
        assert_eq!(topology.gains, 1);
    }

    #[test]
    fn stopping_twice_is_safe() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.play_ambient("rain");
        mixer.stop_ambient("rain");
        mixer.stop_ambient("rain");
        assert!(!mixer.is_ambient_playing("rain"));
        assert_eq!(mixer.topology().unwrap().gains, 0);
    }

    #[test]
    fn volume_is_stored_and_ramped_within_bounds() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.play_ambient("rain");
        assert!(mixer.set_ambient_volume("rain", 50));
        assert_eq!(mixer.ambient_volume("rain"), Some(0.5));

        // Master 0.8 * sample 0.25 * gain; the ramp spans 800 samples.
        let out = pump(&mixer, 1_000);
        let gains: Vec<f32> = out.iter().map(|v| v / (0.8 * 0.25)).collect();
        assert!(gains.iter().all(|g| (0.0..=1.0).contains(g)));
        assert!(gains[0] < 0.7 && gains[0] > 0.5);
        assert!((gains[999] - 0.5).abs() < 1e-3);

        mixer.set_ambient_volume("rain", 250);
        assert_eq!(mixer.ambient_volume("rain"), Some(1.0));
    }

    #[test]
    fn volume_applies_to_future_plays() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.set_ambient_volume("rain", 20);
        mixer.play_ambient("rain");

        let out = pump(&mixer, 4);
        assert!(out.iter().all(|v| (v - 0.8 * 0.25 * 0.2).abs() < 1e-3));
    }

    #[test]
    fn one_shot_ambient_ends_on_its_own() {
        let mut mixer = mixer();
        mixer.load_ambient("chime", "chime.wav", false);
        assert!(mixer.play_ambient("chime"));

        pump(&mixer, 128);
        assert!(!mixer.is_ambient_playing("chime"));
        let topology = mixer.topology().unwrap();
        assert_eq!(topology.sources, 0);
        assert_eq!(topology.gains, 0);

        assert!(mixer.play_ambient("chime"));
        assert_eq!(mixer.topology().unwrap().sources, 1);
    }

    #[test]
    fn looping_ambient_keeps_playing() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.play_ambient("rain");
        pump(&mixer, 10_000);
        assert!(mixer.is_ambient_playing("rain"));
    }

    #[test]
    fn only_one_melody_plays_at_a_time() {
        let mut mixer = mixer();
        mixer.load_melody("piano", "piano.wav");
        mixer.load_melody("strings", "strings.wav");

        assert!(mixer.play_melody("piano"));
        assert!(mixer.play_melody("strings"));
        assert!(!mixer.is_melody_playing("piano"));
        assert!(mixer.is_melody_playing("strings"));
        assert_eq!(mixer.active_melody(), Some("strings"));
        assert_eq!(mixer.topology().unwrap().sources, 1);

        // Melodies play at the fixed 0.5 level.
        let out = pump(&mixer, 4);
        assert!(out.iter().all(|v| (v - 0.8 * 0.2 * 0.5).abs() < 1e-3));
    }

    #[test]
    fn replaying_a_melody_restarts_it() {
        let mut mixer = mixer();
        mixer.load_melody("piano", "piano.wav");
        mixer.play_melody("piano");
        mixer.play_melody("piano");
        assert!(mixer.is_melody_playing("piano"));
        let topology = mixer.topology().unwrap();
        assert_eq!(topology.sources, 1);
        assert_eq!(topology.gains, 1);
    }

    #[test]
    fn unknown_melody_keeps_current_one() {
        let mut mixer = mixer();
        mixer.load_melody("piano", "piano.wav");
        mixer.play_melody("piano");
        assert!(!mixer.play_melody("ghost"));
        assert_eq!(mixer.active_melody(), Some("piano"));
    }

    #[test]
    fn stop_melody_ignores_inactive_ids() {
        let mut mixer = mixer();
        mixer.load_melody("piano", "piano.wav");
        mixer.load_melody("strings", "strings.wav");
        mixer.play_melody("piano");
        mixer.stop_melody("strings");
        assert_eq!(mixer.active_melody(), Some("piano"));
        mixer.stop_melody("piano");
        assert_eq!(mixer.active_melody(), None);
        assert_eq!(mixer.topology().unwrap().sources, 0);
    }

    #[test]
    fn stop_all_restores_initial_topology() {
        let mut mixer = mixer();
        let initial = mixer.topology().unwrap();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.load_ambient("chime", "chime.wav", false);
        mixer.load_melody("piano", "piano.wav");
        mixer.play_ambient("rain");
        mixer.play_ambient("chime");
        mixer.play_melody("piano");

        mixer.stop_all();
        assert!(mixer.playing_ambients().is_empty());
        assert_eq!(mixer.active_melody(), None);
        assert_eq!(mixer.topology().unwrap(), initial);

        assert!(mixer.play_ambient("rain"));
        let out = pump(&mixer, 4);
        assert!(out.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn reloading_a_playing_ambient_stops_it_first() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.play_ambient("rain");
        assert!(mixer.load_ambient("rain", "chime.wav", true));

        assert!(!mixer.is_ambient_playing("rain"));
        assert_eq!(mixer.topology().unwrap().sources, 0);
    }

    #[test]
    fn failed_reload_keeps_the_playing_voice() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.play_ambient("rain");
        assert!(!mixer.load_ambient("rain", "broken.wav", true));

        assert!(mixer.is_ambient_playing("rain"));
        assert_eq!(mixer.ambient_ids(), vec!["rain".to_string()]);
        assert_eq!(mixer.topology().unwrap().sources, 1);
        assert!(pump(&mixer, 16).iter().all(|&v| v > 0.0));
    }

    #[test]
    fn stopped_melody_can_be_restarted() {
        let mut mixer = mixer();
        mixer.load_melody("piano", "piano.wav");
        mixer.load_melody("strings", "strings.wav");
        mixer.play_melody("piano");
        mixer.stop_melody("piano");
        assert_eq!(mixer.topology().unwrap().sources, 0);

        assert!(mixer.play_melody("piano"));
        assert!(mixer.is_melody_playing("piano"));
        mixer.stop_all();
        assert_eq!(mixer.active_melody(), None);
        assert!(mixer.play_melody("strings"));
        assert_eq!(mixer.topology().unwrap().sources, 1);
    }

    #[test]
    fn reloading_the_active_melody_clears_the_slot() {
        let mut mixer = mixer();
        mixer.load_melody("piano", "piano.wav");
        mixer.play_melody("piano");
        assert!(mixer.load_melody("piano", "strings.wav"));
        assert_eq!(mixer.active_melody(), None);
        assert_eq!(mixer.topology().unwrap().sources, 0);
    }

    #[test]
    fn clear_forgets_voices_and_cache() {
        let mut mixer = mixer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.load_melody("piano", "piano.wav");
        mixer.play_ambient("rain");
        mixer.clear();

        assert!(mixer.ambient_ids().is_empty());
        assert!(mixer.melody_ids().is_empty());
        assert!(mixer.cache().is_empty());
        assert_eq!(mixer.topology().unwrap().sources, 0);
    }

    #[test]
    fn master_volume_ramps() {
        let mut mixer = mixer();
        assert_eq!(mixer.master_volume(), Some(0.8));
        assert!(mixer.set_master_volume(40));
        assert_eq!(mixer.master_volume(), Some(0.4));
    }

    #[test]
    fn play_initialises_on_demand() {
        let config = AudioConfig {
            sample_rate: RATE,
            channels: 1,
            ..Default::default()
        };
        let mut mixer = Mixer::new(AudioEngine::new(RATE, 1), Box::new(fetcher()), config);
        assert!(mixer.analyzer().sample().is_none());
        mixer.load_ambient("rain", "rain.wav", true);
        assert!(mixer.play_ambient("rain"));
        assert!(mixer.topology().unwrap().initialized);
    }

    #[test]
    fn analyzer_reports_fixed_length_snapshots() {
        let mut mixer = mixer();
        let mut analyzer = mixer.analyzer();
        mixer.load_ambient("rain", "rain.wav", true);
        mixer.play_ambient("rain");
        pump(&mixer, 512);

        let snapshot = analyzer.sample().unwrap();
        assert_eq!(snapshot.len(), 128);
        assert!(snapshot.bins()[0] > 0);
    }
}
