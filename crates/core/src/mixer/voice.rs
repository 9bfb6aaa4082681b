use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    assets::DecodedAsset,
    graph::{Destination, MixGraph, NodeId},
    MixerError, Result,
};

/// Which melody, if any, currently owns the melody slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MelodySlot {
    #[default]
    Idle,
    Playing(String),
}

impl MelodySlot {
    /// Returns the id of the melody holding the slot, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Playing(id) => Some(id.as_str()),
        }
    }
}

/// Source and gain node pair wired into the graph for one playback.
#[derive(Debug)]
pub(crate) struct LiveNodes {
    source: NodeId,
    gain: NodeId,
}

impl LiveNodes {
    /// Creates `source -> gain -> analysis`. Partially built chains are torn
    /// down before an error is returned.
    fn acquire(
        graph: &mut MixGraph,
        asset: Arc<DecodedAsset>,
        looping: bool,
        level: f32,
    ) -> Result<Self> {
        let nodes = Self {
            source: graph.create_source(asset, looping),
            gain: graph.create_gain(level),
        };
        if let Err(err) = nodes.wire(graph) {
            nodes.release(graph);
            return Err(err);
        }
        Ok(nodes)
    }

    fn wire(&self, graph: &mut MixGraph) -> Result<()> {
        graph.connect(self.source, Destination::Node(self.gain))?;
        graph.connect(self.gain, Destination::Analysis)
    }

    /// Stops, disconnects and frees both nodes. Ids that the graph already
    /// dropped (after a natural end) are ignored.
    fn release(self, graph: &mut MixGraph) {
        graph.stop(self.source);
        graph.disconnect(self.source);
        graph.disconnect(self.gain);
        graph.release(self.source);
        graph.release(self.gain);
    }
}

/// One logical sound entry. Survives stop/play cycles; only its live nodes
/// come and go.
#[derive(Debug)]
pub(crate) struct Voice {
    asset: Arc<DecodedAsset>,
    looping: bool,
    level: Option<f32>,
    playing: Arc<AtomicBool>,
    live: Option<LiveNodes>,
}

impl Voice {
    pub(crate) fn new(asset: Arc<DecodedAsset>, looping: bool, level: Option<f32>) -> Self {
        Self {
            asset,
            looping,
            level,
            playing: Arc::new(AtomicBool::new(false)),
            live: None,
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub(crate) fn level(&self) -> Option<f32> {
        self.level
    }

    pub(crate) fn live_gain(&self) -> Option<NodeId> {
        self.live.as_ref().map(|live| live.gain)
    }

    fn start(&mut self, graph: &mut MixGraph, level: f32) -> Result<()> {
        if let Some(stale) = self.live.take() {
            stale.release(graph);
        }

        let nodes = LiveNodes::acquire(graph, self.asset.clone(), self.looping, level)?;
        if let Err(err) = self.arm(graph, &nodes) {
            nodes.release(graph);
            return Err(err);
        }

        self.playing.store(true, Ordering::SeqCst);
        self.live = Some(nodes);
        Ok(())
    }

    fn arm(&self, graph: &mut MixGraph, nodes: &LiveNodes) -> Result<()> {
        if !self.looping {
            let playing = self.playing.clone();
            let gain = nodes.gain;
            graph.set_on_ended(
                nodes.source,
                Box::new(move |graph| {
                    graph.disconnect(gain);
                    graph.release(gain);
                    playing.store(false, Ordering::SeqCst);
                }),
            )?;
        }
        graph.start(nodes.source)
    }

    fn stop(&mut self, graph: &mut MixGraph) {
        if let Some(live) = self.live.take() {
            live.release(graph);
        }
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Registry of every voice plus the melody slot. All mutations take the
/// locked graph so node bookkeeping and voice state change together.
#[derive(Debug, Default)]
pub(crate) struct VoiceBank {
    ambients: BTreeMap<String, Voice>,
    melodies: BTreeMap<String, Voice>,
    melody: MelodySlot,
}

impl VoiceBank {
    pub(crate) fn ambient(&self, id: &str) -> Option<&Voice> {
        self.ambients.get(id)
    }

    pub(crate) fn melody(&self, id: &str) -> Option<&Voice> {
        self.melodies.get(id)
    }

    pub(crate) fn melody_slot(&self) -> &MelodySlot {
        &self.melody
    }

    pub(crate) fn ambient_ids(&self) -> impl Iterator<Item = &str> {
        self.ambients.keys().map(String::as_str)
    }

    pub(crate) fn melody_ids(&self) -> impl Iterator<Item = &str> {
        self.melodies.keys().map(String::as_str)
    }

    /// Registers an ambient voice. A playing voice with the same id is
    /// stopped before it is replaced.
    pub(crate) fn register_ambient(&mut self, graph: &mut MixGraph, id: &str, voice: Voice) {
        if let Some(mut previous) = self.ambients.insert(id.to_string(), voice) {
            if previous.is_playing() {
                tracing::debug!(id, "stopping ambient before reload");
            }
            previous.stop(graph);
        }
    }

    /// Registers a melody voice, vacating the melody slot first if the
    /// replaced melody held it.
    pub(crate) fn register_melody(&mut self, graph: &mut MixGraph, id: &str, voice: Voice) {
        if self.melody.id() == Some(id) {
            tracing::debug!(id, "stopping melody before reload");
            self.vacate_melody(graph);
        }
        if let Some(mut previous) = self.melodies.insert(id.to_string(), voice) {
            previous.stop(graph);
        }
    }

    /// Starts an ambient voice at its configured level. Returns whether the
    /// voice is playing afterwards.
    pub(crate) fn play_ambient(&mut self, graph: &mut MixGraph, id: &str) -> Result<bool> {
        let Some(voice) = self.ambients.get_mut(id) else {
            return Ok(false);
        };
        if voice.is_playing() {
            return Ok(true);
        }
        let level = voice.level.unwrap_or(0.0);
        voice.start(graph, level)?;
        tracing::debug!(id, level, "ambient started");
        Ok(true)
    }

    pub(crate) fn stop_ambient(&mut self, graph: &mut MixGraph, id: &str) {
        if let Some(voice) = self.ambients.get_mut(id) {
            if voice.is_playing() {
                voice.stop(graph);
                tracing::debug!(id, "ambient stopped");
            }
        }
    }

    /// Stores a new level and ramps the live gain towards it when playing.
    pub(crate) fn set_ambient_level(
        &mut self,
        graph: &mut MixGraph,
        id: &str,
        level: f32,
        ramp_samples: usize,
    ) -> Result<bool> {
        let Some(voice) = self.ambients.get_mut(id) else {
            return Ok(false);
        };
        voice.level = Some(level);
        if voice.is_playing() {
            if let Some(gain) = voice.live_gain() {
                graph.ramp_gain(gain, level, ramp_samples)?;
            }
        }
        Ok(true)
    }

    /// Hands the melody slot to `id`. Unknown ids leave the slot untouched.
    pub(crate) fn play_melody(
        &mut self,
        graph: &mut MixGraph,
        id: &str,
        level: f32,
    ) -> Result<bool> {
        if !self.melodies.contains_key(id) {
            return Ok(false);
        }
        self.transition_melody(graph, Some(id), level)?;
        Ok(true)
    }

    pub(crate) fn stop_melody(&mut self, graph: &mut MixGraph, id: &str) {
        if self.melody.id() == Some(id) {
            self.vacate_melody(graph);
        }
    }

    /// The only path that fills the melody slot. The current melody is
    /// always fully disconnected before `next` is wired in.
    pub(crate) fn transition_melody(
        &mut self,
        graph: &mut MixGraph,
        next: Option<&str>,
        level: f32,
    ) -> Result<()> {
        self.vacate_melody(graph);

        if let Some(id) = next {
            let voice = self
                .melodies
                .get_mut(id)
                .ok_or(MixerError::InvalidInput("unknown melody"))?;
            voice.start(graph, level)?;
            self.melody = MelodySlot::Playing(id.to_string());
            tracing::debug!(id, level, "melody started");
        }
        Ok(())
    }

    /// Stops the active melody, if any, and empties the slot.
    fn vacate_melody(&mut self, graph: &mut MixGraph) {
        if let MelodySlot::Playing(current) = std::mem::take(&mut self.melody) {
            if let Some(voice) = self.melodies.get_mut(&current) {
                voice.stop(graph);
            }
            tracing::debug!(id = %current, "melody stopped");
        }
    }

    pub(crate) fn stop_all(&mut self, graph: &mut MixGraph) {
        for voice in self.ambients.values_mut() {
            voice.stop(graph);
        }
        self.vacate_melody(graph);
        for voice in self.melodies.values_mut() {
            voice.stop(graph);
        }
    }

    pub(crate) fn clear(&mut self, graph: &mut MixGraph) {
        self.stop_all(graph);
        self.ambients.clear();
        self.melodies.clear();
    }
}
