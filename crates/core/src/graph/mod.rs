//! Software mix graph standing in for the host audio engine.
//!
//! Topology is fixed: every voice is a one-shot source feeding a per-voice
//! gain node, every gain node feeds the shared analysis stage, and the
//! analysis stage feeds the master gain and then the output device. The
//! shared stages are installed once and live as long as the graph.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use crate::{analysis::AnalysisStage, assets::DecodedAsset, config::AudioConfig, MixerError, Result};

/// Graph shared between the control side and the real-time render callback.
pub type SharedGraph = Arc<Mutex<MixGraph>>;

/// Invoked from the render callback once a non-looping source runs out of
/// samples. The source has already been removed when the callback runs.
pub type EndedCallback = Box<dyn FnOnce(&mut MixGraph) + Send>;

/// Opaque handle to a node owned by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

/// Where a node's output is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Node(NodeId),
    Analysis,
}

/// Power state of the output engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No samples are produced and no clocks advance.
    Suspended,
    Running,
}

/// Counts describing the live shape of the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Topology {
    pub initialized: bool,
    pub sources: usize,
    pub gains: usize,
    pub connected_sources: usize,
    pub connected_gains: usize,
}

/// Gain value with an optional linear ramp measured in samples.
#[derive(Debug, Clone, PartialEq)]
pub struct GainParam {
    value: f32,
    ramp: Option<Ramp>,
}

#[derive(Debug, Clone, PartialEq)]
struct Ramp {
    start: f32,
    target: f32,
    elapsed: usize,
    length: usize,
}

impl GainParam {
    pub fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Returns the value produced by the most recent sample.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Value the parameter settles on once any running ramp completes.
    pub fn target(&self) -> f32 {
        self.ramp.as_ref().map(|ramp| ramp.target).unwrap_or(self.value)
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp.is_some()
    }

    /// Jumps to `value`, cancelling any ramp in flight.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Starts a linear ramp from the current value to `target`.
    pub fn linear_ramp_to(&mut self, target: f32, length: usize) {
        if length == 0 {
            self.set_value(target);
            return;
        }
        self.ramp = Some(Ramp {
            start: self.value,
            target,
            elapsed: 0,
            length,
        });
    }

    /// Advances the parameter by one sample and returns the new value.
    pub fn next_value(&mut self) -> f32 {
        if let Some(ramp) = self.ramp.as_mut() {
            ramp.elapsed += 1;
            if ramp.elapsed >= ramp.length {
                self.value = ramp.target;
                self.ramp = None;
            } else {
                let progress = ramp.elapsed as f32 / ramp.length as f32;
                self.value = ramp.start + (ramp.target - ramp.start) * progress;
            }
        }
        self.value
    }
}

struct SourceNode {
    asset: Arc<DecodedAsset>,
    looping: bool,
    position: usize,
    started: bool,
    stopped: bool,
    output: Option<Destination>,
    on_ended: Option<EndedCallback>,
}

impl SourceNode {
    fn is_active(&self) -> bool {
        self.started && !self.stopped
    }

    /// Copies the next `out.len()` samples, wrapping when looping. Returns
    /// `true` once a one-shot source has played its final sample.
    fn pull(&mut self, out: &mut [f32]) -> bool {
        let data = self.asset.samples();
        let len = data.len();
        for slot in out.iter_mut() {
            if self.position >= len {
                if self.looping && len > 0 {
                    self.position = 0;
                } else {
                    *slot = 0.0;
                    continue;
                }
            }
            *slot = data[self.position];
            self.position += 1;
        }
        !self.looping && self.position >= len
    }
}

struct GainNode {
    param: GainParam,
    connected: bool,
    curve: Vec<f32>,
}

struct SharedStages {
    analysis: AnalysisStage,
    master: GainParam,
}

/// Software audio graph: one-shot sources feeding per-voice gains, a shared
/// analysis stage and the master gain.
pub struct MixGraph {
    sample_rate: u32,
    state: EngineState,
    next_id: u64,
    sources: HashMap<NodeId, SourceNode>,
    gains: HashMap<NodeId, GainNode>,
    stages: Option<SharedStages>,
    mix: Vec<f32>,
    voice: Vec<f32>,
    ended: Vec<NodeId>,
}

impl MixGraph {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: EngineState::Suspended,
            next_id: 0,
            sources: HashMap::new(),
            gains: HashMap::new(),
            stages: None,
            mix: Vec::new(),
            voice: Vec::new(),
            ended: Vec::new(),
        }
    }

    /// Creates an empty graph wrapped for sharing with the render thread.
    pub fn shared(sample_rate: u32) -> SharedGraph {
        Arc::new(Mutex::new(Self::new(sample_rate)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: EngineState) {
        self.state = state;
    }

    /// Returns whether the analysis and master stages exist.
    pub fn is_initialized(&self) -> bool {
        self.stages.is_some()
    }

    /// Installs the analysis and master stages. Returns `false` when they
    /// already exist, in which case nothing changes.
    pub fn install_stages(&mut self, config: &AudioConfig) -> bool {
        if self.stages.is_some() {
            return false;
        }
        self.stages = Some(SharedStages {
            analysis: AnalysisStage::new(config),
            master: GainParam::new(config.master_gain),
        });
        true
    }

    /// Returns the shared analysis stage once installed.
    pub fn analysis_mut(&mut self) -> Option<&mut AnalysisStage> {
        self.stages.as_mut().map(|stages| &mut stages.analysis)
    }

    /// Returns the master gain parameter once installed.
    pub fn master_gain(&self) -> Option<&GainParam> {
        self.stages.as_ref().map(|stages| &stages.master)
    }

    /// Ramps the master stage to `target` over `length` samples. Fails before
    /// the stages are installed.
    pub fn ramp_master(&mut self, target: f32, length: usize) -> Result<()> {
        let stages = self.stages.as_mut().ok_or(MixerError::Playback(
            "mix graph is not initialised".to_string(),
        ))?;
        stages.master.linear_ramp_to(target, length);
        Ok(())
    }

    /// Creates an unconnected, unstarted source that plays `asset` once, or
    /// forever when `looping`.
    pub fn create_source(&mut self, asset: Arc<DecodedAsset>, looping: bool) -> NodeId {
        let id = self.allocate_id();
        self.sources.insert(
            id,
            SourceNode {
                asset,
                looping,
                position: 0,
                started: false,
                stopped: false,
                output: None,
                on_ended: None,
            },
        );
        id
    }

    /// Creates an unconnected gain node at a fixed `level`.
    pub fn create_gain(&mut self, level: f32) -> NodeId {
        let id = self.allocate_id();
        self.gains.insert(
            id,
            GainNode {
                param: GainParam::new(level),
                connected: false,
                curve: Vec::new(),
            },
        );
        id
    }

    /// Routes a source into a gain node or the analysis stage, or a gain node
    /// into the analysis stage. Any other pairing is rejected.
    pub fn connect(&mut self, from: NodeId, to: Destination) -> Result<()> {
        if to == Destination::Analysis && self.stages.is_none() {
            return Err(MixerError::Playback("mix graph is not initialised".to_string()));
        }

        if let Some(source) = self.sources.get_mut(&from) {
            if let Destination::Node(target) = to {
                if !self.gains.contains_key(&target) {
                    return Err(MixerError::InvalidInput("sources may only feed gain nodes"));
                }
            }
            source.output = Some(to);
            return Ok(());
        }

        if let Some(gain) = self.gains.get_mut(&from) {
            if to != Destination::Analysis {
                return Err(MixerError::InvalidInput(
                    "gain nodes may only feed the analysis stage",
                ));
            }
            gain.connected = true;
            return Ok(());
        }

        Err(MixerError::InvalidInput("unknown node"))
    }

    /// Detaches the node's output. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: NodeId) {
        if let Some(source) = self.sources.get_mut(&id) {
            source.output = None;
        } else if let Some(gain) = self.gains.get_mut(&id) {
            gain.connected = false;
        }
    }

    /// Begins playback of a source. Sources are one-shot and cannot restart.
    pub fn start(&mut self, id: NodeId) -> Result<()> {
        let source = self
            .sources
            .get_mut(&id)
            .ok_or(MixerError::InvalidInput("unknown source node"))?;
        if source.started {
            return Err(MixerError::InvalidInput("source nodes can only be started once"));
        }
        source.started = true;
        Ok(())
    }

    /// Halts a source. A manual stop never fires the completion callback.
    pub fn stop(&mut self, id: NodeId) {
        if let Some(source) = self.sources.get_mut(&id) {
            source.stopped = true;
            source.on_ended = None;
        }
    }

    /// Registers the callback run once a non-looping source reaches its end.
    pub fn set_on_ended(&mut self, id: NodeId, callback: EndedCallback) -> Result<()> {
        let source = self
            .sources
            .get_mut(&id)
            .ok_or(MixerError::InvalidInput("unknown source node"))?;
        source.on_ended = Some(callback);
        Ok(())
    }

    /// Drops a node. Sources routed into a released gain node go silent.
    pub fn release(&mut self, id: NodeId) {
        if self.sources.remove(&id).is_some() {
            return;
        }
        if self.gains.remove(&id).is_some() {
            for source in self.sources.values_mut() {
                if source.output == Some(Destination::Node(id)) {
                    source.output = None;
                }
            }
        }
    }

    /// Ramps a gain node linearly to `target` over `length` samples.
    pub fn ramp_gain(&mut self, id: NodeId, target: f32, length: usize) -> Result<()> {
        let gain = self
            .gains
            .get_mut(&id)
            .ok_or(MixerError::InvalidInput("unknown gain node"))?;
        gain.param.linear_ramp_to(target, length);
        Ok(())
    }

    pub fn gain(&self, id: NodeId) -> Option<&GainParam> {
        self.gains.get(&id).map(|gain| &gain.param)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.sources.contains_key(&id) || self.gains.contains_key(&id)
    }

    /// Returns node and connection counts for the current graph.
    pub fn topology(&self) -> Topology {
        Topology {
            initialized: self.stages.is_some(),
            sources: self.sources.len(),
            gains: self.gains.len(),
            connected_sources: self.sources.values().filter(|s| s.output.is_some()).count(),
            connected_gains: self.gains.values().filter(|g| g.connected).count(),
        }
    }

    /// Produces one block of interleaved output. Silent while suspended or
    /// before the shared stages exist.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if self.state != EngineState::Running || channels == 0 || self.stages.is_none() {
            return;
        }

        let frames = out.len() / channels;
        self.mix.clear();
        self.mix.resize(frames, 0.0);
        self.voice.resize(frames, 0.0);

        for gain in self.gains.values_mut() {
            gain.curve.resize(frames, 0.0);
            for slot in gain.curve.iter_mut() {
                *slot = gain.param.next_value();
            }
        }

        for (&id, source) in self.sources.iter_mut() {
            if !source.is_active() {
                continue;
            }
            let voice = &mut self.voice[..frames];
            if source.pull(voice) {
                self.ended.push(id);
            }

            match source.output {
                Some(Destination::Analysis) => {
                    for (mixed, sample) in self.mix.iter_mut().zip(voice.iter()) {
                        *mixed += *sample;
                    }
                }
                Some(Destination::Node(gain_id)) => {
                    let Some(gain) = self.gains.get(&gain_id) else {
                        continue;
                    };
                    if !gain.connected {
                        continue;
                    }
                    for ((mixed, sample), level) in
                        self.mix.iter_mut().zip(voice.iter()).zip(gain.curve.iter())
                    {
                        *mixed += *sample * *level;
                    }
                }
                None => {}
            }
        }

        if let Some(stages) = self.stages.as_mut() {
            stages.analysis.push(&self.mix);
            for (frame, mixed) in out.chunks_exact_mut(channels).zip(self.mix.iter()) {
                let value = (*mixed * stages.master.next_value()).clamp(-1.0, 1.0);
                frame.fill(value);
            }
        }

        let mut ended = std::mem::take(&mut self.ended);
        for id in ended.drain(..) {
            if let Some(mut source) = self.sources.remove(&id) {
                if let Some(callback) = source.on_ended.take() {
                    callback(self);
                }
            }
        }
        self.ended = ended;
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl fmt::Debug for MixGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixGraph")
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state)
            .field("topology", &self.topology())
            .finish()
    }
}
