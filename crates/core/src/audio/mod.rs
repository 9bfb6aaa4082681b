use std::sync::MutexGuard;

use crate::{
    analysis::FrequencyAnalyzer,
    graph::{EngineState, MixGraph, SharedGraph},
    MixerError, Result,
};

/// Device-side hooks the engine toggles when changing power state.
pub trait OutputBackend {
    fn resume(&mut self) -> Result<()>;
    fn suspend(&mut self) -> Result<()>;
}

/// High level audio engine façade. Owns the shared mix graph and, when one is
/// attached, the device stream that pulls audio out of it.
pub struct AudioEngine {
    sample_rate: u32,
    channels: u16,
    graph: SharedGraph,
    backend: Option<Box<dyn OutputBackend>>,
}

impl AudioEngine {
    /// Creates a suspended engine without an output device. Audio only flows
    /// when something calls [`RenderHandle::render`].
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            graph: MixGraph::shared(sample_rate),
            backend: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Hands the engine a device stream. The stream should drive a
    /// [`RenderHandle`] obtained from [`Self::renderer`].
    pub fn attach_backend(&mut self, backend: Box<dyn OutputBackend>) {
        self.backend = Some(backend);
    }

    /// Returns the current power state of the graph.
    pub fn state(&self) -> Result<EngineState> {
        Ok(self.lock_graph()?.state())
    }

    /// Resumes a suspended engine. Returns `true` when a transition happened.
    pub fn resume_if_suspended(&mut self) -> Result<bool> {
        if self.state()? != EngineState::Suspended {
            return Ok(false);
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.resume()?;
        }
        self.lock_graph()?.set_state(EngineState::Running);
        tracing::info!(sample_rate = self.sample_rate, "audio engine resumed");
        Ok(true)
    }

    /// Suspends a running engine. Rendering produces silence until resumed.
    pub fn suspend(&mut self) -> Result<()> {
        if self.state()? == EngineState::Suspended {
            return Ok(());
        }
        self.lock_graph()?.set_state(EngineState::Suspended);
        if let Some(backend) = self.backend.as_mut() {
            backend.suspend()?;
        }
        tracing::info!("audio engine suspended");
        Ok(())
    }

    /// Returns the callback body a device stream runs on its audio thread.
    pub fn renderer(&self) -> RenderHandle {
        RenderHandle {
            graph: self.graph.clone(),
            channels: self.channels as usize,
        }
    }

    /// Returns a new read handle on the graph's analysis stage.
    pub fn analyzer(&self) -> FrequencyAnalyzer {
        FrequencyAnalyzer::new(self.graph.clone())
    }

    /// Locks the shared graph, mapping a poisoned lock to an error.
    pub fn lock_graph(&self) -> Result<MutexGuard<'_, MixGraph>> {
        self.graph
            .lock()
            .map_err(|_| MixerError::msg("mix graph has been poisoned"))
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

/// Shared, thread-safe render entry point over the engine's mix graph.
#[derive(Clone)]
pub struct RenderHandle {
    graph: SharedGraph,
    channels: usize,
}

impl RenderHandle {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fills `out` with interleaved samples. A poisoned graph yields silence.
    pub fn render(&self, out: &mut [f32]) {
        match self.graph.lock() {
            Ok(mut graph) => graph.render(out, self.channels),
            Err(_) => out.fill(0.0),
        }
    }

    /// Renders `frames` frames into a fresh buffer. Used for offline mixing.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        self.render(&mut out);
        out
    }

    /// Renders `frames` frames in device-sized blocks of at most
    /// `block_size` frames, releasing the graph lock between blocks the way
    /// a device callback would.
    pub fn render_blocks(&self, frames: usize, block_size: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        let block_len = block_size.max(1) * self.channels;
        for block in out.chunks_mut(block_len) {
            self.render(block);
        }
        out
    }
}

impl std::fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHandle")
            .field("channels", &self.channels)
            .finish()
    }
}
