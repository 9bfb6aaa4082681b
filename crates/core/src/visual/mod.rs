//! Audio-reactive visualisation driven by the host's frame callback.

use std::{collections::VecDeque, f32::consts::PI, fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{FrequencyAnalyzer, FrequencySnapshot},
    config::VisualConfig,
    render::Canvas,
    theme::Palette,
    MixerError, Result,
};

mod particles;

pub use particles::{Particle, ParticleField};

const WAVE_STEP: f32 = 4.0;
const WAVE_OFFSETS: [f32; 3] = [0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0];
const MAX_FRAME_DELTA: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    Bars,
    #[default]
    Particles,
    Waveform,
}

impl VisualMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::Particles => "particles",
            Self::Waveform => "waveform",
        }
    }
}

impl fmt::Display for VisualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisualMode {
    type Err = MixerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bars" => Ok(Self::Bars),
            "particles" => Ok(Self::Particles),
            "waveform" => Ok(Self::Waveform),
            _ => Err(MixerError::msg(format!("unknown visual mode `{s}`"))),
        }
    }
}

/// Handle for one requested frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

/// Host mechanism that calls back once per display frame.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameToken;
    fn cancel_frame(&mut self, token: FrameToken);
}

/// Scheduler that queues requests until the host loop drains them.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next: u64,
    pending: VecDeque<FrameToken>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next frame callback due, oldest first.
    pub fn pop(&mut self) -> Option<FrameToken> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameToken {
        let token = FrameToken(self.next);
        self.next += 1;
        self.pending.push_back(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        self.pending.retain(|pending| *pending != token);
    }
}

/// What happened on a frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    /// No analysis data yet; nothing was drawn.
    Skipped,
    /// The token was cancelled or superseded.
    Ignored,
}

/// Mode-specific drawing state.
#[derive(Debug, Clone)]
pub struct Scene {
    mode: VisualMode,
    palette: Palette,
    particles: ParticleField,
    link_distance: f32,
    phase: f32,
    points: Vec<(f32, f32)>,
}

impl Scene {
    pub fn new(config: &VisualConfig) -> Self {
        Self {
            mode: config.mode,
            palette: Palette::default(),
            particles: ParticleField::new(config.particle_count, config.seed),
            link_distance: config.link_distance,
            phase: 0.0,
            points: Vec::new(),
        }
    }

    pub fn mode(&self) -> VisualMode {
        self.mode
    }

    pub fn particles(&self) -> &ParticleField {
        &self.particles
    }

    /// Draws one frame. `delta` is the time since the previous frame.
    pub fn draw<C: Canvas>(&mut self, canvas: &mut C, snapshot: &FrequencySnapshot, delta: f32) {
        let intensity = snapshot.intensity();
        match self.mode {
            VisualMode::Bars => self.draw_bars(canvas, snapshot),
            VisualMode::Particles => self.draw_particles(canvas, intensity),
            VisualMode::Waveform => self.draw_waveform(canvas, intensity, delta),
        }
    }

    fn draw_bars<C: Canvas>(&self, canvas: &mut C, snapshot: &FrequencySnapshot) {
        let (width, height) = canvas.size();
        let bins = snapshot.len();
        if bins == 0 {
            return;
        }
        let bar_width = width / bins as f32;
        for (index, &value) in snapshot.bins().iter().enumerate() {
            if value == 0 {
                continue;
            }
            let level = value as f32 / 255.0;
            let bar_height = level * height;
            let color = self
                .palette
                .primary
                .lerp(self.palette.secondary, index as f32 / bins as f32)
                .with_opacity(0.35 + 0.65 * level);
            canvas.fill_rect(
                index as f32 * bar_width,
                height - bar_height,
                (bar_width - 1.0).max(1.0),
                bar_height,
                color,
            );
        }
    }

    fn draw_particles<C: Canvas>(&mut self, canvas: &mut C, intensity: f32) {
        let (width, height) = canvas.size();
        if !self.particles.is_populated() {
            self.particles.populate(width, height);
        }
        self.particles.step(width, height, intensity);
        self.particles
            .draw(canvas, &self.palette, intensity, self.link_distance);
    }

    fn draw_waveform<C: Canvas>(&mut self, canvas: &mut C, intensity: f32, delta: f32) {
        let (width, height) = canvas.size();
        self.phase = (self.phase + delta * (1.0 + intensity * 2.0) * 2.0) % (2.0 * PI * 1_000.0);
        let amplitude = height * 0.15 * (0.3 + intensity * 1.5);
        let centre = height * 0.5;
        let colors = [
            self.palette.primary,
            self.palette.secondary,
            self.palette.accent,
        ];

        for (offset, color) in WAVE_OFFSETS.iter().zip(colors) {
            self.points.clear();
            let mut x = 0.0;
            while x <= width {
                let envelope = 1.0 + 0.3 * (x * 0.005 + self.phase * 0.5).sin();
                let y = centre + (x * 0.02 + self.phase + offset).sin() * amplitude * envelope;
                self.points.push((x, y));
                x += WAVE_STEP;
            }
            canvas.stroke_polyline(&self.points, 2.0, color.with_opacity(0.4 + 0.6 * intensity));
        }
    }
}

/// Per-frame render loop: samples the analyser once per frame and paints
/// the active mode onto the canvas.
pub struct Visualizer<C, S> {
    analyzer: FrequencyAnalyzer,
    canvas: C,
    scheduler: S,
    scene: Scene,
    pending: Option<FrameToken>,
    last_frame: Option<Duration>,
    intensity: f32,
}

impl<C: Canvas, S: FrameScheduler> Visualizer<C, S> {
    pub fn new(analyzer: FrequencyAnalyzer, canvas: C, scheduler: S, config: &VisualConfig) -> Self {
        Self {
            analyzer,
            canvas,
            scheduler,
            scene: Scene::new(config),
            pending: None,
            last_frame: None,
            intensity: 0.0,
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn into_canvas(self) -> C {
        self.canvas
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn mode(&self) -> VisualMode {
        self.scene.mode
    }

    pub fn set_mode(&mut self, mode: VisualMode) {
        self.scene.mode = mode;
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.scene.palette = palette;
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    /// Intensity of the most recently rendered frame.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Schedules the first frame. Calling it while running changes nothing.
    pub fn start(&mut self) {
        if self.pending.is_none() {
            self.pending = Some(self.scheduler.request_frame());
            self.last_frame = None;
        }
    }

    /// Cancels the scheduled frame and clears the canvas.
    pub fn stop(&mut self) {
        if let Some(token) = self.pending.take() {
            self.scheduler.cancel_frame(token);
        }
        self.canvas.clear();
    }

    /// Updates the surface size without interrupting the loop.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.canvas.resize(width, height);
    }

    /// Frame callback body. `now` is the host's monotonic frame timestamp.
    pub fn on_frame(&mut self, token: FrameToken, now: Duration) -> FrameOutcome {
        if self.pending != Some(token) {
            return FrameOutcome::Ignored;
        }
        self.pending = Some(self.scheduler.request_frame());

        let delta = match self.last_frame {
            Some(last) => now.saturating_sub(last).as_secs_f32().min(MAX_FRAME_DELTA),
            None => 1.0 / 60.0,
        };
        self.last_frame = Some(now);

        let Some(snapshot) = self.analyzer.sample() else {
            return FrameOutcome::Skipped;
        };
        self.intensity = snapshot.intensity();
        self.canvas.clear();
        self.scene.draw(&mut self.canvas, snapshot, delta);
        FrameOutcome::Rendered
    }
}

impl<C, S> fmt::Debug for Visualizer<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Visualizer")
            .field("mode", &self.scene.mode)
            .field("running", &self.pending.is_some())
            .finish()
    }
}
