use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use ambient_mixer_core::{
    AppConfig, AudioEngine, Controller, FileFetcher, FrameQueue, LoggingVideoElement,
    ManifestSet, MixerError, Mixer, PixelCanvas, Rgba, Theme, VisualMode, Visualizer,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod output;

use output::OutputDevice;

const FRAMES_PER_SECOND: u32 = 60;

fn main() -> ambient_mixer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { session, seconds } => run_play(&session, seconds),
        Commands::Inspect { manifest } => run_inspect(&manifest),
        Commands::Snapshot {
            session,
            output,
            seconds,
        } => run_snapshot(&session, &output, seconds),
    }
}

fn run_play(session: &SessionArgs, seconds: u64) -> ambient_mixer_core::Result<()> {
    tracing::info!(theme = %session.theme, seconds, "starting playback");

    let mut config = session.load_config()?;
    let device = OutputDevice::default_output(config.audio.sample_rate, config.audio.block_size)?;
    config.audio.sample_rate = device.sample_rate();
    config.audio.channels = device.channels();

    let mut engine = AudioEngine::new(config.audio.sample_rate, config.audio.channels);
    let backend = device.open(engine.renderer())?;
    engine.attach_backend(Box::new(backend));

    let mut controller = session.controller(engine, &config)?;
    session.start_voices(&mut controller);

    let canvas = PixelCanvas::new(config.visual.width, config.visual.height);
    let mut visualizer = Visualizer::new(
        controller.mixer().analyzer(),
        canvas,
        FrameQueue::new(),
        &config.visual,
    );
    visualizer.set_palette(controller.palette());
    visualizer.start();

    let interval = Duration::from_secs(1) / FRAMES_PER_SECOND;
    let started = Instant::now();
    let total_frames = seconds * FRAMES_PER_SECOND as u64;
    for frame in 0..total_frames {
        thread::sleep(interval);
        let Some(token) = visualizer.scheduler_mut().pop() else {
            break;
        };
        visualizer.on_frame(token, started.elapsed());
        if frame % FRAMES_PER_SECOND as u64 == 0 {
            tracing::info!(
                intensity = visualizer.intensity(),
                playing = ?controller.mixer().playing_ambients(),
                melody = ?controller.mixer().active_melody(),
                "frame"
            );
        }
    }

    visualizer.stop();
    controller.reset();
    controller.mixer_mut().engine_mut().suspend()?;
    tracing::info!("playback finished");
    Ok(())
}

fn run_inspect(manifest: &Path) -> ambient_mixer_core::Result<()> {
    let manifests = ManifestSet::from_json_file(manifest)?;
    for (theme, entry) in manifests.themes() {
        println!("{theme}: {} assets", entry.asset_count());
        for (id, location) in &entry.melodies {
            println!("  melody  {id:<16} {location}");
        }
        for (id, location) in &entry.ambients {
            println!("  ambient {id:<16} {location}");
        }
        if let Some(video) = &entry.video {
            println!("  video   {video}");
        }
    }
    Ok(())
}

fn run_snapshot(session: &SessionArgs, output: &Path, seconds: f32) -> ambient_mixer_core::Result<()> {
    tracing::info!(theme = %session.theme, ?output, seconds, "rendering snapshot");

    let config = session.load_config()?;
    let engine = AudioEngine::new(config.audio.sample_rate, config.audio.channels);
    let mut controller = session.controller(engine, &config)?;
    session.start_voices(&mut controller);

    let mut visualizer = Visualizer::new(
        controller.mixer().analyzer(),
        PixelCanvas::new(config.visual.width, config.visual.height),
        FrameQueue::new(),
        &config.visual,
    );
    visualizer.set_palette(controller.palette());
    visualizer.start();

    // Render audio offline, advancing the visual once per frame interval.
    let renderer = controller.mixer().engine().renderer();
    let frames_per_visual = (config.audio.sample_rate / FRAMES_PER_SECOND).max(1) as usize;
    let visual_frames = (seconds.max(0.0) * FRAMES_PER_SECOND as f32).ceil().max(1.0) as u32;
    for frame in 0..visual_frames {
        renderer.render_blocks(frames_per_visual, config.audio.block_size);
        if let Some(token) = visualizer.scheduler_mut().pop() {
            visualizer.on_frame(token, Duration::from_secs(1) / FRAMES_PER_SECOND * frame);
        }
    }
    let intensity = visualizer.intensity();

    let background = controller.palette().background;
    let canvas = visualizer.into_canvas();
    let (width, height) = (canvas.width(), canvas.height());
    let pixels = flatten(canvas.into_pixels(), background);
    image::save_buffer(output, &pixels, width, height, image::ColorType::Rgba8)
        .map_err(|err| MixerError::msg(format!("failed to write {}: {err}", output.display())))?;

    tracing::info!(?output, width, height, intensity, "snapshot written");
    Ok(())
}

/// Composites straight-alpha pixels over an opaque background colour.
fn flatten(mut pixels: Vec<u8>, background: Rgba) -> Vec<u8> {
    for px in pixels.chunks_exact_mut(4) {
        let alpha = px[3] as f32 / 255.0;
        for (channel, bg) in [background.r, background.g, background.b].into_iter().enumerate() {
            px[channel] = (px[channel] as f32 * alpha + bg as f32 * (1.0 - alpha)).round() as u8;
        }
        px[3] = 255;
    }
    pixels
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Themed ambient sound mixer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a theme through the default output device.
    Play {
        #[command(flatten)]
        session: SessionArgs,
        /// How long to play for.
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Summarise the themes in a manifest.
    Inspect {
        /// Path to the theme manifest JSON.
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Mix a theme offline and write one visualiser frame as a PNG.
    Snapshot {
        #[command(flatten)]
        session: SessionArgs,
        /// Output path for the PNG.
        #[arg(short, long)]
        output: PathBuf,
        /// Seconds of audio to mix before capturing the frame.
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
    },
}

#[derive(clap::Args, Debug)]
struct SessionArgs {
    /// Path to the theme manifest JSON. Asset locations are relative to it.
    #[arg(short, long)]
    manifest: PathBuf,
    /// Theme to load.
    #[arg(short, long, default_value = "dark")]
    theme: Theme,
    /// Ambient ids to start. Defaults to every ambient in the theme.
    #[arg(short, long)]
    ambient: Vec<String>,
    /// Melody id to start.
    #[arg(long)]
    melody: Option<String>,
    /// Visualisation mode.
    #[arg(long)]
    mode: Option<VisualMode>,
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl SessionArgs {
    fn load_config(&self) -> ambient_mixer_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_json_file(path)?,
            None => AppConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.visual.mode = mode;
        }
        config.validate()?;
        Ok(config)
    }

    fn controller(
        &self,
        engine: AudioEngine,
        config: &AppConfig,
    ) -> ambient_mixer_core::Result<Controller<LoggingVideoElement>> {
        let manifests = ManifestSet::from_json_file(&self.manifest)?;
        let root = self
            .manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mixer = Mixer::new(engine, Box::new(FileFetcher::new(root)), config.audio.clone());
        let mut controller = Controller::new(mixer, LoggingVideoElement::default(), manifests);

        let switch = controller
            .switch_theme(self.theme, |loaded, total| {
                tracing::info!(loaded, total, "loading assets");
            })
            .ok_or_else(|| MixerError::msg(format!("manifest has no `{}` theme", self.theme)))?;
        if !switch.report.failed.is_empty() {
            tracing::warn!(failed = ?switch.report.failed, "some assets failed to load");
        }
        Ok(controller)
    }

    fn start_voices(&self, controller: &mut Controller<LoggingVideoElement>) {
        let ambients = if self.ambient.is_empty() {
            controller.mixer().ambient_ids()
        } else {
            self.ambient.clone()
        };
        for id in &ambients {
            if !controller.toggle_ambient(id) {
                tracing::warn!(id, "ambient did not start");
            }
        }
        if let Some(id) = &self.melody {
            if !controller.play_melody(id) {
                tracing::warn!(id, "melody did not start");
            }
        }
    }
}
