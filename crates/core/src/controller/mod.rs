//! Top-level orchestration of theme switches, user toggles and the video
//! background.

use crate::{
    mixer::Mixer,
    theme::{load_theme, LoadReport, ManifestSet, Palette, Theme},
    video::{VideoBackground, VideoElement},
};

/// Result of a theme switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeSwitch {
    pub theme: Theme,
    pub report: LoadReport,
    pub video_playing: bool,
}

/// Application shell state: the mixer, the background video and the
/// manifests of every theme.
pub struct Controller<E> {
    mixer: Mixer,
    video: VideoBackground<E>,
    manifests: ManifestSet,
    theme: Option<Theme>,
}

impl<E: VideoElement> Controller<E> {
    /// Creates a controller with no active theme, registering every
    /// manifest's video source up front.
    pub fn new(mixer: Mixer, element: E, manifests: ManifestSet) -> Self {
        let mut video = VideoBackground::new(element);
        for (theme, manifest) in manifests.themes() {
            if let Some(url) = &manifest.video {
                video.set_source(theme, url.clone());
            }
        }
        Self {
            mixer,
            video,
            manifests,
            theme: None,
        }
    }

    /// Returns the mixer driving every voice.
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn video(&self) -> &VideoBackground<E> {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut VideoBackground<E> {
        &mut self.video
    }

    pub fn manifests(&self) -> &ManifestSet {
        &self.manifests
    }

    /// Returns the theme loaded by the last successful switch.
    pub fn theme(&self) -> Option<Theme> {
        self.theme
    }

    /// Palette of the active theme, or the default one before any switch.
    pub fn palette(&self) -> Palette {
        self.theme.map(Theme::palette).unwrap_or_default()
    }

    /// Tears down everything the previous theme loaded, then loads `theme`
    /// and its background video. Returns `None` without touching the mixer,
    /// the video or the current theme when no manifest exists for `theme`.
    pub fn switch_theme(
        &mut self,
        theme: Theme,
        progress: impl FnMut(usize, usize),
    ) -> Option<ThemeSwitch> {
        if self.manifests.get(theme).is_none() {
            tracing::warn!(%theme, "no manifest for theme; keeping current theme");
            return None;
        }
        tracing::info!(from = ?self.theme, to = %theme, "switching theme");
        self.mixer.clear();
        self.theme = Some(theme);

        let report = load_theme(&mut self.mixer, &self.manifests, theme, progress, |_| {})?;
        if let Some(url) = self.manifests.get(theme).and_then(|m| m.video.clone()) {
            self.video.set_source(theme, url);
        }
        let video_playing = self.video.load(theme);

        Some(ThemeSwitch {
            theme,
            report,
            video_playing,
        })
    }

    /// Resumes the engine if needed, then toggles the ambient voice. Returns
    /// the resulting playing state.
    pub fn toggle_ambient(&mut self, id: &str) -> bool {
        self.mixer.resume_if_suspended();
        self.mixer.toggle_ambient(id)
    }

    /// Sets an ambient level from a 0..=100 slider value.
    pub fn set_ambient_volume(&mut self, id: &str, percent: u8) -> bool {
        self.mixer.set_ambient_volume(id, percent)
    }

    /// Resumes the engine if needed, then makes `id` the sole playing melody.
    pub fn play_melody(&mut self, id: &str) -> bool {
        self.mixer.resume_if_suspended();
        self.mixer.play_melody(id)
    }

    pub fn stop_melody(&mut self, id: &str) {
        self.mixer.stop_melody(id);
    }

    /// Silences every voice and pauses the video; loaded assets stay.
    pub fn reset(&mut self) {
        self.mixer.stop_all();
        self.video.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::{wav_bytes, MemoryFetcher},
        video::tests::FakeElement,
        AudioConfig, AudioEngine,
    };

    const MANIFEST: &str = r#"{
        "dark": {
            "melodies": { "nocturne": "dark/nocturne.wav" },
            "ambients": { "rain": "dark/rain.wav" },
            "video": "dark/loop.mp4"
        },
        "light": {
            "ambients": { "birds": "light/birds.wav" }
        }
    }"#;

    fn controller() -> Controller<FakeElement> {
        controller_with(ManifestSet::from_json_str(MANIFEST).unwrap())
    }

    fn controller_with(manifests: ManifestSet) -> Controller<FakeElement> {
        let fetcher = MemoryFetcher::new()
            .with("dark/nocturne.wav", wav_bytes(&[0.1; 800], 1, 8_000))
            .with("dark/rain.wav", wav_bytes(&[0.2; 800], 1, 8_000))
            .with("light/birds.wav", wav_bytes(&[0.3; 800], 1, 8_000));
        let config = AudioConfig {
            sample_rate: 8_000,
            ..Default::default()
        };
        let mixer = Mixer::new(AudioEngine::new(8_000, 2), Box::new(fetcher), config);
        Controller::new(mixer, FakeElement::default(), manifests)
    }

    #[test]
    fn switch_loads_assets_and_video() {
        let mut controller = controller();
        let mut steps = Vec::new();
        let switch = controller
            .switch_theme(Theme::Dark, |loaded, total| steps.push((loaded, total)))
            .unwrap();

        assert_eq!(steps, vec![(1, 2), (2, 2)]);
        assert!(switch.report.is_complete());
        assert!(switch.video_playing);
        assert_eq!(controller.video().element().source.as_deref(), Some("dark/loop.mp4"));
        assert_eq!(controller.palette(), Theme::Dark.palette());
    }

    #[test]
    fn switch_tears_down_previous_theme() {
        let mut controller = controller();
        controller.switch_theme(Theme::Dark, |_, _| {});
        assert!(controller.toggle_ambient("rain"));
        assert!(controller.play_melody("nocturne"));

        let switch = controller.switch_theme(Theme::Light, |_, _| {}).unwrap();
        assert!(!switch.video_playing);
        assert!(!controller.video().is_visible());
        assert_eq!(controller.mixer().ambient_ids(), vec!["birds".to_string()]);
        assert!(controller.mixer().melody_ids().is_empty());
        assert_eq!(controller.mixer().active_melody(), None);
        assert!(controller.mixer().playing_ambients().is_empty());
        assert_eq!(controller.mixer().cache().len(), 1);
    }

    #[test]
    fn switch_to_unknown_theme_keeps_current_state() {
        let full = ManifestSet::from_json_str(MANIFEST).unwrap();
        let mut dark_only = ManifestSet::default();
        dark_only.insert(Theme::Dark, full.get(Theme::Dark).cloned().unwrap());
        let mut controller = controller_with(dark_only);
        controller.switch_theme(Theme::Dark, |_, _| {});
        assert!(controller.toggle_ambient("rain"));

        let mut called = false;
        assert!(controller
            .switch_theme(Theme::Light, |_, _| called = true)
            .is_none());
        assert!(!called);
        assert_eq!(controller.theme(), Some(Theme::Dark));
        assert_eq!(controller.palette(), Theme::Dark.palette());
        assert_eq!(controller.video().current_theme(), Some(Theme::Dark));
        assert!(controller.video().is_playing());
        assert!(controller.mixer().is_ambient_playing("rain"));
    }

    #[test]
    fn toggles_and_reset() {
        let mut controller = controller();
        controller.switch_theme(Theme::Dark, |_, _| {});

        assert!(controller.toggle_ambient("rain"));
        assert!(controller.set_ambient_volume("rain", 40));
        assert_eq!(controller.mixer().ambient_volume("rain"), Some(0.4));
        assert!(controller.play_melody("nocturne"));

        controller.reset();
        assert!(!controller.mixer().is_ambient_playing("rain"));
        assert_eq!(controller.mixer().active_melody(), None);
        assert!(!controller.video().is_playing());
        assert_eq!(controller.mixer().ambient_ids(), vec!["rain".to_string()]);
    }
}
