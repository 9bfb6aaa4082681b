use std::collections::HashMap;

use crate::{Result, Theme};

/// Host-side video element the background drives.
pub trait VideoElement {
    fn set_source(&mut self, url: &str);
    fn set_visible(&mut self, visible: bool);
    fn set_muted(&mut self, muted: bool);
    /// Attempts playback. Hosts may reject autoplay.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn set_opacity(&mut self, opacity: f32);
    fn set_playback_rate(&mut self, rate: f32);
}

const MIN_PLAYBACK_RATE: f32 = 0.25;
const MAX_PLAYBACK_RATE: f32 = 4.0;

/// Per-theme background video. A pure sink for theme changes: failures hide
/// the element instead of surfacing to the caller.
#[derive(Debug)]
pub struct VideoBackground<E> {
    element: E,
    sources: HashMap<Theme, String>,
    current: Option<Theme>,
    visible: bool,
    playing: bool,
    opacity: f32,
    playback_rate: f32,
}

impl<E: VideoElement> VideoBackground<E> {
    pub fn new(element: E) -> Self {
        Self {
            element,
            sources: HashMap::new(),
            current: None,
            visible: false,
            playing: false,
            opacity: 1.0,
            playback_rate: 1.0,
        }
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    /// Registers the video shown for `theme`, replacing any previous one.
    pub fn set_source(&mut self, theme: Theme, url: impl Into<String>) {
        self.sources.insert(theme, url.into());
    }

    pub fn source(&self, theme: Theme) -> Option<&str> {
        self.sources.get(&theme).map(String::as_str)
    }

    /// Shows the theme's video and tries muted autoplay. Returns whether the
    /// video is playing; a missing source or rejected autoplay hides it.
    pub fn load(&mut self, theme: Theme) -> bool {
        self.current = Some(theme);
        let Some(url) = self.sources.get(&theme).cloned() else {
            tracing::debug!(%theme, "no background video for theme");
            self.hide();
            return false;
        };

        self.element.set_source(&url);
        self.element.set_muted(true);
        self.element.set_opacity(self.opacity);
        self.element.set_playback_rate(self.playback_rate);
        self.element.set_visible(true);
        self.visible = true;
        self.play()
    }

    /// Resumes playback of a visible video. Returns whether it is playing.
    pub fn play(&mut self) -> bool {
        if !self.visible {
            return false;
        }
        match self.element.play() {
            Ok(()) => {
                self.playing = true;
                true
            }
            Err(err) => {
                tracing::warn!(%err, "background video playback rejected");
                self.hide();
                false
            }
        }
    }

    pub fn pause(&mut self) {
        if self.playing {
            self.element.pause();
            self.playing = false;
        }
    }

    /// Returns whether the video is playing afterwards.
    pub fn toggle(&mut self) -> bool {
        if self.playing {
            self.pause();
            false
        } else {
            self.play()
        }
    }

    /// Sets the element opacity, clamped to [0, 1].
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
        self.element.set_opacity(self.opacity);
    }

    /// Sets the playback rate, clamped to [0.25, 4].
    pub fn set_playback_rate(&mut self, rate: f32) {
        self.playback_rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        self.element.set_playback_rate(self.playback_rate);
    }

    pub fn current_theme(&self) -> Option<Theme> {
        self.current
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    fn hide(&mut self) {
        if self.playing {
            self.element.pause();
        }
        self.element.set_visible(false);
        self.visible = false;
        self.playing = false;
    }
}

/// Element that only logs what it is asked to do. Used where no video
/// surface exists, such as the terminal binary.
#[derive(Debug, Clone, Default)]
pub struct LoggingVideoElement {
    source: Option<String>,
}

impl LoggingVideoElement {
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl VideoElement for LoggingVideoElement {
    fn set_source(&mut self, url: &str) {
        tracing::info!(url, "background video source");
        self.source = Some(url.to_string());
    }

    fn set_visible(&mut self, visible: bool) {
        tracing::debug!(visible, "background video visibility");
    }

    fn set_muted(&mut self, muted: bool) {
        tracing::debug!(muted, "background video muted");
    }

    fn play(&mut self) -> Result<()> {
        tracing::debug!(source = ?self.source, "background video playing");
        Ok(())
    }

    fn pause(&mut self) {
        tracing::debug!("background video paused");
    }

    fn set_opacity(&mut self, opacity: f32) {
        tracing::debug!(opacity, "background video opacity");
    }

    fn set_playback_rate(&mut self, rate: f32) {
        tracing::debug!(rate, "background video playback rate");
    }
}
