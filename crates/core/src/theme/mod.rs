use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{render::Rgba, Mixer, MixerError, Result};

/// Visual and sonic bundle the whole app switches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub const ALL: [Theme; 2] = [Theme::Light, Theme::Dark];

    pub fn name(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Self::Light => Palette {
                background: Rgba::rgb(245, 240, 230),
                primary: Rgba::rgb(255, 153, 102),
                secondary: Rgba::rgb(255, 204, 128),
                accent: Rgba::rgb(120, 180, 220),
            },
            Self::Dark => Palette {
                background: Rgba::rgb(12, 14, 28),
                primary: Rgba::rgb(100, 149, 237),
                secondary: Rgba::rgb(147, 112, 219),
                accent: Rgba::rgb(72, 209, 204),
            },
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Theme {
    type Err = MixerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(MixerError::msg(format!("unknown theme `{s}`"))),
        }
    }
}

/// Colours the visualiser tints its output with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgba,
    pub primary: Rgba,
    pub secondary: Rgba,
    pub accent: Rgba,
}

impl Default for Palette {
    fn default() -> Self {
        Theme::Dark.palette()
    }
}

/// Assets for a single theme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeManifest {
    pub melodies: BTreeMap<String, String>,
    pub ambients: BTreeMap<String, String>,
    pub video: Option<String>,
}

impl ThemeManifest {
    /// Returns the number of audio assets, the total used for progress.
    pub fn asset_count(&self) -> usize {
        self.melodies.len() + self.ambients.len()
    }
}

/// All theme manifests, as published next to the audio files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestSet {
    themes: BTreeMap<Theme, ThemeManifest>,
}

impl ManifestSet {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn insert(&mut self, theme: Theme, manifest: ThemeManifest) {
        self.themes.insert(theme, manifest);
    }

    /// Returns the manifest for `theme`, if the set has one.
    pub fn get(&self, theme: Theme) -> Option<&ThemeManifest> {
        self.themes.get(&theme)
    }

    pub fn themes(&self) -> impl Iterator<Item = (Theme, &ThemeManifest)> {
        self.themes.iter().map(|(theme, manifest)| (*theme, manifest))
    }
}

/// Outcome of loading one theme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub total: usize,
    pub failed: Vec<String>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.loaded == self.total
    }
}

/// Loads every asset of `theme` into the mixer one at a time, melodies
/// first. `progress` sees `(loaded, total)` after each attempt, where
/// `loaded` only counts successes; `complete` fires once at the end. A theme
/// missing from the manifest set loads nothing and fires neither callback.
pub fn load_theme(
    mixer: &mut Mixer,
    manifests: &ManifestSet,
    theme: Theme,
    mut progress: impl FnMut(usize, usize),
    complete: impl FnOnce(&LoadReport),
) -> Option<LoadReport> {
    let Some(manifest) = manifests.get(theme) else {
        tracing::warn!(%theme, "no manifest for theme");
        return None;
    };

    let mut report = LoadReport {
        total: manifest.asset_count(),
        ..Default::default()
    };
    tracing::info!(%theme, total = report.total, "loading theme assets");

    for (id, location) in &manifest.melodies {
        if mixer.load_melody(id, location) {
            report.loaded += 1;
        } else {
            report.failed.push(id.clone());
        }
        progress(report.loaded, report.total);
    }
    for (id, location) in &manifest.ambients {
        if mixer.load_ambient(id, location, true) {
            report.loaded += 1;
        } else {
            report.failed.push(id.clone());
        }
        progress(report.loaded, report.total);
    }

    tracing::info!(
        %theme,
        loaded = report.loaded,
        failed = report.failed.len(),
        "theme assets loaded"
    );
    complete(&report);
    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::{wav_bytes, MemoryFetcher},
        AudioConfig, AudioEngine,
    };

    const MANIFEST: &str = r#"{
        "dark": {
            "melodies": { "nocturne": "dark/nocturne.wav" },
            "ambients": { "rain": "dark/rain.wav", "thunder": "dark/missing.wav" },
            "video": "dark/loop.mp4"
        },
        "light": {
            "ambients": { "birds": "light/birds.wav" }
        }
    }"#;

    fn mixer() -> Mixer {
        let fetcher = MemoryFetcher::new()
            .with("dark/nocturne.wav", wav_bytes(&[0.1; 800], 1, 8_000))
            .with("dark/rain.wav", wav_bytes(&[0.2; 800], 1, 8_000))
            .with("light/birds.wav", wav_bytes(&[0.3; 800], 1, 8_000));
        let config = AudioConfig {
            sample_rate: 8_000,
            ..Default::default()
        };
        Mixer::new(AudioEngine::new(8_000, 2), Box::new(fetcher), config)
    }

    #[test]
    fn parses_manifest_set() {
        let set = ManifestSet::from_json_str(MANIFEST).unwrap();
        let dark = set.get(Theme::Dark).unwrap();
        assert_eq!(dark.asset_count(), 3);
        assert_eq!(dark.video.as_deref(), Some("dark/loop.mp4"));
        let light = set.get(Theme::Light).unwrap();
        assert!(light.melodies.is_empty());
        assert!(light.video.is_none());
    }

    #[test]
    fn reports_progress_sequentially() {
        let set = ManifestSet::from_json_str(MANIFEST).unwrap();
        let mut mixer = mixer();
        let mut calls = Vec::new();
        let mut completions = 0;

        let report = load_theme(
            &mut mixer,
            &set,
            Theme::Dark,
            |loaded, total| calls.push((loaded, total)),
            |_| completions += 1,
        )
        .unwrap();

        // Melodies first, then ambients in id order; the failed one does not count.
        assert_eq!(calls, vec![(1, 3), (2, 3), (2, 3)]);
        assert_eq!(completions, 1);
        assert_eq!(report.failed, vec!["thunder".to_string()]);
        assert!(!report.is_complete());
        assert_eq!(mixer.melody_ids(), vec!["nocturne".to_string()]);
        assert_eq!(mixer.ambient_ids(), vec!["rain".to_string()]);
    }

    #[test]
    fn missing_theme_is_a_no_op() {
        let mut set = ManifestSet::default();
        set.insert(Theme::Light, ThemeManifest::default());
        let mut mixer = mixer();
        let mut called = false;

        let report = load_theme(&mut mixer, &set, Theme::Dark, |_, _| called = true, |_| {});
        assert!(report.is_none());
        assert!(!called);
    }

    #[test]
    fn theme_names_round_trip_through_from_str() {
        for theme in Theme::ALL {
            assert_eq!(theme.name().parse::<Theme>().unwrap(), theme);
        }
        assert!("sepia".parse::<Theme>().is_err());
        assert_ne!(Theme::Light.palette(), Theme::Dark.palette());
    }
}
