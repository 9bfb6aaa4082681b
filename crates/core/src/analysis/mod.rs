use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AudioConfig, graph::SharedGraph, MixerError, Result};

/// Byte-scaled magnitudes for every frequency bin of the analysis window.
///
/// The buffer is refreshed in place by [`FrequencyAnalyzer::sample`]; callers
/// must re-sample every frame instead of holding on to old values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencySnapshot {
    bins: Vec<u8>,
}

impl FrequencySnapshot {
    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Mean magnitude across all bins, in the 0-255 range.
    pub fn average(&self) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.bins.iter().map(|&value| value as u32).sum();
        sum as f32 / self.bins.len() as f32
    }

    /// Average magnitude normalised to [0, 1].
    pub fn intensity(&self) -> f32 {
        self.average() / 255.0
    }
}

impl From<Vec<u8>> for FrequencySnapshot {
    fn from(bins: Vec<u8>) -> Self {
        Self { bins }
    }
}

/// Tap on the mixed signal. Keeps the most recent `fft_size` samples and turns
/// them into smoothed decibel magnitudes on request. The audible signal passes
/// through untouched.
pub struct AnalysisStage {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    history: Vec<f32>,
    write_index: usize,
    smoothed: Vec<f32>,
    window: Vec<f32>,
    fft: FftResources,
}

impl AnalysisStage {
    /// Creates a stage with an empty history and a planned FFT of
    /// `config.fft_size` points.
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size;
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Self {
            fft_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            history: vec![0.0; fft_size],
            write_index: 0,
            smoothed: vec![0.0; fft_size / 2],
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            fft,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins exposed to consumers.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Appends mixed samples to the analysis history.
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.history[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.fft_size;
        }
    }

    /// Runs the FFT over the current history and writes byte magnitudes into
    /// `out`, which must hold exactly [`Self::bin_count`] entries.
    pub fn fill_byte_frequency(&mut self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.bin_count() {
            return Err(MixerError::InvalidInput(
                "snapshot length does not match the analysis bin count",
            ));
        }

        let oldest = self.write_index;
        for i in 0..self.fft_size {
            let sample = self.history[(oldest + i) % self.fft_size];
            self.fft.input[i] = sample * self.window[i];
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for (bin, slot) in out.iter_mut().enumerate() {
            let magnitude = self.fft.spectrum[bin].norm() * scale;
            let smoothed =
                self.smoothing * self.smoothed[bin] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[bin] = if smoothed.is_finite() { smoothed } else { 0.0 };

            *slot = if self.smoothed[bin] <= 0.0 {
                0
            } else {
                let decibels = 20.0 * self.smoothed[bin].log10();
                let scaled = 255.0 * (decibels - self.min_decibels) / range;
                scaled.clamp(0.0, 255.0) as u8
            };
        }

        Ok(())
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisStage")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

/// Read side of the shared analysis stage, polled once per rendered frame.
pub struct FrequencyAnalyzer {
    graph: SharedGraph,
    snapshot: FrequencySnapshot,
}

impl FrequencyAnalyzer {
    pub(crate) fn new(graph: SharedGraph) -> Self {
        Self {
            graph,
            snapshot: FrequencySnapshot::default(),
        }
    }

    /// Refreshes and returns the current snapshot, or `None` while the mix
    /// graph has not been initialised.
    pub fn sample(&mut self) -> Option<&FrequencySnapshot> {
        let mut graph = match self.graph.lock() {
            Ok(graph) => graph,
            Err(_) => {
                tracing::error!("mix graph has been poisoned; skipping analysis");
                return None;
            }
        };
        let stage = graph.analysis_mut()?;

        // Only grows on the first call after initialisation.
        self.snapshot.bins.resize(stage.bin_count(), 0);
        if let Err(err) = stage.fill_byte_frequency(&mut self.snapshot.bins) {
            tracing::warn!(%err, "frequency analysis failed");
            return None;
        }
        drop(graph);

        Some(&self.snapshot)
    }
}

impl fmt::Debug for FrequencyAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyAnalyzer")
            .field("bins", &self.snapshot.len())
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let ratio = index as f32 / len as f32;
    0.42 - 0.5 * (2.0 * PI * ratio).cos() + 0.08 * (4.0 * PI * ratio).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> AnalysisStage {
        AnalysisStage::new(&AudioConfig {
            sample_rate: 8_000,
            smoothing: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn exposes_half_the_window_as_bins() {
        let stage = stage();
        assert_eq!(stage.fft_size(), 256);
        assert_eq!(stage.bin_count(), 128);
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut stage = stage();
        stage.push(&[0.0; 256]);
        let mut out = vec![255u8; 128];
        stage.fill_byte_frequency(&mut out).unwrap();
        assert!(out.iter().all(|&value| value == 0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut stage = stage();
        // 1 kHz at 8 kHz lands exactly on bin 32 of a 256-point window.
        let tone: Vec<f32> = (0..256)
            .map(|i| (2.0 * PI * 1_000.0 * i as f32 / 8_000.0).sin())
            .collect();
        stage.push(&tone);

        let mut out = vec![0u8; 128];
        stage.fill_byte_frequency(&mut out).unwrap();

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, &value)| value)
            .map(|(index, _)| index)
            .unwrap();
        assert!((31..=33).contains(&peak), "peak at bin {peak}");
        assert!(out[peak] > 200);
    }

    #[test]
    fn rejects_mismatched_output() {
        let mut stage = stage();
        let mut out = vec![0u8; 64];
        assert!(stage.fill_byte_frequency(&mut out).is_err());
    }

    #[test]
    fn snapshot_reports_intensity() {
        let snapshot = FrequencySnapshot::from(vec![0, 255, 255, 0]);
        assert_eq!(snapshot.len(), 4);
        assert!((snapshot.average() - 127.5).abs() < f32::EPSILON);
        assert!((snapshot.intensity() - 0.5).abs() < f32::EPSILON);
        assert_eq!(FrequencySnapshot::default().intensity(), 0.0);
    }
}
