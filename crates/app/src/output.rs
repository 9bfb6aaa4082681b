use ambient_mixer_core::{MixerError, OutputBackend, RenderHandle, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample,
};

/// Default output device and the stream layout chosen for it.
pub struct OutputDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: SampleFormat,
}

impl OutputDevice {
    /// Opens the default device, preferring a float layout close to
    /// `sample_rate`. Integer-only devices fall back to their default layout
    /// and the mix is converted per callback. `block_size` is requested as
    /// the buffer length when the device supports it.
    pub fn default_output(sample_rate: u32, block_size: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MixerError::Playback("no audio output device found".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let float_config = device
            .supported_output_configs()
            .map_err(|err| MixerError::Playback(format!("failed to query output configs: {err}")))?
            .filter(|config| config.sample_format().is_float())
            .max_by(cpal::SupportedStreamConfigRange::cmp_default_heuristics)
            .map(|range| {
                let rate = sample_rate.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
                range.with_sample_rate(cpal::SampleRate(rate))
            });
        let supported = match float_config {
            Some(config) => config,
            None => device
                .default_output_config()
                .map_err(|err| MixerError::Playback(format!("failed to get output config: {err}")))?,
        };

        let format = supported.sample_format();
        let buffer_size = buffer_size_for(supported.buffer_size(), block_size);
        let mut config: cpal::StreamConfig = supported.into();
        config.buffer_size = buffer_size;

        tracing::info!(
            device = %name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            ?format,
            buffer = ?config.buffer_size,
            "audio output device"
        );

        Ok(Self {
            device,
            config,
            format,
        })
    }

    /// Returns the sample rate the stream will run at.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Builds a paused stream that pulls interleaved samples from `renderer`.
    pub fn open(self, renderer: RenderHandle) -> Result<CpalOutput> {
        let stream = match self.format {
            SampleFormat::F32 => self.build::<f32>(renderer),
            SampleFormat::F64 => self.build::<f64>(renderer),
            SampleFormat::I16 => self.build::<i16>(renderer),
            SampleFormat::U16 => self.build::<u16>(renderer),
            SampleFormat::I32 => self.build::<i32>(renderer),
            SampleFormat::U8 => self.build::<u8>(renderer),
            other => Err(MixerError::Playback(format!(
                "unsupported output sample format {other:?}"
            ))),
        }?;

        // Some hosts start streams on creation.
        if let Err(err) = stream.pause() {
            tracing::debug!(%err, "stream could not be paused after creation");
        }
        Ok(CpalOutput { stream })
    }

    fn build<T>(&self, renderer: RenderHandle) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut mix: Vec<f32> = Vec::new();
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Grows only when the host hands over a larger buffer.
                    mix.resize(data.len(), 0.0);
                    renderer.render(&mut mix);
                    write_converted(data, &mix);
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|err| MixerError::Playback(format!("failed to build output stream: {err}")))
    }
}

fn write_converted<T: FromSample<f32> + Sample>(data: &mut [T], mix: &[f32]) {
    for (out, sample) in data.iter_mut().zip(mix) {
        *out = T::from_sample(*sample);
    }
}

/// Requests `block_size` frames per callback when the device range allows
/// it; otherwise the host picks.
fn buffer_size_for(supported: &cpal::SupportedBufferSize, block_size: usize) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max }
            if (*min as usize..=*max as usize).contains(&block_size) =>
        {
            cpal::BufferSize::Fixed(block_size as u32)
        }
        _ => cpal::BufferSize::Default,
    }
}

/// Device stream the engine resumes and suspends.
pub struct CpalOutput {
    stream: cpal::Stream,
}

impl OutputBackend for CpalOutput {
    fn resume(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|err| MixerError::Playback(format!("failed to start output stream: {err}")))
    }

    fn suspend(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|err| MixerError::Playback(format!("failed to pause output stream: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_converts_to_integer_formats() {
        let mix = [0.0_f32, 0.5, -1.0];

        let mut signed = [1_i16; 3];
        write_converted(&mut signed, &mix);
        assert_eq!(signed[0], 0);
        assert!(signed[1] > 16_000 && signed[1] < 16_500);
        assert_eq!(signed[2], i16::MIN);

        let mut unsigned = [0_u16; 3];
        write_converted(&mut unsigned, &mix);
        assert_eq!(unsigned[0], 32_768);

        let mut wide = [0.0_f64; 3];
        write_converted(&mut wide, &mix);
        assert_eq!(wide, [0.0, 0.5, -1.0]);
    }

    #[test]
    fn block_size_within_range_is_fixed() {
        let range = cpal::SupportedBufferSize::Range { min: 64, max: 4096 };
        assert_eq!(buffer_size_for(&range, 512), cpal::BufferSize::Fixed(512));
        assert_eq!(buffer_size_for(&range, 64), cpal::BufferSize::Fixed(64));
    }

    #[test]
    fn unsupported_block_size_defers_to_host() {
        let range = cpal::SupportedBufferSize::Range { min: 256, max: 1024 };
        assert_eq!(buffer_size_for(&range, 2048), cpal::BufferSize::Default);
        assert_eq!(
            buffer_size_for(&cpal::SupportedBufferSize::Unknown, 512),
            cpal::BufferSize::Default
        );
    }
}
