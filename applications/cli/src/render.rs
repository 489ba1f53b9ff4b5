//! Offline rendering of a WAV file through the audio graph

use crate::error::{CliError, Result};
use moodify_audio::{AudioContext, AudioGraphService, ImpulseLoader, SettingsStore};
use std::path::Path;
use std::sync::PoisonError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Decoded interleaved stereo audio
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub sample_rate: u32,
    /// Interleaved L/R samples in -1.0..=1.0
    pub samples: Vec<f32>,
}

impl StereoBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Summary of a finished render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub frames: usize,
    pub sample_rate: u32,
    pub blocks: usize,
    /// Whether the impulse for the configured room was attached
    pub reverb_loaded: bool,
}

/// Read a WAV file as stereo f32
///
/// Mono input is duplicated to both channels; channels past the second
/// are dropped.
pub fn read_wav(path: &Path) -> Result<StereoBuffer> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 {
        return Err(CliError::InvalidArgument(format!(
            "{} has no channels",
            path.display()
        )));
    }

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mut samples = Vec::with_capacity(raw.len() / channels * 2);
    for frame in raw.chunks_exact(channels) {
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { left };
        samples.push(left);
        samples.push(right);
    }

    debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = samples.len() / 2,
        "Input decoded"
    );

    Ok(StereoBuffer {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Write interleaved stereo as 32-bit float WAV
pub fn write_wav(path: &Path, buffer: &StereoBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &buffer.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Run `input` through a freshly built graph driven by `settings`
///
/// Waits up to `settle_timeout` for the impulse response; if it has not
/// arrived by then the reverb stage renders dry.
pub async fn render_buffer(
    input: &StereoBuffer,
    settings: SettingsStore,
    loader: ImpulseLoader,
    block_frames: usize,
    settle_timeout: Duration,
) -> Result<(StereoBuffer, RenderReport)> {
    if block_frames == 0 {
        return Err(CliError::InvalidArgument(
            "block size must be at least 1 frame".to_string(),
        ));
    }

    let context = AudioContext::new(input.sample_rate).into_shared();
    let (source, destination) = {
        let mut ctx = context.lock().unwrap_or_else(PoisonError::into_inner);
        (ctx.create_source(), ctx.create_destination())
    };

    let room = settings.read(|s| s.reverb_room_size);
    let graph = AudioGraphService::new(context.clone(), settings, loader);
    graph.init(source, destination);

    if tokio::time::timeout(settle_timeout, graph.settle())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = settle_timeout.as_secs(),
            "Impulse response still loading, rendering without it"
        );
    }
    let reverb_loaded = graph.ir_cache_contains(room);

    let mut output = vec![0.0_f32; input.samples.len()];
    let mut blocks = 0;
    {
        let mut ctx = context.lock().unwrap_or_else(PoisonError::into_inner);
        for (inp, out) in input
            .samples
            .chunks(block_frames * 2)
            .zip(output.chunks_mut(block_frames * 2))
        {
            ctx.render(inp, out)?;
            blocks += 1;
        }
    }
    graph.teardown();

    let rendered = StereoBuffer {
        sample_rate: input.sample_rate,
        samples: output,
    };
    let report = RenderReport {
        frames: rendered.frames(),
        sample_rate: rendered.sample_rate,
        blocks,
        reverb_loaded,
    };
    Ok((rendered, report))
}

/// Render `input_path` into `output_path`
pub async fn render_file(
    input_path: &Path,
    output_path: &Path,
    settings: SettingsStore,
    loader: ImpulseLoader,
    block_frames: usize,
    settle_timeout: Duration,
) -> Result<RenderReport> {
    let input = read_wav(input_path)?;
    let (rendered, report) =
        render_buffer(&input, settings, loader, block_frames, settle_timeout).await?;
    write_wav(output_path, &rendered)?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        frames = report.frames,
        blocks = report.blocks,
        reverb_loaded = report.reverb_loaded,
        "Render complete"
    );
    Ok(report)
}
