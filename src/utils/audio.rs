use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::warn;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

/// Playing time of a WAV file in seconds.
pub fn wav_duration(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

fn copy_samples<W: Write + Seek>(path: &Path, spec: WavSpec, writer: &mut WavWriter<W>) -> Result<()> {
    let mut reader = WavReader::open(path)?;
    match spec.sample_format {
        SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                writer.write_sample(sample?)?;
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                writer.write_sample(sample?)?;
            }
        }
    }
    Ok(())
}

fn write_silence<W: Write + Seek>(writer: &mut WavWriter<W>, spec: WavSpec, millis: u32) -> Result<()> {
    let frames = spec.sample_rate as u64 * millis as u64 / 1000;
    let samples = frames * spec.channels as u64;
    for _ in 0..samples {
        match spec.sample_format {
            SampleFormat::Int => writer.write_sample(0i32)?,
            SampleFormat::Float => writer.write_sample(0.0f32)?,
        }
    }
    Ok(())
}

/// Concatenates WAV files with `gap_ms` of silence between them. The first
/// readable file fixes the format; files that cannot be read or do not match
/// it are skipped. Returns how many files were joined.
pub fn concat_wavs(inputs: &[PathBuf], output: &Path, gap_ms: u32) -> Result<usize> {
    let mut readable: Vec<(&PathBuf, WavSpec)> = Vec::new();
    for path in inputs {
        match WavReader::open(path) {
            Ok(reader) => readable.push((path, reader.spec())),
            Err(e) => warn!("Skipping unreadable audio {}: {}", path.display(), e),
        }
    }
    let Some(&(_, spec)) = readable.first() else {
        return Ok(0);
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let mut joined = 0;
    for (path, file_spec) in readable {
        if file_spec != spec {
            warn!(
                "Skipping {}: format {:?} does not match {:?}",
                path.display(),
                file_spec,
                spec
            );
            continue;
        }
        if joined > 0 && gap_ms > 0 {
            write_silence(&mut writer, spec, gap_ms)?;
        }
        copy_samples(path, spec, &mut writer)
            .with_context(|| format!("Failed to copy {}", path.display()))?;
        joined += 1;
    }
    writer.finalize()?;
    Ok(joined)
}
