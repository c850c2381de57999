// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sample decoding and caching.
//!
//! Samples are decoded entirely into memory when they are loaded so that triggering never touches
//! the disk.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("sample file {0} does not exist")]
    FileNotFound(PathBuf),

    #[error("unable to read sample file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("unsupported audio format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },
}

impl LoadError {
    fn unreadable(path: &Path, reason: impl ToString) -> LoadError {
        LoadError::Unreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn unsupported(path: &Path, reason: impl ToString) -> LoadError {
        LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// A decoded sample. The audio data is shared, so clones are cheap and a slot can swap its sample
/// while the renderer is still playing the old one.
#[derive(Clone)]
pub struct LoadedSample {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl LoadedSample {
    /// Wraps already decoded interleaved audio.
    pub fn from_interleaved(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> LoadedSample {
        LoadedSample {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in frames.
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for LoadedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSample")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frame_count())
            .finish()
    }
}

/// Identifies the on-disk version of a file a cached sample was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<FileStamp, LoadError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoadError::FileNotFound(path.to_path_buf()),
            _ => LoadError::unreadable(path, e),
        })?;
        Ok(FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

struct CachedSample {
    stamp: FileStamp,
    sample: LoadedSample,
}

/// Decodes sample files at the graph's sample rate and caches them by path.
pub struct SampleLoader {
    cache: Mutex<HashMap<PathBuf, CachedSample>>,
    /// Sample rate of the audio graph. Files at other rates are converted on load.
    target_sample_rate: u32,
}

impl SampleLoader {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            target_sample_rate,
        }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Loads a sample from a file into memory. The cached copy is reused only while the file on
    /// disk is unchanged; a changed file is decoded again and a missing one is an error.
    pub fn load(&self, path: &Path) -> Result<LoadedSample, LoadError> {
        let stamp = match FileStamp::of(path) {
            Ok(stamp) => stamp,
            Err(e) => {
                self.cache.lock().remove(path);
                return Err(e);
            }
        };
        if let Some(cached) = self.cache.lock().get(path) {
            if cached.stamp == stamp {
                debug!(path = ?path, "Using cached sample");
                return Ok(cached.sample.clone());
            }
            debug!(path = ?path, "Sample changed on disk, decoding again");
        }

        info!(path = ?path, "Loading sample into memory");
        let (samples, channel_count, source_sample_rate) = decode_file(path)?;

        let (final_samples, final_sample_rate) = if source_sample_rate != self.target_sample_rate
        {
            info!(
                source_rate = source_sample_rate,
                target_rate = self.target_sample_rate,
                "Transcoding sample"
            );
            (
                transcode_samples(
                    &samples,
                    channel_count,
                    source_sample_rate,
                    self.target_sample_rate,
                ),
                self.target_sample_rate,
            )
        } else {
            (samples, source_sample_rate)
        };

        let loaded =
            LoadedSample::from_interleaved(final_samples, channel_count, final_sample_rate);
        info!(
            path = ?path,
            channels = channel_count,
            sample_rate = final_sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded"
        );

        self.cache.lock().insert(
            path.to_path_buf(),
            CachedSample {
                stamp,
                sample: loaded.clone(),
            },
        );
        Ok(loaded)
    }

    /// Drops cached samples that nothing outside the cache holds any more. Returns how many were
    /// dropped.
    pub fn evict_unused(&self) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, cached| Arc::strong_count(&cached.sample.data) > 1);
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!(evicted, cached = cache.len(), "Evicted unused samples");
        }
        evicted
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache
            .lock()
            .values()
            .map(|cached| cached.sample.memory_size())
            .sum()
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached_samples = self.cache.lock().len();
        f.debug_struct("SampleLoader")
            .field("cached_samples", &cached_samples)
            .field("target_sample_rate", &self.target_sample_rate)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

/// Decodes the first audio track of a file into interleaved f32 samples. Returns the samples,
/// the channel count and the file's sample rate.
fn decode_file(path: &Path) -> Result<(Vec<f32>, u16, u32), LoadError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoadError::FileNotFound(path.to_path_buf()),
        _ => LoadError::unreadable(path, e),
    })?;
    if file.metadata().map(|m| m.is_dir()).unwrap_or(false) {
        return Err(LoadError::unreadable(path, "path is a directory"));
    }
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| LoadError::unsupported(path, e))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::unsupported(path, "no audio track found"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| LoadError::unsupported(path, "sample rate not specified"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| LoadError::unsupported(path, e))?;

    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(LoadError::unreadable(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Skip corrupt packets, the rest of the file may still be usable.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(SymphoniaError::Unsupported(e)) => return Err(LoadError::unsupported(path, e)),
            Err(e) => return Err(LoadError::unreadable(path, e)),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 || samples.is_empty() {
        return Err(LoadError::unreadable(path, "file contains no audio"));
    }
    Ok((samples, channels, sample_rate))
}

/// Converts interleaved samples from one sample rate to another using linear interpolation,
/// which is plenty for one-shots and loops that are triggered rather than mixed as stems.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }
    output
}
