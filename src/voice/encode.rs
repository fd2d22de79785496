//! PCM chunking and WAV encoding

use std::io::Cursor;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("WAV encoding failed: {0}")]
pub struct EncodeError(#[from] hound::Error);

/// A slice of mono PCM handed over by the capture track
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Splits the incoming sample stream into fixed-interval chunks.
///
/// Chunks leave through an mpsc channel in the order they were produced, so
/// the receiving side only ever appends.
struct ChunkAccumulator {
    interval: Duration,
    sample_rate: u32,
    chunk_len: usize,
    pending: Vec<f32>,
    next_index: usize,
    tx: mpsc::Sender<AudioChunk>,
}

impl ChunkAccumulator {
    fn emit(&mut self, samples: Vec<f32>) {
        let chunk = AudioChunk {
            index: self.next_index,
            sample_rate: self.sample_rate,
            samples,
        };
        self.next_index += 1;
        // Receiver gone means the session was dropped; nothing left to do.
        let _ = self.tx.send(chunk);
    }
}

/// Cloneable handle the audio callback writes into
#[derive(Clone)]
pub struct ChunkSink {
    inner: Arc<Mutex<ChunkAccumulator>>,
}

impl ChunkSink {
    pub fn new(interval: Duration) -> (Self, mpsc::Receiver<AudioChunk>) {
        let (tx, rx) = mpsc::channel();
        let acc = ChunkAccumulator {
            interval,
            sample_rate: 0,
            chunk_len: 0,
            pending: Vec::new(),
            next_index: 0,
            tx,
        };
        (
            Self {
                inner: Arc::new(Mutex::new(acc)),
            },
            rx,
        )
    }

    fn lock(&self) -> MutexGuard<'_, ChunkAccumulator> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Must be called by the track before it starts pushing samples
    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut acc = self.lock();
        acc.sample_rate = sample_rate;
        acc.chunk_len = chunk_len(acc.interval, sample_rate);
    }

    pub fn push(&self, samples: &[f32]) {
        let mut acc = self.lock();
        acc.pending.extend_from_slice(samples);
        let chunk_len = acc.chunk_len;
        if chunk_len == 0 {
            return;
        }
        while acc.pending.len() >= chunk_len {
            let rest = acc.pending.split_off(chunk_len);
            let full = std::mem::replace(&mut acc.pending, rest);
            acc.emit(full);
        }
    }

    /// Emit whatever is buffered as a final short chunk
    pub fn flush(&self) {
        let mut acc = self.lock();
        if !acc.pending.is_empty() {
            let rest = std::mem::take(&mut acc.pending);
            acc.emit(rest);
        }
    }
}

fn chunk_len(interval: Duration, sample_rate: u32) -> usize {
    ((sample_rate as u128 * interval.as_millis()) / 1000) as usize
}

/// Downmix interleaved frames to mono
pub fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
    if channels <= 1 {
        return data.iter().map(|&s| to_f32(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear resampling
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 * ratio;
        let idx = src_idx as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
            (Some(&a), None) => a,
            _ => 0.0,
        };
        output.push(sample);
    }

    output
}

/// Encode mono samples as 16-bit PCM WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, EncodeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(amplitude)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
