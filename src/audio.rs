//! Audio plumbing for the live session. The wire format is mono PCM,
//! 16-bit signed little-endian: captured at 16 kHz, played back at 24 kHz,
//! base64-encoded per frame on the gateway stream.
//!
//! `PlaybackQueue` holds the scheduling logic on its own so the ordering and
//! barge-in invariants stay testable without a sound card; the cpal streams
//! are thin shells around it. cpal streams are not `Send` — both are created
//! and dropped on the session thread.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::live::VoiceError;

pub(crate) const INPUT_SAMPLE_RATE: u32 = 16_000;
pub(crate) const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Capture chunk duration; 40 ms keeps frames small enough for the stream
/// while staying well above scheduler jitter.
pub(crate) const CAPTURE_FRAME_MS: u32 = 40;

// ── Sample conversion ────────────────────────────────────────────────────

pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

pub(crate) fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

pub(crate) fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        samples.push(i16::from_le_bytes([chunk[0], chunk[1]]));
    }
    samples
}

pub(crate) fn encode_frame(samples: &[i16]) -> String {
    B64.encode(pcm16_to_bytes(samples))
}

pub(crate) fn decode_frame(b64: &str) -> Result<Vec<i16>, String> {
    let bytes = B64.decode(b64).map_err(|e| format!("audio frame base64: {e}"))?;
    Ok(bytes_to_pcm16(&bytes))
}

// ── Playback schedule ────────────────────────────────────────────────────

struct Segment {
    start: u64,
    samples: Vec<i16>,
}

/// Gapless sequential schedule over a sample clock. Each pushed segment
/// starts at max(end of the previous segment, current cursor), so segments
/// never overlap and never start in the past. Interruption drops everything
/// scheduled and resets the clock to zero.
pub(crate) struct PlaybackQueue {
    segments: VecDeque<Segment>,
    cursor: u64,
    next_start: u64,
}

impl PlaybackQueue {
    pub(crate) fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            cursor: 0,
            next_start: 0,
        }
    }

    /// Schedule a segment; returns its start time in samples.
    pub(crate) fn push(&mut self, samples: Vec<i16>) -> u64 {
        let start = self.next_start.max(self.cursor);
        self.next_start = start + samples.len() as u64;
        self.segments.push_back(Segment { start, samples });
        start
    }

    pub(crate) fn interrupt(&mut self) {
        self.segments.clear();
        self.cursor = 0;
        self.next_start = 0;
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.segments.is_empty()
    }

    /// Fill a device buffer from the schedule; silence outside segments.
    pub(crate) fn fill(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            *slot = self.next_sample();
        }
    }

    fn next_sample(&mut self) -> f32 {
        let t = self.cursor;
        self.cursor += 1;
        loop {
            let Some(front) = self.segments.front() else {
                return 0.0;
            };
            let end = front.start + front.samples.len() as u64;
            if t < front.start {
                return 0.0;
            }
            if t >= end {
                self.segments.pop_front();
                continue;
            }
            return front.samples[(t - front.start) as usize] as f32 / 32768.0;
        }
    }
}

// ── Capture ──────────────────────────────────────────────────────────────

/// Owns the input stream; dropping it stops capture.
pub(crate) struct CaptureHandle {
    _stream: cpal::Stream,
}

fn classify_build_error(err: cpal::BuildStreamError) -> VoiceError {
    if matches!(err, cpal::BuildStreamError::DeviceNotAvailable) {
        return VoiceError::NoInputDevice;
    }
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
        VoiceError::MicPermission(text)
    } else {
        VoiceError::Connection(text)
    }
}

/// Start streaming fixed-size 16 kHz mono frames into `tx`. Frames keep
/// flowing for as long as the handle lives; a closed receiver just drops
/// them (the session is tearing down).
pub(crate) fn start_capture(tx: mpsc::Sender<Vec<i16>>) -> Result<CaptureHandle, VoiceError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(VoiceError::NoInputDevice)?;
    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(INPUT_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let frame_len = (INPUT_SAMPLE_RATE * CAPTURE_FRAME_MS / 1000) as usize;
    let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _| {
                for &sample in data {
                    pending.push(f32_to_i16(sample));
                    if pending.len() >= frame_len {
                        let frame = std::mem::replace(
                            &mut pending,
                            Vec::with_capacity(frame_len),
                        );
                        let _ = tx.send(frame);
                    }
                }
            },
            |err| eprintln!("[audio] input stream error: {err}"),
            None,
        )
        .map_err(classify_build_error)?;
    stream
        .play()
        .map_err(|e| VoiceError::Connection(format!("input stream start: {e}")))?;
    Ok(CaptureHandle { _stream: stream })
}

// ── Playback ─────────────────────────────────────────────────────────────

/// Owns the output stream and its schedule; dropping it stops playback.
pub(crate) struct Player {
    queue: Arc<Mutex<PlaybackQueue>>,
    _stream: cpal::Stream,
}

impl Player {
    pub(crate) fn new() -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VoiceError::Connection("no output audio device".into()))?;
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(OUTPUT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::new(Mutex::new(PlaybackQueue::new()));
        let cb_queue = Arc::clone(&queue);
        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _| {
                    let mut queue = match cb_queue.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    queue.fill(out);
                },
                |err| eprintln!("[audio] output stream error: {err}"),
                None,
            )
            .map_err(|e| VoiceError::Connection(format!("output stream: {e}")))?;
        stream
            .play()
            .map_err(|e| VoiceError::Connection(format!("output stream start: {e}")))?;
        Ok(Self { queue, _stream: stream })
    }

    pub(crate) fn enqueue(&self, samples: Vec<i16>) {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push(samples);
    }

    pub(crate) fn interrupt(&self) {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.interrupt();
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_byte_roundtrip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345];
        assert_eq!(bytes_to_pcm16(&pcm16_to_bytes(&samples)), samples);
    }

    #[test]
    fn test_frame_encode_decode_roundtrip() {
        let samples = vec![100i16, -200, 300];
        let decoded = decode_frame(&encode_frame(&samples)).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_decode_frame_rejects_bad_base64() {
        assert!(decode_frame("not base64 !!!").is_err());
    }

    #[test]
    fn test_schedule_is_sequential_and_gapless() {
        let mut queue = PlaybackQueue::new();
        let a = queue.push(vec![0; 100]);
        let b = queue.push(vec![0; 50]);
        let c = queue.push(vec![0; 75]);
        assert_eq!(a, 0);
        assert!(b >= a + 100);
        assert!(c >= b + 50);
    }

    #[test]
    fn test_schedule_never_starts_in_the_past() {
        let mut queue = PlaybackQueue::new();
        queue.push(vec![0; 10]);
        // play past the end of the first segment
        let mut out = [0.0f32; 40];
        queue.fill(&mut out);
        let late = queue.push(vec![0; 10]);
        assert!(late >= 40);
    }

    #[test]
    fn test_interrupt_flushes_and_resets_clock() {
        let mut queue = PlaybackQueue::new();
        queue.push(vec![1000; 100]);
        queue.push(vec![1000; 100]);
        let mut out = [0.0f32; 30];
        queue.fill(&mut out);
        assert!(out.iter().any(|&s| s != 0.0));

        queue.interrupt();
        assert!(queue.is_idle());
        // a segment scheduled after barge-in starts at relative time zero
        assert_eq!(queue.push(vec![1000; 10]), 0);
    }

    #[test]
    fn test_fill_is_silent_when_idle() {
        let mut queue = PlaybackQueue::new();
        let mut out = [1.0f32; 16];
        queue.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
