use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::StreamError;

/// Scale between normalized f32 samples and 16-bit integers.
///
/// Using 32768 (not `i16::MAX`) keeps i16 → f32 → i16 exact.
pub const I16_SCALE: f32 = 32768.0;

/// Encoding of a single PCM sample. Byte order is always little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::I16 => 16,
            Self::F32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }
}

/// Describes a PCM stream: rate, channel count and sample encoding.
///
/// Immutable once an engine is initialized; a format change requires
/// re-initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormatDescriptor {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormatDescriptor {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// The caller-facing interchange format: 16-bit signed LE mono.
    pub fn wire(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1, SampleFormat::I16)
    }

    pub fn is_wire(&self) -> bool {
        self.channels == 1 && self.sample_format == SampleFormat::I16
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.sample_format.bits_per_sample()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// Number of whole frames in `byte_len` bytes, or `None` for a partial frame.
    pub fn frames_in(&self, byte_len: usize) -> Option<usize> {
        let frame = self.bytes_per_frame();
        if frame == 0 || byte_len % frame != 0 {
            return None;
        }
        Some(byte_len / frame)
    }

    /// Frames covering `millis` of audio, rounded up.
    pub fn frames_for_millis(&self, millis: u32) -> u32 {
        let frames = (self.sample_rate as u64 * millis as u64).div_ceil(1000);
        frames as u32
    }

    /// Convert a frame count at this rate into the equivalent count at `other`'s rate, rounded up.
    pub fn rescale_frames(&self, frames: u32, other: &AudioFormatDescriptor) -> u32 {
        if self.sample_rate == 0 || self.sample_rate == other.sample_rate {
            return frames;
        }
        (frames as u64 * other.sample_rate as u64).div_ceil(self.sample_rate as u64) as u32
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.sample_rate == 0 {
            return Err(StreamError::UnsupportedFormat("sample rate must be positive".into()));
        }
        if self.channels != 1 {
            return Err(StreamError::UnsupportedFormat(format!(
                "only mono streams are supported, got {} channels",
                self.channels
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for AudioFormatDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{:?}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

/// Immutable run of interleaved PCM frames in a known format.
///
/// Storage is shared, so cloning a chunk never copies sample data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    data: Arc<[u8]>,
    format: AudioFormatDescriptor,
}

impl PcmChunk {
    /// Wrap raw little-endian bytes. Fails if `data` ends in a partial frame.
    pub fn new(format: AudioFormatDescriptor, data: Vec<u8>) -> Result<Self, StreamError> {
        if format.frames_in(data.len()).is_none() {
            return Err(StreamError::InvalidArgument(format!(
                "{} bytes is not a whole number of {}-byte frames",
                data.len(),
                format.bytes_per_frame()
            )));
        }
        Ok(Self {
            data: data.into(),
            format,
        })
    }

    pub fn empty(format: AudioFormatDescriptor) -> Self {
        Self {
            data: Arc::from(Vec::new()),
            format,
        }
    }

    /// Build a chunk from normalized samples, encoding into `format`.
    pub fn from_samples(format: AudioFormatDescriptor, samples: &[f32]) -> Self {
        Self {
            data: encode_samples(samples, format.sample_format).into(),
            format,
        }
    }

    /// Build a wire-format chunk from 16-bit samples.
    pub fn from_i16(sample_rate: u32, samples: &[i16]) -> Self {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            data: data.into(),
            format: AudioFormatDescriptor::wire(sample_rate),
        }
    }

    pub fn format(&self) -> &AudioFormatDescriptor {
        &self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.format.bytes_per_frame().max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode to normalized f32 samples.
    pub fn samples(&self) -> Vec<f32> {
        decode_samples(&self.data, self.format.sample_format)
    }

    /// Decode as 16-bit samples; f32 chunks are rounded.
    pub fn samples_i16(&self) -> Vec<i16> {
        match self.format.sample_format {
            SampleFormat::I16 => self
                .data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect(),
            SampleFormat::F32 => self.samples().into_iter().map(f32_to_i16).collect(),
        }
    }
}

/// Narrow a normalized sample to i16, rounding half away from zero and clamping.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

/// Decode little-endian PCM bytes into normalized samples. Trailing partial samples are ignored.
pub fn decode_samples(bytes: &[u8], format: SampleFormat) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / format.bytes_per_sample());
    decode_into(bytes, format, &mut samples);
    samples
}

/// [`decode_samples`] into a reused buffer; `out` is cleared first.
pub fn decode_into(bytes: &[u8], format: SampleFormat, out: &mut Vec<f32>) {
    out.clear();
    match format {
        SampleFormat::I16 => out.extend(
            bytes
                .chunks_exact(2)
                .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]]))),
        ),
        SampleFormat::F32 => out.extend(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
    }
}

/// Encode normalized samples as little-endian PCM bytes.
pub fn encode_samples(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * format.bytes_per_sample());
    encode_into(samples, format, &mut data);
    data
}

/// [`encode_samples`] into a reused buffer; `out` is cleared first.
pub fn encode_into(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    out.clear();
    match format {
        SampleFormat::I16 => {
            for &sample in samples {
                out.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for &sample in samples {
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_mono_i16() {
        let wire = AudioFormatDescriptor::wire(16000);
        assert!(wire.is_wire());
        assert_eq!(wire.bits_per_sample(), 16);
        assert_eq!(wire.bytes_per_frame(), 2);
    }

    #[test]
    fn frames_in_rejects_partial_frames() {
        let wire = AudioFormatDescriptor::wire(16000);
        assert_eq!(wire.frames_in(8), Some(4));
        assert_eq!(wire.frames_in(7), None);

        let native = AudioFormatDescriptor::new(48000, 1, SampleFormat::F32);
        assert_eq!(native.frames_in(12), Some(3));
        assert_eq!(native.frames_in(6), None);
    }

    #[test]
    fn frames_for_millis_rounds_up() {
        assert_eq!(AudioFormatDescriptor::wire(16000).frames_for_millis(20), 320);
        assert_eq!(AudioFormatDescriptor::wire(44100).frames_for_millis(10), 441);
        assert_eq!(AudioFormatDescriptor::wire(22050).frames_for_millis(1), 23);
    }

    #[test]
    fn rescale_frames_between_rates() {
        let wire = AudioFormatDescriptor::wire(16000);
        let native = AudioFormatDescriptor::new(48000, 1, SampleFormat::F32);
        assert_eq!(wire.rescale_frames(320, &native), 960);
        assert_eq!(native.rescale_frames(961, &wire), 321);
    }

    #[test]
    fn validate_rejects_zero_rate_and_stereo() {
        assert!(AudioFormatDescriptor::wire(0).validate().is_err());
        let stereo = AudioFormatDescriptor::new(48000, 2, SampleFormat::F32);
        assert!(matches!(stereo.validate(), Err(StreamError::UnsupportedFormat(_))));
        assert!(AudioFormatDescriptor::wire(8000).validate().is_ok());
    }

    #[test]
    fn chunk_rejects_partial_frame() {
        let wire = AudioFormatDescriptor::wire(16000);
        assert!(matches!(
            PcmChunk::new(wire, vec![0, 1, 2]),
            Err(StreamError::InvalidArgument(_))
        ));
        let chunk = PcmChunk::new(wire, vec![0, 1, 2, 3]).unwrap();
        assert_eq!(chunk.frame_count(), 2);
    }

    #[test]
    fn i16_samples_are_little_endian() {
        let chunk = PcmChunk::from_i16(16000, &[1, -2, 0x1234]);
        assert_eq!(chunk.as_bytes(), &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
        assert_eq!(chunk.samples_i16(), vec![1, -2, 0x1234]);
    }

    #[test]
    fn narrowing_rounds_instead_of_truncating() {
        // 0.75 LSB rounds up, 0.25 LSB rounds down
        assert_eq!(f32_to_i16(0.75 / I16_SCALE), 1);
        assert_eq!(f32_to_i16(0.25 / I16_SCALE), 0);
        assert_eq!(f32_to_i16(-0.75 / I16_SCALE), -1);
    }

    #[test]
    fn narrowing_clamps_out_of_range() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-3.0), i16::MIN);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
    }

    #[test]
    fn widening_is_lossless() {
        for value in [i16::MIN, -12345, -1, 0, 1, 12345, i16::MAX] {
            assert_eq!(f32_to_i16(i16_to_f32(value)), value);
        }
    }

    #[test]
    fn f32_chunk_round_trips_bytes() {
        let format = AudioFormatDescriptor::new(48000, 1, SampleFormat::F32);
        let chunk = PcmChunk::from_samples(format, &[0.5, -0.25]);
        assert_eq!(chunk.byte_len(), 8);
        assert_eq!(chunk.samples(), vec![0.5, -0.25]);
        assert_eq!(chunk.samples_i16(), vec![16384, -8192]);
    }

    #[test]
    fn reused_buffers_are_cleared_between_calls() {
        let mut bytes = vec![0xAA; 16];
        encode_into(&[0.5, -0.5], SampleFormat::I16, &mut bytes);
        assert_eq!(bytes, vec![0x00, 0x40, 0x00, 0xC0]);

        let mut samples = vec![9.0; 8];
        decode_into(&bytes, SampleFormat::I16, &mut samples);
        assert_eq!(samples, vec![0.5, -0.5]);
    }
}
