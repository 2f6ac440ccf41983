use crate::models::error::StreamError;
use crate::models::format::{AudioFormatDescriptor, PcmChunk};

/// Streaming PCM format converter between two mono formats.
///
/// Handles sample width (i16 ↔ f32) and sample rate. Rate conversion is
/// linear interpolation evaluated at the exact rational source position
/// `k · from / to` of every output frame `k`. The context carries the last
/// input sample and the global frame counters across calls, so converting a
/// stream chunk by chunk yields exactly the samples obtained by converting the
/// concatenated stream at once: chunk boundaries add no discontinuity.
///
/// Output frames are produced as soon as both interpolation neighbours are
/// known. The cumulative output therefore trails `round(frames_in · to / from)`
/// by at most one frame until [`flush`](Self::flush) holds the last sample to
/// complete the tail.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    from: AudioFormatDescriptor,
    to: AudioFormatDescriptor,
    frames_in: u64,
    frames_out: u64,
    /// Last source sample of the previous call; global index `frames_in - 1`.
    history: Option<f32>,
}

impl ConversionContext {
    pub fn new(from: AudioFormatDescriptor, to: AudioFormatDescriptor) -> Result<Self, StreamError> {
        check_compatible(&from, &to)?;
        Ok(Self {
            from,
            to,
            frames_in: 0,
            frames_out: 0,
            history: None,
        })
    }

    pub fn source(&self) -> &AudioFormatDescriptor {
        &self.from
    }

    pub fn destination(&self) -> &AudioFormatDescriptor {
        &self.to
    }

    pub fn is_passthrough(&self) -> bool {
        self.from == self.to
    }

    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }

    /// Convert the next chunk of the stream.
    pub fn convert(&mut self, input: &PcmChunk) -> Result<PcmChunk, StreamError> {
        if input.format() != &self.from {
            return Err(StreamError::UnsupportedFormat(format!(
                "chunk is {}, converter expects {}",
                input.format(),
                self.from
            )));
        }
        if input.is_empty() {
            return Ok(PcmChunk::empty(self.to));
        }
        if self.is_passthrough() {
            let frames = input.frame_count() as u64;
            self.frames_in += frames;
            self.frames_out += frames;
            return Ok(input.clone());
        }

        let output = self.process(&input.samples());
        Ok(PcmChunk::from_samples(self.to, &output))
    }

    /// Complete the stream: emit the frames still owed to reach `round(frames_in · to / from)`.
    pub fn flush(&mut self) -> PcmChunk {
        let tail = self.flush_samples();
        PcmChunk::from_samples(self.to, &tail)
    }

    /// Convert the next run of normalized samples, appending to `output`.
    ///
    /// Same stream semantics as [`convert`](Self::convert) without building chunks.
    pub fn convert_samples(&mut self, input: &[f32], output: &mut Vec<f32>) {
        self.process_into(input, output);
    }

    /// Frames [`flush`](Self::flush) would emit right now.
    pub fn pending_frames(&self) -> u64 {
        expected_frames(self.frames_in, self.from.sample_rate, self.to.sample_rate).saturating_sub(self.frames_out)
    }

    /// Forget all stream position and interpolation state.
    pub fn reset(&mut self) {
        self.frames_in = 0;
        self.frames_out = 0;
        self.history = None;
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let estimate = input.len() as u64 * self.to.sample_rate as u64 / self.from.sample_rate as u64;
        let mut output = Vec::with_capacity(estimate as usize + 1);
        self.process_into(input, &mut output);
        output
    }

    fn process_into(&mut self, input: &[f32], output: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        if self.from.sample_rate == self.to.sample_rate {
            self.frames_in += input.len() as u64;
            self.frames_out += input.len() as u64;
            self.history = input.last().copied();
            output.extend_from_slice(input);
            return;
        }

        let from = self.from.sample_rate as u64;
        let to = self.to.sample_rate as u64;
        // Global index of the first sample addressable in this call.
        let base = match self.history {
            Some(_) => self.frames_in - 1,
            None => self.frames_in,
        };
        let last = self.frames_in + input.len() as u64 - 1;

        loop {
            let position = self.frames_out * from;
            let index = position / to;
            let remainder = position % to;
            let needed = if remainder == 0 { index } else { index + 1 };
            if needed > last {
                break;
            }

            let a = sample_at(self.history, input, base, index);
            let value = if remainder == 0 {
                a
            } else {
                let b = sample_at(self.history, input, base, index + 1);
                let fraction = (remainder as f64 / to as f64) as f32;
                a + (b - a) * fraction
            };
            output.push(value);
            self.frames_out += 1;
        }

        self.frames_in += input.len() as u64;
        self.history = input.last().copied();
    }

    fn flush_samples(&mut self) -> Vec<f32> {
        let owed = self.pending_frames();
        if owed == 0 {
            return Vec::new();
        }
        self.frames_out += owed;
        vec![self.history.unwrap_or(0.0); owed as usize]
    }
}

fn sample_at(history: Option<f32>, input: &[f32], base: u64, global: u64) -> f32 {
    let local = (global - base) as usize;
    match history {
        Some(previous) if local == 0 => previous,
        Some(_) => input[local - 1],
        None => input[local],
    }
}

/// `round(frames · to / from)`, halves rounded up.
pub fn expected_frames(frames: u64, from_rate: u32, to_rate: u32) -> u64 {
    if from_rate == to_rate || from_rate == 0 {
        return frames;
    }
    let from = from_rate as u64;
    (frames * to_rate as u64 + from / 2) / from
}

/// Verify two formats can be converted into one another.
pub fn check_compatible(from: &AudioFormatDescriptor, to: &AudioFormatDescriptor) -> Result<(), StreamError> {
    if from.channels != to.channels {
        return Err(StreamError::UnsupportedFormat(format!(
            "channel count mismatch: {} vs {}",
            from.channels, to.channels
        )));
    }
    from.validate()?;
    to.validate()?;
    Ok(())
}

/// One-shot conversion of a complete chunk.
///
/// Output frame count is exactly `round(input_frames · to / from)`.
pub fn convert(
    input: &PcmChunk,
    from: &AudioFormatDescriptor,
    to: &AudioFormatDescriptor,
) -> Result<PcmChunk, StreamError> {
    let mut context = ConversionContext::new(*from, *to)?;
    if context.is_passthrough() || input.is_empty() {
        return context.convert(input);
    }
    if input.format() != from {
        return Err(StreamError::UnsupportedFormat(format!(
            "chunk is {}, expected {}",
            input.format(),
            from
        )));
    }

    let target = expected_frames(input.frame_count() as u64, from.sample_rate, to.sample_rate) as usize;
    let mut samples = context.process(&input.samples());
    samples.extend(context.flush_samples());
    samples.truncate(target);
    Ok(PcmChunk::from_samples(*to, &samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::SampleFormat;
    use approx::assert_abs_diff_eq;

    fn float(rate: u32) -> AudioFormatDescriptor {
        AudioFormatDescriptor::new(rate, 1, SampleFormat::F32)
    }

    fn sine(rate: u32, frequency: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / rate as f32).sin())
            .collect()
    }

    fn sine_i16(rate: u32, frequency: f32, frames: usize) -> Vec<i16> {
        sine(rate, frequency, frames)
            .into_iter()
            .map(crate::models::format::f32_to_i16)
            .collect()
    }

    #[test]
    fn identity_keeps_frames_and_values() {
        for rate in [8000, 16000, 22050, 44100, 48000] {
            let wire = AudioFormatDescriptor::wire(rate);
            let input = PcmChunk::from_i16(rate, &sine_i16(rate, 440.0, 321));

            let output = convert(&input, &wire, &wire).unwrap();

            assert_eq!(output.frame_count(), 321);
            assert_eq!(output.samples_i16(), input.samples_i16());
        }
    }

    #[test]
    fn width_only_conversion_is_exact_both_ways() {
        let wire = AudioFormatDescriptor::wire(16000);
        let samples = vec![i16::MIN, -1000, -1, 0, 1, 1000, i16::MAX];
        let input = PcmChunk::from_i16(16000, &samples);

        let widened = convert(&input, &wire, &float(16000)).unwrap();
        assert_eq!(widened.format().sample_format, SampleFormat::F32);
        assert_eq!(widened.frame_count(), samples.len());

        let narrowed = convert(&widened, &float(16000), &wire).unwrap();
        assert_eq!(narrowed.samples_i16(), samples);
    }

    #[test]
    fn upsample_2x_interpolates_midpoints() {
        let input = PcmChunk::from_samples(float(24000), &[0.0, 1.0]);

        let output = convert(&input, &float(24000), &float(48000)).unwrap();

        let samples = output.samples();
        assert_eq!(samples.len(), 4);
        assert_abs_diff_eq!(samples[0], 0.0);
        assert_abs_diff_eq!(samples[1], 0.5);
        assert_abs_diff_eq!(samples[2], 1.0);
        // tail held at last sample
        assert_abs_diff_eq!(samples[3], 1.0);
    }

    #[test]
    fn output_frame_count_is_rounded_ratio() {
        let cases = [(48000, 16000, 1600, 533), (16000, 44100, 100, 276), (44100, 16000, 441, 160), (8000, 48000, 7, 42)];
        for (from, to, frames, expected) in cases {
            let input = PcmChunk::from_samples(float(from), &vec![0.25; frames]);
            let output = convert(&input, &float(from), &float(to)).unwrap();
            assert_eq!(output.frame_count(), expected, "{from} -> {to}");
        }
    }

    #[test]
    fn round_trip_integer_ratio_is_exact() {
        let wire = AudioFormatDescriptor::wire(16000);
        let samples = sine_i16(16000, 300.0, 1600);
        let input = PcmChunk::from_i16(16000, &samples);

        let up = convert(&input, &wire, &float(48000)).unwrap();
        assert_eq!(up.frame_count(), 4800);
        let back = convert(&up, &float(48000), &wire).unwrap();

        assert_eq!(back.frame_count(), 1600);
        assert_eq!(back.samples_i16(), samples);
    }

    #[test]
    fn round_trip_fractional_ratio_stays_within_bound() {
        let wire = AudioFormatDescriptor::wire(16000);
        let samples = sine_i16(16000, 200.0, 1600);
        let input = PcmChunk::from_i16(16000, &samples);

        let up = convert(&input, &wire, &float(44100)).unwrap();
        assert_eq!(up.frame_count(), 4410);
        let back = convert(&up, &float(44100), &wire).unwrap();

        assert_eq!(back.frame_count(), 1600);
        let restored = back.samples_i16();
        // The final frames read the held tail; compare the interior.
        for i in 0..1598 {
            let error = (restored[i] as i32 - samples[i] as i32).abs();
            assert!(error <= 64, "frame {i}: error {error}");
        }
    }

    #[test]
    fn chunked_stream_matches_whole_stream() {
        let input = sine(44100, 1000.0, 4410);
        let whole = {
            let mut context = ConversionContext::new(float(44100), float(16000)).unwrap();
            let mut out = context.process(&input);
            out.extend(context.flush_samples());
            out
        };

        let mut context = ConversionContext::new(float(44100), float(16000)).unwrap();
        let mut pieces = Vec::new();
        let mut offset = 0;
        for size in [1usize, 7, 480, 13, 1000, 99].iter().cycle() {
            if offset >= input.len() {
                break;
            }
            let end = (offset + size).min(input.len());
            let chunk = PcmChunk::from_samples(float(44100), &input[offset..end]);
            pieces.extend(context.convert(&chunk).unwrap().samples());
            offset = end;
        }
        pieces.extend(context.flush().samples());

        assert_eq!(pieces.len(), whole.len());
        for (a, b) in pieces.iter().zip(&whole) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn chunked_upsampling_has_no_boundary_step() {
        // A ramp stays a ramp: every step between outputs equals the slope.
        let ramp: Vec<f32> = (0..200).map(|i| i as f32 * 0.001).collect();
        let mut context = ConversionContext::new(float(16000), float(48000)).unwrap();
        let mut output = Vec::new();
        for piece in ramp.chunks(17) {
            output.extend(context.convert(&PcmChunk::from_samples(float(16000), piece)).unwrap().samples());
        }

        for pair in output.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], 0.001 / 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn streaming_count_trails_target_by_at_most_one() {
        let mut context = ConversionContext::new(float(44100), float(16000)).unwrap();
        for _ in 0..50 {
            context.convert(&PcmChunk::from_samples(float(44100), &[0.1; 441])).unwrap();
            let target = expected_frames(context.frames_in(), 44100, 16000);
            assert!(context.frames_out().abs_diff(target) <= 1);
        }
    }

    #[test]
    fn pending_frames_counts_the_held_tail() {
        let mut context = ConversionContext::new(float(16000), float(48000)).unwrap();
        let output = context.convert(&PcmChunk::from_samples(float(16000), &[0.25; 160])).unwrap();
        assert_eq!(output.frame_count(), 478);
        assert_eq!(context.pending_frames(), 2);

        assert_eq!(context.flush().frame_count(), 2);
        assert_eq!(context.pending_frames(), 0);
    }

    #[test]
    fn sample_conversion_matches_chunk_conversion() {
        let input = sine(44100, 300.0, 1000);
        let mut chunked = ConversionContext::new(float(44100), float(16000)).unwrap();
        let mut raw = ConversionContext::new(float(44100), float(16000)).unwrap();

        let mut expected = Vec::new();
        let mut output = Vec::new();
        for piece in input.chunks(256) {
            expected.extend(chunked.convert(&PcmChunk::from_samples(float(44100), piece)).unwrap().samples());
            raw.convert_samples(piece, &mut output);
        }
        assert_eq!(output, expected);
        assert_eq!(raw.frames_out(), chunked.frames_out());
    }

    #[test]
    fn deterministic_for_identical_input() {
        let input = PcmChunk::from_samples(float(22050), &sine(22050, 700.0, 900));
        let a = convert(&input, &float(22050), &AudioFormatDescriptor::wire(16000)).unwrap();
        let b = convert(&input, &float(22050), &AudioFormatDescriptor::wire(16000)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reset_restarts_stream() {
        let mut context = ConversionContext::new(float(16000), float(32000)).unwrap();
        let chunk = PcmChunk::from_samples(float(16000), &[0.0, 0.5, 1.0]);
        let first = context.convert(&chunk).unwrap();
        context.reset();
        let second = context.convert(&chunk).unwrap();
        assert_eq!(first, second);
        assert_eq!(context.frames_in(), 3);
    }

    #[test]
    fn rejects_mismatched_channels_and_zero_rate() {
        let stereo = AudioFormatDescriptor::new(48000, 2, SampleFormat::F32);
        assert!(matches!(
            ConversionContext::new(float(48000), stereo),
            Err(StreamError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ConversionContext::new(float(0), float(48000)),
            Err(StreamError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ConversionContext::new(stereo, stereo),
            Err(StreamError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn rejects_chunk_in_wrong_format() {
        let mut context = ConversionContext::new(float(48000), AudioFormatDescriptor::wire(16000)).unwrap();
        let wrong = PcmChunk::from_i16(48000, &[1, 2, 3]);
        assert!(matches!(context.convert(&wrong), Err(StreamError::UnsupportedFormat(_))));
    }

    #[test]
    fn empty_input_produces_empty_output() {
        let wire = AudioFormatDescriptor::wire(16000);
        let output = convert(&PcmChunk::empty(wire), &wire, &float(48000)).unwrap();
        assert!(output.is_empty());
        assert_eq!(output.format(), &float(48000));
    }
}
