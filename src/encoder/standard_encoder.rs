use std::cmp;
use std::io::{self, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};
use log::{debug, trace, warn};

use crate::adx_header::{AdxEncoding, AdxHeader, AdxLoop, AdxVersion};
use crate::error::{AdxError, AdxResult};
use crate::{gen_coeffs, AdxSpec, Coefficients, LoopInfo, Prev};

/// Offset of the copyright marker in encoded streams; sample data starts
/// four bytes after it.
pub const DEFAULT_COPYRIGHT_OFFSET: u16 = 0x194;

const BLOCK_SIZE: u8 = 18;
const SAMPLE_BITDEPTH: u8 = 4;
const SAMPLES_PER_BLOCK: usize = (BLOCK_SIZE as usize - 2) * 8 / SAMPLE_BITDEPTH as usize;
const MAX_SCALE: i32 = i16::MAX as i32;

#[derive(Clone,Copy,Debug)]
struct Block {
    /// Decoder-side state at the start of this block.
    prev: Prev,
    samples: [i16; SAMPLES_PER_BLOCK],
    size: usize,
}

impl Block {
    fn new() -> Block {
        Block {
            prev: Prev::default(),
            samples: [0; SAMPLES_PER_BLOCK],
            size: 0,
        }
    }

    fn push(&mut self, sample: i16) {
        self.samples[self.size] = sample;
        self.size += 1;
    }

    fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn is_full(&self) -> bool {
        self.size == SAMPLES_PER_BLOCK
    }

    /// Residuals against a prediction driven by the source samples.
    /// Positions past `size` stay zero.
    fn residuals(&self, coeffs: Coefficients) -> [i32; SAMPLES_PER_BLOCK] {
        let mut residuals = [0; SAMPLES_PER_BLOCK];
        let mut prev = self.prev;
        for (residual, &sample) in residuals.iter_mut().zip(&self.samples[..self.size]) {
            *residual = sample as i32 - coeffs.predict(&prev);
            prev.push(sample as i32);
        }
        residuals
    }

    /// Quantizes against the state the decoder will reconstruct. Returns the
    /// nibbles and the resulting state, or the smallest scale that avoids
    /// clipping if `scale` is too small.
    fn quantize(&self, scale: i32, coeffs: Coefficients)
                -> Result<([u8; SAMPLES_PER_BLOCK], Prev), i32>
    {
        let mut nibbles = [0u8; SAMPLES_PER_BLOCK];
        let mut prev = self.prev;
        let mut needed = scale;
        for (nibble, &sample) in nibbles.iter_mut().zip(&self.samples[..self.size]) {
            let prediction = coeffs.predict(&prev);
            let residual = sample as i32 - prediction;
            needed = cmp::max(needed, scale_for(residual));

            let quantized = quantize_residual(residual, scale);
            let sample = (quantized * scale + prediction).clamp(i16::MIN as i32, i16::MAX as i32);
            prev.push(sample);
            *nibble = quantized as u8 & 0x0F;
        }

        if needed > scale && scale < MAX_SCALE {
            Err(cmp::min(needed, MAX_SCALE))
        }
        else {
            Ok((nibbles, prev))
        }
    }

    fn to_writer<W>(&mut self, mut writer: W, coeffs: Coefficients) -> io::Result<()>
        where W: Write
    {
        let residuals = self.residuals(coeffs);
        let mut scale = block_scale(&residuals);

        let (nibbles, prev) = loop {
            match self.quantize(scale, coeffs) {
                Ok(result) => break result,
                Err(larger) => {
                    trace!("scale {} clips, retrying with {}", scale, larger);
                    scale = larger;
                }
            }
        };

        writer.write_u16::<BigEndian>(scale as u16)?;
        let mut packed = [0u8; SAMPLES_PER_BLOCK / 2];
        for (byte, pair) in packed.iter_mut().zip(nibbles.chunks(2)) {
            *byte = (pair[0] << 4) | pair[1];
        }
        writer.write_all(&packed)?;

        self.prev = prev;
        self.samples = [0; SAMPLES_PER_BLOCK];
        self.size = 0;
        Ok(())
    }
}

/// Smallest scale that lets `residual` fit the [-8, 7] nibble range.
fn scale_for(residual: i32) -> i32 {
    if residual > 0 {
        (residual + 6) / 7
    }
    else {
        (-residual + 7) / 8
    }
}

/// Scale for a block of residuals, never zero.
fn block_scale(residuals: &[i32]) -> i32 {
    let max = residuals.iter().cloned().filter(|&r| r > 0).max();
    let min = residuals.iter().cloned().filter(|&r| r < 0).min();
    let scale = match (max, min) {
        (Some(max), Some(min)) => cmp::max(scale_for(max), scale_for(min)),
        (Some(max), None) => scale_for(max),
        (None, Some(min)) => scale_for(min),
        (None, None) => 0,
    };
    scale.clamp(1, MAX_SCALE)
}

fn quantize_residual(residual: i32, scale: i32) -> i32 {
    // Rounded div
    let unclipped = if residual > 0 {
        (residual + (scale >> 1)) / scale
    }
    else {
        (residual - (scale >> 1)) / scale
    };
    unclipped.clamp(-8, 7)
}

#[derive(Clone,Debug)]
struct Frame {
    blocks: Vec<Block>,
    channel: usize,
}

impl Frame {
    fn new(channels: usize) -> Frame {
        Frame {
            blocks: vec![Block::new(); channels],
            channel: 0,
        }
    }

    /// Adds one interleaved sample. Returns true when a whole sample frame
    /// (one sample per channel) has been completed.
    fn push(&mut self, sample: i16) -> bool {
        self.blocks[self.channel].push(sample);
        self.channel += 1;
        if self.channel == self.blocks.len() {
            self.channel = 0;
            true
        }
        else {
            false
        }
    }

    fn is_empty(&self) -> bool {
        self.blocks[0].is_empty()
    }

    fn is_full(&self) -> bool {
        self.blocks[0].is_full()
    }

    fn to_writer<W>(&mut self, mut writer: W, coeffs: Coefficients) -> io::Result<()>
        where W: Write
    {
        for block in self.blocks.iter_mut() {
            block.to_writer(&mut writer, coeffs)?;
        }
        Ok(())
    }
}

#[derive(Clone,Debug)]
pub struct StandardEncoder<W> {
    inner: W,
    spec: AdxSpec,
    coeffs: Coefficients,
    samples_encoded: u32,
    blocks_written: u32,
    current_frame: Frame,
}

impl<W> StandardEncoder<W>
    where W: Write + Seek
{
    /// Writes a provisional header and readies the encoder. `writer` must be
    /// positioned at the start of the output.
    pub fn new(writer: W, spec: AdxSpec) -> AdxResult<StandardEncoder<W>> {
        if spec.channels == 0 || spec.channels > 2 {
            return Err(AdxError::UnsupportedChannels(spec.channels));
        }
        if spec.sample_rate == 0 {
            return Err(AdxError::BadHeader("sample rate is zero"));
        }

        let mut encoder = StandardEncoder {
            inner: writer,
            spec: spec,
            coeffs: gen_coeffs(spec.highpass_frequency, spec.sample_rate),
            samples_encoded: 0,
            blocks_written: 0,
            current_frame: Frame::new(spec.channels as usize),
        };
        let header = encoder.header(0, spec.loop_info);
        header.to_writer(&mut encoder.inner)?;
        Ok(encoder)
    }

    /// Encodes interleaved samples, writing each block as soon as it fills.
    pub fn encode_data<I>(&mut self, samples: I) -> AdxResult<()>
        where I: IntoIterator<Item = i16>
    {
        for sample in samples {
            if self.current_frame.push(sample) {
                self.samples_encoded += 1;
                if self.current_frame.is_full() {
                    self.write_frame()?;
                }
            }
        }
        Ok(())
    }

    /// Flushes the final partial block, appends the end-of-stream block and
    /// rewrites the header with the final totals.
    pub fn finish(mut self) -> AdxResult<W> {
        if self.current_frame.channel != 0 {
            warn!("input ended mid-frame, padding {} channel(s) with silence",
                  self.spec.channels as usize - self.current_frame.channel);
            while !self.current_frame.push(0) {}
            self.samples_encoded += 1;
        }
        if !self.current_frame.is_empty() {
            self.write_frame()?;
        }

        self.inner.write_u16::<BigEndian>(0x8001)?;
        self.inner.write_u16::<BigEndian>(BLOCK_SIZE as u16 - 4)?;
        for _ in 0..(BLOCK_SIZE - 4) {
            self.inner.write_u8(0x00)?;
        }

        let loop_info = self.spec.loop_info.and_then(|li| {
            let end_sample = cmp::min(li.end_sample, self.samples_encoded);
            if end_sample != li.end_sample {
                warn!("loop end {} is past the last sample, clamping to {}",
                      li.end_sample, end_sample);
            }
            let clamped = LoopInfo::new(li.start_sample, end_sample);
            if clamped.is_none() {
                warn!("loop region is empty after clamping, disabling loop");
            }
            clamped
        });

        debug!("encoded {} samples in {} blocks", self.samples_encoded, self.blocks_written);
        let header = self.header(self.samples_encoded, loop_info);
        self.inner.seek(SeekFrom::Start(0))?;
        header.to_writer(&mut self.inner)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_frame(&mut self) -> AdxResult<()> {
        trace!("writing block {}", self.blocks_written);
        self.current_frame.to_writer(&mut self.inner, self.coeffs)?;
        self.blocks_written += 1;
        Ok(())
    }

    fn header(&self, total_samples: u32, loop_info: Option<LoopInfo>) -> AdxHeader {
        let looping = loop_info.map(|li| AdxLoop {
            enabled: true,
            begin_sample: li.start_sample,
            end_sample: li.end_sample,
            ..AdxLoop::default()
        });
        let mut header = AdxHeader {
            copyright_offset: DEFAULT_COPYRIGHT_OFFSET,
            encoding: AdxEncoding::Standard,
            block_size: BLOCK_SIZE,
            sample_bitdepth: SAMPLE_BITDEPTH,
            channel_count: self.spec.channels as u8,
            sample_rate: self.spec.sample_rate,
            total_samples: 0,
            highpass_frequency: self.spec.highpass_frequency,
            version: AdxVersion::Version3 {
                alignment_samples: 0,
                looping: looping.unwrap_or_default(),
            },
            flags: 0,
        };
        let (begin_byte, end_byte) = match looping {
            Some(looping) => (header.sample_to_byte(looping.begin_sample),
                              header.sample_to_byte(looping.end_sample)),
            None => (0, 0),
        };
        header.patch_totals(total_samples, begin_byte, end_byte);
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::adx_header::AdxHeader;
    use crate::gen_coeffs;

    #[test]
    fn constant_block() {
        let coeffs = gen_coeffs(500, 44100);
        let mut block = Block::new();
        for _ in 0..SAMPLES_PER_BLOCK {
            block.push(100);
        }
        let mut buf = Vec::new();
        block.to_writer(&mut buf, coeffs).unwrap();
        assert_eq!(buf.len(), BLOCK_SIZE as usize);
        assert_eq!(&buf[..4], &[0x00, 0x0F, 0x7A, 0x1F]);
        assert!(block.is_empty());
        assert_ne!(block.prev, Prev::default());
    }

    #[test]
    fn silent_block_has_unit_scale() {
        let coeffs = gen_coeffs(500, 44100);
        let mut block = Block::new();
        for _ in 0..SAMPLES_PER_BLOCK {
            block.push(0);
        }
        let mut buf = Vec::new();
        block.to_writer(&mut buf, coeffs).unwrap();
        assert_eq!(&buf[..2], &[0x00, 0x01]);
        assert!(buf[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn scale_bounds() {
        assert_eq!(block_scale(&[0; 4]), 1);
        assert_eq!(block_scale(&[70, -8]), 10);
        assert_eq!(block_scale(&[7, -80]), 10);
        assert_eq!(block_scale(&[-81]), 11);
        assert_eq!(block_scale(&[3, 1]), 1);
        assert_eq!(block_scale(&[8]), 2);
    }

    #[test]
    fn quantize_rounds_and_clips() {
        assert_eq!(quantize_residual(14, 4), 4);
        assert_eq!(quantize_residual(-14, 4), -4);
        assert_eq!(quantize_residual(13, 4), 3);
        assert_eq!(quantize_residual(100, 4), 7);
        assert_eq!(quantize_residual(-100, 4), -8);
        assert_eq!(quantize_residual(0, 4), 0);
    }

    #[test]
    fn partial_block_pads_with_zero_nibbles() {
        let coeffs = gen_coeffs(500, 44100);
        let mut block = Block::new();
        for _ in 0..3 {
            block.push(-500);
        }
        let mut buf = Vec::new();
        block.to_writer(&mut buf, coeffs).unwrap();
        assert_eq!(buf.len(), BLOCK_SIZE as usize);
        assert_eq!(buf[3] & 0x0F, 0);
        assert!(buf[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_three_channels() {
        let spec = AdxSpec::new(3, 44100);
        match StandardEncoder::new(Cursor::new(Vec::new()), spec) {
            Err(AdxError::UnsupportedChannels(3)) => {}
            _ => panic!("expected channel count error"),
        }
    }

    #[test]
    fn finish_patches_header() {
        let mut spec = AdxSpec::new(2, 44100);
        spec.loop_info = LoopInfo::new(40, 1000);
        let mut encoder = StandardEncoder::new(Cursor::new(Vec::new()), spec).unwrap();
        encoder.encode_data((0..200).map(|i| (i * 10) as i16)).unwrap();
        let data = encoder.finish().unwrap().into_inner();

        let header = AdxHeader::parse(&data).unwrap();
        assert_eq!(header.total_samples, 100);
        assert_eq!(header.channel_count, 2);
        assert_eq!(&data[0x192..0x198], b"(c)CRI");

        // 100 samples -> 4 blocks of 2 * 18 bytes, then the end block.
        assert_eq!(data.len(), 0x198 + 4 * 36 + 18);
        assert_eq!(&data[data.len() - 18..data.len() - 14], &[0x80, 0x01, 0x00, 0x0E]);

        let looping = header.loop_info().unwrap();
        assert_eq!(looping.begin_sample, 40);
        assert_eq!(looping.end_sample, 100);
        assert_eq!(looping.begin_byte, 0x198 + 36);
        assert_eq!(looping.end_byte, 0x198 + 3 * 36);
    }

    #[test]
    fn empty_loop_after_clamp_is_disabled() {
        let mut spec = AdxSpec::new(1, 32000);
        spec.loop_info = LoopInfo::new(50, 60);
        let mut encoder = StandardEncoder::new(Cursor::new(Vec::new()), spec).unwrap();
        encoder.encode_data(vec![1i16; 20]).unwrap();
        let data = encoder.finish().unwrap().into_inner();

        let header = AdxHeader::parse(&data).unwrap();
        assert_eq!(header.total_samples, 20);
        assert!(header.loop_info().is_none());
    }
}
