use std::cmp;
use std::io::{Read, Seek, SeekFrom};

use log::{debug, trace};

use crate::adx_bytes::AdxBytes;
use crate::adx_header::AdxHeader;
use crate::decoder::Decoder;
use crate::error::{AdxError, AdxResult};
use crate::{gen_coeffs, Coefficients, LoopInfo, Prev};

/// Scale value marking the end-of-stream block.
const END_OF_STREAM_SCALE: u16 = 0x8001;

pub struct StandardDecoder<S> {
    inner: S,
    header: AdxHeader,
    coeffs: Coefficients,
    prev: Vec<Prev>,
    block: Vec<u8>,
    samples: Vec<i16>,
    block_index: u32,
    current_sample: u32,
}

impl<S> StandardDecoder<S>
    where S: Read + Seek
{
    pub fn from_header(header: AdxHeader, inner: S) -> AdxResult<StandardDecoder<S>> {
        header.validate()?;
        let coeffs = gen_coeffs(header.highpass_frequency, header.sample_rate);
        let channels = header.channel_count as usize;
        let samples_per_block = header.samples_per_block() as usize;

        Ok(StandardDecoder {
            inner: inner,
            coeffs: coeffs,
            prev: vec![Prev::default(); channels],
            block: Vec::with_capacity(header.frame_size()),
            samples: vec![0; samples_per_block * channels],
            block_index: 0,
            current_sample: 0,
            header: header,
        })
    }

    pub fn header(&self) -> &AdxHeader {
        &self.header
    }

    fn read_block(&mut self) -> AdxResult<()> {
        let offset = self.header.block_offset(self.block_index);
        let frame_size = self.header.frame_size();
        self.inner.seek(SeekFrom::Start(offset))?;
        self.block.clear();
        (&mut self.inner).take(frame_size as u64).read_to_end(&mut self.block)?;
        if self.block.len() < frame_size {
            return Err(AdxError::Truncated {
                expected: frame_size,
                actual: self.block.len(),
            });
        }
        Ok(())
    }
}

impl<S> Decoder for StandardDecoder<S>
    where S: Read + Seek
{
    fn channels(&self) -> u32 {
        self.header.channel_count as u32
    }

    fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    fn loop_info(&self) -> Option<LoopInfo> {
        self.header.loop_info().map(|looping| LoopInfo {
            start_sample: looping.begin_sample,
            end_sample: looping.end_sample,
        })
    }

    fn next_frame(&mut self) -> AdxResult<Option<&[i16]>> {
        if self.current_sample >= self.header.total_samples {
            return Ok(None);
        }

        self.read_block()?;
        if self.block.u16_at(0) == END_OF_STREAM_SCALE {
            return Err(AdxError::EarlyEndOfStream {
                decoded: self.current_sample,
                expected: self.header.total_samples,
            });
        }

        let count = cmp::min(self.header.samples_per_block(),
                             self.header.total_samples - self.current_sample) as usize;
        trace!("decoding block {} ({} samples)", self.block_index, count);
        decode_block(&self.block, self.header.block_size as usize, self.coeffs,
                     &mut self.prev, &mut self.samples, count);

        self.block_index += 1;
        self.current_sample += count as u32;
        if self.current_sample == self.header.total_samples {
            debug!("decoded {} samples in {} blocks", self.current_sample, self.block_index);
        }

        let channels = self.prev.len();
        Ok(Some(&self.samples[..count * channels]))
    }
}

/// Decodes the first `count` samples of every channel in `block` into
/// `out`, interleaved in channel order.
pub(crate) fn decode_block(block: &[u8], block_size: usize, coeffs: Coefficients,
                           prev: &mut [Prev], out: &mut [i16], count: usize) {
    let channels = prev.len();
    for (channel, prev) in prev.iter_mut().enumerate() {
        let segment = &block[channel * block_size..(channel + 1) * block_size];
        let scale = segment.u16_at(0) as i32;

        for sample_idx in 0..count {
            let byte = segment[2 + sample_idx / 2];
            let nibble = if sample_idx % 2 == 0 { byte >> 4 } else { byte & 0x0F };

            let delta = sign_extend(nibble) * scale;
            let unclamped_sample = delta + coeffs.predict(prev);
            let sample = unclamped_sample.clamp(i16::MIN as i32, i16::MAX as i32);

            prev.push(sample);
            out[sample_idx * channels + channel] = sample as i16;
        }
    }
}

/// Sign extends a 4-bit two's complement value.
pub(crate) fn sign_extend(nibble: u8) -> i32 {
    (((nibble << 4) as i8) >> 4) as i32
}
