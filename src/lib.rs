pub mod adx_header;
mod adx_bytes;
pub mod decoder;
pub mod encoder;
pub mod error;

use std::cmp;
use std::f64;
use std::io::{Cursor, Read, Seek};

use log::debug;

use adx_header::AdxHeader;
use decoder::{Decoder, StandardDecoder};
use encoder::StandardEncoder;
use error::AdxResult;

/// Highpass cutoff used when the caller does not pick one.
pub const DEFAULT_HIGHPASS_FREQ: u16 = 500;

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct LoopInfo {
    pub start_sample: u32,
    pub end_sample: u32,
}

impl LoopInfo {
    /// Returns a loop only when `start_sample < end_sample`.
    pub fn new(start_sample: u32, end_sample: u32) -> Option<LoopInfo> {
        if start_sample < end_sample {
            Some(LoopInfo {
                start_sample: start_sample,
                end_sample: end_sample,
            })
        }
        else {
            None
        }
    }
}

/// Encoding parameters supplied by the caller.
#[derive(Clone,Copy,Debug)]
pub struct AdxSpec {
    pub channels: u32,
    pub sample_rate: u32,
    pub highpass_frequency: u16,
    pub loop_info: Option<LoopInfo>,
}

impl AdxSpec {
    pub fn new(channels: u32, sample_rate: u32) -> AdxSpec {
        AdxSpec {
            channels: channels,
            sample_rate: sample_rate,
            highpass_frequency: DEFAULT_HIGHPASS_FREQ,
            loop_info: None,
        }
    }
}

/// Two most recent samples of one channel.
#[derive(Clone,Copy,Debug,Default,PartialEq,Eq)]
pub struct Prev {
    pub first: i32,
    pub second: i32,
}

impl Prev {
    pub fn push(&mut self, sample: i32) {
        self.second = self.first;
        self.first = sample;
    }
}

/// Second-order predictor coefficients.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct Coefficients {
    pub first: f64,
    pub second: f64,
}

impl Coefficients {
    pub fn predict(&self, prev: &Prev) -> i32 {
        (self.first * prev.first as f64 + self.second * prev.second as f64).round() as i32
    }
}

pub fn gen_coeffs(highpass_frequency: u16, sample_rate: u32) -> Coefficients {
    let highpass_samples = highpass_frequency as f64 / sample_rate as f64;
    let a = f64::consts::SQRT_2 - (2.0 * f64::consts::PI * highpass_samples).cos();
    let b = f64::consts::SQRT_2 - 1.0;
    // Rounding can push this just below zero when the cutoff is tiny.
    let c = (a - ((a + b) * (a - b)).max(0.0).sqrt()) / b;

    let coeffs = Coefficients {
        first: c * 2.0,
        second: -(c * c),
    };
    debug!("coefficients for {} Hz at {} Hz: {:?}", highpass_frequency, sample_rate, coeffs);
    coeffs
}

/// Reads the header and prepares a decoder positioned at the first block.
pub fn from_reader<R>(mut reader: R) -> AdxResult<StandardDecoder<R>>
    where R: Read + Seek
{
    let header = AdxHeader::read_header(&mut reader)?;
    StandardDecoder::from_header(header, reader)
}

/// Decodes a whole ADX stream to interleaved 16-bit PCM.
pub fn decode(adx: &[u8]) -> AdxResult<(AdxHeader, Vec<i16>)> {
    let mut decoder = from_reader(Cursor::new(adx))?;
    let header = decoder.header();
    // total_samples is untrusted; never reserve more than the data can hold.
    let blocks_present = (adx.len() as u64).saturating_sub(header.data_offset()) / header.frame_size() as u64;
    let capacity = cmp::min(header.total_samples as u64,
                            blocks_present * header.samples_per_block() as u64);
    let mut samples = Vec::with_capacity(capacity as usize * header.channel_count as usize);
    decoder.decode_into(&mut samples)?;
    Ok((decoder.header().clone(), samples))
}

/// Encodes interleaved 16-bit PCM to a complete ADX stream.
pub fn encode(samples: &[i16], spec: AdxSpec) -> AdxResult<Vec<u8>> {
    let mut encoder = StandardEncoder::new(Cursor::new(Vec::new()), spec)?;
    encoder.encode_data(samples.iter().cloned())?;
    Ok(encoder.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_coefficients() {
        // 4.12 fixed-point values commonly quoted for 500 Hz at 44.1 kHz.
        let coeffs = gen_coeffs(500, 44100);
        assert_eq!((coeffs.first * 4096.0).round() as i32, 7334);
        assert_eq!((coeffs.second * 4096.0).round() as i32, -3283);
    }

    #[test]
    fn zero_cutoff_is_finite() {
        let coeffs = gen_coeffs(0, 44100);
        assert!((coeffs.first - 2.0).abs() < 1e-9);
        assert!((coeffs.second + 1.0).abs() < 1e-9);
    }

    #[test]
    fn predict_rounds() {
        let coeffs = Coefficients { first: 0.5, second: 0.0 };
        let mut prev = Prev::default();
        prev.push(3);
        assert_eq!(coeffs.predict(&prev), 2);
        prev.push(-3);
        assert_eq!(prev, Prev { first: -3, second: 3 });
        assert_eq!(coeffs.predict(&prev), -2);
    }

    #[test]
    fn loop_needs_ordered_bounds() {
        assert!(LoopInfo::new(10, 10).is_none());
        assert!(LoopInfo::new(11, 10).is_none());
        assert_eq!(LoopInfo::new(0, 10), Some(LoopInfo { start_sample: 0, end_sample: 10 }));
    }
}
