pub mod standard_decoder;

pub use self::standard_decoder::StandardDecoder;

use std::io::{Seek, Write};

use hound::WavWriter;

use crate::error::AdxResult;
use crate::LoopInfo;

/// Destination for decoded PCM, one interleaved block at a time.
pub trait PcmSink {
    fn write_frame(&mut self, samples: &[i16]) -> AdxResult<()>;
}

impl PcmSink for Vec<i16> {
    fn write_frame(&mut self, samples: &[i16]) -> AdxResult<()> {
        self.extend_from_slice(samples);
        Ok(())
    }
}

impl<W> PcmSink for WavWriter<W>
    where W: Write + Seek
{
    fn write_frame(&mut self, samples: &[i16]) -> AdxResult<()> {
        for &sample in samples {
            self.write_sample(sample)?;
        }
        Ok(())
    }
}

pub trait Decoder {
    fn channels(&self) -> u32;
    fn sample_rate(&self) -> u32;
    fn loop_info(&self) -> Option<LoopInfo>;

    /// Decodes the next block. Returns `None` once every sample has been
    /// produced.
    fn next_frame(&mut self) -> AdxResult<Option<&[i16]>>;

    fn decode_into<K>(&mut self, sink: &mut K) -> AdxResult<()>
        where K: PcmSink,
              Self: Sized
    {
        while let Some(frame) = self.next_frame()? {
            sink.write_frame(frame)?;
        }
        Ok(())
    }
}
