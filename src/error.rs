use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdxError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("bad adx magic value: {0:#06x}")]
    BadMagic(u16),
    #[error("truncated adx data: expected {expected} bytes, got {actual}")]
    Truncated {
        expected: usize,
        actual: usize,
    },
    #[error("end-of-stream block at sample {decoded}, header declares {expected}")]
    EarlyEndOfStream {
        decoded: u32,
        expected: u32,
    },
    #[error("bad adx header: {0}")]
    BadHeader(&'static str),
    #[error("unsupported adx encoding type: {0:#04x}")]
    UnsupportedEncoding(u8),
    #[error("unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannels(u32),
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

pub type AdxResult<T> = Result<T, AdxError>;
