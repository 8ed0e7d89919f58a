use std::io::{Read, Write};

use log::{debug, warn};

use crate::adx_bytes::AdxBytes;
use crate::error::{AdxError, AdxResult};

const ADX_MAGIC: u16 = 0x8000;
const ADX_COPYRIGHT: &[u8; 6] = b"(c)CRI";

/// Length of the fixed-layout header fields.
pub const ADX_HEADER_LEN: usize = 0x40;
/// Smallest copyright offset that keeps the sample data clear of the
/// header fields.
pub const MIN_COPYRIGHT_OFFSET: u16 = (ADX_HEADER_LEN - 4) as u16;

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum AdxEncoding {
    /// Fixed-coefficient 4-bit ADPCM.
    Standard,
    Other(u8),
}

impl From<u8> for AdxEncoding {
    fn from(val: u8) -> AdxEncoding {
        match val {
            0x03 => AdxEncoding::Standard,
            other => AdxEncoding::Other(other),
        }
    }
}

impl From<AdxEncoding> for u8 {
    fn from(val: AdxEncoding) -> u8 {
        match val {
            AdxEncoding::Standard => 0x03,
            AdxEncoding::Other(other) => other,
        }
    }
}

/// Loop region as stored in the header.
#[derive(Clone,Copy,Debug,Default,PartialEq,Eq)]
pub struct AdxLoop {
    pub enabled: bool,
    pub begin_sample: u32,
    pub begin_byte: u32,
    pub end_sample: u32,
    pub end_byte: u32,
}

impl AdxLoop {
    fn read(bytes: &[u8], offset: usize) -> AdxLoop {
        AdxLoop {
            enabled: bytes.u32_at(offset) == 1,
            begin_sample: bytes.u32_at(offset + 0x04),
            begin_byte: bytes.u32_at(offset + 0x08),
            end_sample: bytes.u32_at(offset + 0x0C),
            end_byte: bytes.u32_at(offset + 0x10),
        }
    }

    fn write(&self, bytes: &mut [u8], offset: usize) {
        bytes.put_u32_at(offset, self.enabled as u32);
        bytes.put_u32_at(offset + 0x04, self.begin_sample);
        bytes.put_u32_at(offset + 0x08, self.begin_byte);
        bytes.put_u32_at(offset + 0x0C, self.end_sample);
        bytes.put_u32_at(offset + 0x10, self.end_byte);
    }
}

/// Header version. Each supported version carries its own loop layout.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum AdxVersion {
    Version3 {
        alignment_samples: u16,
        looping: AdxLoop,
    },
    Version4(AdxLoop),
    /// Any other version byte. Loop fields are not read.
    Other(u8),
}

impl From<AdxVersion> for u8 {
    fn from(val: AdxVersion) -> u8 {
        match val {
            AdxVersion::Version3 { .. } => 0x03,
            AdxVersion::Version4(_) => 0x04,
            AdxVersion::Other(other) => other,
        }
    }
}

#[derive(Clone,Debug,PartialEq,Eq)]
pub struct AdxHeader {
    pub copyright_offset: u16,
    pub encoding: AdxEncoding,
    pub block_size: u8,
    pub sample_bitdepth: u8,
    pub channel_count: u8,
    pub sample_rate: u32,
    pub total_samples: u32,
    pub highpass_frequency: u16,
    pub version: AdxVersion,
    pub flags: u8,
}

impl AdxHeader {
    /// Parses the first `ADX_HEADER_LEN` bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> AdxResult<AdxHeader> {
        if bytes.len() < ADX_HEADER_LEN {
            return Err(AdxError::Truncated {
                expected: ADX_HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let magic = bytes.u16_at(0x00);
        if magic != ADX_MAGIC {
            return Err(AdxError::BadMagic(magic));
        }

        let version = match bytes[0x12] {
            0x03 => AdxVersion::Version3 {
                alignment_samples: bytes.u16_at(0x14),
                looping: AdxLoop::read(bytes, 0x18),
            },
            0x04 => AdxVersion::Version4(AdxLoop::read(bytes, 0x24)),
            other => {
                warn!("unsupported adx version {}, ignoring loop fields", other);
                AdxVersion::Other(other)
            }
        };

        let header = AdxHeader {
            copyright_offset: bytes.u16_at(0x02),
            encoding: bytes[0x04].into(),
            block_size: bytes[0x05],
            sample_bitdepth: bytes[0x06],
            channel_count: bytes[0x07],
            sample_rate: bytes.u32_at(0x08),
            total_samples: bytes.u32_at(0x0C),
            highpass_frequency: bytes.u16_at(0x10),
            version: version,
            flags: bytes[0x13],
        };
        debug!("parsed adx header: {:?}", header);
        Ok(header)
    }

    pub fn read_header<R>(reader: R) -> AdxResult<AdxHeader>
        where R: Read
    {
        let mut buffer = Vec::with_capacity(ADX_HEADER_LEN);
        reader.take(ADX_HEADER_LEN as u64).read_to_end(&mut buffer)?;
        AdxHeader::parse(&buffer)
    }

    pub fn serialize(&self) -> [u8; ADX_HEADER_LEN] {
        let mut bytes = [0u8; ADX_HEADER_LEN];
        bytes.put_u16_at(0x00, ADX_MAGIC);
        bytes.put_u16_at(0x02, self.copyright_offset);
        bytes[0x04] = self.encoding.into();
        bytes[0x05] = self.block_size;
        bytes[0x06] = self.sample_bitdepth;
        bytes[0x07] = self.channel_count;
        bytes.put_u32_at(0x08, self.sample_rate);
        bytes.put_u32_at(0x0C, self.total_samples);
        bytes.put_u16_at(0x10, self.highpass_frequency);
        bytes[0x12] = self.version.into();
        bytes[0x13] = self.flags;
        match self.version {
            AdxVersion::Version3 { alignment_samples, ref looping } => {
                bytes.put_u16_at(0x14, alignment_samples);
                looping.write(&mut bytes, 0x18);
            }
            AdxVersion::Version4(ref looping) => looping.write(&mut bytes, 0x24),
            AdxVersion::Other(_) => {}
        }
        bytes
    }

    /// Writes everything up to the first block: header fields, zero padding
    /// and the copyright marker.
    pub fn to_writer<W>(&self, mut writer: W) -> AdxResult<()>
        where W: Write
    {
        if self.copyright_offset < MIN_COPYRIGHT_OFFSET {
            return Err(AdxError::BadHeader("copyright offset overlaps header fields"));
        }

        let mut bytes = vec![0u8; self.data_offset() as usize];
        bytes[..ADX_HEADER_LEN].copy_from_slice(&self.serialize());
        let copyright_start = self.copyright_offset as usize - 2;
        bytes[copyright_start..copyright_start + ADX_COPYRIGHT.len()].copy_from_slice(ADX_COPYRIGHT);
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Fills in the fields only known once a whole stream has been encoded.
    pub fn patch_totals(&mut self, total_samples: u32, loop_begin_byte: u32, loop_end_byte: u32) {
        self.total_samples = total_samples;
        if let Some(looping) = self.loop_fields_mut() {
            looping.begin_byte = loop_begin_byte;
            looping.end_byte = loop_end_byte;
        }
    }

    /// Checks the fields the block codec depends on.
    pub fn validate(&self) -> AdxResult<()> {
        if self.encoding != AdxEncoding::Standard {
            return Err(AdxError::UnsupportedEncoding(self.encoding.into()));
        }
        if self.channel_count == 0 || self.channel_count > 2 {
            return Err(AdxError::UnsupportedChannels(self.channel_count as u32));
        }
        if self.sample_bitdepth != 4 {
            return Err(AdxError::BadHeader("sample bitdepth must be 4"));
        }
        if self.block_size < 3 {
            return Err(AdxError::BadHeader("block size too small"));
        }
        if self.sample_rate == 0 {
            return Err(AdxError::BadHeader("sample rate is zero"));
        }
        Ok(())
    }

    pub fn samples_per_block(&self) -> u32 {
        (self.block_size as u32 - 2) * 8 / self.sample_bitdepth as u32
    }

    /// Byte offset of the first block.
    pub fn data_offset(&self) -> u64 {
        self.copyright_offset as u64 + 4
    }

    /// Bytes in one block across all channels.
    pub fn frame_size(&self) -> usize {
        self.block_size as usize * self.channel_count as usize
    }

    pub fn block_offset(&self, block_index: u32) -> u64 {
        self.data_offset() + block_index as u64 * self.frame_size() as u64
    }

    /// Byte offset of the block holding `sample`.
    ///
    /// This is an absolute file offset, data offset included, so loop byte
    /// indices can be seeked to directly just like `block_offset`.
    pub fn sample_to_byte(&self, sample: u32) -> u32 {
        self.block_offset(sample / self.samples_per_block()) as u32
    }

    /// Loop region, if the header declares an enabled one.
    pub fn loop_info(&self) -> Option<AdxLoop> {
        match self.version {
            AdxVersion::Version3 { looping, .. } | AdxVersion::Version4(looping) if looping.enabled =>
                Some(looping),
            _ => None,
        }
    }

    fn loop_fields_mut(&mut self) -> Option<&mut AdxLoop> {
        match self.version {
            AdxVersion::Version3 { ref mut looping, .. } => Some(looping),
            AdxVersion::Version4(ref mut looping) => Some(looping),
            AdxVersion::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(version: AdxVersion) -> AdxHeader {
        AdxHeader {
            copyright_offset: 0x194,
            encoding: AdxEncoding::Standard,
            block_size: 18,
            sample_bitdepth: 4,
            channel_count: 2,
            sample_rate: 44100,
            total_samples: 100,
            highpass_frequency: 500,
            version: version,
            flags: 0,
        }
    }

    fn sample_loop() -> AdxLoop {
        AdxLoop {
            enabled: true,
            begin_sample: 64,
            begin_byte: 0x1BC,
            end_sample: 4000,
            end_byte: 0x2000,
        }
    }

    #[test]
    fn parse_known_bytes() {
        let mut bytes = [0u8; ADX_HEADER_LEN];
        bytes[..0x14].copy_from_slice(&[
            0x80, 0x00, 0x01, 0x94, 0x03, 0x12, 0x04, 0x02, 0x00, 0x00, 0xAC, 0x44,
            0x00, 0x00, 0x00, 0x64, 0x01, 0xF4, 0x03, 0x00,
        ]);
        let header = AdxHeader::parse(&bytes).unwrap();
        assert_eq!(header.copyright_offset, 0x194);
        assert_eq!(header.encoding, AdxEncoding::Standard);
        assert_eq!(header.block_size, 18);
        assert_eq!(header.sample_bitdepth, 4);
        assert_eq!(header.channel_count, 2);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.total_samples, 100);
        assert_eq!(header.highpass_frequency, 500);
        assert_eq!(header.samples_per_block(), 32);
        assert!(header.loop_info().is_none());
    }

    #[test]
    fn bad_magic() {
        let mut bytes = sample_header(AdxVersion::Version4(AdxLoop::default())).serialize();
        bytes[0] = 0x00;
        match AdxHeader::parse(&bytes) {
            Err(AdxError::BadMagic(0x0000)) => {}
            other => panic!("expected bad magic, got {:?}", other),
        }
    }

    #[test]
    fn short_header() {
        match AdxHeader::parse(&[0x80, 0x00, 0x01]) {
            Err(AdxError::Truncated { expected: ADX_HEADER_LEN, actual: 3 }) => {}
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn round_trip_versions() {
        let headers = [
            sample_header(AdxVersion::Version3 { alignment_samples: 12, looping: sample_loop() }),
            sample_header(AdxVersion::Version4(sample_loop())),
            sample_header(AdxVersion::Version4(AdxLoop::default())),
        ];
        for header in headers.iter() {
            assert_eq!(&AdxHeader::parse(&header.serialize()).unwrap(), header);
        }
    }

    #[test]
    fn loop_field_offsets() {
        let v3 = sample_header(AdxVersion::Version3 { alignment_samples: 0, looping: sample_loop() }).serialize();
        assert_eq!(v3.u32_at(0x18), 1);
        assert_eq!(v3.u32_at(0x1C), 64);
        assert_eq!(v3.u32_at(0x28), 0x2000);

        let v4 = sample_header(AdxVersion::Version4(sample_loop())).serialize();
        assert_eq!(v4.u32_at(0x24), 1);
        assert_eq!(v4.u32_at(0x28), 64);
        assert_eq!(v4.u32_at(0x34), 0x2000);
        assert!(v4[0x38..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unknown_version_drops_loop() {
        let mut bytes = sample_header(AdxVersion::Version4(sample_loop())).serialize();
        bytes[0x12] = 0x05;
        let header = AdxHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, AdxVersion::Other(5));
        assert!(header.loop_info().is_none());
    }

    #[test]
    fn block_addressing() {
        let header = sample_header(AdxVersion::Version4(AdxLoop::default()));
        assert_eq!(header.block_offset(3), 516);
        assert_eq!(header.sample_to_byte(3 * 32 + 5), 516);
    }

    #[test]
    fn patch_totals_updates_loop_bytes() {
        let mut header = sample_header(AdxVersion::Version3 { alignment_samples: 0, looping: sample_loop() });
        header.patch_totals(5000, 0x300, 0x400);
        assert_eq!(header.total_samples, 5000);
        let looping = header.loop_info().unwrap();
        assert_eq!(looping.begin_byte, 0x300);
        assert_eq!(looping.end_byte, 0x400);
        assert_eq!(looping.begin_sample, 64);
    }

    #[test]
    fn writer_places_copyright() {
        let header = sample_header(AdxVersion::Version4(AdxLoop::default()));
        let mut out = Vec::new();
        header.to_writer(&mut out).unwrap();
        assert_eq!(out.len(), 0x194 + 4);
        assert_eq!(&out[0x192..0x198], b"(c)CRI");
        assert_eq!(&out[..ADX_HEADER_LEN], &header.serialize()[..]);
    }

    #[test]
    fn writer_rejects_small_offset() {
        let mut header = sample_header(AdxVersion::Version4(AdxLoop::default()));
        header.copyright_offset = 0x20;
        assert!(header.to_writer(Vec::new()).is_err());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut header = sample_header(AdxVersion::Version4(AdxLoop::default()));
        assert!(header.validate().is_ok());
        header.channel_count = 3;
        assert!(matches!(header.validate(), Err(AdxError::UnsupportedChannels(3))));
        header.channel_count = 1;
        header.encoding = AdxEncoding::Other(0x10);
        assert!(matches!(header.validate(), Err(AdxError::UnsupportedEncoding(0x10))));
    }
}
