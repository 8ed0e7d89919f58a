use byteorder::{BigEndian, ByteOrder};

/// Big-endian field access at fixed byte offsets.
///
/// Callers are responsible for keeping `offset` plus the field width inside
/// the slice; every ADX structure has a fixed layout so the offsets are
/// known up front.
pub(crate) trait AdxBytes {
    fn u16_at(&self, offset: usize) -> u16;
    fn u32_at(&self, offset: usize) -> u32;
    fn put_u16_at(&mut self, offset: usize, val: u16);
    fn put_u32_at(&mut self, offset: usize, val: u32);
}

impl AdxBytes for [u8] {
    fn u16_at(&self, offset: usize) -> u16 {
        BigEndian::read_u16(&self[offset..offset + 2])
    }

    fn u32_at(&self, offset: usize) -> u32 {
        BigEndian::read_u32(&self[offset..offset + 4])
    }

    fn put_u16_at(&mut self, offset: usize, val: u16) {
        BigEndian::write_u16(&mut self[offset..offset + 2], val);
    }

    fn put_u32_at(&mut self, offset: usize, val: u32) {
        BigEndian::write_u32(&mut self[offset..offset + 4], val);
    }
}
