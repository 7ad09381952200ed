//! Bitstream I/O utilities for wire structures.
//!
//! Thin wrappers over `bitstream-io` that keep every read and write
//! big-endian and bounds-checked. Headers of the transport layer are
//! bit-packed, so both directions go through these types.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn get_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.bs.read_bytes(buf)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip_n: out of bounds bits",
            ));
        }

        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

/// Bit-level writer appending big-endian fields to an underlying sink.
pub struct BitstreamIoWriter<W: io::Write> {
    bs: BitWriter<W, BigEndian>,
}

pub type BsIoVecWriter<'a> = BitstreamIoWriter<&'a mut Vec<u8>>;

impl<W: io::Write> BitstreamIoWriter<W> {
    pub fn new(write: W) -> Self {
        Self {
            bs: BitWriter::new(write),
        }
    }

    #[inline(always)]
    pub fn put(&mut self, bit: bool) -> io::Result<()> {
        self.bs.write_bit(bit)
    }

    /// Writes the low `n` bits of `value`. Values wider than `n` bits are rejected.
    #[inline(always)]
    pub fn put_n<U: UnsignedInteger>(&mut self, n: u32, value: U) -> io::Result<()> {
        self.bs.write_unsigned_var(n, value)
    }

    /// Writes `n` reserved bits, all set to one.
    #[inline(always)]
    pub fn put_reserved(&mut self, n: u32) -> io::Result<()> {
        for _ in 0..n {
            self.bs.write_bit(true)?;
        }

        Ok(())
    }

    #[inline(always)]
    pub fn put_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bs.write_bytes(bytes)
    }

    pub fn is_aligned(&self) -> bool {
        self.bs.byte_aligned()
    }

    /// Releases the sink. Every structure written through this type ends on
    /// a byte boundary, so a dangling partial byte is an error.
    pub fn finish(self) -> io::Result<W> {
        if !self.bs.byte_aligned() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "finish: bitstream does not end on a byte boundary",
            ));
        }

        Ok(self.bs.into_writer())
    }
}

impl<'a> BsIoVecWriter<'a> {
    pub fn from_vec(dst: &'a mut Vec<u8>) -> Self {
        Self::new(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_packs_fields_msb_first() {
        let mut out = Vec::new();
        let mut writer = BsIoVecWriter::from_vec(&mut out);
        writer.put_n(4, 0b1010u8).unwrap();
        writer.put(true).unwrap();
        writer.put_reserved(3).unwrap();
        writer.put_n(16, 0x1234u16).unwrap();
        writer.finish().unwrap();

        assert_eq!(out, [0b1010_1111, 0x12, 0x34]);
    }

    #[test]
    fn unaligned_finish_is_rejected() {
        let mut out = Vec::new();
        let mut writer = BsIoVecWriter::from_vec(&mut out);
        writer.put_n(3, 1u8).unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn reader_reads_back_fields() {
        let data = [0b1010_1111, 0x12, 0x34];
        let mut reader = BsIoSliceReader::from_slice(&data);
        assert_eq!(reader.get_n::<u8>(4).unwrap(), 0b1010);
        assert!(reader.get().unwrap());
        reader.skip_n(3).unwrap();
        assert_eq!(reader.get_n::<u16>(16).unwrap(), 0x1234);
        assert_eq!(reader.available().unwrap(), 0);
        assert!(reader.get().is_err());
    }
}
