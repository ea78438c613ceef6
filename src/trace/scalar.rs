//! Scalar value tags and their big-endian encodings.

use crate::error::Error;

/// Closed set of scalar kinds a record field may carry.
///
/// The discriminant doubles as the wire code written into descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    U32 = 4,
    I32 = 5,
    U64 = 6,
    I64 = 7,
    Str = 8,
}

impl Scalar {
    /// Wire code of this scalar kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Scalar::code`], for readers.
    pub fn from_code(code: u8) -> Option<Scalar> {
        match code {
            0 => Some(Scalar::U8),
            1 => Some(Scalar::I8),
            2 => Some(Scalar::U16),
            3 => Some(Scalar::I16),
            4 => Some(Scalar::U32),
            5 => Some(Scalar::I32),
            6 => Some(Scalar::U64),
            7 => Some(Scalar::I64),
            8 => Some(Scalar::Str),
            _ => None,
        }
    }
}

/// Typed appender over a scratch buffer.
///
/// All integers are written big-endian. A string is written as a `u16`
/// length including the terminating NUL, then the bytes, then the NUL.
pub struct RecordBuf<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> RecordBuf<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// The encoded length prefix counts the NUL, so the payload itself is
    /// capped at `0xFFFF - 1` bytes.
    pub fn put_str(&mut self, v: &str) -> Result<(), Error> {
        let len = v.len();
        if len > usize::from(u16::MAX) - 1 {
            return Err(Error::InvalidArgument("string field too long"));
        }

        self.put_u16(len as u16 + 1);
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_codes_are_dense() {
        for code in 0..=8 {
            assert_eq!(Scalar::from_code(code).unwrap().code(), code);
        }
        assert_eq!(Scalar::from_code(9), None);
    }

    #[test]
    fn test_u16_big_endian() {
        let mut bytes = Vec::new();
        RecordBuf::new(&mut bytes).put_u16(0xABCD);
        assert_eq!(bytes, [0xAB, 0xCD]);
    }

    #[test]
    fn test_wide_integers_big_endian() {
        let mut bytes = Vec::new();
        let mut buf = RecordBuf::new(&mut bytes);
        buf.put_u32(0x01020304);
        buf.put_u64(0x0102030405060708);
        buf.put_i32(-2);
        assert_eq!(
            bytes,
            [
                0x01, 0x02, 0x03, 0x04, //
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, //
                0xFF, 0xFF, 0xFF, 0xFE,
            ]
        );
    }

    #[test]
    fn test_str_encoding() {
        let mut bytes = Vec::new();
        RecordBuf::new(&mut bytes).put_str("hello").unwrap();
        assert_eq!(bytes, [0x00, 0x06, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0x00]);
    }

    #[test]
    fn test_empty_str_encoding() {
        let mut bytes = Vec::new();
        RecordBuf::new(&mut bytes).put_str("").unwrap();
        assert_eq!(bytes, [0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_oversized_str_rejected() {
        let long = "x".repeat(usize::from(u16::MAX));
        let mut bytes = Vec::new();
        assert!(RecordBuf::new(&mut bytes).put_str(&long).is_err());
    }
}
