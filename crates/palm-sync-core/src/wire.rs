//! Checked big-endian reads and Palm string helpers.
//!
//! `bytes::Buf` panics when a read runs past the end of the buffer. Wire
//! data comes from a device we do not control, so every read goes through
//! [`WireRead`], which reports short input as a [`CodecError`] instead.
//!
//! Palm OS strings are single-byte (Latin-1 compatible) and NUL-terminated.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{CodecError, CodecResult};

/// Checked reads over any `Buf`.
pub trait WireRead: Buf {
    /// Fail unless at least `n` bytes remain.
    fn need(&self, n: usize) -> CodecResult<()> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn take_u8(&mut self) -> CodecResult<u8> {
        self.need(1)?;
        Ok(self.get_u8())
    }

    fn take_u16(&mut self) -> CodecResult<u16> {
        self.need(2)?;
        Ok(self.get_u16())
    }

    fn take_u32(&mut self) -> CodecResult<u32> {
        self.need(4)?;
        Ok(self.get_u32())
    }

    /// Take exactly `n` bytes.
    fn take_bytes(&mut self, n: usize) -> CodecResult<Bytes> {
        self.need(n)?;
        Ok(self.copy_to_bytes(n))
    }

    /// Skip `n` padding bytes.
    fn skip(&mut self, n: usize) -> CodecResult<()> {
        self.need(n)?;
        self.advance(n);
        Ok(())
    }

    /// Read a NUL-terminated string, consuming the terminator.
    fn take_cstring(&mut self) -> CodecResult<String> {
        let mut raw = Vec::new();
        loop {
            if !self.has_remaining() {
                return Err(CodecError::UnterminatedString);
            }
            match self.get_u8() {
                0 => break,
                b => raw.push(b),
            }
        }
        Ok(latin1_decode(&raw))
    }

    /// Read a fixed-size field holding a NUL-padded string.
    fn take_fixed_cstring(&mut self, len: usize) -> CodecResult<String> {
        let raw = self.take_bytes(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(latin1_decode(&raw[..end]))
    }
}

impl<B: Buf> WireRead for B {}

/// Decode single-byte Palm text.
pub fn latin1_decode(raw: &[u8]) -> String {
    raw.iter().map(|&b| char::from(b)).collect()
}

/// Encode text as single-byte Palm text. Characters outside Latin-1
/// become `?`.
pub fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Write a string followed by a NUL terminator.
pub fn put_cstring(buf: &mut impl BufMut, text: &str) {
    buf.put_slice(&latin1_encode(text));
    buf.put_u8(0);
}

/// Fail unless `len` fits a length field whose largest value is `max`.
pub fn check_len(field: &'static str, len: usize, max: usize) -> CodecResult<()> {
    if len > max {
        return Err(CodecError::FieldTooLong { field, len, max });
    }
    Ok(())
}

/// Encoded size of [`put_cstring`] output.
pub fn cstring_len(text: &str) -> usize {
    text.chars().count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_short_read_is_error() {
        let mut buf = Bytes::from_static(&[0x01]);
        let err = buf.take_u16().unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedEof {
                needed: 2,
                remaining: 1
            }
        ));
    }

    #[test]
    fn test_cstring_roundtrip() {
        let mut out = BytesMut::new();
        put_cstring(&mut out, "Caf\u{e9}");
        assert_eq!(&out[..], b"Caf\xe9\0");
        assert_eq!(cstring_len("Caf\u{e9}"), 5);

        let mut input = out.freeze();
        assert_eq!(input.take_cstring().unwrap(), "Caf\u{e9}");
        assert!(!input.has_remaining());
    }

    #[test]
    fn test_unterminated_cstring() {
        let mut buf = Bytes::from_static(b"abc");
        assert!(matches!(
            buf.take_cstring(),
            Err(CodecError::UnterminatedString)
        ));
    }

    #[test]
    fn test_fixed_cstring_stops_at_nul() {
        let mut buf = Bytes::from_static(b"MemoDB\0\0\0\0rest");
        assert_eq!(buf.take_fixed_cstring(10).unwrap(), "MemoDB");
        assert_eq!(&buf[..], b"rest");
    }

    #[test]
    fn test_non_latin1_replaced() {
        assert_eq!(latin1_encode("a\u{263a}b"), b"a?b");
    }
}
