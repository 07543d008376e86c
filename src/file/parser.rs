//! Cursor over a byte slice with the decoding primitives of the metadata format.
//!
//! [`Parser`] is used by every layer that walks a variable-length structure: signature blobs,
//! method body headers, exception sections, the metadata root and CIL byte streams. All reads
//! are bounds checked and advance the cursor only on success.
//!
//! The compressed unsigned integer encoding (ECMA-335 II.23.2) is implemented in both directions:
//!
//! | Value range              | Width | Leading bits |
//! |--------------------------|-------|--------------|
//! | `0x00..=0x7F`            | 1     | `0`          |
//! | `0x80..=0x3FFF`          | 2     | `10`         |
//! | `0x4000..=0x1FFF_FFFF`   | 4     | `110`        |
//!
//! ```rust
//! use cilfront::file::parser::{write_compressed_uint, Parser};
//!
//! let mut encoded = Vec::new();
//! write_compressed_uint(0x4000, &mut encoded)?;
//! assert_eq!(encoded, [0xC0, 0x00, 0x40, 0x00]);
//!
//! let mut parser = Parser::new(&encoded);
//! assert_eq!(parser.read_compressed_uint()?, 0x4000);
//! # Ok::<(), cilfront::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, read_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// Largest value representable with the compressed unsigned encoding.
pub const COMPRESSED_UINT_MAX: u32 = 0x1FFF_FFFF;

/// A forward cursor over a borrowed byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying slice
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying slice is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True while unread bytes remain
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move the cursor to an absolute position. Seeking to the end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.end_of(step)?;
        self.position = end;
        Ok(())
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The whole underlying slice
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Run `f`, restoring the cursor if it fails.
    ///
    /// # Errors
    /// Forwards the error returned by `f`.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }

        result
    }

    /// Advance to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the end of the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a big-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn read_be<T: CilIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Read `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.end_of(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read a compressed unsigned integer (1, 2 or 4 bytes).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input and [`crate::Error::Malformed`]
    /// if the leading byte has the reserved `111` pattern.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        if (first_byte & 0xE0) == 0xC0 {
            let rest = self.read_bytes(3)?;
            return Ok(((u32::from(first_byte) & 0x1F) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2]));
        }

        Err(malformed_error!("Invalid compressed uint - 0x{:02x}", first_byte))
    }

    /// Read a compressed signed integer (low bit carries the sign).
    ///
    /// # Errors
    /// See [`Parser::read_compressed_uint`].
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_uint()?;
        let sign_extension = match self.position - start {
            1 => 0xFFFF_FFC0,
            2 => 0xFFFF_E000,
            _ => 0xF000_0000,
        };

        let mut value = unsigned >> 1;
        if (unsigned & 1) != 0 {
            value |= sign_extension;
        }

        #[allow(clippy::cast_possible_wrap)]
        Ok(value as i32)
    }

    /// Read a compressed `TypeDefOrRefOrSpec` value and expand it to a full token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag is 3.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;
        let table: u32 = match compressed_token & 0x3 {
            0x0 => 0x0200_0000,
            0x1 => 0x0100_0000,
            0x2 => 0x1B00_0000,
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        Ok(Token::new(table | (compressed_token >> 2)))
    }

    /// Read a NUL terminated UTF-8 string. A missing terminator ends the string at the end
    /// of the data.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.data.len(), |p| start + p);

        self.position = (end + 1).min(self.data.len());
        std::str::from_utf8(&self.data[start..end])
            .map(str::to_string)
            .map_err(|e| malformed_error!("Invalid UTF-8 string at offset {}: {}", start, e))
    }

    fn end_of(&self, length: usize) -> Result<usize> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(end)
    }
}

/// Number of bytes the compressed encoding of `value` takes.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for values above [`COMPRESSED_UINT_MAX`].
pub fn compressed_uint_size(value: u32) -> Result<usize> {
    match value {
        0..=0x7F => Ok(1),
        0x80..=0x3FFF => Ok(2),
        0x4000..=COMPRESSED_UINT_MAX => Ok(4),
        _ => Err(malformed_error!("Value 0x{:x} cannot be compressed", value)),
    }
}

/// Append the shortest compressed encoding of `value` to `out`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for values above [`COMPRESSED_UINT_MAX`].
pub fn write_compressed_uint(value: u32, out: &mut Vec<u8>) -> Result<()> {
    match compressed_uint_size(value)? {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(0x8000 | value as u16).to_be_bytes()),
        _ => out.extend_from_slice(&(0xC000_0000 | value).to_be_bytes()),
    }

    Ok(())
}

/// Append the compressed encoding of a signed `value` to `out`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] outside `-0x1000_0000..=0x0FFF_FFFF`.
pub fn write_compressed_int(value: i32, out: &mut Vec<u8>) -> Result<()> {
    #[allow(clippy::cast_sign_loss)]
    let rotated = |bits: u32| ((value as u32) << 1 | u32::from(value < 0)) & ((1 << bits) - 1);

    match value {
        -0x40..=0x3F => write_compressed_uint(rotated(7), out),
        -0x2000..=0x1FFF => {
            out.extend_from_slice(&(0x8000 | rotated(14) as u16).to_be_bytes());
            Ok(())
        }
        -0x1000_0000..=0x0FFF_FFFF => {
            out.extend_from_slice(&(0xC000_0000 | rotated(29)).to_be_bytes());
            Ok(())
        }
        _ => Err(malformed_error!("Value {} cannot be compressed", value)),
    }
}

/// Append the compressed `TypeDefOrRefOrSpec` encoding of `token` to `out`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for tokens of other tables.
pub fn write_compressed_token(token: Token, out: &mut Vec<u8>) -> Result<()> {
    let tag = match token.table() {
        0x02 => 0,
        0x01 => 1,
        0x1B => 2,
        _ => return Err(malformed_error!("Token {} is not TypeDefOrRefOrSpec", token)),
    };

    write_compressed_uint((token.row() << 2) | tag, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn compressed_uint() {
        #[rustfmt::skip]
        let test_cases = [
            (vec![0x03], 3),
            (vec![0x7F], 0x7F),
            (vec![0x80, 0x80], 0x80),
            (vec![0xBF, 0xFF], 0x3FFF),
            (vec![0xC0, 0x00, 0x40, 0x00], 0x4000),
            (vec![0xDF, 0xFF, 0xFF, 0xFF], 0x1FFF_FFFF),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_compressed_uint().unwrap(), expected);
            assert!(!parser.has_more_data());

            let mut encoded = Vec::new();
            write_compressed_uint(expected, &mut encoded).unwrap();
            assert_eq!(encoded, input);
        }

        let mut parser = Parser::new(&[]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::OutOfBounds { .. })
        ));

        let mut parser = Parser::new(&[0xE0, 0, 0, 0]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::Malformed { .. })
        ));

        assert!(write_compressed_uint(0x2000_0000, &mut Vec::new()).is_err());
    }

    #[test]
    fn compressed_int() {
        let mut parser = Parser::new(&[0x06, 0x7B, 0x80, 0x80, 0x01, 0x7F, 0x80, 0x01, 0x00]);
        assert_eq!(parser.read_compressed_int().unwrap(), 3);
        assert_eq!(parser.read_compressed_int().unwrap(), -3);
        assert_eq!(parser.read_compressed_int().unwrap(), 64);
        assert_eq!(parser.read_compressed_int().unwrap(), -64);
        assert_eq!(parser.read_compressed_int().unwrap(), -1);
        assert_eq!(parser.read_compressed_int().unwrap(), -8192);
        assert_eq!(parser.read_compressed_int().unwrap(), 0);
    }

    #[test]
    fn compressed_int_write() {
        for value in [0, 3, -3, 63, -64, 64, -65, 8191, -8192, 8192, -8193, 0x0FFF_FFFF, -0x1000_0000] {
            let mut out = Vec::new();
            write_compressed_int(value, &mut out).unwrap();
            assert_eq!(Parser::new(&out).read_compressed_int().unwrap(), value);
        }

        let mut out = Vec::new();
        write_compressed_int(-1, &mut out).unwrap();
        assert_eq!(out, [0x7F]);
        assert!(write_compressed_int(0x1000_0000, &mut out).is_err());
    }

    #[test]
    fn compressed_token_write() {
        let mut out = Vec::new();
        write_compressed_token(Token(0x0100_0012), &mut out).unwrap();
        assert_eq!(out, [0x49]);
        assert!(write_compressed_token(Token(0x0600_0001), &mut out).is_err());
    }

    #[test]
    fn compressed_token() {
        let mut parser = Parser::new(&[0x49, 0x06, 0x0B]);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0100_0012);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x1B00_0001);
        assert!(parser.read_compressed_token().is_err());
    }

    #[test]
    fn strings() {
        let mut parser = Parser::new(b"abc\0\0tail");
        assert_eq!(parser.read_string_utf8().unwrap(), "abc");
        assert_eq!(parser.read_string_utf8().unwrap(), "");
        assert_eq!(parser.read_string_utf8().unwrap(), "tail");
        assert!(!parser.has_more_data());
    }

    #[test]
    fn cursor() {
        let mut parser = Parser::new(&[1, 2, 3, 4, 5]);
        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        assert!(parser.align(8).is_err());
        assert!(parser
            .transactional(|p| {
                p.read_le::<u8>()?;
                p.read_le::<u32>()
            })
            .is_err());
        assert_eq!(parser.pos(), 4);
        assert_eq!(parser.read_bytes(1).unwrap(), [5]);
        parser.seek(5).unwrap();
        assert!(parser.seek(6).is_err());
    }
}
