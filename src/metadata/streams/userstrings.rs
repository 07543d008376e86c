//! The `#US` heap: length-prefixed UTF-16 string literals referenced by `ldstr`.
//!
//! Every entry is a compressed length followed by that many bytes: the UTF-16LE code units
//! and one trailing flag byte.

use widestring::U16String;

use crate::{file::parser::Parser, Result};

/// Owned copy of the `#US` heap.
#[derive(Debug, Clone)]
pub struct UserStrings {
    data: Vec<u8>,
}

impl UserStrings {
    /// Take ownership of the heap bytes. An absent heap is a single zero byte.
    #[must_use]
    pub fn from(data: Vec<u8>) -> UserStrings {
        if data.is_empty() {
            return UserStrings { data: vec![0] };
        }

        UserStrings { data }
    }

    /// Get the string literal at byte offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry does not fit the heap.
    pub fn get(&self, index: usize) -> Result<U16String> {
        let Some(bytes) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        let mut parser = Parser::new(bytes);
        let len = parser.read_compressed_uint()? as usize;
        let payload = parser.read_bytes(len)?;

        let units = payload
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<u16>>();

        Ok(U16String::from_vec(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = vec![
            0x00,
            0x05, b'H', 0x00, b'i', 0x00, 0x00,
            0x01, 0x00,
        ];

        let strings = UserStrings::from(data);
        assert_eq!(strings.get(1).unwrap().to_string_lossy(), "Hi");
        assert_eq!(strings.get(7).unwrap().len(), 0);
        assert!(strings.get(50).is_err());
    }
}
