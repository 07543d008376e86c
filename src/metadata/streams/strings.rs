//! The `#Strings` heap: NUL terminated UTF-8 identifiers addressed by byte offset.

use std::ffi::CStr;

use crate::Result;

/// Owned copy of the `#Strings` heap.
#[derive(Debug, Clone)]
pub struct Strings {
    data: Vec<u8>,
}

impl Strings {
    /// Take ownership of the heap bytes. An absent heap is a single NUL byte.
    #[must_use]
    pub fn from(data: Vec<u8>) -> Strings {
        if data.is_empty() {
            return Strings { data: vec![0] };
        }

        Strings { data }
    }

    /// Get the identifier starting at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the heap, or
    /// [`crate::Error::Malformed`] for unterminated or non UTF-8 data.
    pub fn get(&self, index: usize) -> Result<&str> {
        let Some(bytes) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        CStr::from_bytes_until_nul(bytes)
            .map_err(|_| malformed_error!("Unterminated string at index - {}", index))?
            .to_str()
            .map_err(|_| malformed_error!("Invalid string at index - {}", index))
    }

    /// Heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the heap holds nothing but the leading NUL
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = b"\0<Module>\0System\0Object\0".to_vec();

        let strings = Strings::from(data);
        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get(1).unwrap(), "<Module>");
        assert_eq!(strings.get(10).unwrap(), "System");
        assert_eq!(strings.get(13).unwrap(), "tem");
        assert_eq!(strings.get(17).unwrap(), "Object");
        assert!(strings.get(100).is_err());
    }

    #[test]
    fn absent() {
        let strings = Strings::from(Vec::new());
        assert!(strings.is_empty());
        assert_eq!(strings.get(0).unwrap(), "");
    }

    #[test]
    fn unterminated() {
        let strings = Strings::from(b"\0abc".to_vec());
        assert!(matches!(strings.get(1), Err(crate::Error::Malformed { .. })));
    }
}
