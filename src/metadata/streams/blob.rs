//! The `#Blob` heap: length-prefixed byte runs, the length using the compressed integer
//! encoding.

use crate::{file::parser::Parser, Result};

/// Owned copy of the `#Blob` heap.
#[derive(Debug, Clone)]
pub struct Blob {
    data: Vec<u8>,
}

impl Blob {
    /// Take ownership of the heap bytes. An absent heap is a single zero byte.
    #[must_use]
    pub fn from(data: Vec<u8>) -> Blob {
        if data.is_empty() {
            return Blob { data: vec![0] };
        }

        Blob { data }
    }

    /// Get the blob starting at `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob does not fit the heap.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        let Some(bytes) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        let mut parser = Parser::new(bytes);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }

    /// Heap size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the heap holds nothing but the leading zero byte
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
        let mut data = vec![
            0x00,
            0x03, 0x20, 0x00, 0x01,
            0x80, 0x81,
        ];
        data.extend(std::iter::repeat_n(0xAA, 0x81));

        let blob = Blob::from(data);
        assert_eq!(blob.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blob.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(blob.get(5).unwrap().len(), 0x81);
        assert!(blob.get(2000).is_err());
    }

    #[test]
    fn truncated() {
        let blob = Blob::from(vec![0x00, 0x05, 0x01]);
        assert!(matches!(blob.get(1), Err(crate::Error::OutOfBounds { .. })));
    }
}
