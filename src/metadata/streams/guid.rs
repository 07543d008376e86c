//! The `#GUID` heap: 16 byte records addressed by a 1-based index.

use crate::Result;

/// Owned copy of the `#GUID` heap.
#[derive(Debug, Clone, Default)]
pub struct Guid {
    data: Vec<u8>,
}

impl Guid {
    /// Take ownership of the heap bytes
    #[must_use]
    pub fn from(data: Vec<u8>) -> Guid {
        Guid { data }
    }

    /// Get the GUID with the 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 or an index past the heap.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Err(out_of_bounds_error!());
        }

        let start = (index - 1) * 16;
        let Some(bytes) = self.data.get(start..start + 16) else {
            return Err(out_of_bounds_error!());
        };

        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(bytes);
        Ok(uguid::Guid::from_bytes(buffer))
    }

    /// Number of GUIDs in the heap
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let mut data = vec![0x11u8; 16];
        data.extend([0x22u8; 16]);

        let guids = Guid::from(data);
        assert_eq!(guids.count(), 2);
        assert_eq!(guids.get(1).unwrap().to_bytes(), [0x11; 16]);
        assert_eq!(guids.get(2).unwrap().to_bytes(), [0x22; 16]);
        assert!(guids.get(0).is_err());
        assert!(guids.get(3).is_err());
    }
}
