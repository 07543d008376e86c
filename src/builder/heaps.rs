//! Heap builders for the four metadata heaps.
//!
//! Every builder reserves index 0 for the null entry and deduplicates what it is given, so the
//! same name or signature always lands at the same index.

use std::collections::HashMap;

use crate::{file::parser::write_compressed_uint, Result};

/// Common interface of the heap builders.
pub(crate) trait HeapBuilder {
    /// Size of the heap so far, without padding
    fn size(&self) -> usize;

    /// The heap bytes, padded to 4 bytes
    fn finish(&self) -> Vec<u8>;

    /// True if indices into this heap need 4 bytes
    fn is_large(&self) -> bool {
        self.size() >= 0x1_0000
    }
}

fn padded(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.resize((out.len() + 3) & !3, 0);
    out
}

/// `#Strings`: NUL terminated UTF-8.
#[derive(Debug)]
pub(crate) struct StringHeap {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl StringHeap {
    pub(crate) fn new() -> Self {
        StringHeap {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.index.get(value) {
            return offset;
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_string(), offset);
        offset
    }
}

impl HeapBuilder for StringHeap {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn finish(&self) -> Vec<u8> {
        padded(&self.data)
    }
}

/// `#Blob`: compressed length followed by the bytes.
#[derive(Debug)]
pub(crate) struct BlobHeap {
    data: Vec<u8>,
    index: HashMap<Vec<u8>, u32>,
}

impl BlobHeap {
    pub(crate) fn new() -> Self {
        BlobHeap {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(&offset) = self.index.get(value) {
            return Ok(offset);
        }

        let offset = self.data.len() as u32;
        let len = u32::try_from(value.len())
            .map_err(|_| malformed_error!("Blob of {} bytes is too large", value.len()))?;
        write_compressed_uint(len, &mut self.data)?;
        self.data.extend_from_slice(value);
        self.index.insert(value.to_vec(), offset);
        Ok(offset)
    }
}

impl HeapBuilder for BlobHeap {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn finish(&self) -> Vec<u8> {
        padded(&self.data)
    }
}

/// `#GUID`: 16 byte entries addressed from 1.
#[derive(Debug, Default)]
pub(crate) struct GuidHeap {
    data: Vec<u8>,
}

impl GuidHeap {
    pub(crate) fn add(&mut self, guid: uguid::Guid) -> u32 {
        let bytes = guid.to_bytes();
        if let Some(position) = self.data.chunks_exact(16).position(|entry| entry == bytes) {
            return position as u32 + 1;
        }

        self.data.extend_from_slice(&bytes);
        (self.data.len() / 16) as u32
    }
}

impl HeapBuilder for GuidHeap {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn finish(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn is_large(&self) -> bool {
        self.data.len() / 16 >= 0x1_0000
    }
}

/// `#US`: UTF-16 literals with a trailing flag byte.
#[derive(Debug)]
pub(crate) struct UserStringHeap {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl UserStringHeap {
    pub(crate) fn new() -> Self {
        UserStringHeap {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Add a literal and return its byte offset, which is the row of its `0x70` token.
    pub(crate) fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(&offset) = self.index.get(value) {
            return Ok(offset);
        }

        let offset = self.data.len() as u32;
        let units: Vec<u16> = value.encode_utf16().collect();
        let len = u32::try_from(units.len() * 2 + 1)
            .map_err(|_| malformed_error!("User string of {} units is too long", units.len()))?;
        write_compressed_uint(len, &mut self.data)?;
        for unit in &units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data.push(u8::from(units.iter().any(|&unit| needs_flag(unit))));

        if offset > 0x00FF_FFFF {
            return Err(malformed_error!("#US heap exceeds the token range"));
        }
        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }
}

/// The flag byte is set when a unit is outside the plain ASCII set that sorts bytewise.
fn needs_flag(unit: u16) -> bool {
    unit > 0xFF || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F..=0xFF)
}

impl HeapBuilder for UserStringHeap {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn finish(&self) -> Vec<u8> {
        padded(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::streams::{Blob, Guid, Strings, UserStrings};

    #[test]
    fn strings_dedupe_and_reserve_zero() {
        let mut heap = StringHeap::new();
        assert_eq!(heap.add(""), 0);
        let object = heap.add("Object");
        assert_eq!(object, 1);
        assert_eq!(heap.add("System"), 8);
        assert_eq!(heap.add("Object"), object);

        let strings = Strings::from(heap.finish());
        assert_eq!(strings.get(8).unwrap(), "System");
        assert_eq!(heap.finish().len() % 4, 0);
    }

    #[test]
    fn blobs_read_back() {
        let mut heap = BlobHeap::new();
        assert_eq!(heap.add(&[]).unwrap(), 0);
        let first = heap.add(&[0x20, 0x00, 0x01]).unwrap();
        let long = vec![0xAB; 200];
        let second = heap.add(&long).unwrap();
        assert_eq!(heap.add(&[0x20, 0x00, 0x01]).unwrap(), first);

        let blobs = Blob::from(heap.finish());
        assert_eq!(blobs.get(first as usize).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(blobs.get(second as usize).unwrap(), long.as_slice());
    }

    #[test]
    fn guids_are_one_based() {
        let mut heap = GuidHeap::default();
        let a = uguid::Guid::from_bytes([1; 16]);
        let b = uguid::Guid::from_bytes([2; 16]);
        assert_eq!(heap.add(a), 1);
        assert_eq!(heap.add(b), 2);
        assert_eq!(heap.add(a), 1);
        assert_eq!(Guid::from(heap.finish()).get(2).unwrap(), b);
    }

    #[test]
    fn user_strings() {
        let mut heap = UserStringHeap::new();
        let hello = heap.add("Hello").unwrap();
        let umlaut = heap.add("Grüße").unwrap();
        assert_eq!(hello, 1);
        assert_eq!(heap.add("Hello").unwrap(), hello);

        let raw = heap.finish();
        assert_eq!(raw[1], 11);
        assert_eq!(raw[12], 0);
        assert_eq!(raw[umlaut as usize + 11], 1);

        let strings = UserStrings::from(raw);
        assert_eq!(strings.get(hello as usize).unwrap().to_string_lossy(), "Hello");
        assert_eq!(strings.get(umlaut as usize).unwrap().to_string_lossy(), "Grüße");
    }
}
