use strum::IntoEnumIterator;

use crate::{
    file::parser::Parser,
    metadata::tables::{read_header_prefix, CodedIndexKind, TableId},
    Result,
};

/// Column width information for one table stream.
///
/// Simple indices are 4 bytes wide when the target table has more than `0xFFFF` rows. A coded
/// index with `n` tag bits is 4 bytes wide when any candidate table has `1 << (16 - n)` rows or
/// more. Heap indices follow the heap-size flags (bit 0 strings, bit 1 GUIDs, bit 2 blobs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    rows: [u32; 64],
    heap_flags: u8,
}

impl TableInfo {
    /// Build from row counts indexed by table id and the heap-size flags
    #[must_use]
    pub fn new(rows: [u32; 64], heap_flags: u8) -> Self {
        TableInfo { rows, heap_flags }
    }

    /// Decode the stream header. Returns the info and the offset of the first row.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is truncated.
    pub fn read(data: &[u8]) -> Result<(TableInfo, usize)> {
        let mut parser = Parser::new(data);
        let (heap_flags, valid) = read_header_prefix(&mut parser)?;

        let mut rows = [0u32; 64];
        for (bit, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << bit) != 0 {
                *count = parser.read_le::<u32>()?;
            }
        }

        Ok((TableInfo { rows, heap_flags }, parser.pos()))
    }

    /// Encode the stream header for these row counts.
    #[must_use]
    pub fn write_header(&self) -> Vec<u8> {
        let mut valid = 0u64;
        for (bit, count) in self.rows.iter().enumerate() {
            if *count > 0 {
                valid |= 1u64 << bit;
            }
        }

        let mut out = Vec::with_capacity(24 + 4 * valid.count_ones() as usize);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&[2, 0, self.heap_flags, 1]);
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        for count in self.rows.iter().filter(|count| **count > 0) {
            out.extend_from_slice(&count.to_le_bytes());
        }

        out
    }

    /// Row count of `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// The raw heap-size flags
    #[must_use]
    pub fn heap_flags(&self) -> u8 {
        self.heap_flags
    }

    /// True if indices into `table` are 4 bytes wide
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows(table) > u32::from(u16::MAX)
    }

    /// Width in bytes of a simple index into `table`
    #[must_use]
    pub fn index_bytes(&self, table: TableId) -> u32 {
        if self.is_large(table) {
            4
        } else {
            2
        }
    }

    /// True if coded indices of `kind` are 4 bytes wide
    #[must_use]
    pub fn is_large_coded(&self, kind: CodedIndexKind) -> bool {
        let limit = 1u32 << (16 - kind.tag_bits());
        kind.tables()
            .iter()
            .any(|table| self.rows(*table) >= limit)
    }

    /// Width in bytes of a coded index of `kind`
    #[must_use]
    pub fn coded_bytes(&self, kind: CodedIndexKind) -> u32 {
        if self.is_large_coded(kind) {
            4
        } else {
            2
        }
    }

    /// True if `#Strings` indices are 4 bytes wide
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.heap_flags & 0x01 != 0
    }

    /// True if `#GUID` indices are 4 bytes wide
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.heap_flags & 0x02 != 0
    }

    /// True if `#Blob` indices are 4 bytes wide
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.heap_flags & 0x04 != 0
    }

    /// Width in bytes of a `#Strings` index
    #[must_use]
    pub fn str_bytes(&self) -> u32 {
        if self.is_large_str() {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#GUID` index
    #[must_use]
    pub fn guid_bytes(&self) -> u32 {
        if self.is_large_guid() {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#Blob` index
    #[must_use]
    pub fn blob_bytes(&self) -> u32 {
        if self.is_large_blob() {
            4
        } else {
            2
        }
    }

    /// Tables with at least one row, in ascending id order
    pub fn present(&self) -> impl Iterator<Item = TableId> + '_ {
        TableId::iter().filter(|id| self.rows(*id) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_index_width() {
        let mut rows = [0u32; 64];
        rows[TableId::Field as usize] = 0xFFFF;
        rows[TableId::MethodDef as usize] = 0x1_0000;

        let info = TableInfo::new(rows, 0);
        assert_eq!(info.index_bytes(TableId::Field), 2);
        assert_eq!(info.index_bytes(TableId::MethodDef), 4);
        assert_eq!(info.index_bytes(TableId::Param), 2);
    }

    #[test]
    fn coded_index_width() {
        // TypeDefOrRef has 2 tag bits: 4 bytes from 0x4000 rows on
        let mut rows = [0u32; 64];
        rows[TableId::TypeRef as usize] = 0x3FFF;
        assert_eq!(TableInfo::new(rows, 0).coded_bytes(CodedIndexKind::TypeDefOrRef), 2);

        rows[TableId::TypeRef as usize] = 0x4000;
        let info = TableInfo::new(rows, 0);
        assert_eq!(info.coded_bytes(CodedIndexKind::TypeDefOrRef), 4);
        assert_eq!(info.coded_bytes(CodedIndexKind::HasCustomAttribute), 4);
        assert_eq!(info.coded_bytes(CodedIndexKind::MethodDefOrRef), 2);
        assert_eq!(info.index_bytes(TableId::TypeRef), 2);
    }

    #[test]
    fn heap_widths() {
        let info = TableInfo::new([0; 64], 0x05);
        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.guid_bytes(), 2);
        assert_eq!(info.blob_bytes(), 4);
    }

    #[test]
    fn header_round_trip() {
        let mut rows = [0u32; 64];
        rows[TableId::Module as usize] = 1;
        rows[TableId::TypeDef as usize] = 3;
        rows[TableId::GenericParamConstraint as usize] = 7;

        let info = TableInfo::new(rows, 0x02);
        let header = info.write_header();
        assert_eq!(header.len(), 24 + 12);

        let (decoded, offset) = TableInfo::read(&header).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(offset, header.len());
        assert_eq!(
            decoded.present().collect::<Vec<_>>(),
            [TableId::Module, TableId::TypeDef, TableId::GenericParamConstraint]
        );
    }
}
