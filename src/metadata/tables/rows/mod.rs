//! Owned row records for every supported table.
//!
//! Each record keeps its scalar columns as read, heap columns as raw heap offsets, simple
//! indices as raw 1-based rows and coded indices as typed enums (`None` for a null row). The
//! column order of every record is the order of ECMA-335 II.22.

use crate::{
    metadata::{
        tables::{CodedIndex, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// Read, size and write one row of a table.
pub trait TableRow: Sized {
    /// The table holding rows of this kind
    const TABLE: TableId;

    /// Size of one row in bytes for the given column widths
    fn row_size(info: &TableInfo) -> u32;

    /// Read the row with number `rid` at `offset`, advancing it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data or
    /// [`crate::Error::Malformed`] for an invalid coded index tag.
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self>;

    /// Append the encoded row to `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a value does not fit its column.
    fn write_row(&self, out: &mut Vec<u8>, info: &TableInfo) -> Result<()>;

    /// Row number
    fn rid(&self) -> u32;

    /// Metadata token of the row
    fn token(&self) -> Token {
        Token::from_parts(Self::TABLE, self.rid())
    }
}

fn push_dyn(out: &mut Vec<u8>, value: u32, is_large: bool) -> Result<()> {
    if is_large {
        out.extend_from_slice(&value.to_le_bytes());
    } else {
        let narrow = u16::try_from(value)
            .map_err(|_| malformed_error!("Index {} does not fit a 2 byte column", value))?;
        out.extend_from_slice(&narrow.to_le_bytes());
    }

    Ok(())
}

fn read_coded<T: CodedIndex>(data: &[u8], offset: &mut usize, info: &TableInfo) -> Result<Option<T>> {
    let raw = crate::file::io::read_le_at_dyn(data, offset, info.is_large_coded(T::KIND))?;
    T::decode(raw)
}

fn write_coded<T: CodedIndex>(out: &mut Vec<u8>, value: Option<T>, info: &TableInfo) -> Result<()> {
    push_dyn(
        out,
        crate::metadata::tables::encode_optional(value),
        info.is_large_coded(T::KIND),
    )
}

macro_rules! column_type {
    (u8) => { u8 };
    (u16) => { u16 };
    (u32) => { u32 };
    (str) => { u32 };
    (guid) => { u32 };
    (blob) => { u32 };
    (index($table:ident)) => { u32 };
    (coded($kind:ident)) => { Option<$kind> };
}

macro_rules! column_size {
    ($info:ident, u8) => { 1 };
    ($info:ident, u16) => { 2 };
    ($info:ident, u32) => { 4 };
    ($info:ident, str) => { $info.str_bytes() };
    ($info:ident, guid) => { $info.guid_bytes() };
    ($info:ident, blob) => { $info.blob_bytes() };
    ($info:ident, index($table:ident)) => { $info.index_bytes(TableId::$table) };
    ($info:ident, coded($kind:ident)) => {
        $info.coded_bytes(crate::metadata::tables::CodedIndexKind::$kind)
    };
}

macro_rules! column_read {
    ($data:ident, $offset:ident, $info:ident, u8) => {
        crate::file::io::read_le_at::<u8>($data, $offset)?
    };
    ($data:ident, $offset:ident, $info:ident, u16) => {
        crate::file::io::read_le_at::<u16>($data, $offset)?
    };
    ($data:ident, $offset:ident, $info:ident, u32) => {
        crate::file::io::read_le_at::<u32>($data, $offset)?
    };
    ($data:ident, $offset:ident, $info:ident, str) => {
        crate::file::io::read_le_at_dyn($data, $offset, $info.is_large_str())?
    };
    ($data:ident, $offset:ident, $info:ident, guid) => {
        crate::file::io::read_le_at_dyn($data, $offset, $info.is_large_guid())?
    };
    ($data:ident, $offset:ident, $info:ident, blob) => {
        crate::file::io::read_le_at_dyn($data, $offset, $info.is_large_blob())?
    };
    ($data:ident, $offset:ident, $info:ident, index($table:ident)) => {
        crate::file::io::read_le_at_dyn($data, $offset, $info.is_large(TableId::$table))?
    };
    ($data:ident, $offset:ident, $info:ident, coded($kind:ident)) => {
        read_coded::<$kind>($data, $offset, $info)?
    };
}

macro_rules! column_write {
    ($out:ident, $info:ident, $value:expr, u8) => {
        $out.push($value)
    };
    ($out:ident, $info:ident, $value:expr, u16) => {
        $out.extend_from_slice(&$value.to_le_bytes())
    };
    ($out:ident, $info:ident, $value:expr, u32) => {
        $out.extend_from_slice(&$value.to_le_bytes())
    };
    ($out:ident, $info:ident, $value:expr, str) => {
        push_dyn($out, $value, $info.is_large_str())?
    };
    ($out:ident, $info:ident, $value:expr, guid) => {
        push_dyn($out, $value, $info.is_large_guid())?
    };
    ($out:ident, $info:ident, $value:expr, blob) => {
        push_dyn($out, $value, $info.is_large_blob())?
    };
    ($out:ident, $info:ident, $value:expr, index($table:ident)) => {
        push_dyn($out, $value, $info.is_large(TableId::$table))?
    };
    ($out:ident, $info:ident, $value:expr, coded($kind:ident)) => {
        write_coded::<$kind>($out, $value, $info)?
    };
}

macro_rules! table_row {
    (
        $(#[$meta:meta])*
        $name:ident($table:ident) {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $kind:ident $(($arg:ident))?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Row number within the table
            pub rid: u32,
            $(
                $(#[$field_meta])*
                pub $field: column_type!($kind $(($arg))?),
            )*
        }

        impl TableRow for $name {
            const TABLE: TableId = TableId::$table;

            fn row_size(info: &TableInfo) -> u32 {
                0 $(+ column_size!(info, $kind $(($arg))?))*
            }

            fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
                Ok($name {
                    rid,
                    $($field: column_read!(data, offset, info, $kind $(($arg))?),)*
                })
            }

            fn write_row(&self, out: &mut Vec<u8>, info: &TableInfo) -> Result<()> {
                $(column_write!(out, info, self.$field, $kind $(($arg))?);)*
                Ok(())
            }

            fn rid(&self) -> u32 {
                self.rid
            }
        }
    };
}

mod assembly;
mod members;
mod types;

pub use assembly::*;
pub use members::*;
pub use types::*;
