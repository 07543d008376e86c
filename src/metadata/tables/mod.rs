//! The `#~` table stream.
//!
//! The stream starts with a small header (heap index widths, the 64-bit valid-table mask and one
//! row count per present table) followed by the rows of every present table in ascending
//! [`TableId`] order. Column widths depend on the row counts and heap flags, which
//! [`TableInfo`] computes before any row is read.
//!
//! Rows are decoded eagerly into owned records (see [`rows`], each named after its table with a
//! `Raw` suffix) and stored in one [`MetadataTable`] per kind inside [`Tables`]. Row numbers are
//! 1-based; row 0 is the null sentinel of every simple and coded index.
//!
//! ```rust
//! use cilfront::metadata::tables::{TableId, TableInfo};
//!
//! let mut rows = [0u32; 64];
//! rows[TableId::TypeDef as usize] = 70_000;
//! let info = TableInfo::new(rows, 0);
//! assert_eq!(info.index_bytes(TableId::TypeDef), 4);
//! assert_eq!(info.index_bytes(TableId::Field), 2);
//! ```

mod codedindex;
mod info;
pub mod rows;

pub use codedindex::*;
pub use info::TableInfo;
pub use rows::*;

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{file::parser::Parser, Result};

/// Identifiers of the metadata tables (ECMA-335 II.22).
///
/// The pointer tables and the edit-and-continue tables have ids so that the valid-table mask
/// can be decoded, but modules that contain them are rejected.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRVA = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOS = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOS = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Look up the table with id `value`
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        TableId::iter().find(|id| *id as u8 == value)
    }

    /// False for the pointer and edit-and-continue tables
    #[must_use]
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            TableId::FieldPtr
                | TableId::MethodPtr
                | TableId::ParamPtr
                | TableId::EventPtr
                | TableId::PropertyPtr
                | TableId::EncLog
                | TableId::EncMap
        )
    }
}

/// The rows of one table, addressed by 1-based row number.
#[derive(Debug, Clone)]
pub struct MetadataTable<T> {
    rows: Vec<T>,
}

impl<T> Default for MetadataTable<T> {
    fn default() -> Self {
        MetadataTable { rows: Vec::new() }
    }
}

impl<T> MetadataTable<T> {
    /// The row with 1-based number `rid`, `None` for 0 or past the end
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<&T> {
        if rid == 0 {
            return None;
        }

        self.rows.get(rid as usize - 1)
    }

    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// True if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in row-number order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    /// Append a row and return its 1-based number
    pub fn push(&mut self, row: T) -> u32 {
        self.rows.push(row);
        self.rows.len() as u32
    }
}

impl<'a, T> IntoIterator for &'a MetadataTable<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

macro_rules! define_tables {
    ($($field:ident: $id:ident => $row:ident),* $(,)?) => {
        /// Every supported table of a module.
        #[derive(Debug, Clone, Default)]
        #[allow(missing_docs)]
        pub struct Tables {
            $(pub $field: MetadataTable<$row>,)*
        }

        impl Tables {
            fn read_table(
                &mut self,
                id: TableId,
                count: u32,
                data: &[u8],
                offset: &mut usize,
                info: &TableInfo,
            ) -> Result<()> {
                match id {
                    $(
                        TableId::$id => {
                            for rid in 1..=count {
                                let row = <$row as TableRow>::read_row(data, offset, rid, info)?;
                                self.$field.push(row);
                            }
                            Ok(())
                        }
                    )*
                    unsupported => Err(malformed_error!(
                        "Unsupported metadata table - {:?}",
                        unsupported
                    )),
                }
            }

            /// Row counts indexed by table id, as stored in the stream header
            #[must_use]
            pub fn row_counts(&self) -> [u32; 64] {
                let mut rows = [0u32; 64];
                $(rows[TableId::$id as usize] = self.$field.row_count();)*
                rows
            }

            fn write_table(&self, id: TableId, out: &mut Vec<u8>, info: &TableInfo) -> Result<()> {
                match id {
                    $(
                        TableId::$id => {
                            for row in &self.$field {
                                row.write_row(out, info)?;
                            }
                            Ok(())
                        }
                    )*
                    _ => Ok(()),
                }
            }
        }
    };
}

define_tables! {
    module: Module => ModuleRaw,
    type_ref: TypeRef => TypeRefRaw,
    type_def: TypeDef => TypeDefRaw,
    field: Field => FieldRaw,
    method_def: MethodDef => MethodDefRaw,
    param: Param => ParamRaw,
    interface_impl: InterfaceImpl => InterfaceImplRaw,
    member_ref: MemberRef => MemberRefRaw,
    constant: Constant => ConstantRaw,
    custom_attribute: CustomAttribute => CustomAttributeRaw,
    field_marshal: FieldMarshal => FieldMarshalRaw,
    decl_security: DeclSecurity => DeclSecurityRaw,
    class_layout: ClassLayout => ClassLayoutRaw,
    field_layout: FieldLayout => FieldLayoutRaw,
    stand_alone_sig: StandAloneSig => StandAloneSigRaw,
    event_map: EventMap => EventMapRaw,
    event: Event => EventRaw,
    property_map: PropertyMap => PropertyMapRaw,
    property: Property => PropertyRaw,
    method_semantics: MethodSemantics => MethodSemanticsRaw,
    method_impl: MethodImpl => MethodImplRaw,
    module_ref: ModuleRef => ModuleRefRaw,
    type_spec: TypeSpec => TypeSpecRaw,
    impl_map: ImplMap => ImplMapRaw,
    field_rva: FieldRVA => FieldRVARaw,
    assembly: Assembly => AssemblyRaw,
    assembly_processor: AssemblyProcessor => AssemblyProcessorRaw,
    assembly_os: AssemblyOS => AssemblyOSRaw,
    assembly_ref: AssemblyRef => AssemblyRefRaw,
    assembly_ref_processor: AssemblyRefProcessor => AssemblyRefProcessorRaw,
    assembly_ref_os: AssemblyRefOS => AssemblyRefOSRaw,
    file: File => FileRaw,
    exported_type: ExportedType => ExportedTypeRaw,
    manifest_resource: ManifestResource => ManifestResourceRaw,
    nested_class: NestedClass => NestedClassRaw,
    generic_param: GenericParam => GenericParamRaw,
    method_spec: MethodSpec => MethodSpecRaw,
    generic_param_constraint: GenericParamConstraint => GenericParamConstraintRaw,
}

impl Tables {
    /// Decode the whole `#~` stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated row data and
    /// [`crate::Error::Malformed`] for pointer or edit-and-continue tables.
    pub fn read(data: &[u8]) -> Result<(Tables, TableInfo)> {
        let (info, mut offset) = TableInfo::read(data)?;

        let mut tables = Tables::default();
        for id in TableId::iter() {
            let count = info.rows(id);
            if count == 0 {
                continue;
            }

            tables.read_table(id, count, data, &mut offset, &info)?;
        }

        log::trace!(
            "decoded {} table rows across {} tables",
            TableId::iter().map(|id| u64::from(info.rows(id))).sum::<u64>(),
            TableId::iter().filter(|id| info.rows(*id) > 0).count()
        );

        Ok((tables, info))
    }

    /// Encode the tables as a `#~` stream, padded to 4 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a column value does not fit its computed width.
    pub fn write(&self, heap_flags: u8) -> Result<Vec<u8>> {
        let info = TableInfo::new(self.row_counts(), heap_flags);
        let mut out = info.write_header();

        for id in TableId::iter() {
            self.write_table(id, &mut out, &info)?;
        }

        while out.len() % 4 != 0 {
            out.push(0);
        }

        Ok(out)
    }
}

/// Reader for the fixed part of the stream header, shared with [`TableInfo::read`].
pub(crate) fn read_header_prefix(parser: &mut Parser) -> Result<(u8, u64)> {
    let _reserved = parser.read_le::<u32>()?;
    let _major = parser.read_le::<u8>()?;
    let _minor = parser.read_le::<u8>()?;
    let heap_flags = parser.read_le::<u8>()?;
    let _reserved = parser.read_le::<u8>()?;
    let valid = parser.read_le::<u64>()?;
    let _sorted = parser.read_le::<u64>()?;

    Ok((heap_flags, valid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids() {
        assert_eq!(TableId::COUNT, 45);
        assert_eq!(TableId::from_u8(0x2C), Some(TableId::GenericParamConstraint));
        assert_eq!(TableId::from_u8(0x2D), None);
        assert!(!TableId::FieldPtr.is_supported());
        assert!(TableId::Field.is_supported());
    }

    #[test]
    fn write_then_read() {
        let mut tables = Tables::default();
        tables.module.push(ModuleRaw {
            rid: 1,
            generation: 0,
            name: 1,
            mvid: 1,
            enc_id: 0,
            enc_base_id: 0,
        });
        tables.type_def.push(TypeDefRaw {
            rid: 1,
            flags: 0,
            name: 10,
            namespace: 0,
            extends: None,
            field_list: 1,
            method_list: 1,
        });
        tables.type_def.push(TypeDefRaw {
            rid: 2,
            flags: 0x0010_0001,
            name: 20,
            namespace: 30,
            extends: Some(TypeDefOrRef::TypeRef(1)),
            field_list: 1,
            method_list: 1,
        });

        let data = tables.write(0).unwrap();
        let (decoded, info) = Tables::read(&data).unwrap();
        assert_eq!(info.rows(TableId::TypeDef), 2);
        assert_eq!(decoded.type_def.row_count(), 2);

        let second = decoded.type_def.get(2).unwrap();
        assert_eq!(second.rid, 2);
        assert_eq!(second.flags, 0x0010_0001);
        assert_eq!(second.extends, Some(TypeDefOrRef::TypeRef(1)));
        assert!(decoded.type_def.get(0).is_none());
        assert!(decoded.type_def.get(3).is_none());
    }

    #[test]
    fn reject_pointer_tables() {
        let mut rows = [0u32; 64];
        rows[TableId::FieldPtr as usize] = 1;
        let info = TableInfo::new(rows, 0);
        let mut data = info.write_header();
        data.extend_from_slice(&[1, 0]);

        assert!(matches!(Tables::read(&data), Err(crate::Error::Malformed { .. })));
    }
}
