use super::{push_dyn, read_coded, write_coded, TableRow};
use crate::{
    metadata::tables::{Implementation, TableId, TableInfo},
    Result,
};

table_row! {
    /// `Assembly` (0x20): identity of the assembly this module belongs to.
    AssemblyRaw(Assembly) {
        /// `AssemblyHashAlgorithm`
        hash_alg_id: u32,
        /// Version, major part
        major_version: u16,
        /// Version, minor part
        minor_version: u16,
        /// Version, build part
        build_number: u16,
        /// Version, revision part
        revision_number: u16,
        /// `AssemblyFlags`
        flags: u32,
        /// `#Blob` index of the public key
        public_key: blob,
        /// `#Strings` index of the simple name
        name: str,
        /// `#Strings` index of the culture
        culture: str,
    }
}

table_row! {
    /// `AssemblyProcessor` (0x21), unused
    AssemblyProcessorRaw(AssemblyProcessor) {
        /// Processor id
        processor: u32,
    }
}

table_row! {
    /// `AssemblyOS` (0x22), unused
    AssemblyOSRaw(AssemblyOS) {
        /// Platform id
        os_platform_id: u32,
        /// OS major version
        os_major_version: u32,
        /// OS minor version
        os_minor_version: u32,
    }
}

table_row! {
    /// `AssemblyRef` (0x23): a referenced assembly.
    AssemblyRefRaw(AssemblyRef) {
        /// Version, major part
        major_version: u16,
        /// Version, minor part
        minor_version: u16,
        /// Version, build part
        build_number: u16,
        /// Version, revision part
        revision_number: u16,
        /// `AssemblyFlags`
        flags: u32,
        /// `#Blob` index of the public key or token
        public_key_or_token: blob,
        /// `#Strings` index of the simple name
        name: str,
        /// `#Strings` index of the culture
        culture: str,
        /// `#Blob` index of the hash value
        hash_value: blob,
    }
}

table_row! {
    /// `AssemblyRefProcessor` (0x24), unused
    AssemblyRefProcessorRaw(AssemblyRefProcessor) {
        /// Processor id
        processor: u32,
        /// The assembly reference
        assembly_ref: index(AssemblyRef),
    }
}

table_row! {
    /// `AssemblyRefOS` (0x25), unused
    AssemblyRefOSRaw(AssemblyRefOS) {
        /// Platform id
        os_platform_id: u32,
        /// OS major version
        os_major_version: u32,
        /// OS minor version
        os_minor_version: u32,
        /// The assembly reference
        assembly_ref: index(AssemblyRef),
    }
}

table_row! {
    /// `File` (0x26): another file of a multi-file assembly.
    FileRaw(File) {
        /// `FileAttributes`
        flags: u32,
        /// `#Strings` index of the file name
        name: str,
        /// `#Blob` index of the hash value
        hash_value: blob,
    }
}

table_row! {
    /// `ExportedType` (0x27)
    ExportedTypeRaw(ExportedType) {
        /// `TypeAttributes`
        flags: u32,
        /// Hint: the `TypeDef` row in the defining module
        type_def_id: u32,
        /// `#Strings` index of the type name
        name: str,
        /// `#Strings` index of the namespace
        namespace: str,
        /// Where the type lives
        implementation: coded(Implementation),
    }
}

table_row! {
    /// `ManifestResource` (0x28)
    ManifestResourceRaw(ManifestResource) {
        /// Offset into the resource section
        offset: u32,
        /// `ManifestResourceAttributes`
        flags: u32,
        /// `#Strings` index of the name
        name: str,
        /// Where the resource lives, `None` for this file
        implementation: coded(Implementation),
    }
}
