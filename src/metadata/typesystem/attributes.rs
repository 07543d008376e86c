//! Flag constants of the `TypeDef` and `Field` tables.

#[allow(non_snake_case)]
/// `TypeAttributes` (ECMA-335 II.23.1.15)
pub mod TypeAttributes {
    /// Mask of the visibility bits
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Not visible outside the assembly
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Visible outside the assembly
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested, public
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested, private
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;

    /// Mask of the layout bits
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// Fields are laid out by the runtime
    pub const AUTO_LAYOUT: u32 = 0x0000_0000;
    /// Fields are laid out in declaration order
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    /// Field offsets are given explicitly
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;

    /// The type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// The type cannot be instantiated
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// The type cannot be derived from
    pub const SEALED: u32 = 0x0000_0100;
    /// The name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Static constructor may run lazily
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// `FieldAttributes` (ECMA-335 II.23.1.5)
pub mod FieldAttributes {
    /// Mask of the access bits
    pub const FIELD_ACCESS_MASK: u16 = 0x0007;
    /// One value per type rather than per instance
    pub const STATIC: u16 = 0x0010;
    /// Assigned only by constructors
    pub const INIT_ONLY: u16 = 0x0020;
    /// Compile time constant
    pub const LITERAL: u16 = 0x0040;
    /// Has a default value in the `Constant` table
    pub const HAS_DEFAULT: u16 = 0x8000;
    /// Initial data lives at an RVA
    pub const HAS_FIELD_RVA: u16 = 0x0100;
}
