use bitflags::bitflags;

/// Mask of the member access bits in `MethodAttributes`
pub const METHOD_ACCESS_MASK: u16 = 0x0007;
/// Mask of the code type bits in `MethodImplAttributes`
pub const METHOD_IMPL_CODE_TYPE_MASK: u16 = 0x0003;

bitflags! {
    /// `MethodAttributes` without the access bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodModifiers: u16 {
        /// Defined on the type rather than per instance
        const STATIC = 0x0010;
        /// Cannot be overridden
        const FINAL = 0x0020;
        /// Virtual
        const VIRTUAL = 0x0040;
        /// Hidden by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Always takes a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Overridable only if accessible
        const STRICT = 0x0200;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// Special name
        const SPECIAL_NAME = 0x0800;
        /// Runtime special name (`.ctor`, `.cctor`)
        const RTSPECIAL_NAME = 0x1000;
        /// Implemented through platform invoke
        const PINVOKE_IMPL = 0x2000;
        /// Has declarative security
        const HAS_SECURITY = 0x4000;
        /// Calls a method with security code
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

impl MethodModifiers {
    /// Extract the modifiers from raw `MethodAttributes`
    #[must_use]
    pub fn from_method_flags(flags: u16) -> Self {
        Self::from_bits_truncate(flags & !METHOD_ACCESS_MASK)
    }
}

bitflags! {
    /// `MethodImplAttributes`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodImplFlags: u16 {
        /// Native code
        const NATIVE = 0x0001;
        /// Optimised IL
        const OPTIL = 0x0002;
        /// Implemented by the runtime
        const RUNTIME = 0x0003;
        /// Unmanaged code
        const UNMANAGED = 0x0004;
        /// Must not be inlined
        const NO_INLINING = 0x0008;
        /// Declared but implemented elsewhere
        const FORWARD_REF = 0x0010;
        /// Single threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

impl MethodImplFlags {
    /// True if the body is CIL rather than native or runtime provided
    #[must_use]
    pub fn is_il(self) -> bool {
        self.bits() & METHOD_IMPL_CODE_TYPE_MASK == 0
    }
}

bitflags! {
    /// Flags of the first header byte(s) of a method body
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header
        const TINY_FORMAT = 0x2;
        /// Fat header
        const FAT_FORMAT = 0x3;
        /// Extra data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialise locals
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags of an extra data section header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Exception handling table
        const EHTABLE = 0x1;
        /// Reserved
        const OPT_ILTABLE = 0x2;
        /// 24 byte clauses with a 3 byte size
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}
