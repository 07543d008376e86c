use strum::{EnumIter, IntoEnumIterator};

use crate::metadata::{token::Token, typesystem::ModuleId};

#[allow(non_snake_case, dead_code, missing_docs)]
/// Leading bytes of type signatures
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDefOrRef compressed token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDefOrRef compressed token
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 ... loCount lo1 ...
    pub const ARRAY: u8 = 0x14;
    // type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    pub const SZARRAY: u8 = 0x1d;
    pub const MVAR: u8 = 0x1e;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
    pub const BOXED: u8 = 0x51;
    // Compiler internal kinds
    pub const REF_GENERIC_PARAM: u8 = 0xfc;
    pub const UNINSTANTIATED_GENERIC_PARAM: u8 = 0xfd;
    pub const VIRT_FTN_PTR: u8 = 0xfe;
}

/// Primitive kinds, including the compiler internal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
#[repr(u8)]
pub enum ElementType {
    /// Placeholder for an absent slot
    End = ELEMENT_TYPE::END,
    /// void
    Void = ELEMENT_TYPE::VOID,
    /// bool
    Boolean = ELEMENT_TYPE::BOOLEAN,
    /// char
    Char = ELEMENT_TYPE::CHAR,
    /// int8
    I1 = ELEMENT_TYPE::I1,
    /// uint8
    U1 = ELEMENT_TYPE::U1,
    /// int16
    I2 = ELEMENT_TYPE::I2,
    /// uint16
    U2 = ELEMENT_TYPE::U2,
    /// int32
    I4 = ELEMENT_TYPE::I4,
    /// uint32
    U4 = ELEMENT_TYPE::U4,
    /// int64
    I8 = ELEMENT_TYPE::I8,
    /// uint64
    U8 = ELEMENT_TYPE::U8,
    /// float32
    R4 = ELEMENT_TYPE::R4,
    /// float64
    R8 = ELEMENT_TYPE::R8,
    /// System.String
    String = ELEMENT_TYPE::STRING,
    /// System.TypedReference
    TypedByRef = ELEMENT_TYPE::TYPEDBYREF,
    /// native int
    I = ELEMENT_TYPE::I,
    /// native unsigned int
    U = ELEMENT_TYPE::U,
    /// System.Object
    Object = ELEMENT_TYPE::OBJECT,
    /// Reference type standing in for a generic parameter in shared code
    RefGenericParam = ELEMENT_TYPE::REF_GENERIC_PARAM,
    /// Generic parameter without instantiation
    UninstantiatedGenericParam = ELEMENT_TYPE::UNINSTANTIATED_GENERIC_PARAM,
    /// Pointer to a virtual method implementation
    VirtFtnPtr = ELEMENT_TYPE::VIRT_FTN_PTR,
}

impl ElementType {
    /// Map a signature byte onto a primitive kind
    #[must_use]
    pub fn from_u8(value: u8) -> Option<ElementType> {
        ElementType::iter().find(|kind| *kind as u8 == value)
    }

    /// True for the kinds a signature blob may name with a single tag byte.
    ///
    /// `End` and the compiler-internal kinds only appear in signatures built in memory.
    #[must_use]
    pub fn is_signature_primitive(self) -> bool {
        matches!(
            self as u8,
            0x01..=0x0e | ELEMENT_TYPE::TYPEDBYREF | ELEMENT_TYPE::I | ELEMENT_TYPE::U | ELEMENT_TYPE::OBJECT
        )
    }

    /// The `System` type name for the primitives the core library defines
    #[must_use]
    pub fn system_name(self) -> Option<&'static str> {
        Some(match self {
            ElementType::Void => "Void",
            ElementType::Boolean => "Boolean",
            ElementType::Char => "Char",
            ElementType::I1 => "SByte",
            ElementType::U1 => "Byte",
            ElementType::I2 => "Int16",
            ElementType::U2 => "UInt16",
            ElementType::I4 => "Int32",
            ElementType::U4 => "UInt32",
            ElementType::I8 => "Int64",
            ElementType::U8 => "UInt64",
            ElementType::R4 => "Single",
            ElementType::R8 => "Double",
            ElementType::String => "String",
            ElementType::TypedByRef => "TypedReference",
            ElementType::I => "IntPtr",
            ElementType::U => "UIntPtr",
            ElementType::Object => "Object",
            _ => return None,
        })
    }

    /// Inverse of [`ElementType::system_name`]
    #[must_use]
    pub fn from_system_name(name: &str) -> Option<ElementType> {
        ElementType::iter().find(|kind| kind.system_name() == Some(name))
    }

    /// True for kinds that are passed by value on the evaluation stack
    #[must_use]
    pub fn is_value_type(self) -> bool {
        !matches!(
            self,
            ElementType::String | ElementType::Object | ElementType::RefGenericParam
        )
    }
}

/// A `TypeDefOrRef` token, qualified by the module it is valid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    /// Module whose tables the token indexes
    pub module: ModuleId,
    /// `TypeDef`, `TypeRef` or `TypeSpec` token
    pub token: Token,
}

impl ClassRef {
    /// Qualify `token` with `module`
    #[must_use]
    pub fn new(module: ModuleId, token: Token) -> Self {
        ClassRef { module, token }
    }
}

/// Shape of a general array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    /// Element type
    pub elem: TypeSig,
    /// Number of dimensions
    pub rank: u32,
    /// Declared sizes, may be shorter than `rank`
    pub sizes: Vec<u32>,
    /// Declared lower bounds, may be shorter than `rank`
    pub lo_bounds: Vec<i32>,
}

/// Which generic list an uninstantiated parameter came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericOrigin {
    /// A type parameter (`!n`)
    Type,
    /// A method parameter (`!!n`)
    Method,
}

/// The type algebra of signatures.
///
/// `PartialEq` is syntactic. Use [`crate::metadata::signatures::compare_types`] for the
/// structural comparison that sees through type references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// A primitive kind
    Primitive(ElementType),
    /// A type defined in metadata
    Class(ClassRef),
    /// A boxed value type
    Boxed(Box<TypeSig>),
    /// Instantiation of a generic type
    GenericInst {
        /// The generic type definition
        base: Box<TypeSig>,
        /// Type arguments
        args: Vec<TypeSig>,
    },
    /// Single dimension, zero based array
    SzArray(Box<TypeSig>),
    /// General array
    Array(Box<ArrayShape>),
    /// Managed reference
    ByRef(Box<TypeSig>),
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Type generic parameter by position
    Var(u32),
    /// Method generic parameter by position
    MVar(u32),
    /// A generic parameter that had no instantiation to substitute from
    Uninstantiated {
        /// Position in the originating list
        index: u32,
        /// Name of the parameter slot, if it had one
        name: Option<String>,
        /// Originating list
        origin: GenericOrigin,
    },
}

impl TypeSig {
    /// Shorthand for a primitive
    #[must_use]
    pub fn primitive(kind: ElementType) -> TypeSig {
        TypeSig::Primitive(kind)
    }

    /// Shorthand for a metadata defined type
    #[must_use]
    pub fn class(module: ModuleId, token: Token) -> TypeSig {
        TypeSig::Class(ClassRef::new(module, token))
    }

    /// The primitive kind, if this is one
    #[must_use]
    pub fn as_primitive(&self) -> Option<ElementType> {
        match self {
            TypeSig::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The generic definition and arguments, looking through one boxed, by-ref or pointer wrapper.
    #[must_use]
    pub fn generic_instance(&self) -> Option<(&TypeSig, &[TypeSig])> {
        match self {
            TypeSig::GenericInst { base, args } => Some((base, args)),
            TypeSig::Boxed(inner) | TypeSig::ByRef(inner) | TypeSig::Ptr(inner) => {
                match inner.as_ref() {
                    TypeSig::GenericInst { base, args } => Some((base, args)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The underlying metadata type of a class or generic instantiation
    #[must_use]
    pub fn class_ref(&self) -> Option<ClassRef> {
        match self {
            TypeSig::Class(class) => Some(*class),
            TypeSig::GenericInst { base, .. } => base.class_ref(),
            _ => None,
        }
    }

    /// False if an uninstantiated parameter occurs anywhere inside
    #[must_use]
    pub fn is_instantiable(&self) -> bool {
        match self {
            TypeSig::Uninstantiated { .. }
            | TypeSig::Primitive(ElementType::UninstantiatedGenericParam) => false,
            TypeSig::Primitive(_) | TypeSig::Class(_) | TypeSig::Var(_) | TypeSig::MVar(_) => {
                true
            }
            TypeSig::Boxed(inner)
            | TypeSig::SzArray(inner)
            | TypeSig::ByRef(inner)
            | TypeSig::Ptr(inner) => inner.is_instantiable(),
            TypeSig::Array(shape) => shape.elem.is_instantiable(),
            TypeSig::GenericInst { base, args } => {
                base.is_instantiable() && args.iter().all(TypeSig::is_instantiable)
            }
        }
    }
}

/// A custom modifier on a parameter or field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomMod {
    /// `modreq` rather than `modopt`
    pub required: bool,
    /// The modifier type
    pub class: ClassRef,
}

/// A parameter, return or local slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    /// Slot type
    pub ty: TypeSig,
    /// Custom modifiers, in signature order
    pub custom_mods: Vec<CustomMod>,
    /// Pinned local
    pub pinned: bool,
    /// Name, where known
    pub name: Option<String>,
}

impl Param {
    /// An unnamed slot of `ty`
    #[must_use]
    pub fn new(ty: TypeSig) -> Self {
        Param {
            ty,
            custom_mods: Vec::new(),
            pinned: false,
            name: None,
        }
    }

    /// A named slot of `ty`
    #[must_use]
    pub fn named(ty: TypeSig, name: impl Into<String>) -> Self {
        Param {
            name: Some(name.into()),
            ..Param::new(ty)
        }
    }

    /// The placeholder used to pad parameter lists
    #[must_use]
    pub fn empty() -> Self {
        Param::new(TypeSig::Primitive(ElementType::End))
    }

    /// True for a padding placeholder
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ty == TypeSig::Primitive(ElementType::End)
    }
}

/// Calling convention as far as signatures distinguish it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallConv {
    /// Managed default
    #[default]
    Default = 0,
    /// Variable arguments
    VarArg = 1,
    /// Generic method
    Generic = 2,
}

impl CallConv {
    /// Decode the numeric form used in mangled names
    #[must_use]
    pub fn from_u32(value: u32) -> Option<CallConv> {
        match value {
            0 => Some(CallConv::Default),
            1 => Some(CallConv::VarArg),
            2 => Some(CallConv::Generic),
            _ => None,
        }
    }
}

/// A method signature (`MethodDefSig` / `MethodRefSig`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MethodSig {
    /// Instance method
    pub has_this: bool,
    /// `this` is the first declared parameter
    pub explicit_this: bool,
    /// Calling convention
    pub call_conv: CallConv,
    /// Generic parameter count for generic methods
    pub gen_param_count: u32,
    /// Return slot
    pub ret: Param,
    /// Declared parameters, without an implicit `this`
    pub params: Vec<Param>,
    /// Index of the first parameter after a vararg sentinel
    pub sentinel: Option<usize>,
}

impl Default for Param {
    fn default() -> Self {
        Param::new(TypeSig::Primitive(ElementType::Void))
    }
}

impl MethodSig {
    /// Static method returning `ret` with the given parameters
    #[must_use]
    pub fn new(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            ret: Param::new(ret),
            params: params.into_iter().map(Param::new).collect(),
            ..MethodSig::default()
        }
    }

    /// The same signature as an instance method
    #[must_use]
    pub fn with_this(mut self) -> Self {
        self.has_this = true;
        self
    }

    /// True if an implicit `this` precedes the declared parameters
    #[must_use]
    pub fn has_implicit_this(&self) -> bool {
        self.has_this && !self.explicit_this
    }

    /// Number of argument slots including an implicit `this`
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_implicit_this())
    }
}

/// A generic method instantiation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericMethodSig {
    /// The generic method's own signature
    pub method: MethodSig,
    /// Method type arguments
    pub args: Vec<TypeSig>,
}

/// A method signature, possibly instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodSignature {
    /// Plain or uninstantiated generic method
    Method(MethodSig),
    /// Instantiated generic method
    Generic(GenericMethodSig),
}

impl MethodSignature {
    /// The underlying method signature
    #[must_use]
    pub fn method(&self) -> &MethodSig {
        match self {
            MethodSignature::Method(sig) => sig,
            MethodSignature::Generic(generic) => &generic.method,
        }
    }

    /// Mutable access to the underlying method signature
    pub fn method_mut(&mut self) -> &mut MethodSig {
        match self {
            MethodSignature::Method(sig) => sig,
            MethodSignature::Generic(generic) => &mut generic.method,
        }
    }

    /// Method type arguments, if instantiated
    #[must_use]
    pub fn generic_args(&self) -> Option<&[TypeSig]> {
        match self {
            MethodSignature::Method(_) => None,
            MethodSignature::Generic(generic) => Some(&generic.args),
        }
    }
}

impl From<MethodSig> for MethodSignature {
    fn from(sig: MethodSig) -> Self {
        MethodSignature::Method(sig)
    }
}

/// Field signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSig {
    /// Field type with its custom modifiers
    pub ty: Param,
}

/// Property signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertySig {
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub ty: Param,
    /// Indexer parameters
    pub params: Vec<Param>,
}

/// Local variable signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LocalVarSig {
    /// One slot per local
    pub locals: Vec<Param>,
}

/// Method instantiation signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSpecSig {
    /// Method type arguments
    pub args: Vec<TypeSig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_types() {
        assert_eq!(ElementType::from_u8(0x08), Some(ElementType::I4));
        assert_eq!(ElementType::from_u8(0xfe), Some(ElementType::VirtFtnPtr));
        assert_eq!(ElementType::from_u8(0x11), None);

        assert!(ElementType::String.is_signature_primitive());
        assert!(ElementType::TypedByRef.is_signature_primitive());
        assert!(!ElementType::End.is_signature_primitive());
        assert!(!ElementType::RefGenericParam.is_signature_primitive());
        assert!(!ElementType::UninstantiatedGenericParam.is_signature_primitive());
        assert!(!ElementType::VirtFtnPtr.is_signature_primitive());
        assert_eq!(ElementType::from_system_name("IntPtr"), Some(ElementType::I));
        assert_eq!(ElementType::Object.system_name(), Some("Object"));
        assert!(!ElementType::String.is_value_type());
    }

    #[test]
    fn generic_instance_through_wrappers() {
        let inst = TypeSig::GenericInst {
            base: Box::new(TypeSig::class(ModuleId(0), Token(0x0200_0002))),
            args: vec![TypeSig::Primitive(ElementType::I4)],
        };
        let boxed = TypeSig::Boxed(Box::new(inst.clone()));

        let (base, args) = boxed.generic_instance().unwrap();
        assert_eq!(base.class_ref().unwrap().token, Token(0x0200_0002));
        assert_eq!(args.len(), 1);
        assert_eq!(inst.class_ref(), base.class_ref());

        let nested = TypeSig::ByRef(Box::new(boxed));
        assert!(nested.generic_instance().is_none());
    }

    #[test]
    fn instantiable() {
        let open = TypeSig::SzArray(Box::new(TypeSig::Uninstantiated {
            index: 0,
            name: None,
            origin: GenericOrigin::Type,
        }));
        assert!(!open.is_instantiable());
        assert!(TypeSig::Var(0).is_instantiable());
    }

    #[test]
    fn method_arg_count() {
        let sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![TypeSig::Primitive(ElementType::I4)],
        )
        .with_this();
        assert_eq!(sig.arg_count(), 2);
        assert!(Param::empty().is_empty());
    }
}
