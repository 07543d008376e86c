//! Resolved per-row records of a loaded module.
//!
//! Each definition is created from its raw table row while the module loads and then completed
//! by the loader passes (ownership ranges, nesting, constants, layouts, attributes, bodies).
//! After loading they are immutable, except for the inheritance predicates on
//! [`TypeDefinition`], which are computed on first use and cached.

use std::{ops::Range, sync::OnceLock};

use crate::metadata::{
    method::{MethodBody, MethodImplFlags, MethodModifiers, METHOD_ACCESS_MASK},
    signatures::{FieldSig, MethodSig, PropertySig, TypeSig},
    tables::{CustomAttributeType, MethodDefOrRef, TypeDefOrRef},
    typesystem::{ConstantValue, FieldAttributes, FieldId, MethodDefId, TypeAttributes, TypeDefId},
};

/// A generic parameter of a type or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParamDefinition {
    /// Position in the owner's parameter list
    pub number: u16,
    /// `GenericParamAttributes`
    pub flags: u16,
    /// Declared name
    pub name: String,
    /// Constraint types from `GenericParamConstraint`
    pub constraints: Vec<TypeDefOrRef>,
}

/// Explicit packing and size of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLayout {
    /// Field alignment, 0 for the default
    pub packing_size: u16,
    /// Total size, 0 if not given
    pub class_size: u32,
}

/// A `MethodImpl` record: `body` implements `declaration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodImplDefinition {
    /// The implementing method
    pub body: MethodDefOrRef,
    /// The implemented method
    pub declaration: MethodDefOrRef,
}

/// A custom attribute attached to some row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomAttributeDefinition {
    /// `CustomAttribute` row
    pub row: u32,
    /// Attribute constructor
    pub constructor: CustomAttributeType,
    /// Encoded constructor arguments
    pub value: Vec<u8>,
}

/// One slot of an object's instance layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceField {
    /// Type declaring the field
    pub owner: TypeDefId,
    /// The field row, `None` for slots the runtime adds to `System.Object`
    pub field: Option<FieldId>,
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: TypeSig,
}

/// A `TypeDef` row with everything it owns.
#[derive(Debug)]
pub struct TypeDefinition {
    /// 1-based row
    pub row: u32,
    /// `TypeAttributes`
    pub flags: u32,
    /// Simple name
    pub name: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Base type
    pub extends: Option<TypeDefOrRef>,
    /// Owned `Field` rows
    pub fields: Range<u32>,
    /// Owned `MethodDef` rows
    pub methods: Range<u32>,
    /// Owned `Event` rows
    pub events: Range<u32>,
    /// Owned `Property` rows
    pub properties: Range<u32>,
    /// Enclosing type row of a nested type
    pub enclosing: Option<u32>,
    /// Rows of directly nested types
    pub nested: Vec<u32>,
    /// Generic parameters, ordered by number
    pub generic_params: Vec<GenericParamDefinition>,
    /// `ClassLayout` record
    pub layout: Option<ClassLayout>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeDefOrRef>,
    /// `MethodImpl` records of this class
    pub method_impls: Vec<MethodImplDefinition>,
    pub(crate) value_type: OnceLock<bool>,
    pub(crate) enum_type: OnceLock<bool>,
    pub(crate) delegate_type: OnceLock<bool>,
    pub(crate) virtual_methods: OnceLock<Vec<MethodDefId>>,
    pub(crate) instance_fields: OnceLock<Vec<InstanceField>>,
}

impl TypeDefinition {
    pub(crate) fn new(
        row: u32,
        flags: u32,
        name: String,
        namespace: String,
        extends: Option<TypeDefOrRef>,
    ) -> Self {
        TypeDefinition {
            row,
            flags,
            name,
            namespace,
            extends,
            fields: 1..1,
            methods: 1..1,
            events: 1..1,
            properties: 1..1,
            enclosing: None,
            nested: Vec::new(),
            generic_params: Vec::new(),
            layout: None,
            interfaces: Vec::new(),
            method_impls: Vec::new(),
            value_type: OnceLock::new(),
            enum_type: OnceLock::new(),
            delegate_type: OnceLock::new(),
            virtual_methods: OnceLock::new(),
            instance_fields: OnceLock::new(),
        }
    }

    /// True for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }

    /// True for abstract types
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags & TypeAttributes::ABSTRACT != 0
    }

    /// True if field placement is left to the runtime
    #[must_use]
    pub fn is_auto_layout(&self) -> bool {
        self.flags & TypeAttributes::LAYOUT_MASK == TypeAttributes::AUTO_LAYOUT
    }

    /// True for types nested in another type
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }

    /// Names of the generic parameters in order
    #[must_use]
    pub fn generic_param_names(&self) -> Vec<String> {
        self.generic_params.iter().map(|p| p.name.clone()).collect()
    }
}

/// A `MethodDef` row.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    /// 1-based row
    pub row: u32,
    /// Owning `TypeDef` row
    pub owner: u32,
    /// Method name
    pub name: String,
    /// RVA of the body, 0 if none
    pub rva: u32,
    /// Raw `MethodAttributes`
    pub flags: u16,
    /// `MethodImplAttributes`
    pub impl_flags: MethodImplFlags,
    /// Declared signature, parameter names filled in from the `Param` table
    pub signature: MethodSig,
    /// Owned `Param` rows
    pub params: Range<u32>,
    /// Generic parameters, ordered by number
    pub generic_params: Vec<GenericParamDefinition>,
    /// Methods this one explicitly overrides
    pub overrides: Vec<MethodDefOrRef>,
    /// Decoded body
    pub body: Option<MethodBody>,
}

impl MethodDefinition {
    /// Modifier flags without the access bits
    #[must_use]
    pub fn modifiers(&self) -> MethodModifiers {
        MethodModifiers::from_method_flags(self.flags)
    }

    /// Member access bits
    #[must_use]
    pub fn access(&self) -> u16 {
        self.flags & METHOD_ACCESS_MASK
    }

    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers().contains(MethodModifiers::STATIC)
    }

    /// True for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.modifiers().contains(MethodModifiers::VIRTUAL)
    }

    /// True for methods without an implementation
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.modifiers().contains(MethodModifiers::ABSTRACT)
    }

    /// True if the method takes a fresh vtable slot
    #[must_use]
    pub fn is_new_slot(&self) -> bool {
        self.modifiers().contains(MethodModifiers::NEW_SLOT)
    }

    /// Names of the generic parameters in order
    #[must_use]
    pub fn generic_param_names(&self) -> Vec<String> {
        self.generic_params.iter().map(|p| p.name.clone()).collect()
    }
}

/// A `Field` row.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// 1-based row
    pub row: u32,
    /// Owning `TypeDef` row
    pub owner: u32,
    /// Field name
    pub name: String,
    /// `FieldAttributes`
    pub flags: u16,
    /// Declared type
    pub signature: FieldSig,
    /// Default value
    pub constant: Option<ConstantValue>,
    /// RVA of the initial data
    pub rva: Option<u32>,
    /// Explicit offset from `FieldLayout`
    pub offset: Option<u32>,
}

impl FieldDefinition {
    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// True for compile time constants
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags & FieldAttributes::LITERAL != 0
    }
}

/// A `Param` row
#[derive(Debug, Clone)]
pub struct ParamDefinition {
    /// 1-based row
    pub row: u32,
    /// `ParamAttributes`
    pub flags: u16,
    /// 0 for the return value, else the 1-based parameter position
    pub sequence: u16,
    /// Declared name
    pub name: String,
    /// Default value
    pub constant: Option<ConstantValue>,
}

/// A `Property` row
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    /// 1-based row
    pub row: u32,
    /// Owning `TypeDef` row, 0 if no property map claims it
    pub owner: u32,
    /// `PropertyAttributes`
    pub flags: u16,
    /// Property name
    pub name: String,
    /// Property signature
    pub signature: PropertySig,
    /// Default value
    pub constant: Option<ConstantValue>,
}

/// An `Event` row
#[derive(Debug, Clone)]
pub struct EventDefinition {
    /// 1-based row
    pub row: u32,
    /// Owning `TypeDef` row, 0 if no event map claims it
    pub owner: u32,
    /// `EventAttributes`
    pub flags: u16,
    /// Event name
    pub name: String,
    /// Delegate type of the event
    pub event_type: Option<TypeDefOrRef>,
}
