//! Typed coded indices (ECMA-335 II.24.2.6).
//!
//! Every coded-index column is decoded into its own enum whose variants are the candidate
//! tables, each carrying the 1-based row. A zero row decodes to `None`, so an index that does
//! not point to a row is not representable as a variant.

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Error, Result,
};

/// Behaviour shared by all typed coded indices.
pub trait CodedIndex: Sized + Copy {
    /// The coded-index kind, used for column width computation
    const KIND: CodedIndexKind;

    /// Decode a raw column value, `None` for a null row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a tag without candidate table.
    fn decode(value: u32) -> Result<Option<Self>>;

    /// Encode as a raw column value
    fn encode(&self) -> u32;

    /// The table this index points into
    fn table(&self) -> TableId;

    /// The 1-based row
    fn row(&self) -> u32;

    /// Convert a full token into this kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::IncompatibleIndex`] if the token's table is not a candidate.
    fn from_token(token: Token) -> Result<Self>;

    /// The metadata token of the referenced row
    fn token(&self) -> Token {
        Token::from_parts(self.table(), self.row())
    }
}

/// Encode an optional coded index, 0 for `None`
pub fn encode_optional<T: CodedIndex>(index: Option<T>) -> u32 {
    index.map_or(0, |index| index.encode())
}

macro_rules! coded_index {
    ($(
        $(#[$meta:meta])*
        $name:ident: $bits:literal => [$($tag:literal => $table:ident),* $(,)?]
    );* $(;)?) => {
        /// All coded-index kinds.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
        #[allow(missing_docs)]
        pub enum CodedIndexKind {
            $($name,)*
        }

        impl CodedIndexKind {
            /// Number of tag bits
            #[must_use]
            pub fn tag_bits(self) -> u32 {
                match self {
                    $(CodedIndexKind::$name => $bits,)*
                }
            }

            /// Candidate tables, in tag order with unused tags left out
            #[must_use]
            pub fn tables(self) -> &'static [TableId] {
                match self {
                    $(CodedIndexKind::$name => &[$(TableId::$table),*],)*
                }
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            #[allow(missing_docs)]
            pub enum $name {
                $($table(u32),)*
            }

            impl CodedIndex for $name {
                const KIND: CodedIndexKind = CodedIndexKind::$name;

                fn decode(value: u32) -> Result<Option<Self>> {
                    let tag = value & ((1 << $bits) - 1);
                    let row = value >> $bits;
                    if row == 0 {
                        return Ok(None);
                    }

                    match tag {
                        $($tag => Ok(Some($name::$table(row))),)*
                        _ => Err(malformed_error!(
                            "Invalid {} tag - {}",
                            stringify!($name),
                            tag
                        )),
                    }
                }

                fn encode(&self) -> u32 {
                    match self {
                        $($name::$table(row) => (row << $bits) | $tag,)*
                    }
                }

                fn table(&self) -> TableId {
                    match self {
                        $($name::$table(_) => TableId::$table,)*
                    }
                }

                fn row(&self) -> u32 {
                    match self {
                        $($name::$table(row) => *row,)*
                    }
                }

                fn from_token(token: Token) -> Result<Self> {
                    match token.table_id() {
                        $(Some(TableId::$table) => Ok($name::$table(token.row())),)*
                        _ => Err(Error::IncompatibleIndex(format!(
                            "{} is not a {} index",
                            token,
                            stringify!($name)
                        ))),
                    }
                }
            }

            impl From<$name> for Token {
                fn from(index: $name) -> Token {
                    index.token()
                }
            }
        )*
    };
}

coded_index! {
    /// A type: definition, reference or specification.
    TypeDefOrRef: 2 => [0 => TypeDef, 1 => TypeRef, 2 => TypeSpec];

    /// Owner of a `Constant` row.
    HasConstant: 2 => [0 => Field, 1 => Param, 2 => Property];

    /// Owner of a `CustomAttribute` row.
    HasCustomAttribute: 5 => [
        0 => MethodDef,
        1 => Field,
        2 => TypeRef,
        3 => TypeDef,
        4 => Param,
        5 => InterfaceImpl,
        6 => MemberRef,
        7 => Module,
        8 => DeclSecurity,
        9 => Property,
        10 => Event,
        11 => StandAloneSig,
        12 => ModuleRef,
        13 => TypeSpec,
        14 => Assembly,
        15 => AssemblyRef,
        16 => File,
        17 => ExportedType,
        18 => ManifestResource,
        19 => GenericParam,
        20 => GenericParamConstraint,
        21 => MethodSpec,
    ];

    /// Owner of a `FieldMarshal` row.
    HasFieldMarshal: 1 => [0 => Field, 1 => Param];

    /// Owner of a `DeclSecurity` row.
    HasDeclSecurity: 2 => [0 => TypeDef, 1 => MethodDef, 2 => Assembly];

    /// Parent of a `MemberRef` row.
    MemberRefParent: 3 => [
        0 => TypeDef,
        1 => TypeRef,
        2 => ModuleRef,
        3 => MethodDef,
        4 => TypeSpec,
    ];

    /// Event or property associated with accessor methods.
    HasSemantics: 1 => [0 => Event, 1 => Property];

    /// A method: definition or member reference.
    MethodDefOrRef: 1 => [0 => MethodDef, 1 => MemberRef];

    /// Target of an `ImplMap` row.
    MemberForwarded: 1 => [0 => Field, 1 => MethodDef];

    /// Location of an exported type or manifest resource.
    Implementation: 2 => [0 => File, 1 => AssemblyRef, 2 => ExportedType];

    /// Constructor of a custom attribute. Tags 0, 1 and 4 are unused.
    CustomAttributeType: 3 => [2 => MethodDef, 3 => MemberRef];

    /// Scope of a `TypeRef` row.
    ResolutionScope: 2 => [0 => Module, 1 => ModuleRef, 2 => AssemblyRef, 3 => TypeRef];

    /// Owner of a `GenericParam` row.
    TypeOrMethodDef: 1 => [0 => TypeDef, 1 => MethodDef];
}
