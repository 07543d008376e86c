//! Cross-module handles into the session's module arena.

use std::fmt;

use crate::metadata::{tables::TableId, token::Token};

/// Index of a loaded module inside a [`crate::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// Position in the session's module list
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

macro_rules! row_handle {
    ($(#[$meta:meta])* $name:ident => $table:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            /// Owning module
            pub module: ModuleId,
            /// 1-based row
            pub row: u32,
        }

        impl $name {
            /// Handle for `row` in `module`
            #[must_use]
            pub fn new(module: ModuleId, row: u32) -> Self {
                $name { module, row }
            }

            /// The row's token inside its module
            #[must_use]
            pub fn token(&self) -> Token {
                Token::from_parts(TableId::$table, self.row)
            }
        }
    };
}

row_handle!(
    /// A `TypeDef` row of some module
    TypeDefId => TypeDef
);
row_handle!(
    /// A `MethodDef` row of some module
    MethodDefId => MethodDef
);
row_handle!(
    /// A `Field` row of some module
    FieldId => Field
);
