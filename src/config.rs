//! Options shared by every stage of a compilation session.

/// Default recursion guard for signature parsing and generic substitution.
pub const DEFAULT_MAX_SIGNATURE_DEPTH: usize = 64;

/// Settings carried by a [`crate::Session`].
///
/// ```rust
/// use cilfront::CompileOptions;
///
/// let options = CompileOptions::default()
///     .with_internal_opcodes(true)
///     .with_max_signature_depth(32);
/// assert!(options.allow_internal_opcodes);
/// assert_eq!(options.corlib_name, "mscorlib");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Permit the `0xFD` internal opcode table in method bodies
    pub allow_internal_opcodes: bool,
    /// Nesting limit for signature parsing and generic substitution
    pub max_signature_depth: usize,
    /// Name of the core library that defines `System.Object` and friends
    pub corlib_name: String,
    /// Name of the runtime support module with compiler intrinsics
    pub support_module: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            allow_internal_opcodes: false,
            max_signature_depth: DEFAULT_MAX_SIGNATURE_DEPTH,
            corlib_name: "mscorlib".to_string(),
            support_module: "libsupcs".to_string(),
        }
    }
}

impl CompileOptions {
    /// Allow or forbid the internal opcode table
    #[must_use]
    pub fn with_internal_opcodes(mut self, allow: bool) -> Self {
        self.allow_internal_opcodes = allow;
        self
    }

    /// Set the signature recursion guard
    #[must_use]
    pub fn with_max_signature_depth(mut self, depth: usize) -> Self {
        self.max_signature_depth = depth;
        self
    }

    /// Set the core library name
    #[must_use]
    pub fn with_corlib_name(mut self, name: impl Into<String>) -> Self {
        self.corlib_name = name.into();
        self
    }

    /// Set the runtime support module name
    #[must_use]
    pub fn with_support_module(mut self, name: impl Into<String>) -> Self {
        self.support_module = name.into();
        self
    }
}
