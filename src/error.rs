use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every failure this library can report.
///
/// The variants are grouped the way callers are expected to react to them:
///
/// ## Format errors
/// The input image (or a signature / bytecode stream inside it) is not well formed. A module
/// that produced one of these during loading is unusable as a whole.
/// - [`Error::Malformed`], [`Error::OutOfBounds`], [`Error::Empty`]
/// - [`Error::BadImageSignature`], [`Error::TruncatedHeader`], [`Error::OptionalHeaderTooSmall`],
///   [`Error::UnsupportedCharacteristics`], [`Error::RvaNotMapped`], [`Error::UnknownStream`]
/// - [`Error::UnknownElementType`], [`Error::UnknownOpcode`], [`Error::RestrictedOpcode`],
///   [`Error::RecursionLimit`]
///
/// ## Resolution errors
/// A reference could not be bound to a definition. Only the unit being compiled is affected.
/// - [`Error::AssemblyNotFound`], [`Error::TypeNotFound`], [`Error::MemberNotFound`],
///   [`Error::DuplicateOwnership`]
///
/// ## Internal consistency errors
/// - [`Error::NoEncoding`], [`Error::StackMismatch`], [`Error::IncompatibleIndex`],
///   [`Error::LockError`]
///
/// # Examples
///
/// ```rust,no_run
/// use cilfront::{Error, Session};
///
/// let session = Session::default();
/// match session.load_file(std::path::Path::new("app.dll")) {
///     Ok(module) => println!("loaded {:?}", module),
///     Err(Error::RvaNotMapped(rva)) => eprintln!("bad rva 0x{rva:08x}"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // File parsing Errors
    /// The file is damaged and could not be parsed.
    ///
    /// Carries the source location where the problem was detected to ease debugging.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The image does not start with the `MZ` / `PE\0\0` signatures.
    #[error("Invalid image signature")]
    BadImageSignature,

    /// The image ended before a fixed-size header was complete.
    #[error("Truncated header - {0}")]
    TruncatedHeader(&'static str),

    /// The PE optional header is shorter than the 224 bytes a CLI image needs.
    #[error("Optional header too small - {0} bytes")]
    OptionalHeaderTooSmall(u16),

    /// The COFF characteristics are not one of the accepted CLI image kinds.
    #[error("Unsupported image characteristics - 0x{0:04x}")]
    UnsupportedCharacteristics(u16),

    /// No section covers the relative virtual address.
    #[error("RVA not defined - 0x{0:08x}")]
    RvaNotMapped(u32),

    /// A metadata stream with an unrecognised name was found.
    #[error("Unknown metadata table - {0}")]
    UnknownStream(String),

    /// A signature blob could not be decoded.
    #[error("Invalid signature - {0}")]
    InvalidSignature(String),

    /// A signature contained an element type tag that has no meaning at that position.
    #[error("Element type not recognised - 0x{0:02x}")]
    UnknownElementType(u8),

    /// The bytecode stream contained an opcode that is not defined.
    #[error("Unknown opcode - 0x{0:04x}")]
    UnknownOpcode(u16),

    /// An internal-use opcode was found while internal opcodes are not allowed.
    #[error("Opcode 0x{0:04x} is restricted to internal code")]
    RestrictedOpcode(u16),

    /// A recursive structure exceeded the configured depth.
    #[error("Reached the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Errors reported by the PE parser.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    // Resolution errors
    /// A referenced assembly is not loaded in the session.
    #[error("Assembly not found - {0}")]
    AssemblyNotFound(String),

    /// A type could not be found by name or token.
    #[error("Type not found - {0}")]
    TypeNotFound(String),

    /// A method or field could not be found by name and signature.
    #[error("Member not found - {0}")]
    MemberNotFound(String),

    /// Two records claim ownership of the same row.
    #[error("Duplicate ownership - {0}")]
    DuplicateOwnership(String),

    /// A token does not refer to a row of the expected kind.
    #[error("Unexpected token - {0}")]
    UnexpectedToken(Token),

    // Internal consistency errors
    /// There is no encoder registered for the instruction.
    #[error("No encoding available for {0}")]
    NoEncoding(String),

    /// The abstract evaluation stack has an impossible shape.
    #[error("Stack mismatch - {0}")]
    StackMismatch(String),

    /// Two table indices of different kinds were compared or combined.
    #[error("Incompatible table index - {0}")]
    IncompatibleIndex(String),

    /// A shared structure could not be locked.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
