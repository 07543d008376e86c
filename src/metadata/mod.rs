//! Metadata reading and the linked module model.
//!
//! # Key Components
//!
//! - [`root`] and [`streams`] - the metadata root, the stream directory and the four heaps
//! - [`tables`] - row catalog, coded indices and the `#~` stream codec
//! - [`method`] - method body headers and exception clauses
//! - [`signatures`] - the signature algebra: parsing, comparison, substitution, mangling
//! - [`typesystem`] - linked definitions and the keys for compilation requests
//! - [`module`] - a loaded module after the post-processing passes
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilfront::{file::File, metadata::{module::Module, typesystem::ModuleId}, CompileOptions};
//!
//! let file = File::from_file("tests/samples/hello.exe".as_ref())?;
//! let module = Module::load(ModuleId(0), &file, &CompileOptions::default())?;
//! println!("{}: {} types", module.name(), module.types().len());
//! # Ok::<(), cilfront::Error>(())
//! ```

/// The CLI header
pub mod cor20header;
pub(crate) mod loader;
/// Method bodies and method flags
pub mod method;
/// Loaded modules
pub mod module;
/// The metadata root
pub mod root;
/// The signature algebra
pub mod signatures;
/// Metadata heaps
pub mod streams;
/// Metadata tables
pub mod tables;
/// Metadata tokens
pub mod token;
/// Linked definitions
pub mod typesystem;
