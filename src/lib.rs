// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # cilfront
//!
//! The front end of an ahead-of-time compiler for .NET assemblies. `cilfront` reads CLI images
//! (PE files carrying ECMA-335 metadata), links the metadata of every loaded module into one
//! compilation [`Session`], and lowers CIL method bodies into a typed three-address code that a
//! native back end can consume.
//!
//! ## Features
//!
//! - **Binary reading** - PE validation, RVA mapping, the CLI header, the metadata root and all
//!   four heaps
//! - **Metadata tables** - every ECMA-335 table with typed coded indices, decoded eagerly and
//!   linked by post-processing passes (ownership ranges, nesting, generic parameters, layouts)
//! - **Signature algebra** - parsing, structural comparison across modules, generic
//!   substitution, rendering and name mangling
//! - **Bytecode graph** - instruction decoding for the single-byte, `0xFE` and compiler-internal
//!   `0xFD` tables, with successor and predecessor links and exception handler roots
//! - **Lowering** - evaluation stack typing and emission of three-address code, method by
//!   method or in parallel across a module
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilfront::prelude::*;
//!
//! let session = Session::new(CompileOptions::default());
//! session.load_file("mscorlib.dll".as_ref())?;
//! let app = session.load_file("App.exe".as_ref())?;
//!
//! for lowered in session.lower_all(app)? {
//!     match lowered {
//!         Ok(method) => println!("{method}"),
//!         Err(error) => eprintln!("skipped: {error}"),
//!     }
//! }
//! # Ok::<(), cilfront::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - the PE container and bounds-checked binary access
//! - [`metadata`] - heaps, tables, method bodies, signatures and loaded modules
//! - [`assembly`] - opcode tables, the instruction decoder and [`assembly::CilGraph`]
//! - [`session`] - cross-module resolution, inheritance queries and signature hooks
//! - [`lowering`] - the three-address code and the encoder producing it
//! - [`builder`] - [`builder::ImageBuilder`], which produces images in memory for tests
//! - [`config`] - [`CompileOptions`]
//!
//! Logging goes through the [`log`] facade: module loading and lowering summaries at `debug`,
//! methods that fail to lower at `warn`, table decoding detail at `trace`.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub mod assembly;
pub mod builder;
pub mod config;
pub mod file;
pub mod lowering;
pub mod metadata;
pub mod prelude;
pub mod session;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

pub use config::CompileOptions;
pub use error::Error;
pub use session::Session;
