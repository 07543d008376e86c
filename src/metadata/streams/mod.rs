//! Metadata streams: the four heaps and the stream directory.
//!
//! A metadata root names its streams in a directory of [`StreamHeader`]s. The heaps are copied
//! out of the image into owned buffers so a loaded module does not borrow the file:
//!
//! - **`#Strings`** ([`Strings`]): NUL terminated UTF-8 identifiers
//! - **`#US`** ([`UserStrings`]): UTF-16 literals for `ldstr`
//! - **`#Blob`** ([`Blob`]): signatures, constant values and attribute arguments
//! - **`#GUID`** ([`Guid`]): 16 byte module identifiers
//!
//! The fifth stream, `#~`, holds the tables and is decoded by [`crate::metadata::tables`].
//! Heaps that an image omits behave as a heap with a single zero byte.

mod blob;
mod guid;
mod streamheader;
mod strings;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use streamheader::{StreamHeader, STREAM_NAMES};
pub use strings::Strings;
pub use userstrings::UserStrings;
