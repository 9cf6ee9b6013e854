//! Archive storage lookup
//!
//! Maps client-supplied archive identifiers onto directories under the
//! configured storage root. The storage root is only ever read.

pub mod identifier;
pub mod resolver;

pub use identifier::{ArchiveId, ArchiveRequest};
pub use resolver::{resolve_request, DirectoryResolver, StorageResolver};
