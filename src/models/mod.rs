//! Canonical content model shared by parsers, sync and storage

pub mod catalog;
pub mod epg;
pub mod ingest;
pub mod sync;

pub use catalog::*;
pub use epg::*;
pub use ingest::*;
pub use sync::*;
