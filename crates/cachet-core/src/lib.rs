//! cachet core
//!
//! The store backend contract shared by the cache and its storage adapters:
//! the [`StoreBackend`] trait, item handles, backend options, the backend
//! registry, and error handling.

pub mod backend;
pub mod error;
pub mod item;
pub mod registry;

pub use backend::{BackendOptions, ItemInfo, OpenItem, OpenMode, StoreBackend, temporary_location};
pub use error::{Error, Result};
pub use item::{ItemReader, ItemSink, ItemWriter, miss_on_error};
pub use registry::{BackendFactory, BackendRegistry, scheme_of};
