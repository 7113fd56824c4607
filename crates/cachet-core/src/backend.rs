//! Store backend contract.
//!
//! A store backend persists the cache's items under a location. The cache
//! manager only talks to storage through [`StoreBackend`], so any medium that
//! can implement the operations below can hold a cache.

use crate::item::{ItemReader, ItemWriter};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Options passed to [`StoreBackend::configure`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Whether the cache compresses items before storing them.
    #[serde(default)]
    pub compress: bool,
    /// Requested memory-mapping mode for loaded items.
    #[serde(default)]
    pub mmap_mode: Option<String>,
}

impl BackendOptions {
    /// Build options from a loosely typed mapping. Unknown keys are ignored.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_mmap_mode(mut self, mode: impl Into<String>) -> Self {
        self.mmap_mode = Some(mode.into());
        self
    }
}

/// Metadata about a stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Full location of the item.
    pub path: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Recency of the item, used for least-recently-used eviction.
    ///
    /// Backends without access tracking report the last-modified time here.
    pub last_access: DateTime<Utc>,
}

/// Mode an item is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self> {
        match mode {
            "r" | "rb" => Ok(OpenMode::Read),
            "w" | "wb" => Ok(OpenMode::Write),
            other => Err(Error::InvalidArgument(format!(
                "mode must be 'rb' or 'wb', got '{}'",
                other
            ))),
        }
    }
}

/// An item opened through [`StoreBackend::open_item`].
pub enum OpenItem {
    Reader(ItemReader),
    Writer(ItemWriter),
}

impl OpenItem {
    pub fn into_reader(self) -> Option<ItemReader> {
        match self {
            OpenItem::Reader(reader) => Some(reader),
            OpenItem::Writer(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<ItemWriter> {
        match self {
            OpenItem::Writer(writer) => Some(writer),
            OpenItem::Reader(_) => None,
        }
    }
}

/// Trait for cache storage backends.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Bind the backend to a location. Called once before any other operation.
    async fn configure(
        &mut self,
        location: &str,
        verbose: u32,
        options: BackendOptions,
    ) -> Result<()>;

    /// Check if an item exists.
    async fn item_exists(&self, location: &str) -> Result<bool>;

    /// Open an item for reading.
    ///
    /// Fails with [`Error::NotFound`] when the item cannot be read, whatever
    /// the underlying cause. Errors raised while reading the returned stream
    /// use [`std::io::ErrorKind::NotFound`].
    async fn open_read(&self, location: &str) -> Result<ItemReader>;

    /// Open an item for writing. The item is replaced when the writer is
    /// finished.
    async fn open_write(&self, location: &str) -> Result<ItemWriter>;

    /// Move an item to a new location.
    async fn move_item(&self, src: &str, dst: &str) -> Result<()>;

    /// Create a location so items can be written under it.
    async fn create_location(&self, location: &str) -> Result<()>;

    /// Recursively delete everything under a location.
    async fn clear_location(&self, location: &str) -> Result<()>;

    /// List every item stored under a location.
    async fn list_items(&self, location: &str) -> Result<Vec<ItemInfo>>;

    /// Root location the backend was configured with.
    fn location(&self) -> Option<&str>;

    /// Whether the cache should compress items.
    fn compress(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Open an item with a textual mode (`rb` or `wb`).
    async fn open_item(&self, location: &str, mode: &str) -> Result<OpenItem> {
        match mode.parse::<OpenMode>()? {
            OpenMode::Read => Ok(OpenItem::Reader(self.open_read(location).await?)),
            OpenMode::Write => Ok(OpenItem::Writer(self.open_write(location).await?)),
        }
    }

    async fn contains_item(&self, location: &str) -> Result<bool> {
        self.item_exists(location).await
    }

    /// Read an item's full contents.
    ///
    /// A transfer that fails partway through is reported as
    /// [`Error::NotFound`], the same as a missing item.
    async fn load_bytes(&self, location: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_read(location).await?;
        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes).await {
            debug!(location = %location, error = %e, "Item read failed");
            return Err(Error::NotFound(location.to_string()));
        }
        Ok(bytes)
    }

    /// Write an item so that readers never observe it half-written.
    ///
    /// The bytes go to a unique temporary sibling first and are then moved
    /// into place. A root location is rejected before anything is written.
    async fn dump_bytes(&self, location: &str, bytes: &[u8]) -> Result<()> {
        if is_root_location(location) {
            return Err(Error::InvalidArgument(format!(
                "cannot store an item at root location {}",
                location
            )));
        }
        let temporary = temporary_location(location);
        let mut writer = self.open_write(&temporary).await?;
        writer.write_all(bytes).await?;
        writer.finish().await?;
        self.move_item(&temporary, location).await
    }
}

/// Unique sibling of `location` used while an item is being written.
pub fn temporary_location(location: &str) -> String {
    format!("{}.tmp-{}", location, uuid::Uuid::new_v4().simple())
}

/// Whether `location` names a store root (`s3://bucket`) rather than an item.
fn is_root_location(location: &str) -> bool {
    match location.split_once("://") {
        Some((_, rest)) => !rest.trim_end_matches('/').contains('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_mode_parse() {
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("wb".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::Write);
    }

    #[test]
    fn test_open_mode_rejects_other_modes() {
        for mode in ["ab", "r+", "rw", "", "RB"] {
            let err = mode.parse::<OpenMode>().unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "mode {mode:?}");
        }
    }

    #[test]
    fn test_temporary_location_is_unique_sibling() {
        let a = temporary_location("s3://bucket/cache/item");
        let b = temporary_location("s3://bucket/cache/item");
        assert!(a.starts_with("s3://bucket/cache/item.tmp-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_root_locations() {
        assert!(is_root_location("s3://bucket"));
        assert!(is_root_location("s3://bucket/"));
        assert!(!is_root_location("s3://bucket/item"));
        assert!(!is_root_location("s3://bucket/cache/"));
        assert!(!is_root_location("/tmp/cache"));
    }

    #[test]
    fn test_options_builders() {
        let options = BackendOptions::default()
            .with_compress(true)
            .with_mmap_mode("r");
        assert!(options.compress);
        assert_eq!(options.mmap_mode.as_deref(), Some("r"));
    }
}
