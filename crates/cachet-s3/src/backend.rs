//! Store backend keeping cache items in S3.

use crate::aws::AwsObjectStore;
use crate::settings::S3Settings;
use crate::store::ObjectStore;
use crate::uri::{ObjectUri, SCHEME_PREFIX};
use async_trait::async_trait;
use cachet_core::{
    BackendOptions, Error, ItemInfo, ItemReader, ItemSink, ItemWriter, Result, StoreBackend,
    miss_on_error,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Where the object store comes from when the backend is configured.
enum StoreSource {
    /// Build an S3 client from these settings.
    Settings(S3Settings),
    /// Use an already constructed store.
    Store(Arc<dyn ObjectStore>),
}

/// Settings resolved by [`StoreBackend::configure`].
struct BackendConfig {
    location: String,
    verbose: u32,
    compress: bool,
    store: Arc<dyn ObjectStore>,
}

/// Store backend for `s3://bucket/prefix` locations.
pub struct S3StoreBackend {
    source: StoreSource,
    config: Option<BackendConfig>,
}

impl S3StoreBackend {
    /// Backend whose client settings come from the environment.
    pub fn new() -> Self {
        Self::with_settings(S3Settings::from_env())
    }

    pub fn with_settings(settings: S3Settings) -> Self {
        Self {
            source: StoreSource::Settings(settings),
            config: None,
        }
    }

    /// Backend that uses `store` instead of creating an S3 client.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            source: StoreSource::Store(store),
            config: None,
        }
    }

    /// Verbosity the backend was configured with.
    pub fn verbose(&self) -> u32 {
        self.config.as_ref().map_or(0, |c| c.verbose)
    }

    fn config(&self) -> Result<&BackendConfig> {
        self.config.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("S3 store backend used before configure".to_string())
        })
    }

    fn store(&self) -> Result<&Arc<dyn ObjectStore>> {
        Ok(&self.config()?.store)
    }
}

impl Default for S3StoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for S3StoreBackend {
    async fn configure(
        &mut self,
        location: &str,
        verbose: u32,
        options: BackendOptions,
    ) -> Result<()> {
        if let Some(mode) = &options.mmap_mode {
            return Err(Error::InvalidConfiguration(format!(
                "impossible to mmap on S3 (mmap_mode={})",
                mode
            )));
        }

        if !location.starts_with(SCHEME_PREFIX) {
            return Err(Error::InvalidConfiguration(format!(
                "location must be an s3:// URI: {}",
                location
            )));
        }
        ObjectUri::parse(location).map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        // Bucket access is not checked here; the first real operation reports it.
        let store: Arc<dyn ObjectStore> = match &self.source {
            StoreSource::Settings(settings) => Arc::new(AwsObjectStore::connect(settings).await),
            StoreSource::Store(store) => store.clone(),
        };

        info!(
            location = %location,
            store = %store.name(),
            compress = options.compress,
            "S3 store backend configured"
        );

        self.config = Some(BackendConfig {
            location: location.to_string(),
            verbose,
            compress: options.compress,
            store,
        });
        Ok(())
    }

    async fn item_exists(&self, location: &str) -> Result<bool> {
        let store = self.store()?;
        store.exists(&ObjectUri::parse(location)?).await
    }

    async fn open_read(&self, location: &str) -> Result<ItemReader> {
        let store = self.store()?;
        let opened = match ObjectUri::parse(location) {
            Ok(uri) => store.get(&uri).await,
            Err(e) => Err(e),
        };

        // The cache treats NotFound as a miss, so every read failure becomes one,
        // including failures while the body is streaming.
        match opened {
            Ok(reader) => Ok(miss_on_error(location, reader)),
            Err(e) => {
                debug!(location = %location, error = %e, "Item not readable");
                Err(Error::NotFound(location.to_string()))
            }
        }
    }

    async fn open_write(&self, location: &str) -> Result<ItemWriter> {
        let config = self.config()?;
        let uri = ObjectUri::parse(location)?;
        if uri.key().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "item location has no key: {}",
                location
            )));
        }
        Ok(ItemWriter::new(Box::new(ObjectSink {
            store: config.store.clone(),
            uri,
            location: location.to_string(),
            verbose: config.verbose,
        })))
    }

    async fn move_item(&self, src: &str, dst: &str) -> Result<()> {
        let store = self.store()?;
        let src_uri = ObjectUri::parse(src)?;
        let dst_uri = ObjectUri::parse(dst)?;

        // No rename in S3. A failure after the copy leaves both objects behind.
        store.copy(&src_uri, &dst_uri).await?;
        store.delete(&src_uri).await?;

        debug!(src = %src, dst = %dst, "Item moved");
        Ok(())
    }

    async fn create_location(&self, location: &str) -> Result<()> {
        // Prefixes exist implicitly once an object is written under them.
        debug!(location = %location, "create_location is a no-op on S3");
        Ok(())
    }

    async fn clear_location(&self, location: &str) -> Result<()> {
        let config = self.config()?;
        let prefix = ObjectUri::parse(location)?;
        let deleted = config.store.delete_prefix(&prefix).await?;

        if config.verbose > 0 {
            info!(location = %location, deleted, "Cleared location");
        } else {
            debug!(location = %location, deleted, "Cleared location");
        }
        Ok(())
    }

    async fn list_items(&self, location: &str) -> Result<Vec<ItemInfo>> {
        let store = self.store()?;
        let prefix = ObjectUri::parse(location)?;
        let objects = store.list(&prefix).await?;

        Ok(objects
            .into_iter()
            .map(|object| ItemInfo {
                path: object.uri.to_string(),
                size_bytes: object.size_bytes,
                // S3 does not track access times; last-modified stands in for them.
                last_access: object.last_modified,
            })
            .collect())
    }

    fn location(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.location.as_str())
    }

    fn compress(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.compress)
    }

    fn name(&self) -> &str {
        "s3"
    }
}

/// Uploads a finished item as a single object.
struct ObjectSink {
    store: Arc<dyn ObjectStore>,
    uri: ObjectUri,
    location: String,
    verbose: u32,
}

#[async_trait]
impl ItemSink for ObjectSink {
    async fn commit(self: Box<Self>, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        self.store.put(&self.uri, bytes).await?;

        if self.verbose > 0 {
            info!(location = %self.location, size, "Item written");
        } else {
            debug!(location = %self.location, size, "Item written");
        }
        Ok(())
    }

    fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    fn memory_backend() -> (S3StoreBackend, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        (S3StoreBackend::with_store(store.clone()), store)
    }

    #[tokio::test]
    async fn test_configure_accepts_s3_locations() {
        let (mut backend, store) = memory_backend();
        backend
            .configure(
                "s3://bucket/cache",
                2,
                BackendOptions::default().with_compress(true),
            )
            .await
            .unwrap();

        assert_eq!(backend.location(), Some("s3://bucket/cache"));
        assert_eq!(backend.verbose(), 2);
        assert!(backend.compress());
        // configure does not touch the bucket
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_configure_rejects_non_s3_locations() {
        for location in ["/tmp/cache", "file:///tmp/cache", "gs://bucket/cache", "s3://"] {
            let (mut backend, _) = memory_backend();
            let err = backend
                .configure(location, 0, BackendOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidConfiguration(_)), "{location}");
            assert!(backend.location().is_none());
        }
    }

    #[tokio::test]
    async fn test_configure_rejects_mmap() {
        for location in ["s3://bucket/cache", "/tmp/cache"] {
            let (mut backend, _) = memory_backend();
            let err = backend
                .configure(location, 0, BackendOptions::default().with_mmap_mode("r"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("mmap"), "{location}");
            assert!(matches!(err, Error::InvalidConfiguration(_)));
        }
    }

    #[tokio::test]
    async fn test_operations_require_configure() {
        let (backend, _) = memory_backend();
        let err = backend.item_exists("s3://bucket/a").await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        let err = backend.list_items("s3://bucket").await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_malformed_read_location_is_not_found() {
        let (mut backend, _) = memory_backend();
        backend
            .configure("s3://bucket/cache", 0, BackendOptions::default())
            .await
            .unwrap();

        let err = backend.open_read("/tmp/cache/item").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_write_location_is_invalid_argument() {
        let (mut backend, _) = memory_backend();
        backend
            .configure("s3://bucket/cache", 0, BackendOptions::default())
            .await
            .unwrap();

        let err = backend.open_write("/tmp/cache/item").await.err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_write_requires_key() {
        let (mut backend, store) = memory_backend();
        backend
            .configure("s3://bucket/cache", 0, BackendOptions::default())
            .await
            .unwrap();

        for location in ["s3://bucket", "s3://bucket/"] {
            let err = backend.open_write(location).await.err().unwrap();
            assert!(matches!(err, Error::InvalidArgument(_)), "{location}");
        }
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_location_is_noop() {
        let (mut backend, store) = memory_backend();
        backend
            .configure("s3://bucket/cache", 0, BackendOptions::default())
            .await
            .unwrap();

        backend.create_location("s3://bucket/cache/func").await.unwrap();
        assert_eq!(store.call_count(), 0);
        assert!(store.is_empty().await);
    }
}
