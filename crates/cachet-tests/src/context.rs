//! Test context holding a MinIO server and a fresh bucket.

use crate::containers::MinioContainer;
use cachet_core::{BackendOptions, BackendRegistry, StoreBackend};
use cachet_s3::{AwsObjectStore, S3Settings, S3StoreBackend, SCHEME};
use tracing::info;

/// A running MinIO server with one empty bucket.
pub struct S3TestContext {
    pub minio: MinioContainer,
    pub bucket: String,
    pub settings: S3Settings,
}

impl S3TestContext {
    pub async fn new() -> anyhow::Result<Self> {
        let minio = MinioContainer::start().await?;
        let settings = minio.s3_settings();

        let bucket = format!("cachet-{}", uuid::Uuid::new_v4().simple());
        AwsObjectStore::connect(&settings)
            .await
            .client()
            .create_bucket()
            .bucket(&bucket)
            .send()
            .await?;
        info!(bucket = %bucket, endpoint = %minio.endpoint(), "Created test bucket");

        Ok(Self {
            minio,
            bucket,
            settings,
        })
    }

    /// `s3://` location of `path` inside the test bucket.
    pub fn location(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, path.trim_start_matches('/'))
    }

    /// Backend configured on `path` through a registry, as a cache would.
    pub async fn backend(&self, path: &str) -> anyhow::Result<Box<dyn StoreBackend>> {
        let settings = self.settings.clone();
        let mut registry = BackendRegistry::new();
        registry.register(SCHEME, move || {
            Box::new(S3StoreBackend::with_settings(settings.clone()))
        });

        Ok(registry
            .open_location(&self.location(path), 0, BackendOptions::default())
            .await?)
    }
}
