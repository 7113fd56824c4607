//! Testcontainer configurations for integration tests.

use cachet_s3::S3Settings;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::minio::MinIO;

/// Root credentials of the MinIO image.
const MINIO_ROOT_USER: &str = "minioadmin";
const MINIO_ROOT_PASSWORD: &str = "minioadmin";

/// MinIO container standing in for S3.
pub struct MinioContainer {
    #[allow(dead_code)] // Kept to maintain container lifetime
    container: ContainerAsync<MinIO>,
    endpoint: String,
}

impl MinioContainer {
    pub async fn start() -> anyhow::Result<Self> {
        let container = MinIO::default().with_tag("latest").start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(9000).await?;

        Ok(Self {
            container,
            endpoint: format!("http://{}:{}", host, port),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Client settings pointing at this server.
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings::default()
            .with_endpoint_url(self.endpoint.clone())
            .with_region("us-east-1")
            .with_force_path_style(true)
            .with_credentials(MINIO_ROOT_USER, MINIO_ROOT_PASSWORD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_minio_container_starts() {
        let minio = MinioContainer::start().await.unwrap();
        assert!(minio.endpoint().starts_with("http://"));

        let settings = minio.s3_settings();
        assert!(settings.force_path_style);
        assert_eq!(settings.endpoint_url.as_deref(), Some(minio.endpoint()));
    }
}
