//! Client settings for the S3 backend.

use std::env;

/// Smallest part size S3 accepts for all but the last multipart part.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Settings used to build the S3 client.
///
/// Anything left unset (credentials, region, endpoint) is resolved by the
/// AWS SDK's own environment and profile chain.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub endpoint_url: Option<String>,
    /// Region override.
    pub region: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: bool,
    /// Static access key, mostly for tests against local services.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Objects larger than this are uploaded in parts of this size.
    pub part_size: usize,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            region: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            part_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

impl S3Settings {
    /// Read settings from `CACHET_S3_*` environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(url) = non_empty_var("CACHET_S3_ENDPOINT_URL") {
            settings.endpoint_url = Some(url);
        }
        if let Some(region) = non_empty_var("CACHET_S3_REGION") {
            settings.region = Some(region);
        }
        if let Some(flag) = non_empty_var("CACHET_S3_FORCE_PATH_STYLE") {
            settings.force_path_style = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Some(size) = non_empty_var("CACHET_S3_PART_SIZE").and_then(|v| v.parse().ok()) {
            settings = settings.with_part_size(size);
        }

        settings
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_force_path_style(mut self, enable: bool) -> Self {
        self.force_path_style = enable;
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Set the multipart part size, clamped to the S3 minimum.
    pub fn with_part_size(mut self, size: usize) -> Self {
        self.part_size = size.max(MIN_PART_SIZE);
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = S3Settings::default();
        assert!(settings.endpoint_url.is_none());
        assert!(!settings.force_path_style);
        assert_eq!(settings.part_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_part_size_is_clamped() {
        let settings = S3Settings::default().with_part_size(1024);
        assert_eq!(settings.part_size, MIN_PART_SIZE);
    }

    #[test]
    fn test_from_env() {
        // SAFETY: these variables are only read by this test
        unsafe {
            std::env::set_var("CACHET_S3_ENDPOINT_URL", "http://localhost:9000");
            std::env::set_var("CACHET_S3_FORCE_PATH_STYLE", "true");
            std::env::set_var("CACHET_S3_PART_SIZE", "16777216");
        }

        let settings = S3Settings::from_env();
        assert_eq!(settings.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(settings.force_path_style);
        assert_eq!(settings.part_size, 16 * 1024 * 1024);

        unsafe {
            std::env::remove_var("CACHET_S3_ENDPOINT_URL");
            std::env::remove_var("CACHET_S3_FORCE_PATH_STYLE");
            std::env::remove_var("CACHET_S3_PART_SIZE");
        }
    }
}
