//! Integration test infrastructure for cachet.
//!
//! This crate provides testcontainers-based infrastructure for running the S3
//! store backend against a real MinIO server.
//!
//! # Usage
//!
//! ```ignore
//! use cachet_tests::S3TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = S3TestContext::new().await.unwrap();
//!     let backend = ctx.backend("cache").await.unwrap();
//! }
//! ```

pub mod containers;
pub mod context;

pub use containers::MinioContainer;
pub use context::S3TestContext;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cachet_s3=debug,cachet_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
