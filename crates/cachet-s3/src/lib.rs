//! S3 store backend for cachet (S3/MinIO/R2 compatible).

pub mod aws;
pub mod backend;
pub mod settings;
pub mod store;
pub mod uri;

pub use aws::AwsObjectStore;
pub use backend::S3StoreBackend;
pub use settings::S3Settings;
pub use store::{MemoryObjectStore, ObjectMeta, ObjectStore};
pub use uri::{ObjectUri, SCHEME, SCHEME_PREFIX};

use cachet_core::BackendRegistry;

/// Register the S3 backend under the `s3` scheme.
///
/// Client settings are read from the environment each time a backend is built.
pub fn install(registry: &mut BackendRegistry) {
    registry.register(SCHEME, || Box::new(S3StoreBackend::new()));
}
