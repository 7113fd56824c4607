//! Object store backed by the AWS SDK S3 client.

use crate::settings::S3Settings;
use crate::store::{ObjectMeta, ObjectStore};
use crate::uri::ObjectUri;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use cachet_core::{Error, ItemReader, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Maximum number of keys a single DeleteObjects request accepts.
const DELETE_BATCH_SIZE: usize = 1000;

/// S3 (or S3-compatible) object store.
#[derive(Clone)]
pub struct AwsObjectStore {
    client: Client,
    part_size: usize,
}

impl AwsObjectStore {
    /// Build a client from `settings` and the SDK's ambient configuration.
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(url) = &settings.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id,
                secret,
                None,
                None,
                "cachet-settings",
            ));
        }

        let shared = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.force_path_style)
            .build();

        debug!(
            endpoint = ?settings.endpoint_url,
            path_style = settings.force_path_style,
            "S3 client created"
        );
        Self::from_client(Client::from_conf(config), settings.part_size)
    }

    pub fn from_client(client: Client, part_size: usize) -> Self {
        Self { client, part_size }
    }

    /// Underlying SDK client, for operations outside the store port.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn put_single(&self, uri: &ObjectUri, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| storage_error("put_object", uri, e))?;
        Ok(())
    }

    async fn put_multipart(&self, uri: &ObjectUri, body: Vec<u8>) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await
            .map_err(|e| storage_error("create_multipart_upload", uri, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::Storage(format!("no upload id returned for {}", uri)))?
            .to_string();

        let result = async {
            let parts = self.upload_parts(uri, &upload_id, &body).await?;
            self.client
                .complete_multipart_upload()
                .bucket(uri.bucket())
                .key(uri.key())
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| storage_error("complete_multipart_upload", uri, e))?;
            Ok::<(), Error>(())
        }
        .await;

        if result.is_err() {
            let aborted = self
                .client
                .abort_multipart_upload()
                .bucket(uri.bucket())
                .key(uri.key())
                .upload_id(&upload_id)
                .send()
                .await;
            if let Err(e) = aborted {
                warn!(
                    uri = %uri,
                    upload_id = %upload_id,
                    error = %DisplayErrorContext(&e),
                    "Failed to abort multipart upload"
                );
            }
        }
        result
    }

    async fn upload_parts(
        &self,
        uri: &ObjectUri,
        upload_id: &str,
        body: &[u8],
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        for (index, chunk) in body.chunks(self.part_size).enumerate() {
            let part_number = index as i32 + 1;
            let output = self
                .client
                .upload_part()
                .bucket(uri.bucket())
                .key(uri.key())
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| storage_error("upload_part", uri, e))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .build(),
            );
        }
        debug!(uri = %uri, parts = parts.len(), "Uploaded multipart object");
        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    async fn exists(&self, uri: &ObjectUri) -> Result<bool> {
        let response = self
            .client
            .head_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await;

        match response {
            Ok(_) => Ok(true),
            Err(e) => {
                let e = e.into_service_error();
                if e.is_not_found() {
                    Ok(false)
                } else {
                    Err(storage_error("head_object", uri, e))
                }
            }
        }
    }

    async fn get(&self, uri: &ObjectUri) -> Result<ItemReader> {
        let output = self
            .client
            .get_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_no_such_key() {
                    Error::NotFound(uri.to_string())
                } else {
                    storage_error("get_object", uri, e)
                }
            })?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn put(&self, uri: &ObjectUri, body: Vec<u8>) -> Result<()> {
        if body.len() <= self.part_size {
            self.put_single(uri, body).await
        } else {
            self.put_multipart(uri, body).await
        }
    }

    async fn copy(&self, src: &ObjectUri, dst: &ObjectUri) -> Result<()> {
        self.client
            .copy_object()
            .bucket(dst.bucket())
            .key(dst.key())
            .copy_source(src.copy_source())
            .send()
            .await
            .map_err(|e| storage_error("copy_object", src, e))?;
        Ok(())
    }

    async fn delete(&self, uri: &ObjectUri) -> Result<()> {
        self.client
            .delete_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await
            .map_err(|e| storage_error("delete_object", uri, e))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &ObjectUri) -> Result<u64> {
        let objects = self.list(prefix).await?;

        for batch in objects.chunks(DELETE_BATCH_SIZE) {
            let identifiers = batch
                .iter()
                .map(|object| {
                    ObjectIdentifier::builder()
                        .key(object.uri.key())
                        .build()
                        .map_err(|e| Error::Storage(format!("invalid object identifier: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| Error::Storage(format!("invalid delete request: {}", e)))?;

            let output = self
                .client
                .delete_objects()
                .bucket(prefix.bucket())
                .delete(delete)
                .send()
                .await
                .map_err(|e| storage_error("delete_objects", prefix, e))?;

            if let Some(failed) = output.errors().first() {
                return Err(Error::Storage(format!(
                    "failed to delete {} objects under {}, first {}: {}",
                    output.errors().len(),
                    prefix,
                    failed.key().unwrap_or_default(),
                    failed.message().unwrap_or("unknown error")
                )));
            }
        }

        Ok(objects.len() as u64)
    }

    async fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectMeta>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(prefix.bucket())
            .prefix(prefix.key())
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| storage_error("list_objects_v2", prefix, e))?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let uri = ObjectUri::new(prefix.bucket(), key);
                let last_modified = last_modified_or_now(&uri, object.last_modified());
                objects.push(ObjectMeta {
                    uri,
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    last_modified,
                });
            }
        }

        debug!(prefix = %prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    fn name(&self) -> &str {
        "s3"
    }
}

fn storage_error<E>(operation: &str, uri: &ObjectUri, err: E) -> Error
where
    E: std::error::Error,
{
    Error::Storage(format!(
        "{} failed for {}: {}",
        operation,
        uri,
        DisplayErrorContext(err)
    ))
}

fn to_chrono(timestamp: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// Listing time for an object. Without one the object counts as just
/// modified, so eviction does not pick it first.
fn last_modified_or_now(uri: &ObjectUri, timestamp: Option<&AwsDateTime>) -> DateTime<Utc> {
    match timestamp.and_then(to_chrono) {
        Some(time) => time,
        None => {
            warn!(uri = %uri, "Object listed without a usable LastModified");
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_chrono() {
        let timestamp = AwsDateTime::from_secs_and_nanos(1_700_000_000, 250_000_000);
        let converted = to_chrono(&timestamp).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
        assert_eq!(converted.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_missing_last_modified_counts_as_recent() {
        let uri = ObjectUri::new("bucket", "cache/item");
        let before = Utc::now();
        assert!(last_modified_or_now(&uri, None) >= before);

        let timestamp = AwsDateTime::from_secs(1_700_000_000);
        assert_eq!(
            last_modified_or_now(&uri, Some(&timestamp)).timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn test_storage_error_names_operation() {
        let err = storage_error(
            "copy_object",
            &ObjectUri::new("bucket", "key"),
            std::io::Error::other("boom"),
        );
        let message = err.to_string();
        assert!(message.contains("copy_object failed for s3://bucket/key"));
        assert!(message.contains("boom"));
    }

    mod http {
        use super::*;
        use tokio::io::AsyncReadExt;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn error_body(code: &str, key: &str) -> String {
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>{code}</Code><Message>{code}</Message>\
                 <Key>{key}</Key><RequestId>cachet-test</RequestId></Error>"
            )
        }

        async fn store_for(server: &MockServer) -> AwsObjectStore {
            let settings = S3Settings::default()
                .with_endpoint_url(server.uri())
                .with_region("us-east-1")
                .with_force_path_style(true)
                .with_credentials("test-access-key", "test-secret-key");
            AwsObjectStore::connect(&settings).await
        }

        #[tokio::test]
        async fn test_exists_uses_path_style_endpoint() {
            let server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .and(path("/bucket/cache/item"))
                .respond_with(ResponseTemplate::new(200).insert_header("content-length", "4"))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("HEAD"))
                .and(path("/bucket/cache/missing"))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&server)
                .await;

            let store = store_for(&server).await;
            assert!(
                store
                    .exists(&ObjectUri::new("bucket", "cache/item"))
                    .await
                    .unwrap()
            );
            assert!(
                !store
                    .exists(&ObjectUri::new("bucket", "cache/missing"))
                    .await
                    .unwrap()
            );
        }

        #[tokio::test]
        async fn test_get_streams_body() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/bucket/cache/item"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-length", "7")
                        .set_body_bytes(b"payload".to_vec()),
                )
                .mount(&server)
                .await;

            let store = store_for(&server).await;
            let mut reader = store
                .get(&ObjectUri::new("bucket", "cache/item"))
                .await
                .unwrap();
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).await.unwrap();
            assert_eq!(bytes, b"payload");
        }

        #[tokio::test]
        async fn test_get_no_such_key_is_not_found() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/bucket/cache/missing"))
                .respond_with(
                    ResponseTemplate::new(404)
                        .insert_header("content-type", "application/xml")
                        .set_body_string(error_body("NoSuchKey", "cache/missing")),
                )
                .mount(&server)
                .await;

            let store = store_for(&server).await;
            let err = store
                .get(&ObjectUri::new("bucket", "cache/missing"))
                .await
                .err()
                .unwrap();
            let expected = "s3://bucket/cache/missing";
            assert!(matches!(err, Error::NotFound(ref uri) if uri == expected), "{err:?}");
        }

        #[tokio::test]
        async fn test_get_other_failures_are_storage_errors() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/bucket/cache/locked"))
                .respond_with(
                    ResponseTemplate::new(403)
                        .insert_header("content-type", "application/xml")
                        .set_body_string(error_body("AccessDenied", "cache/locked")),
                )
                .mount(&server)
                .await;

            let store = store_for(&server).await;
            let err = store
                .get(&ObjectUri::new("bucket", "cache/locked"))
                .await
                .err()
                .unwrap();
            assert!(matches!(err, Error::Storage(_)), "{err:?}");
            assert!(err.to_string().contains("get_object failed"));
        }
    }
}
