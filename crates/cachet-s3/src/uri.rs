//! `s3://bucket/key` locations.

use cachet_core::{Error, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt;
use std::str::FromStr;

/// URI scheme served by this backend.
pub const SCHEME: &str = "s3";

/// Prefix every location must start with.
pub const SCHEME_PREFIX: &str = "s3://";

/// Characters left unescaped in a copy source, `/` included.
static COPY_SOURCE_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A bucket and key parsed from an `s3://` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUri {
    bucket: String,
    key: String,
}

impl ObjectUri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key`. The key may be empty, naming the whole bucket.
    pub fn parse(location: &str) -> Result<Self> {
        let rest = location.strip_prefix(SCHEME_PREFIX).ok_or_else(|| {
            Error::InvalidArgument(format!("location must be an s3:// URI: {}", location))
        })?;

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "location has no bucket: {}",
                location
            )));
        }

        Ok(Self::new(bucket, key))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Location of `path` below this one.
    pub fn join(&self, path: &str) -> Self {
        let path = path.trim_start_matches('/');
        let key = if self.key.is_empty() || self.key.ends_with('/') {
            format!("{}{}", self.key, path)
        } else {
            format!("{}/{}", self.key, path)
        };
        Self::new(self.bucket.clone(), key)
    }

    /// Whether this object's key starts with `prefix`'s key, literally.
    pub fn has_prefix(&self, prefix: &ObjectUri) -> bool {
        self.bucket == prefix.bucket && self.key.starts_with(&prefix.key)
    }

    /// Value of the `x-amz-copy-source` header naming this object.
    pub fn copy_source(&self) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&self.key, &COPY_SOURCE_ENCODE_SET)
        )
    }
}

impl FromStr for ObjectUri {
    type Err = Error;

    fn from_str(location: &str) -> Result<Self> {
        Self::parse(location)
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME_PREFIX, self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let uri = ObjectUri::parse("s3://bucket/cache/func/output.pkl").unwrap();
        assert_eq!(uri.bucket(), "bucket");
        assert_eq!(uri.key(), "cache/func/output.pkl");
        assert_eq!(uri.to_string(), "s3://bucket/cache/func/output.pkl");
    }

    #[test]
    fn test_parse_bucket_only() {
        let uri = ObjectUri::parse("s3://bucket").unwrap();
        assert_eq!(uri.bucket(), "bucket");
        assert_eq!(uri.key(), "");

        let uri: ObjectUri = "s3://bucket/".parse().unwrap();
        assert_eq!(uri.key(), "");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        for location in ["/tmp/cache", "gs://bucket/key", "s3:/bucket", "s3://", "s3:///key"] {
            assert!(
                matches!(ObjectUri::parse(location), Err(Error::InvalidArgument(_))),
                "{location}"
            );
        }
    }

    #[test]
    fn test_join() {
        let root = ObjectUri::parse("s3://bucket/cache").unwrap();
        assert_eq!(root.join("a/b").to_string(), "s3://bucket/cache/a/b");
        assert_eq!(root.join("/a").to_string(), "s3://bucket/cache/a");

        let bucket = ObjectUri::parse("s3://bucket").unwrap();
        assert_eq!(bucket.join("a").key(), "a");
    }

    #[test]
    fn test_has_prefix_is_literal() {
        let prefix = ObjectUri::parse("s3://bucket/cache/f[1]*").unwrap();
        assert!(ObjectUri::parse("s3://bucket/cache/f[1]*/out").unwrap().has_prefix(&prefix));
        assert!(!ObjectUri::parse("s3://bucket/cache/f1x/out").unwrap().has_prefix(&prefix));
        assert!(!ObjectUri::parse("s3://other/cache/f[1]*/out").unwrap().has_prefix(&prefix));
    }

    #[test]
    fn test_copy_source_encoding() {
        let uri = ObjectUri::parse("s3://bucket/dir/a b+c?[1].pkl").unwrap();
        assert_eq!(uri.copy_source(), "bucket/dir/a%20b%2Bc%3F%5B1%5D.pkl");
    }
}
