use std::borrow::Cow;
use std::fmt;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use super::{Backend, BoxedBackend, Connector};
use crate::error::{StorageError, StorageResult};

/// Connection settings for [`S3Backend`].
#[derive(Clone, Debug)]
pub struct S3Config {
    /// Name of the bucket all objects are written to.
    pub bucket: String,
    /// AWS region, e.g. `us-west-2`.
    pub region: String,
    /// Custom endpoint for S3-compatible services such as MinIO.
    pub endpoint: Option<String>,
    /// Use path-style addressing instead of virtual-hosted buckets.
    pub force_path_style: bool,
    /// Prepended verbatim to every key before it is sent.
    ///
    /// Only used to address objects written with the old doubled key layout.
    pub key_prefix: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-west-2".to_owned(),
            endpoint: None,
            force_path_style: false,
            key_prefix: None,
        }
    }
}

/// A [`Backend`] session against Amazon S3 or an S3-compatible service.
pub struct S3Backend {
    client: Client,
    bucket: String,
    key_prefix: Option<String>,
}

impl S3Backend {
    /// Creates a new session with its own SDK configuration and connection pool.
    pub async fn connect(config: &S3Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("bucket must not be empty".to_owned()));
        }
        if config.region.is_empty() {
            return Err(StorageError::Config("region must not be empty".to_owned()));
        }

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn object_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match &self.key_prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
            None => Cow::Borrowed(key),
        }
    }
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[tracing::instrument(level = "trace", fields(bucket = %self.bucket), skip(self, payload))]
    async fn put_object(&self, key: &str, payload: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|err| StorageError::sdk("failed to put object", err))?;

        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(bucket = %self.bucket), skip(self))]
    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                tracing::debug!("Object not found");
                return Err(StorageError::NotFound(key.to_owned()));
            }
            Err(err) => return Err(StorageError::sdk("failed to get object", err)),
        };

        // The body is dropped on every path out of here, which returns the connection.
        let aggregated = output
            .body
            .collect()
            .await
            .map_err(|err| StorageError::sdk("failed to read object body", err))?;

        Ok(aggregated.into_bytes())
    }
}

#[async_trait::async_trait]
impl Connector for S3Config {
    async fn connect(&self) -> StorageResult<BoxedBackend> {
        Ok(Box::new(S3Backend::connect(self).await?))
    }
}
