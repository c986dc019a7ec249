//! S3 backend built on the AWS SDK.
//!
//! Works against AWS itself (region and credentials from the default provider
//! chain) or any S3-compatible endpoint via `endpoint_url` + path-style
//! addressing.

use crate::{
    errors::{StorageError, StorageResult},
    models::object::{ListPage, ListedObject, ObjectHead, PutObject},
    services::storage_client::ObjectStorage,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Region, http::HttpResponse, timeout::TimeoutConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how to reach the bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible services. `None` means AWS.
    pub endpoint_url: Option<String>,
    /// Region override; the SDK's provider chain decides when unset.
    pub region: Option<String>,
    /// Address buckets as `{endpoint}/{bucket}` instead of a subdomain.
    pub force_path_style: bool,
}

#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    max_keys: i32,
}

impl S3Storage {
    /// Resolve credentials and region from the environment and build a client
    /// bound to `bucket`.
    pub async fn connect(settings: &S3Settings, bucket: impl Into<String>, max_keys: usize) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config).timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build(),
        );
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self::from_client(Client::from_conf(builder.build()), bucket, max_keys)
    }

    pub fn from_client(client: Client, bucket: impl Into<String>, max_keys: usize) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            max_keys: max_keys.clamp(1, 1000) as i32,
        }
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }
}

/// HTTP status of a failed call, when the service answered at all.
fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|raw| raw.status().as_u16())
}

/// Fold an SDK failure into [`StorageError`]: a service reply keeps its status,
/// everything else is a transport problem.
fn storage_error<E>(err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match status_of(&err) {
        Some(status) => StorageError::Status {
            status,
            message: err
                .as_service_error()
                .and_then(|e| e.message().or(e.code()))
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
        },
        None => StorageError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, continuation_token: Option<&str>) -> StorageResult<ListPage> {
        debug!(
            "list_objects_v2 {} (max {}, token {:?})",
            self.bucket, self.max_keys, continuation_token
        );
        let resp = match self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(self.max_keys)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err)
                if status_of(&err) == Some(404)
                    || err.as_service_error().is_some_and(|e| e.is_no_such_bucket()) =>
            {
                return Err(StorageError::BucketNotFound(self.bucket.clone()));
            }
            Err(err) => return Err(storage_error(err)),
        };

        let objects = resp
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(ListedObject {
                    key: key.to_string(),
                    size_bytes: obj.size().unwrap_or(0),
                    etag: obj
                        .e_tag()
                        .map(|e| e.trim_matches('"').to_string())
                        .filter(|e| !e.is_empty()),
                    last_modified: obj.last_modified().and_then(to_chrono),
                })
            })
            .collect();

        Ok(ListPage {
            objects,
            is_truncated: resp.is_truncated().unwrap_or(false),
            next_continuation_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectHead> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => Ok(ObjectHead {
                key: key.to_string(),
                size_bytes: resp.content_length(),
                content_type: resp.content_type().map(str::to_string),
                etag: resp.e_tag().map(|e| e.trim_matches('"').to_string()),
            }),
            Err(err)
                if status_of(&err) == Some(404)
                    || err.as_service_error().is_some_and(|e| e.is_not_found()) =>
            {
                Err(self.not_found(key))
            }
            Err(err) => Err(storage_error(err)),
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(self.not_found(key));
            }
            Err(err) => return Err(storage_error(err)),
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transport(format!("reading body of `{}`: {}", key, e)))?;
        Ok(body.into_bytes())
    }

    async fn put_object(&self, request: PutObject) -> StorageResult<()> {
        let size = request.body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .content_type(request.content_type.as_str())
            .acl(ObjectCannedAcl::from(request.visibility.as_acl()))
            .body(ByteStream::from(request.body))
            .send()
            .await
            .map_err(storage_error)?;
        debug!("put {}/{} ({} bytes)", self.bucket, request.key, size);
        Ok(())
    }
}
