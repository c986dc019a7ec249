//! src/services/local_storage.rs
//!
//! LocalStorage: a bucket laid out on local disk, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Listing follows ListObjectsV2
//! ordering and truncation rules, so the batch engine sees the same paging
//! behavior it gets from S3.
//!
//! A listing from the start walks the bucket once and keeps the sorted result;
//! continuation pages are served from that snapshot.

use crate::{
    errors::{StorageError, StorageResult},
    models::object::{ListPage, ListedObject, ObjectHead, PutObject},
    services::storage_client::ObjectStorage,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const TMP_PREFIX: &str = ".tmp-";

/// Disk-backed bucket.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    /// Base directory on disk where buckets live.
    pub base_path: PathBuf,

    /// Bucket this client is bound to.
    pub bucket: String,

    /// Maximum keys returned per listing page (1-1000).
    pub max_keys: usize,

    /// Sorted bucket contents captured by the last listing from the start.
    snapshot: Arc<Mutex<Option<Arc<Vec<ListedObject>>>>>,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>, bucket: impl Into<String>, max_keys: usize) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            max_keys: max_keys.clamp(1, 1000),
            snapshot: Arc::default(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects empty or oversized keys, keys that begin or end with `/`, keys
    /// with a `..` segment, and keys carrying control characters or backslashes.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') || key.ends_with('/') {
            return Err(invalid());
        }
        if key.split('/').any(|segment| segment == "..") {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers: first two bytes of MD5(bucket/key) as hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }

    /// Sorted bucket contents, rescanned when `refresh` is set or nothing has
    /// been captured yet.
    async fn sorted_entries(&self, refresh: bool) -> StorageResult<Arc<Vec<ListedObject>>> {
        let mut snapshot = self.snapshot.lock().await;
        if let Some(entries) = snapshot.as_ref().filter(|_| !refresh) {
            return Ok(entries.clone());
        }

        let root = self.bucket_root();
        let bucket = self.bucket.clone();
        let mut entries = tokio::task::spawn_blocking(move || scan_bucket(&root, &bucket))
            .await
            .map_err(io::Error::other)??;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        debug!("scanned {} objects in {}", entries.len(), self.bucket);

        let entries = Arc::new(entries);
        *snapshot = Some(entries.clone());
        Ok(entries)
    }

    fn map_io(&self, key: &str, err: io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            self.not_found(key)
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List objects in lexicographic key order, `max_keys` at a time.
    ///
    /// Continuation tokens are the base64 of the last key of the previous page.
    /// Objects written after the first page was served show up in the next
    /// listing from the start.
    async fn list_objects(&self, continuation_token: Option<&str>) -> StorageResult<ListPage> {
        let entries = self.sorted_entries(continuation_token.is_none()).await?;

        let start = match continuation_token.map(decode_continuation_token) {
            Some(after) => entries.partition_point(|obj| obj.key.as_str() <= after.as_str()),
            None => 0,
        };
        let fetch_limit = self.max_keys + 1;
        let mut rows: Vec<ListedObject> =
            entries[start..].iter().take(fetch_limit).cloned().collect();

        let mut is_truncated = false;
        let mut next_continuation_token = None;
        if rows.len() == fetch_limit {
            rows.pop();
            if let Some(last) = rows.last() {
                next_continuation_token = Some(encode_continuation_token(&last.key));
            }
            is_truncated = true;
        }

        Ok(ListPage {
            objects: rows,
            is_truncated,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectHead> {
        self.ensure_key_safe(key)?;
        let meta = fs::metadata(self.object_path(key))
            .await
            .map_err(|err| self.map_io(key, err))?;
        if !meta.is_file() {
            return Err(self.not_found(key));
        }
        Ok(ObjectHead {
            key: key.to_string(),
            size_bytes: Some(meta.len() as i64),
            content_type: None,
            etag: None,
        })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.ensure_key_safe(key)?;
        let body = fs::read(self.object_path(key))
            .await
            .map_err(|err| self.map_io(key, err))?;
        Ok(Bytes::from(body))
    }

    /// Write bytes to a temporary file, fsync, then rename into place so a
    /// failed write never leaves a partial object behind.
    async fn put_object(&self, request: PutObject) -> StorageResult<()> {
        let key = request.key.as_str();
        self.ensure_key_safe(key)?;
        if !fs::try_exists(self.bucket_root()).await? {
            return Err(StorageError::BucketNotFound(self.bucket.clone()));
        }

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));

        if let Err(err) = write_synced(&tmp_path, &request.body).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        debug!(
            "stored {} ({} bytes, {}, {}, etag {:x})",
            file_path.display(),
            request.body.len(),
            request.content_type,
            request.visibility.as_acl(),
            md5::compute(&request.body)
        );
        Ok(())
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(body).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Walk `root/{shard}/{shard}/...` and recover object keys from the paths.
fn scan_bucket(root: &Path, bucket: &str) -> StorageResult<Vec<ListedObject>> {
    if !root.is_dir() {
        return Err(StorageError::BucketNotFound(bucket.to_string()));
    }

    let mut objects = Vec::new();
    for entry in WalkDir::new(root).min_depth(3) {
        let entry = entry.map_err(|e| StorageError::Io(io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .skip(2)
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let meta = entry
            .metadata()
            .map_err(|e| StorageError::Io(io::Error::other(e)))?;
        let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
        objects.push(ListedObject {
            key,
            size_bytes: meta.len() as i64,
            etag: None,
            last_modified,
        });
    }
    Ok(objects)
}

fn encode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::object::Visibility, services::filter::derive_target_key};

    fn put(key: &str, body: &'static [u8]) -> PutObject {
        PutObject {
            key: key.to_string(),
            body: Bytes::from_static(body),
            content_type: "image/png".into(),
            visibility: Visibility::Private,
        }
    }

    async fn bucket(max_keys: usize) -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("media")).await.unwrap();
        let storage = LocalStorage::new(dir.path(), "media", max_keys);
        (dir, storage)
    }

    #[tokio::test]
    async fn put_then_head_and_get() {
        let (_dir, storage) = bucket(1000).await;
        storage.put_object(put("img/a.png", b"png-bytes")).await.unwrap();

        let head = storage.head_object("img/a.png").await.unwrap();
        assert_eq!(head.size_bytes, Some(9));
        let body = storage.get_object("img/a.png").await.unwrap();
        assert_eq!(&body[..], b"png-bytes");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, storage) = bucket(1000).await;
        assert!(storage.head_object("img/a.webp").await.unwrap_err().is_not_found());
        assert!(storage.get_object("img/a.png").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (_dir, storage) = bucket(1000).await;
        let keys = [
            "",
            "/abs.png",
            "../escape.png",
            "img/../a.png",
            "dir/",
            "a\\b.png",
        ];
        for key in keys {
            let err = storage.put_object(put(key, b"x")).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectKey(_)), "{key}");
        }
    }

    #[tokio::test]
    async fn missing_bucket_fails_listing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "nope", 10);
        let err = storage.list_objects(None).await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn listing_pages_in_key_order() {
        let (_dir, storage) = bucket(2).await;
        for key in ["e.png", "a.png", "img/c.jpg", "b.png", "img/d.gif"] {
            storage.put_object(put(key, b"x")).await.unwrap();
        }

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = storage.list_objects(token.as_deref()).await.unwrap();
            pages += 1;
            assert!(page.objects.len() <= 2);
            keys.extend(page.objects.iter().map(|o| o.key.clone()));
            match page.continuation() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(keys, vec!["a.png", "b.png", "e.png", "img/c.jpg", "img/d.gif"]);
    }

    #[tokio::test]
    async fn overwrite_replaces_object() {
        let (_dir, storage) = bucket(10).await;
        storage.put_object(put("a.webp", b"old")).await.unwrap();
        storage.put_object(put("a.webp", b"newer")).await.unwrap();

        let page = storage.list_objects(None).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].size_bytes, 5);
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn doubled_dot_inside_a_name_is_a_valid_key() {
        let (_dir, storage) = bucket(10).await;
        let target = derive_target_key("img/trailing.");
        assert_eq!(target, "img/trailing..webp");

        storage.put_object(put(&target, b"webp")).await.unwrap();
        assert!(storage.head_object(&target).await.is_ok());
        assert_eq!(&storage.get_object(&target).await.unwrap()[..], b"webp");
    }

    #[tokio::test]
    async fn continuation_pages_reuse_the_first_scan() {
        let (_dir, storage) = bucket(1).await;
        for key in ["a.png", "b.png", "c.png"] {
            storage.put_object(put(key, b"x")).await.unwrap();
        }

        let first = storage.list_objects(None).await.unwrap();
        assert_eq!(first.objects[0].key, "a.png");
        storage.put_object(put("bb.png", b"x")).await.unwrap();

        let mut keys = Vec::new();
        let mut token = first.continuation().map(str::to_string);
        while let Some(current) = token {
            let page = storage.list_objects(Some(&current)).await.unwrap();
            keys.extend(page.objects.iter().map(|o| o.key.clone()));
            token = page.continuation().map(str::to_string);
        }
        assert_eq!(keys, vec!["b.png", "c.png"]);

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = storage.list_objects(token.as_deref()).await.unwrap();
            keys.extend(page.objects.iter().map(|o| o.key.clone()));
            match page.continuation() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        assert_eq!(keys, vec!["a.png", "b.png", "bb.png", "c.png"]);
    }
}
