//! In-memory bucket and transcoder doubles for engine tests.

use crate::{
    errors::{StorageError, StorageResult, TranscodeError},
    models::object::{ListPage, ListedObject, ObjectHead, PutObject, Visibility},
    services::{
        storage_client::ObjectStorage,
        transcoder::{EncodeOptions, Transcoder},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailOn {
    Head,
    Get,
    Put,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub head: usize,
    pub get: usize,
    pub put: usize,
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub visibility: Visibility,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    failures: HashSet<(String, FailOn)>,
    latency: HashMap<String, Duration>,
    failing_list_call: Option<usize>,
    list_latency: Duration,
    calls: CallCounts,
}

/// Bucket held in a `BTreeMap`, listed in key order `page_size` at a time.
pub struct MemoryStorage {
    state: Mutex<State>,
    page_size: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    listed_while_busy: AtomicBool,
}

struct InFlight<'a>(&'a MemoryStorage);

impl<'a> InFlight<'a> {
    fn enter(storage: &'a MemoryStorage) -> Self {
        let now = storage.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        storage.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(storage)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStorage {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            listed_while_busy: AtomicBool::new(false),
        }
    }

    /// Bucket whose objects' bodies are their own keys.
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let storage = Self::new(1000);
        for key in keys {
            let key = key.into();
            let body = Bytes::from(key.clone().into_bytes());
            storage.insert(&key, body);
        }
        storage
    }

    pub fn insert(&self, key: &str, body: Bytes) {
        self.state.lock().unwrap().objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: "application/octet-stream".into(),
                visibility: Visibility::Private,
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(key)
    }

    pub fn stored(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn fail_on(&self, key: &str, op: FailOn) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((key.to_string(), op));
    }

    /// Delay every head/get/put touching `key`.
    pub fn set_latency(&self, key: &str, latency: Duration) {
        self.state
            .lock()
            .unwrap()
            .latency
            .insert(key.to_string(), latency);
    }

    /// Make the `call`-th listing request (1-based) fail.
    pub fn fail_list_call(&self, call: usize) {
        self.state.lock().unwrap().failing_list_call = Some(call);
    }

    pub fn set_list_latency(&self, latency: Duration) {
        self.state.lock().unwrap().list_latency = latency;
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Whether a listing request arrived while object calls were outstanding.
    pub fn listed_while_busy(&self) -> bool {
        self.listed_while_busy.load(Ordering::SeqCst)
    }

    /// Count the call and decide whether it should fail, without holding the
    /// lock across an await.
    fn begin(&self, key: &str, op: FailOn) -> (Duration, bool) {
        let mut state = self.state.lock().unwrap();
        match op {
            FailOn::Head => state.calls.head += 1,
            FailOn::Get => state.calls.get += 1,
            FailOn::Put => state.calls.put += 1,
        }
        let latency = state.latency.get(key).copied().unwrap_or_default();
        let fail = state.failures.contains(&(key.to_string(), op));
        (latency, fail)
    }

    fn injected(key: &str) -> StorageError {
        StorageError::Status {
            status: 500,
            message: format!("injected failure for {key}"),
        }
    }

    fn not_found(key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: "memory".into(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        "memory"
    }

    async fn list_objects(&self, continuation_token: Option<&str>) -> StorageResult<ListPage> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            self.listed_while_busy.store(true, Ordering::SeqCst);
        }
        let (latency, fail) = {
            let mut state = self.state.lock().unwrap();
            state.calls.list += 1;
            (
                state.list_latency,
                state.failing_list_call == Some(state.calls.list),
            )
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StorageError::Transport("listing connection reset".into()));
        }

        let state = self.state.lock().unwrap();
        let mut rows: Vec<ListedObject> = state
            .objects
            .iter()
            .filter(|(key, _)| continuation_token.is_none_or(|after| key.as_str() > after))
            .take(self.page_size + 1)
            .map(|(key, obj)| ListedObject::new(key.clone(), obj.body.len() as i64))
            .collect();

        let is_truncated = rows.len() > self.page_size;
        if is_truncated {
            rows.pop();
        }
        let next_continuation_token = if is_truncated {
            rows.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: rows,
            is_truncated,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectHead> {
        let _guard = InFlight::enter(self);
        let (latency, fail) = self.begin(key, FailOn::Head);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(Self::injected(key));
        }
        let state = self.state.lock().unwrap();
        let obj = state.objects.get(key).ok_or_else(|| Self::not_found(key))?;
        Ok(ObjectHead {
            key: key.to_string(),
            size_bytes: Some(obj.body.len() as i64),
            content_type: Some(obj.content_type.clone()),
            etag: None,
        })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let _guard = InFlight::enter(self);
        let (latency, fail) = self.begin(key, FailOn::Get);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(Self::injected(key));
        }
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(key)
            .map(|obj| obj.body.clone())
            .ok_or_else(|| Self::not_found(key))
    }

    async fn put_object(&self, request: PutObject) -> StorageResult<()> {
        let _guard = InFlight::enter(self);
        let (latency, fail) = self.begin(&request.key, FailOn::Put);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(Self::injected(&request.key));
        }
        self.state.lock().unwrap().objects.insert(
            request.key,
            StoredObject {
                body: request.body,
                content_type: request.content_type,
                visibility: request.visibility,
            },
        );
        Ok(())
    }
}

/// Transcoder that halves its input, rejecting [`StubTranscoder::REJECTED`].
pub struct StubTranscoder;

impl StubTranscoder {
    pub const REJECTED: &'static [u8] = b"corrupt";

    pub fn output_len(input_len: usize) -> usize {
        input_len / 2 + 1
    }
}

impl Transcoder for StubTranscoder {
    fn convert(&self, input: &[u8], _options: &EncodeOptions) -> Result<Vec<u8>, TranscodeError> {
        if input == Self::REJECTED {
            return Err(TranscodeError::Decode("unsupported image format".into()));
        }
        Ok(vec![b'w'; Self::output_len(input.len())])
    }
}
