//! In-memory fakes for the backup seams.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{Document, doc};

use super::db_dump::{Connector, DocumentSource};
use super::s3_upload::ObjectStore;
use crate::config::MongoConfig;
use crate::errors::AppError;

pub fn numbered_docs(prefix: &str, n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| doc! { "_id": format!("{}-{}", prefix, i), "seq": i as i64 })
        .collect()
}

pub fn read_json_archive(path: &Path) -> Result<Vec<serde_json::Value>> {
    let decoder = flate2::read::GzDecoder::new(File::open(path)?);
    Ok(serde_json::from_reader(decoder)?)
}

#[derive(Default)]
struct SourceState {
    page_requests: Mutex<Vec<(String, u64, i64)>>,
    closed: AtomicBool,
}

/// A static dataset served with skip/limit semantics.
#[derive(Clone, Default)]
pub struct MemorySource {
    collections: Arc<BTreeMap<String, Vec<Document>>>,
    count_bias: u64,
    fail_at_offset: Option<u64>,
    state: Arc<SourceState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, docs: Vec<Document>) -> Self {
        let mut collections = (*self.collections).clone();
        collections.insert(name.to_string(), docs);
        self.collections = Arc::new(collections);
        self
    }

    /// Inflates every count by `bias`.
    pub fn with_count_bias(mut self, bias: u64) -> Self {
        self.count_bias = bias;
        self
    }

    pub fn failing_at_offset(mut self, offset: u64) -> Self {
        self.fail_at_offset = Some(offset);
        self
    }

    pub fn page_requests(&self) -> Vec<(String, u64, i64)> {
        self.state.page_requests.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.collections.keys().cloned().collect())
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        let len = self.collections.get(collection).map_or(0, Vec::len) as u64;
        Ok(len + self.count_bias)
    }

    async fn fetch_page(&self, collection: &str, skip: u64, limit: i64) -> Result<Vec<Document>> {
        self.state
            .page_requests
            .lock()
            .unwrap()
            .push((collection.to_string(), skip, limit));
        if self.fail_at_offset == Some(skip) {
            return Err(AppError::Connection("connection reset by peer".into()).into());
        }
        let docs = self.collections.get(collection).cloned().unwrap_or_default();
        Ok(docs.into_iter().skip(skip as usize).take(limit as usize).collect())
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MemoryConnector {
    source: MemorySource,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(source: MemorySource) -> Self {
        MemoryConnector { source, connects: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn connect_counter(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _config: &MongoConfig) -> Result<Box<dyn DocumentSource>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.source.clone()))
    }
}

/// Records uploads; fails while `fail` is set.
#[derive(Clone, Default)]
pub struct RecordingStore {
    uploads: Arc<Mutex<Vec<(String, PathBuf, String)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<(String, PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Storage("simulated upload failure".into()).into());
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), path.to_path_buf(), content_type.to_string()));
        Ok(())
    }
}
