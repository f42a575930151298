// mongobackup/src/backup/db_dump.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::{Client, Database};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Exporter;
use crate::config::MongoConfig;
use crate::errors::AppError;
use crate::utils::setting::{build_connection_string, check_db_connection};

/// Documents fetched per query.
pub const PAGE_SIZE: i64 = 1000;
/// Field injected into every exported document naming its source collection.
pub const COLLECTION_FIELD: &str = "_collection";

/// Read access to one database, as the streaming exporter needs it.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Live collection names, excluding `system.*`.
    async fn collection_names(&self) -> Result<Vec<String>>;
    async fn count_documents(&self, collection: &str) -> Result<u64>;
    /// One page in natural order, issued as a fresh query.
    async fn fetch_page(&self, collection: &str, skip: u64, limit: i64) -> Result<Vec<Document>>;
    async fn close(&self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &MongoConfig) -> Result<Box<dyn DocumentSource>>;
}

pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, config: &MongoConfig) -> Result<Box<dyn DocumentSource>> {
        info!(host = %config.host, port = config.port, "Connecting to MongoDB...");
        let uri = build_connection_string(config);
        let client = Client::with_uri_str(&uri).await.map_err(|e| {
            AppError::Connection(format!(
                "Failed to create MongoDB client for {}:{}: {}",
                config.host, config.port, e
            ))
        })?;
        let db = client.database(&config.database);

        if let Err(e) = check_db_connection(&db).await {
            client.shutdown().await;
            return Err(e.into());
        }

        Ok(Box::new(MongoSource { client, db }))
    }
}

struct MongoSource {
    client: Client,
    db: Database,
}

#[async_trait]
impl DocumentSource for MongoSource {
    async fn collection_names(&self) -> Result<Vec<String>> {
        let names = self
            .db
            .list_collection_names()
            .await
            .with_context(|| format!("Failed to list collections of database '{}'", self.db.name()))?;
        Ok(names.into_iter().filter(|name| !name.starts_with("system.")).collect())
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        self.db
            .collection::<Document>(collection)
            .count_documents(doc! {})
            .await
            .with_context(|| format!("Failed to count documents in collection '{}'", collection))
    }

    async fn fetch_page(&self, collection: &str, skip: u64, limit: i64) -> Result<Vec<Document>> {
        let cursor = self
            .db
            .collection::<Document>(collection)
            .find(doc! {})
            .skip(skip)
            .limit(limit)
            .await
            .with_context(|| format!("Failed to query collection '{}' at offset {}", collection, skip))?;
        cursor
            .try_collect()
            .await
            .with_context(|| format!("Failed to read page of collection '{}' at offset {}", collection, skip))
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        debug!("MongoDB client shut down");
    }
}

/// Writes documents as one JSON array through a gzip stream.
///
/// The array opens with `[\n`, separates records with `,\n` and closes with `\n]`.
/// Records are relaxed MongoDB Extended JSON: ObjectIds are written as
/// `{"$oid": "..."}` and dates as `{"$date": "..."}` rather than bare hex or
/// ISO strings, so restore tooling must parse Extended JSON.
pub struct JsonArrayWriter<W: Write> {
    encoder: GzEncoder<W>,
    records: u64,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(inner: W) -> std::io::Result<Self> {
        let mut encoder = GzEncoder::new(inner, Compression::default());
        encoder.write_all(b"[\n")?;
        Ok(JsonArrayWriter { encoder, records: 0 })
    }

    /// Serializes `document` as relaxed Extended JSON.
    pub fn write_document(&mut self, document: Document) -> Result<(), AppError> {
        if self.records > 0 {
            self.encoder.write_all(b",\n")?;
        }
        let value = Bson::Document(document).into_relaxed_extjson();
        serde_json::to_writer(&mut self.encoder, &value)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Closes the array and the gzip stream, handing back the inner writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.encoder.write_all(b"\n]")?;
        self.encoder.finish()
    }
}

/// Pages in flight between the reader and the file writer.
const WRITER_QUEUE_DEPTH: usize = 2;

enum WriterMsg {
    Page(Vec<Document>),
    Finish,
}

/// Owns the archive file on a blocking thread so compression and disk writes
/// stay off the async workers. Without a `Finish` message the array is left
/// unterminated and the partial file stays on disk.
fn write_archive(dest: &Path, mut pages: mpsc::Receiver<WriterMsg>) -> Result<u64> {
    let file = File::create(dest)
        .with_context(|| format!("Failed to create backup file: {}", dest.display()))?;
    let mut writer = JsonArrayWriter::new(BufWriter::new(file))
        .with_context(|| format!("Failed to start archive: {}", dest.display()))?;

    loop {
        match pages.blocking_recv() {
            Some(WriterMsg::Page(page)) => {
                for document in page {
                    writer
                        .write_document(document)
                        .with_context(|| format!("Failed to write document to {}", dest.display()))?;
                }
            }
            Some(WriterMsg::Finish) => break,
            None => return Ok(writer.records()),
        }
    }

    let records = writer.records();
    let buffered = writer
        .finish()
        .with_context(|| format!("Failed to finish gzip stream for {}", dest.display()))?;
    let file = buffered
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to flush backup file {}", dest.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync backup file {} to disk", dest.display()))?;

    Ok(records)
}

async fn send_pages(source: &dyn DocumentSource, pages: &mpsc::Sender<WriterMsg>) -> Result<()> {
    let collections = source.collection_names().await?;
    info!(count = collections.len(), "Found collections to back up");

    for name in &collections {
        info!(collection = %name, "Backing up collection");
        let total = source.count_documents(name).await?;
        info!(collection = %name, total, "Total documents in collection");

        let mut processed: u64 = 0;
        while processed < total {
            let mut page = source.fetch_page(name, processed, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len() as u64;
            for document in page.iter_mut() {
                document.insert(COLLECTION_FIELD, name.as_str());
            }
            if pages.send(WriterMsg::Page(page)).await.is_err() {
                // The writer stopped; its own error is reported by the caller.
                return Ok(());
            }

            processed += fetched;
            info!(collection = %name, processed, total, "Processed documents");
        }

        info!(collection = %name, "Completed backup of collection");
    }

    let _ = pages.send(WriterMsg::Finish).await;
    Ok(())
}

/// Streams every document of every collection into `dest`.
///
/// Paging uses skip/limit with a fresh query per page, so documents inserted
/// or removed mid-run may be missed or repeated. A page with zero documents
/// ends the collection even if the count said otherwise.
pub async fn export_collections(source: &dyn DocumentSource, dest: &Path) -> Result<u64> {
    let (tx, rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
    let path = dest.to_path_buf();
    let writer = tokio::task::spawn_blocking(move || write_archive(&path, rx));

    let read_result = send_pages(source, &tx).await;
    drop(tx);
    let write_result = writer.await.context("Archive writer task panicked")?;

    read_result?;
    write_result
}

/// In-process exporter producing `.json.gz` archives.
pub struct StreamingExporter<C: Connector = MongoConnector> {
    connector: C,
}

impl StreamingExporter<MongoConnector> {
    pub fn new() -> Self {
        StreamingExporter { connector: MongoConnector }
    }
}

impl Default for StreamingExporter<MongoConnector> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl<C: Connector> StreamingExporter<C> {
    pub fn with_connector(connector: C) -> Self {
        StreamingExporter { connector }
    }
}

#[async_trait]
impl<C: Connector> Exporter for StreamingExporter<C> {
    fn extension(&self) -> &'static str {
        ".json.gz"
    }

    async fn export(&self, config: &MongoConfig, dest: &Path) -> Result<()> {
        info!(database = %config.database, "Starting backup of database");
        let source = self.connector.connect(config).await?;
        info!(database = %config.database, "Connected. Starting export...");

        let result = export_collections(source.as_ref(), dest).await;
        // The client is released on every path, including failed exports.
        source.close().await;

        let records = result?;
        info!(records, file = %dest.display(), "✅ Export completed successfully");
        Ok(())
    }
}
