//! Bucket registry and append-only record logs.
//!
//! The [`BucketStore`] owns every bucket for the life of the process. The
//! registry map and each bucket's log sit behind their own locks, so appends
//! to different buckets never contend and readers only hold a bucket's lock
//! long enough to copy out a snapshot.
//!
//! When a notifier channel is attached, each committed append is published
//! as an [`AppendEvent`] before the log lock is released, so events leave a
//! bucket in sequence order. Delivery to subscribers runs on separate tasks
//! and carries no ordering guarantee.

use crate::error::{Result, TsError};
use crate::schema::{BucketSchema, FieldDefinition, FieldMap, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Longest accepted bucket name, in bytes.
pub const MAX_BUCKET_NAME_LEN: usize = 255;

/// One immutable data point in a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Position in the bucket's log, assigned at append.
    pub seq: u64,
    /// Value of the bucket's time axis field.
    pub time_value: i64,
    /// Values in schema order.
    pub values: Vec<Value>,
}

/// Wire shape of a single record: `{"data": {field: value, ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDocument {
    pub data: FieldMap,
}

/// Published once per committed append.
#[derive(Debug, Clone)]
pub struct AppendEvent {
    pub bucket: String,
    pub seq: u64,
    pub document: Arc<RecordDocument>,
}

#[derive(Debug, Default)]
struct RecordLog {
    records: Vec<Arc<Record>>,
    next_seq: u64,
}

/// A named, schema-typed, append-only log.
#[derive(Debug)]
pub struct Bucket {
    name: String,
    schema: BucketSchema,
    log: RwLock<RecordLog>,
}

impl Bucket {
    fn new(name: String, schema: BucketSchema) -> Self {
        Self {
            name,
            schema,
            log: RwLock::new(RecordLog::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &BucketSchema {
        &self.schema
    }

    /// Copies out the current record list. Records appended after this
    /// returns are not part of the snapshot.
    pub async fn snapshot(&self) -> Vec<Arc<Record>> {
        self.log.read().await.records.clone()
    }

    /// The record with the highest sequence number.
    pub async fn latest(&self) -> Option<Arc<Record>> {
        self.log.read().await.records.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sequence number of the newest record, if any.
    pub async fn last_seq(&self) -> Option<u64> {
        self.log.read().await.records.last().map(|r| r.seq)
    }

    pub fn document(&self, record: &Record) -> RecordDocument {
        RecordDocument {
            data: self.schema.project(&record.values),
        }
    }

    async fn append(&self, values: Vec<Value>, notifier: Option<&mpsc::UnboundedSender<AppendEvent>>) -> Arc<Record> {
        let time_value = values[self.schema.time_index()]
            .as_i64()
            .unwrap_or_default();

        let mut log = self.log.write().await;
        let record = Arc::new(Record {
            seq: log.next_seq,
            time_value,
            values,
        });
        log.next_seq += 1;
        log.records.push(Arc::clone(&record));

        if let Some(notifier) = notifier {
            let event = AppendEvent {
                bucket: self.name.clone(),
                seq: record.seq,
                document: Arc::new(self.document(&record)),
            };
            if notifier.send(event).is_err() {
                warn!(bucket = %self.name, "stream hub is gone, append not published");
            }
        }
        record
    }
}

/// Process-wide registry of buckets.
#[derive(Debug, Default)]
pub struct BucketStore {
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
    notifier: Option<mpsc::UnboundedSender<AppendEvent>>,
}

impl BucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that publishes every committed append on `notifier`.
    pub fn with_notifier(notifier: mpsc::UnboundedSender<AppendEvent>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            notifier: Some(notifier),
        }
    }

    /// Registers an empty bucket.
    pub async fn create_bucket(&self, name: &str, fields: &[FieldDefinition]) -> Result<Arc<Bucket>> {
        if name.is_empty() {
            return Err(TsError::InvalidSchema("bucket name must not be empty".to_string()));
        }
        if name.len() > MAX_BUCKET_NAME_LEN {
            return Err(TsError::InvalidSchema(format!(
                "bucket name is {} bytes, limit is {}",
                name.len(),
                MAX_BUCKET_NAME_LEN
            )));
        }
        let schema = BucketSchema::from_definitions(name, fields)?;

        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(name) {
            return Err(TsError::AlreadyExists(name.to_string()));
        }

        let bucket = Arc::new(Bucket::new(name.to_string(), schema));
        buckets.insert(name.to_string(), Arc::clone(&bucket));
        info!(bucket = name, fields = fields.len(), "bucket created");
        Ok(bucket)
    }

    pub async fn lookup(&self, name: &str) -> Result<Arc<Bucket>> {
        self.buckets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TsError::NotFound(name.to_string()))
    }

    pub async fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validates `field_values` against the bucket schema and appends it.
    ///
    /// The record is visible to reads once this returns. Validation happens
    /// before the log is touched, so a rejected write leaves it unchanged.
    pub async fn append(
        &self,
        name: &str,
        field_values: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Arc<Record>> {
        let bucket = self.lookup(name).await?;
        let values = bucket.schema().decode_values(field_values)?;
        let record = bucket.append(values, self.notifier.as_ref()).await;
        debug!(bucket = name, seq = record.seq, time = record.time_value, "record appended");
        Ok(record)
    }
}
