//! Point, scan and aggregate reads over bucket snapshots.
//!
//! [`QueryEngine`] holds no state of its own. Each call takes a snapshot of
//! one bucket's log and works on that copy, so a long scan never holds up
//! writers.

use crate::aggregation::{AggregateFunction, AggregateValue, TimeRange};
use crate::error::{Result, TsError};
use crate::store::{BucketStore, Record, RecordDocument};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How much of a bucket a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// The record with the highest sequence number.
    MostRecent,
    /// Every record, in insertion order.
    Full,
    /// Records whose time value lies in the window, in insertion order.
    Range(TimeRange),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadResult {
    Single(RecordDocument),
    Many(Vec<RecordDocument>),
}

/// Wire shape of an aggregate read: `{"data": {"<field>_<function>": n}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateDocument {
    pub data: BTreeMap<String, AggregateValue>,
}

impl AggregateDocument {
    pub fn new(field: &str, function: AggregateFunction, value: AggregateValue) -> Self {
        let mut data = BTreeMap::new();
        data.insert(format!("{}_{}", field, function), value);
        Self { data }
    }
}

/// Records of `records` that fall inside `range`, order preserved.
pub fn in_range(records: &[Arc<Record>], range: TimeRange) -> impl Iterator<Item = &Arc<Record>> {
    records.iter().filter(move |r| range.contains(r.time_value))
}

#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<BucketStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<BucketStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self, bucket_name: &str, mode: ReadMode) -> Result<ReadResult> {
        let bucket = self.store.lookup(bucket_name).await?;

        match mode {
            ReadMode::MostRecent => {
                let record = bucket
                    .latest()
                    .await
                    .ok_or_else(|| TsError::EmptyBucket(bucket_name.to_string()))?;
                Ok(ReadResult::Single(bucket.document(&record)))
            }
            ReadMode::Full => {
                let snapshot = bucket.snapshot().await;
                Ok(ReadResult::Many(
                    snapshot.iter().map(|r| bucket.document(r)).collect(),
                ))
            }
            ReadMode::Range(range) => {
                let snapshot = bucket.snapshot().await;
                Ok(ReadResult::Many(
                    in_range(&snapshot, range).map(|r| bucket.document(r)).collect(),
                ))
            }
        }
    }

    /// Reduces `field_name` over the records whose time value lies in
    /// `[start, end]`.
    pub async fn aggregate_read(
        &self,
        bucket_name: &str,
        function: AggregateFunction,
        field_name: &str,
        start: i64,
        end: i64,
    ) -> Result<AggregateDocument> {
        let bucket = self.store.lookup(bucket_name).await?;

        let schema = bucket.schema();
        let (index, field) = schema
            .index_of(field_name)
            .map(|i| (i, &schema.fields()[i]))
            .filter(|(_, f)| f.field_type().is_numeric())
            .ok_or_else(|| TsError::UnknownField(field_name.to_string()))?;

        let range = TimeRange::new(start, end)?;
        let snapshot = bucket.snapshot().await;
        let values: Vec<_> = in_range(&snapshot, range).map(|r| &r.values[index]).collect();

        let value = function.apply(field.field_type(), &values)?;
        Ok(AggregateDocument::new(field_name, function, value))
    }
}
