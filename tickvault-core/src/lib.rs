/*!
# Tickvault Core: In-Memory Time-Series Buckets with Live Streams

Tickvault Core is the storage and query engine behind the Tickvault datagram
service. It keeps named, schema-typed, append-only record logs in memory,
answers point, scan and windowed aggregate reads over them, and fans newly
appended records out to live stream subscribers.

## Key Features

### Typed Buckets
- Fixed-width field types (`INT`, `LONG`, `FLOAT`, `DOUBLE`, `BOOLEAN`, `STRING`)
- Schemas validated once at creation and immutable afterwards
- The `timestamp` field is every bucket's time axis

### Consistent Appends and Reads
- Per-bucket locking; appends to different buckets never contend
- Writes are validated before they touch the log, so a rejected write
  changes nothing
- Readers work on snapshots and never hold up writers for longer than
  the copy

### Aggregation
- `sum`, `count`, `min`, `max` and `avg` over inclusive time windows
- Integral fields stay integral where the result allows it

### Live Streams
- Subscriptions bind an endpoint to a set of bucket names
- Committed appends are pushed through a pluggable [`PushSink`], off the
  writer's path

## Usage

```rust,no_run
use tickvault_core::{BucketStore, FieldDefinition, QueryEngine, ReadMode};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(BucketStore::new());
    store
        .create_bucket(
            "cpu",
            &[
                FieldDefinition::new("timestamp", "LONG", 8),
                FieldDefinition::new("value", "INT", 4),
            ],
        )
        .await?;

    let fields = serde_json::json!({"timestamp": 315532800000i64, "value": 42});
    if let Some(fields) = fields.as_object() {
        store.append("cpu", fields).await?;
    }

    let engine = QueryEngine::new(store);
    let latest = engine.read("cpu", ReadMode::MostRecent).await?;
    println!("{}", serde_json::to_string(&latest)?);
    Ok(())
}
```
*/

pub mod aggregation;
pub mod error;
pub mod query;
pub mod schema;
pub mod store;
pub mod stream;

pub use aggregation::{AggregateFunction, AggregateValue, TimeRange};
pub use error::{Result, TsError};
pub use query::{AggregateDocument, QueryEngine, ReadMode, ReadResult};
pub use schema::{BucketSchema, FieldDefinition, FieldMap, FieldSchema, FieldType, Value, TIME_FIELD};
pub use store::{AppendEvent, Bucket, BucketStore, Record, RecordDocument, MAX_BUCKET_NAME_LEN};
pub use stream::{DeliveryStats, PushError, PushSink, StreamHub, Subscription};
