//! Routes decoded requests to the bucket store, query engine and stream hub.
//!
//! [`Dispatcher`] is the single entry point the transport talks to. Mutating
//! actions answer with a plain status line, reads answer with a JSON
//! document, and every failure becomes an [`ErrorResponse`] payload. Nothing
//! a client sends can take the process down.
//!
//! [`ErrorResponse`]: crate::error::ErrorResponse

use crate::error::DispatchError;
use crate::request::{
    ActionType, AggregateReadRequest, CreateBucketRequest, CreateStreamRequest, ReadRequest, ReadType, Request,
    WriteRequest,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tickvault_core::{
    AggregateDocument, AggregateFunction, BucketStore, PushSink, QueryEngine, ReadMode, ReadResult, StreamHub,
    TimeRange,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Status(String),
    Read(ReadResult),
    Aggregate(AggregateDocument),
}

impl Response {
    /// Whether this is a read result rather than a status line.
    pub fn is_document(&self) -> bool {
        !matches!(self, Response::Status(_))
    }

    /// Wire bytes: status lines are sent as-is, documents as JSON.
    pub fn encode(&self) -> Result<Bytes, DispatchError> {
        let encoded = match self {
            Response::Status(message) => return Ok(Bytes::from(message.clone())),
            Response::Read(result) => serde_json::to_vec(result),
            Response::Aggregate(doc) => serde_json::to_vec(doc),
        };
        encoded
            .map(Bytes::from)
            .map_err(|e| DispatchError::Internal(format!("failed to encode response: {}", e)))
    }
}

pub struct Dispatcher {
    store: Arc<BucketStore>,
    queries: QueryEngine,
    hub: StreamHub,
    fanout: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Dispatcher over an existing store and hub. Appends reach the hub only
    /// if `store` was built with a notifier that the hub consumes.
    pub fn new(store: Arc<BucketStore>, hub: StreamHub) -> Self {
        Self {
            queries: QueryEngine::new(Arc::clone(&store)),
            store,
            hub,
            fanout: None,
        }
    }

    /// Fresh store and hub wired together, pushing stream records to `sink`.
    pub fn with_sink<S: PushSink>(sink: Arc<S>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(BucketStore::with_notifier(tx));
        let hub = StreamHub::new();
        let fanout = hub.spawn_fanout(sink, rx);

        let mut dispatcher = Self::new(store, hub);
        dispatcher.fanout = Some(fanout);
        dispatcher
    }

    pub fn store(&self) -> &Arc<BucketStore> {
        &self.store
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    pub async fn dispatch(&self, request: Request, source: SocketAddr) -> Result<Response, DispatchError> {
        match request {
            Request::CreateBucket(req) => self.create_bucket(req).await,
            Request::Write(req) => self.write(req).await,
            Request::Read(req) => self.read(req).await,
            Request::AggregateRead(req) => self.aggregate_read(req).await,
            Request::CreateStream(req) => self.create_stream(req, source).await,
        }
    }

    /// Decodes, dispatches and encodes one datagram. Documents and error
    /// payloads are kept within `max_size` bytes.
    pub async fn handle_datagram(&self, payload: &[u8], source: SocketAddr, max_size: usize) -> Bytes {
        let result = match Request::from_json(payload) {
            Ok(request) => {
                let action = request.action();
                debug!(%source, ?action, "dispatching request");
                self.dispatch(request, source).await
            }
            Err(e) => Err(e),
        };

        // Status lines confirm committed changes and are always sent; only
        // read documents are replaced when they outgrow a datagram.
        let reply = result.and_then(|response| {
            let bytes = response.encode()?;
            if response.is_document() && bytes.len() > max_size {
                return Err(DispatchError::ResponseTooLarge {
                    size: bytes.len(),
                    limit: max_size,
                });
            }
            Ok(bytes)
        });

        match reply {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%source, code = e.code(), "request rejected: {}", e);
                e.to_response().encode(max_size)
            }
        }
    }

    async fn create_bucket(&self, req: CreateBucketRequest) -> Result<Response, DispatchError> {
        self.store.create_bucket(&req.bucket_name, &req.fields).await?;
        Ok(Response::Status(ActionType::CreateBucket.status_message(&req.bucket_name)))
    }

    async fn write(&self, req: WriteRequest) -> Result<Response, DispatchError> {
        self.store.append(&req.bucket_name, &req.field_values).await?;
        Ok(Response::Status(ActionType::Write.status_message(&req.bucket_name)))
    }

    async fn read(&self, req: ReadRequest) -> Result<Response, DispatchError> {
        let mode = match req.read_type {
            ReadType::MostRecent => ReadMode::MostRecent,
            ReadType::Full => ReadMode::Full,
            ReadType::Range => match (req.time_range_start, req.time_range_end) {
                (Some(start), Some(end)) => ReadMode::Range(TimeRange::new(start, end)?),
                _ => {
                    return Err(DispatchError::MalformedRequest(
                        "RANGE reads need timeRangeStart and timeRangeEnd".to_string(),
                    ))
                }
            },
        };
        Ok(Response::Read(self.queries.read(&req.bucket_name, mode).await?))
    }

    async fn aggregate_read(&self, req: AggregateReadRequest) -> Result<Response, DispatchError> {
        let function: AggregateFunction = req.aggregation_type.parse()?;
        let doc = self
            .queries
            .aggregate_read(
                &req.bucket_name,
                function,
                &req.field_name,
                req.time_range_start,
                req.time_range_end,
            )
            .await?;
        Ok(Response::Aggregate(doc))
    }

    async fn create_stream(&self, req: CreateStreamRequest, source: SocketAddr) -> Result<Response, DispatchError> {
        self.hub.create_stream(&req.buckets_to_stream, source).await;
        let subject = format!("[{}]", req.buckets_to_stream.join(", "));
        Ok(Response::Status(ActionType::CreateStream.status_message(&subject)))
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.take() {
            fanout.abort();
        }
    }
}
