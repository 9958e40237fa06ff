//! Live stream subscriptions and fan-out of appended records.
//!
//! Subscribers register an endpoint against a set of bucket names. The hub
//! consumes [`AppendEvent`]s from the store's notifier channel on its own
//! task and hands each record to a [`PushSink`] once per interested
//! endpoint. Every delivery runs in a separate task; a failed or slow
//! delivery is logged and dropped without touching the writer.

use crate::store::{AppendEvent, RecordDocument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
#[error("push to {endpoint} failed: {reason}")]
pub struct PushError {
    pub endpoint: SocketAddr,
    pub reason: String,
}

/// Delivers a record document to a subscriber endpoint.
#[async_trait]
pub trait PushSink: Send + Sync + 'static {
    async fn push(&self, endpoint: SocketAddr, document: Arc<RecordDocument>) -> Result<(), PushError>;
}

/// Binding of one endpoint to a set of buckets.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub buckets: HashSet<String>,
    pub endpoint: SocketAddr,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn covers(&self, bucket: &str) -> bool {
        self.buckets.contains(bucket)
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Registry of subscriptions plus the fan-out worker.
#[derive(Debug, Clone, Default)]
pub struct StreamHub {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    stats: Arc<DeliveryStats>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` for appends to any of `buckets`.
    ///
    /// Bucket names are not checked; a stream may be opened before the
    /// bucket exists.
    pub async fn create_stream(&self, buckets: &[String], endpoint: SocketAddr) -> Subscription {
        let subscription = Subscription {
            buckets: buckets.iter().cloned().collect(),
            endpoint,
            created_at: Utc::now(),
        };
        self.subscriptions.write().await.push(subscription.clone());
        info!(%endpoint, ?buckets, "stream started");
        subscription
    }

    /// Endpoints subscribed to `bucket`, one entry per subscription.
    pub async fn subscribers_for(&self, bucket: &str) -> Vec<SocketAddr> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.covers(bucket))
            .map(|s| s.endpoint)
            .collect()
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Starts the fan-out worker. It runs until every sender of `events`
    /// has been dropped.
    pub fn spawn_fanout<S: PushSink>(&self, sink: Arc<S>, mut events: mpsc::UnboundedReceiver<AppendEvent>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                hub.fan_out(&sink, event).await;
            }
            debug!("append channel closed, fan-out stopped");
        })
    }

    async fn fan_out<S: PushSink>(&self, sink: &Arc<S>, event: AppendEvent) {
        for endpoint in self.subscribers_for(&event.bucket).await {
            let sink = Arc::clone(sink);
            let stats = Arc::clone(&self.stats);
            let document = Arc::clone(&event.document);
            let bucket = event.bucket.clone();
            let seq = event.seq;
            tokio::spawn(async move {
                match sink.push(endpoint, document).await {
                    Ok(()) => {
                        stats.sent.fetch_add(1, Ordering::Relaxed);
                        debug!(%endpoint, bucket = %bucket, seq, "pushed record to subscriber");
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(bucket = %bucket, seq, "{}", e);
                    }
                }
            });
        }
    }
}
