#[cfg(test)]
mod tests {
    use crate::dispatcher::{Dispatcher, Response};
    use crate::request::Request;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tickvault_core::{BucketStore, PushError, PushSink, RecordDocument, StreamHub};

    mock! {
        pub Sink {}
        #[async_trait]
        impl PushSink for Sink {
            async fn push(&self, endpoint: SocketAddr, document: Arc<RecordDocument>) -> Result<(), PushError>;
        }
    }

    const MAX: usize = 65507;

    fn client() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(BucketStore::new()), StreamHub::new())
    }

    async fn send(dispatcher: &Dispatcher, message: Value) -> String {
        let payload = serde_json::to_vec(&message).unwrap();
        let reply = dispatcher.handle_datagram(&payload, client(), MAX).await;
        String::from_utf8(reply.to_vec()).unwrap()
    }

    async fn send_json(dispatcher: &Dispatcher, message: Value) -> Value {
        serde_json::from_str(&send(dispatcher, message).await).unwrap()
    }

    async fn create_bucket(dispatcher: &Dispatcher, name: &str) -> String {
        send(
            dispatcher,
            json!({
                "actionType": "createBucket",
                "bucketName": name,
                "fields": [
                    {"name": "timestamp", "type": "LONG", "size": 8},
                    {"name": "value", "type": "INT", "size": 4}
                ]
            }),
        )
        .await
    }

    async fn write(dispatcher: &Dispatcher, bucket: &str, timestamp: i64, value: i64) -> String {
        send(
            dispatcher,
            json!({
                "actionType": "write",
                "bucketName": bucket,
                "fieldValues": {"timestamp": timestamp, "value": value}
            }),
        )
        .await
    }

    #[tokio::test]
    async fn test_create_bucket() {
        let dispatcher = dispatcher();
        let response = create_bucket(&dispatcher, "test_bucket").await;
        assert!(response.contains("Bucket created successfully"));
    }

    #[tokio::test]
    async fn test_duplicate_bucket() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "dup").await;
        let response: Value = serde_json::from_str(&create_bucket(&dispatcher, "dup").await).unwrap();
        assert_eq!(response["error"], "ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_write_and_read_most_recent() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "recent").await;
        let response = write(&dispatcher, "recent", 315532800000, 42).await;
        assert!(response.contains("Data written to bucket"));

        let read = send_json(
            &dispatcher,
            json!({"actionType": "read", "bucketName": "recent", "type": "MOST_RECENT"}),
        )
        .await;
        assert_eq!(read, json!({"data": {"timestamp": 315532800000i64, "value": 42}}));
    }

    #[tokio::test]
    async fn test_read_full() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "full").await;
        write(&dispatcher, "full", 315532800000, 42).await;
        write(&dispatcher, "full", 315532800000, 84).await;

        let read = send_json(&dispatcher, json!({"actionType": "read", "bucketName": "full", "type": "FULL"})).await;
        let records = read.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["data"]["value"], 42);
        assert_eq!(records[1]["data"]["value"], 84);
    }

    #[tokio::test]
    async fn test_aggregate_sum() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "agg").await;
        write(&dispatcher, "agg", 315532800000, 42).await;
        write(&dispatcher, "agg", 315532800001, 84).await;
        write(&dispatcher, "agg", 315532800003, 126).await;

        let result = send_json(
            &dispatcher,
            json!({
                "actionType": "aggregateRead",
                "bucketName": "agg",
                "aggregationType": "sum",
                "fieldName": "value",
                "timeRangeStart": 315532799999i64,
                "timeRangeEnd": 315532800002i64
            }),
        )
        .await;
        assert_eq!(result, json!({"data": {"value_sum": 126}}));
    }

    #[tokio::test]
    async fn test_aggregate_unknown_function() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "agg").await;
        let result = send_json(
            &dispatcher,
            json!({
                "actionType": "aggregateRead",
                "bucketName": "agg",
                "aggregationType": "median",
                "fieldName": "value",
                "timeRangeStart": 0,
                "timeRangeEnd": 1
            }),
        )
        .await;
        assert_eq!(result["error"], "INVALID_AGGREGATION");
    }

    #[tokio::test]
    async fn test_range_read_requires_bounds() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "range").await;
        write(&dispatcher, "range", 5, 1).await;
        write(&dispatcher, "range", 15, 2).await;

        let missing = send_json(&dispatcher, json!({"actionType": "read", "bucketName": "range", "type": "RANGE"})).await;
        assert_eq!(missing["error"], "MALFORMED_REQUEST");

        let read = send_json(
            &dispatcher,
            json!({"actionType": "read", "bucketName": "range", "type": "RANGE", "timeRangeStart": 10, "timeRangeEnd": 20}),
        )
        .await;
        assert_eq!(read, json!([{"data": {"timestamp": 15, "value": 2}}]));
    }

    #[tokio::test]
    async fn test_missing_bucket_operations() {
        let dispatcher = dispatcher();
        let write_err: Value = serde_json::from_str(&write(&dispatcher, "ghost", 1, 1).await).unwrap();
        assert_eq!(write_err["error"], "NOT_FOUND");

        let read_err = send_json(&dispatcher, json!({"actionType": "read", "bucketName": "ghost", "type": "FULL"})).await;
        assert_eq!(read_err["error"], "NOT_FOUND");

        let agg_err = send_json(
            &dispatcher,
            json!({
                "actionType": "aggregateRead",
                "bucketName": "ghost",
                "aggregationType": "sum",
                "fieldName": "value",
                "timeRangeStart": 0,
                "timeRangeEnd": 1
            }),
        )
        .await;
        assert_eq!(agg_err["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_stream_for_unknown_bucket() {
        let dispatcher = dispatcher();
        let response = send(
            &dispatcher,
            json!({"actionType": "createStream", "bucketsToStream": ["not_yet_created"]}),
        )
        .await;
        assert!(response.contains("Stream started for buckets"));
        assert!(response.contains("not_yet_created"));
        assert_eq!(dispatcher.hub().subscribers_for("not_yet_created").await, vec![client()]);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_requests() {
        let dispatcher = dispatcher();
        let unknown = send_json(&dispatcher, json!({"actionType": "dropBucket", "bucketName": "b"})).await;
        assert_eq!(unknown["error"], "UNKNOWN_ACTION");

        let reply = dispatcher.handle_datagram(b"{\"actionType\": \"wri", client(), MAX).await;
        let malformed: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(malformed["error"], "MALFORMED_REQUEST");
        assert!(malformed["message"].as_str().unwrap().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_oversized_reply_is_replaced_by_error() {
        let dispatcher = dispatcher();
        create_bucket(&dispatcher, "big").await;
        for i in 0..50 {
            write(&dispatcher, "big", i, i).await;
        }

        let payload = serde_json::to_vec(&json!({"actionType": "read", "bucketName": "big", "type": "FULL"})).unwrap();
        let reply = dispatcher.handle_datagram(&payload, client(), 256).await;
        let err: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(err["error"], "RESPONSE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_small_datagram_limit_never_hides_a_committed_change() {
        let dispatcher = dispatcher();
        let name = "n".repeat(100);
        let create = serde_json::to_vec(&json!({
            "actionType": "createBucket",
            "bucketName": name,
            "fields": [
                {"name": "timestamp", "type": "LONG", "size": 8},
                {"name": "value", "type": "INT", "size": 4}
            ]
        }))
        .unwrap();

        let reply = dispatcher.handle_datagram(&create, client(), 120).await;
        let reply = String::from_utf8(reply.to_vec()).unwrap();
        assert_eq!(reply, format!("Bucket created successfully: {}", name));
        assert!(dispatcher.store().lookup(&name).await.is_ok());

        let retry = dispatcher.handle_datagram(&create, client(), 120).await;
        assert!(retry.len() <= 120);
        let retry: Value = serde_json::from_slice(&retry).unwrap();
        assert_eq!(retry["error"], "ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_overlong_bucket_name_is_rejected() {
        let dispatcher = dispatcher();
        let response: Value = serde_json::from_str(&create_bucket(&dispatcher, &"n".repeat(300)).await).unwrap();
        assert_eq!(response["error"], "INVALID_SCHEMA");
        assert!(dispatcher.store().bucket_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_overflow_is_reported() {
        let dispatcher = dispatcher();
        send(
            &dispatcher,
            json!({
                "actionType": "createBucket",
                "bucketName": "wide",
                "fields": [
                    {"name": "timestamp", "type": "LONG", "size": 8},
                    {"name": "v", "type": "DOUBLE", "size": 8}
                ]
            }),
        )
        .await;
        for timestamp in [1, 2] {
            send(
                &dispatcher,
                json!({"actionType": "write", "bucketName": "wide", "fieldValues": {"timestamp": timestamp, "v": 1.7e308}}),
            )
            .await;
        }

        let result = send_json(
            &dispatcher,
            json!({
                "actionType": "aggregateRead",
                "bucketName": "wide",
                "aggregationType": "sum",
                "fieldName": "v",
                "timeRangeStart": 0,
                "timeRangeEnd": 9
            }),
        )
        .await;
        assert_eq!(result["error"], "AGGREGATE_OVERFLOW");
    }

    #[tokio::test]
    async fn test_stream_opened_before_bucket_receives_pushes() {
        let mut sink = MockSink::new();
        sink.expect_push()
            .withf(|endpoint, document| {
                *endpoint == SocketAddr::from(([127, 0, 0, 1], 40000))
                    && serde_json::to_value(&**document).unwrap() == json!({"data": {"timestamp": 5, "value": 9}})
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::with_sink(Arc::new(sink));
        let started = send(&dispatcher, json!({"actionType": "createStream", "bucketsToStream": ["later"]})).await;
        assert!(started.contains("Stream started for buckets"));

        create_bucket(&dispatcher, "later").await;
        write(&dispatcher, "later", 5, 9).await;

        for _ in 0..100 {
            if dispatcher.hub().stats().sent() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(dispatcher.hub().stats().sent(), 1);
        assert_eq!(dispatcher.hub().stats().failed(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_returns_typed_response() {
        let dispatcher = dispatcher();
        let request = Request::from_json(br#"{"actionType":"createStream","bucketsToStream":["a","b"]}"#).unwrap();
        let response = tokio_test::assert_ok!(dispatcher.dispatch(request, client()).await);
        assert_eq!(response, Response::Status("Stream started for buckets: [a, b]".to_string()));
    }

    #[tokio::test]
    async fn test_write_is_pushed_to_stream_subscriber() {
        let mut sink = MockSink::new();
        sink.expect_push()
            .withf(|endpoint, _| *endpoint == SocketAddr::from(([127, 0, 0, 1], 40000)))
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::with_sink(Arc::new(sink));
        create_bucket(&dispatcher, "live").await;
        send(&dispatcher, json!({"actionType": "createStream", "bucketsToStream": ["live"]})).await;
        write(&dispatcher, "live", 1, 7).await;

        for _ in 0..100 {
            if dispatcher.hub().stats().sent() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(dispatcher.hub().stats().sent(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers() {
        let dispatcher = Arc::new(dispatcher());
        create_bucket(&dispatcher, "busy").await;

        let writers = (0..32).map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { write(&dispatcher, "busy", i, i).await })
        });
        for response in futures::future::join_all(writers).await {
            assert!(response.unwrap().contains("Data written to bucket"));
        }

        let bucket = dispatcher.store().lookup("busy").await.unwrap();
        let snapshot = bucket.snapshot().await;
        assert_eq!(snapshot.len(), 32);
        assert!(snapshot.windows(2).all(|w| w[0].seq + 1 == w[1].seq));
    }
}
