//! Request model for the datagram protocol.
//!
//! Each datagram carries one JSON object whose `actionType` field selects
//! the operation; the remaining fields are the operation's arguments.

use crate::error::DispatchError;
use serde::Deserialize;
use tickvault_core::FieldDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    CreateBucket,
    Write,
    Read,
    AggregateRead,
    CreateStream,
}

impl ActionType {
    pub fn from_wire(name: &str) -> Result<Self, DispatchError> {
        match name {
            "createBucket" => Ok(ActionType::CreateBucket),
            "write" => Ok(ActionType::Write),
            "read" => Ok(ActionType::Read),
            "aggregateRead" => Ok(ActionType::AggregateRead),
            "createStream" => Ok(ActionType::CreateStream),
            other => Err(DispatchError::UnknownAction(other.to_string())),
        }
    }

    /// Success message for mutating actions.
    pub fn status_message(&self, subject: &str) -> String {
        let subject = truncate_subject(subject);
        match self {
            ActionType::CreateBucket => format!("Bucket created successfully: {}", subject),
            ActionType::Write => format!("Data written to bucket: {}", subject),
            ActionType::CreateStream => format!("Stream started for buckets: {}", subject),
            ActionType::Read | ActionType::AggregateRead => subject.to_string(),
        }
    }
}

/// Longest subject echoed back in a status line, in bytes.
const MAX_SUBJECT_LEN: usize = 256;

fn truncate_subject(subject: &str) -> String {
    if subject.len() <= MAX_SUBJECT_LEN {
        return subject.to_string();
    }
    let mut cut = MAX_SUBJECT_LEN;
    while !subject.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &subject[..cut])
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    pub bucket_name: String,
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub bucket_name: String,
    pub field_values: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadType {
    MostRecent,
    Full,
    Range,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub bucket_name: String,
    #[serde(rename = "type")]
    pub read_type: ReadType,
    #[serde(default)]
    pub time_range_start: Option<i64>,
    #[serde(default)]
    pub time_range_end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReadRequest {
    pub bucket_name: String,
    pub aggregation_type: String,
    pub field_name: String,
    pub time_range_start: i64,
    pub time_range_end: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStreamRequest {
    pub buckets_to_stream: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateBucket(CreateBucketRequest),
    Write(WriteRequest),
    Read(ReadRequest),
    AggregateRead(AggregateReadRequest),
    CreateStream(CreateStreamRequest),
}

impl Request {
    /// Decodes one datagram payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, DispatchError> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| DispatchError::MalformedRequest(format!("invalid JSON: {}", e)))?;

        let action = value
            .get("actionType")
            .and_then(|t| t.as_str())
            .ok_or_else(|| DispatchError::MalformedRequest("missing actionType".to_string()))?;

        match ActionType::from_wire(action)? {
            ActionType::CreateBucket => body(value).map(Request::CreateBucket),
            ActionType::Write => body(value).map(Request::Write),
            ActionType::Read => body(value).map(Request::Read),
            ActionType::AggregateRead => body(value).map(Request::AggregateRead),
            ActionType::CreateStream => body(value).map(Request::CreateStream),
        }
    }

    pub fn action(&self) -> ActionType {
        match self {
            Request::CreateBucket(_) => ActionType::CreateBucket,
            Request::Write(_) => ActionType::Write,
            Request::Read(_) => ActionType::Read,
            Request::AggregateRead(_) => ActionType::AggregateRead,
            Request::CreateStream(_) => ActionType::CreateStream,
        }
    }
}

fn body<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T, DispatchError> {
    serde_json::from_value(value).map_err(|e| DispatchError::MalformedRequest(e.to_string()))
}
