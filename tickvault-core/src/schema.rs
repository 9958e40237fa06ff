//! Bucket schemas and the typed values stored against them.
//!
//! A bucket's schema is an ordered list of fixed-width fields, fixed at
//! creation. Incoming JSON values are checked against their field's
//! [`FieldType`] once, at the write boundary, and stored as [`Value`]s from
//! then on.

use crate::error::{Result, TsError};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Name of the field every bucket uses as its time axis.
pub const TIME_FIELD: &str = "timestamp";

/// Largest capacity a `STRING` field may declare.
pub const MAX_STRING_SIZE: i64 = 4096;

/// Scalar types a field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    /// Fixed-capacity UTF-8 text; width is the declared size.
    String,
}

impl FieldType {
    /// Byte width every field of this type must declare, if the type has one.
    pub fn canonical_width(&self) -> Option<u32> {
        match self {
            FieldType::Int | FieldType::Float => Some(4),
            FieldType::Long | FieldType::Double => Some(8),
            FieldType::Boolean => Some(1),
            FieldType::String => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Long | FieldType::Float | FieldType::Double
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Long)
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Long => write!(f, "LONG"),
            FieldType::Float => write!(f, "FLOAT"),
            FieldType::Double => write!(f, "DOUBLE"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::String => write!(f, "STRING"),
        }
    }
}

impl FromStr for FieldType {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INT" => Ok(FieldType::Int),
            "LONG" => Ok(FieldType::Long),
            "FLOAT" => Ok(FieldType::Float),
            "DOUBLE" => Ok(FieldType::Double),
            "BOOLEAN" => Ok(FieldType::Boolean),
            "STRING" => Ok(FieldType::String),
            _ => Err(TsError::InvalidSchema(format!("unknown field type '{}'", s))),
        }
    }
}

/// Field declaration as it arrives in a `createBucket` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub size: i64,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            size,
        }
    }
}

/// A validated field of a bucket schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    name: Arc<str>,
    field_type: FieldType,
    size: u32,
}

impl FieldSchema {
    pub fn new(name: &str, field_type: FieldType, size: i64) -> Result<Self> {
        if name.is_empty() {
            return Err(TsError::InvalidSchema("field name must not be empty".to_string()));
        }

        let size = match field_type.canonical_width() {
            Some(width) if size == i64::from(width) => width,
            Some(width) => {
                return Err(TsError::InvalidSchema(format!(
                    "field '{}' of type {} must have size {}, got {}",
                    name, field_type, width, size
                )))
            }
            None if (1..=MAX_STRING_SIZE).contains(&size) => size as u32,
            None => {
                return Err(TsError::InvalidSchema(format!(
                    "field '{}' of type {} must have size between 1 and {}, got {}",
                    name, field_type, MAX_STRING_SIZE, size
                )))
            }
        };

        Ok(Self {
            name: Arc::from(name),
            field_type,
            size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Converts a JSON value into this field's typed representation.
    pub fn decode(&self, raw: &JsonValue) -> Result<Value> {
        let field = self.name();
        match self.field_type {
            FieldType::Int => {
                let v = integral(field, raw)?;
                i32::try_from(v)
                    .map(Value::Int)
                    .map_err(|_| TsError::type_mismatch(field, format!("{} is out of range for INT", v)))
            }
            FieldType::Long => integral(field, raw).map(Value::Long),
            FieldType::Float => {
                let v = number(field, raw)?;
                if !v.is_finite() || v.abs() > f64::from(f32::MAX) {
                    return Err(TsError::type_mismatch(field, format!("{} is out of range for FLOAT", v)));
                }
                Ok(Value::Float(v as f32))
            }
            FieldType::Double => number(field, raw).map(Value::Double),
            FieldType::Boolean => raw
                .as_bool()
                .map(Value::Boolean)
                .ok_or_else(|| TsError::type_mismatch(field, format!("expected boolean, found {}", json_kind(raw)))),
            FieldType::String => {
                let s = raw
                    .as_str()
                    .ok_or_else(|| TsError::type_mismatch(field, format!("expected string, found {}", json_kind(raw))))?;
                if s.len() > self.size as usize {
                    return Err(TsError::type_mismatch(
                        field,
                        format!("string of {} bytes exceeds field size {}", s.len(), self.size),
                    ));
                }
                Ok(Value::Str(s.to_string()))
            }
        }
    }
}

fn json_kind(raw: &JsonValue) -> &'static str {
    match raw {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn integral(field: &str, raw: &JsonValue) -> Result<i64> {
    if let Some(v) = raw.as_i64() {
        return Ok(v);
    }
    if let Some(v) = raw.as_u64() {
        return Err(TsError::type_mismatch(field, format!("{} does not fit in 64 bits", v)));
    }
    match raw.as_f64() {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
        Some(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => Ok(v as i64),
        Some(v) => Err(TsError::type_mismatch(field, format!("{} is not an integer", v))),
        None => Err(TsError::type_mismatch(field, format!("expected integer, found {}", json_kind(raw)))),
    }
}

fn number(field: &str, raw: &JsonValue) -> Result<f64> {
    raw.as_f64()
        .ok_or_else(|| TsError::type_mismatch(field, format!("expected number, found {}", json_kind(raw))))
}

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Str(String),
}

impl Value {
    /// Integral view, used for the time axis.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Boolean(_) | Value::Str(_) => None,
        }
    }
}

/// Immutable, ordered field list of a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSchema {
    fields: Vec<FieldSchema>,
    time_index: usize,
}

impl BucketSchema {
    /// Validates field declarations for the bucket named `bucket`.
    pub fn from_definitions(bucket: &str, definitions: &[FieldDefinition]) -> Result<Self> {
        if definitions.is_empty() {
            return Err(TsError::InvalidSchema("field list must not be empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(definitions.len());
        let mut fields = Vec::with_capacity(definitions.len());
        for def in definitions {
            if !seen.insert(def.name.as_str()) {
                return Err(TsError::InvalidSchema(format!("duplicate field name '{}'", def.name)));
            }
            let field_type = def.type_name.parse::<FieldType>()?;
            fields.push(FieldSchema::new(&def.name, field_type, def.size)?);
        }

        Self::new(bucket, fields)
    }

    pub fn new(bucket: &str, fields: Vec<FieldSchema>) -> Result<Self> {
        let time_index = fields
            .iter()
            .position(|f| f.name() == TIME_FIELD)
            .ok_or_else(|| TsError::MissingTimeField(bucket.to_string()))?;

        let time_type = fields[time_index].field_type();
        if !time_type.is_integral() {
            return Err(TsError::InvalidSchema(format!(
                "'{}' must be INT or LONG, got {}",
                TIME_FIELD, time_type
            )));
        }

        Ok(Self { fields, time_index })
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    pub fn time_index(&self) -> usize {
        self.time_index
    }

    /// Checks a write's field map and returns its values in schema order.
    ///
    /// Every schema field must be present and no others; nothing is
    /// partially accepted.
    pub fn decode_values(&self, field_values: &serde_json::Map<String, JsonValue>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match field_values.get(field.name()) {
                None | Some(JsonValue::Null) => {
                    return Err(TsError::MissingField(field.name().to_string()))
                }
                Some(raw) => values.push(field.decode(raw)?),
            }
        }

        if let Some(extra) = field_values.keys().find(|k| self.field(k).is_none()) {
            return Err(TsError::UnknownField(extra.clone()));
        }

        Ok(values)
    }

    /// Pairs stored values with their field names.
    pub fn project(&self, values: &[Value]) -> FieldMap {
        FieldMap(
            self.fields
                .iter()
                .zip(values)
                .map(|(f, v)| (Arc::clone(&f.name), v.clone()))
                .collect(),
        )
    }
}

/// Field name to value mapping in schema order; serializes as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap(Vec<(Arc<str>, Value)>);

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(&**name, value)?;
        }
        map.end()
    }
}
