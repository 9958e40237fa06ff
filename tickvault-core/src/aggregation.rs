//! Aggregation functions over a numeric field of a bucket.
//!
//! This module provides:
//! - The supported reductions (Sum, Count, Min, Max, Avg)
//! - Inclusive time ranges used to select records
//! - The reduction itself, which keeps integral fields integral where the
//!   result allows it
//!
//! Query code filters records with [`TimeRange::contains`] and hands the
//! surviving values to [`AggregateFunction::apply`].

use crate::error::{Result, TsError};
use crate::schema::{FieldType, Value};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Reductions that can be applied to a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    /// Count the number of values
    Count,
    /// Sum all values
    Sum,
    /// Calculate the average
    Avg,
    /// Find the minimum value
    Min,
    /// Find the maximum value
    Max,
}

impl Display for AggregateFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "count"),
            AggregateFunction::Sum => write!(f, "sum"),
            AggregateFunction::Avg => write!(f, "avg"),
            AggregateFunction::Min => write!(f, "min"),
            AggregateFunction::Max => write!(f, "max"),
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            _ => Err(TsError::InvalidAggregation(s.to_string())),
        }
    }
}

/// Inclusive window over a bucket's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(TsError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whether `time` lies within the window, both bounds included.
    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Result of a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateValue {
    Integer(i64),
    Float(f64),
}

impl AggregateValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            AggregateValue::Integer(v) => v as f64,
            AggregateValue::Float(v) => v,
        }
    }
}

impl AggregateFunction {
    /// Reduces `values`, all of type `field_type`.
    ///
    /// Sum and count of nothing are zero. Min, max and avg of nothing have no
    /// value and fail with `EmptyRange`.
    pub fn apply(&self, field_type: FieldType, values: &[&Value]) -> Result<AggregateValue> {
        if let AggregateFunction::Count = self {
            return Ok(AggregateValue::Integer(values.len() as i64));
        }

        if values.is_empty() {
            return match self {
                AggregateFunction::Sum if field_type.is_integral() => Ok(AggregateValue::Integer(0)),
                AggregateFunction::Sum => Ok(AggregateValue::Float(0.0)),
                _ => Err(TsError::EmptyRange(self.to_string())),
            };
        }

        if field_type.is_integral() {
            let ints = values.iter().filter_map(|v| v.as_i64());
            return Ok(match self {
                AggregateFunction::Sum => {
                    let sum: i128 = ints.map(i128::from).sum();
                    i64::try_from(sum)
                        .map(AggregateValue::Integer)
                        .unwrap_or(AggregateValue::Float(sum as f64))
                }
                AggregateFunction::Min => AggregateValue::Integer(ints.min().unwrap_or_default()),
                AggregateFunction::Max => AggregateValue::Integer(ints.max().unwrap_or_default()),
                AggregateFunction::Avg => {
                    let sum: i128 = ints.map(i128::from).sum();
                    AggregateValue::Float(sum as f64 / values.len() as f64)
                }
                AggregateFunction::Count => unreachable!("count handled above"),
            });
        }

        let floats = values.iter().filter_map(|v| v.as_f64());
        let n = values.len() as f64;
        let result = match self {
            AggregateFunction::Sum => floats.sum(),
            AggregateFunction::Min => floats.fold(f64::INFINITY, f64::min),
            AggregateFunction::Max => floats.fold(f64::NEG_INFINITY, f64::max),
            // Scaled before summing so the mean of large values stays finite.
            AggregateFunction::Avg => floats.map(|v| v / n).sum(),
            AggregateFunction::Count => unreachable!("count handled above"),
        };
        if !result.is_finite() {
            return Err(TsError::AggregateOverflow(self.to_string()));
        }
        Ok(AggregateValue::Float(result))
    }
}
