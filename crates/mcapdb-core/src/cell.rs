//! Spreadsheet cell boundary types.
//!
//! The spreadsheet host can only pass and receive plain cell values, never
//! structured errors. Arguments arrive as [`CellInput`]; lookups resolve to a
//! tagged [`LookupResult`], which is mapped to a [`CellValue`] (possibly a
//! [`Sentinel`]) only at the outermost boundary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LookupError, Result};
use crate::types::{Attribute, AttributeValue, EntityId};

/// Largest float that still maps exactly onto an entity id.
const MAX_EXACT_ID: f64 = 9_007_199_254_740_992.0;

/// A raw argument as passed by the spreadsheet host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CellInput {
    /// An empty cell.
    #[default]
    Empty,
    /// A numeric cell. Hosts send all numbers as floats.
    Number(f64),
    /// A text cell.
    Text(String),
    /// A boolean cell.
    Bool(bool),
    /// A host-native date cell.
    Date(NaiveDate),
}

impl CellInput {
    /// Interprets the cell as an entity id.
    ///
    /// Accepts integral non-negative numbers and text holding a non-negative integer.
    ///
    /// # Errors
    /// Returns [`LookupError::Validation`] for any other cell.
    pub fn to_entity_id(&self) -> Result<EntityId> {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_ID => {
                EntityId::new(*n as i64)
            }
            Self::Number(n) => Err(LookupError::Validation(format!(
                "entity id must be a whole number, got {n}"
            ))),
            Self::Text(s) => s.parse(),
            other => Err(LookupError::Validation(format!(
                "entity id must be a number, got {}",
                other.kind()
            ))),
        }
    }

    /// Interprets the cell as a calendar date, parsing text with `format`.
    ///
    /// # Errors
    /// Returns [`LookupError::Validation`] if the cell is not a date or does not match `format`.
    pub fn to_date(&self, format: &str) -> Result<NaiveDate> {
        match self {
            Self::Date(date) => Ok(*date),
            Self::Text(s) => NaiveDate::parse_from_str(s.trim(), format).map_err(|e| {
                LookupError::Validation(format!("invalid date {s:?} (expected {format}): {e}"))
            }),
            other => Err(LookupError::Validation(format!(
                "date must be text, got {}",
                other.kind()
            ))),
        }
    }

    /// Interprets the cell as an attribute name.
    ///
    /// # Errors
    /// Returns [`LookupError::Validation`] if the cell is not text naming a known attribute.
    pub fn to_attribute(&self) -> Result<Attribute> {
        match self {
            Self::Text(s) => s.parse(),
            other => Err(LookupError::Validation(format!(
                "field must be text, got {}",
                other.kind()
            ))),
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "an empty cell",
            Self::Number(_) => "a number",
            Self::Text(_) => "text",
            Self::Bool(_) => "a boolean",
            Self::Date(_) => "a date",
        }
    }
}

impl fmt::Display for CellInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("None"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{d}"),
        }
    }
}

impl From<f64> for CellInput {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for CellInput {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for CellInput {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for CellInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for CellInput {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for CellInput {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<Self>> From<Option<T>> for CellInput {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Error markers returned to the host in place of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentinel {
    /// The key is valid but the store has no row for it.
    NoData,
    /// An argument failed validation.
    InputError,
    /// The store could not be queried.
    QueryError,
}

impl Sentinel {
    /// Returns the marker string shown in the cell.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoData => "#N/A_DATA",
            Self::InputError => "#INPUT_ERROR",
            Self::QueryError => "#QUERY_ERROR",
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value handed back to the spreadsheet host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// An empty cell (the column was NULL).
    Empty,
    /// A numeric cell.
    Number(f64),
    /// A text cell.
    Text(String),
    /// An error marker.
    Error(Sentinel),
}

impl CellValue {
    /// Returns the sentinel if this cell carries one.
    #[must_use]
    pub const fn sentinel(&self) -> Option<Sentinel> {
        match self {
            Self::Error(s) => Some(*s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Error(s) => write!(f, "{s}"),
        }
    }
}

impl From<AttributeValue> for CellValue {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Number(n) => Self::Number(n),
            AttributeValue::Text(s) => Self::Text(s),
            AttributeValue::Null => Self::Empty,
        }
    }
}

/// The outcome of a single facade call, before it is mapped to a cell.
#[derive(Clone, Debug, PartialEq)]
pub enum LookupResult {
    /// The attribute was resolved.
    Value(AttributeValue),
    /// The key was valid but no row exists.
    NotFound,
    /// An argument failed validation.
    ValidationError(String),
    /// The store failed.
    StoreError(String),
}

impl LookupResult {
    /// Returns true if the call produced a value.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Value(_) => None,
            Self::NotFound => Some("Data not found.".to_string()),
            Self::ValidationError(msg) | Self::StoreError(msg) => Some(msg.clone()),
        }
    }

    /// Maps the outcome to the cell the host receives.
    #[must_use]
    pub fn into_cell(self) -> CellValue {
        match self {
            Self::Value(value) => value.into(),
            Self::NotFound => CellValue::Error(Sentinel::NoData),
            Self::ValidationError(_) => CellValue::Error(Sentinel::InputError),
            Self::StoreError(_) => CellValue::Error(Sentinel::QueryError),
        }
    }
}

impl From<LookupError> for LookupResult {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Validation(msg) => Self::ValidationError(msg),
            LookupError::NotFound { .. } => Self::NotFound,
            other => Self::StoreError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FMT: &str = "%Y-%m-%d";

    #[test]
    fn test_entity_id_from_cells() {
        assert_eq!(CellInput::from(1234).to_entity_id().unwrap().get(), 1234);
        assert_eq!(CellInput::from(1234.0).to_entity_id().unwrap().get(), 1234);
        assert_eq!(CellInput::from("1234").to_entity_id().unwrap().get(), 1234);

        assert!(CellInput::from("abc").to_entity_id().is_err());
        assert!(CellInput::from(12.5).to_entity_id().is_err());
        assert!(CellInput::from(-3).to_entity_id().is_err());
        assert!(CellInput::from(f64::NAN).to_entity_id().is_err());
        assert!(CellInput::from(f64::INFINITY).to_entity_id().is_err());
        assert!(CellInput::Empty.to_entity_id().is_err());
        assert!(CellInput::from(true).to_entity_id().is_err());
    }

    #[test]
    fn test_date_from_cells() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(CellInput::from("2024-01-15").to_date(FMT).unwrap(), expected);
        assert_eq!(CellInput::from(expected).to_date(FMT).unwrap(), expected);
        assert_eq!(
            CellInput::from("15/01/2024").to_date("%d/%m/%Y").unwrap(),
            expected
        );

        assert!(CellInput::from("2024-02-30").to_date(FMT).is_err());
        assert!(CellInput::from("15/01/2024").to_date(FMT).is_err());
        assert!(CellInput::from(45306.0).to_date(FMT).is_err());
        assert!(CellInput::Empty.to_date(FMT).is_err());
    }

    #[test]
    fn test_attribute_from_cells() {
        assert_eq!(
            CellInput::from("sector").to_attribute().unwrap(),
            Attribute::Sector
        );
        assert!(CellInput::from("accord_code").to_attribute().is_err());
        assert!(CellInput::from(1.0).to_attribute().is_err());
    }

    #[test]
    fn test_result_to_cell() {
        assert_eq!(
            LookupResult::Value(AttributeValue::Number(5000.0)).into_cell(),
            CellValue::Number(5000.0)
        );
        assert_eq!(
            LookupResult::Value(AttributeValue::Null).into_cell(),
            CellValue::Empty
        );
        assert_eq!(
            LookupResult::NotFound.into_cell(),
            CellValue::Error(Sentinel::NoData)
        );
        assert_eq!(
            LookupResult::ValidationError("bad".into()).into_cell(),
            CellValue::Error(Sentinel::InputError)
        );
        assert_eq!(
            LookupResult::StoreError("locked".into()).into_cell(),
            CellValue::Error(Sentinel::QueryError)
        );
    }

    #[test]
    fn test_sentinels_are_distinct() {
        let rendered: Vec<String> = [Sentinel::NoData, Sentinel::InputError, Sentinel::QueryError]
            .iter()
            .map(|s| CellValue::Error(*s).to_string())
            .collect();
        assert_eq!(rendered, ["#N/A_DATA", "#INPUT_ERROR", "#QUERY_ERROR"]);
    }

    #[test]
    fn test_error_into_result() {
        let result: LookupResult = LookupError::StoreUnavailable("disk I/O error".into()).into();
        assert_eq!(
            result,
            LookupResult::StoreError("Database error: disk I/O error".into())
        );
        assert_eq!(result.error_message().as_deref(), Some("Database error: disk I/O error"));
    }
}
