//! Core data types for daily company metrics.
//!
//! This module defines the fundamental data structures:
//!
//! - [`EntityId`] - Integer code identifying a company
//! - [`MetricRecord`] - One `daily_metrics` row
//! - [`Attribute`] - The retrievable columns of a row
//! - [`AttributeValue`] - A single resolved column value

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LookupError, Result};

/// Integer code uniquely identifying a company in the store.
///
/// Entity ids are never negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EntityId(i64);

impl EntityId {
    /// Creates a new entity id, rejecting negative values.
    ///
    /// # Errors
    /// Returns [`LookupError::Validation`] if `id` is negative.
    pub fn new(id: i64) -> Result<Self> {
        if id < 0 {
            return Err(LookupError::Validation(format!(
                "entity id must be non-negative, got {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for EntityId {
    type Error = LookupError;

    fn try_from(id: i64) -> Result<Self> {
        Self::new(id)
    }
}

impl From<EntityId> for i64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl FromStr for EntityId {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let id = trimmed
            .parse::<i64>()
            .map_err(|_| LookupError::Validation(format!("invalid entity id: {trimmed:?}")))?;
        Self::new(id)
    }
}

/// A retrievable column of the `daily_metrics` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Company name.
    CompanyName,
    /// Business sector.
    Sector,
    /// Market capitalization category (large cap, mid cap, ...).
    McapCategory,
    /// Market capitalization.
    Mcap,
}

impl Attribute {
    /// Every retrievable attribute, in column order.
    pub const ALL: [Self; 4] = [
        Self::CompanyName,
        Self::Sector,
        Self::McapCategory,
        Self::Mcap,
    ];

    /// Returns the column name backing this attribute.
    ///
    /// Column names are fixed; they are the only identifiers that ever reach query text.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::CompanyName => "company_name",
            Self::Sector => "sector",
            Self::McapCategory => "mcap_category",
            Self::Mcap => "mcap",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Attribute {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|attr| attr.column().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LookupError::Validation(format!("invalid field: {wanted:?}")))
    }
}

/// A resolved column value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// A numeric column value.
    Number(f64),
    /// A text column value.
    Text(String),
    /// The row exists but the column is NULL.
    Null,
}

impl AttributeValue {
    fn from_text(value: Option<&String>) -> Self {
        value.map_or(Self::Null, |s| Self::Text(s.clone()))
    }
}

/// One row of the `daily_metrics` table.
///
/// `(entity_id, date)` is the primary key; every other column is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Company identifier.
    pub entity_id: EntityId,
    /// Trading date of the row.
    pub date: NaiveDate,
    /// Company name.
    pub company_name: Option<String>,
    /// Business sector.
    pub sector: Option<String>,
    /// Market capitalization category.
    pub mcap_category: Option<String>,
    /// Market capitalization.
    pub mcap: Option<f64>,
}

impl MetricRecord {
    /// Creates a record with only the key columns populated.
    #[must_use]
    pub const fn new(entity_id: EntityId, date: NaiveDate) -> Self {
        Self {
            entity_id,
            date,
            company_name: None,
            sector: None,
            mcap_category: None,
            mcap: None,
        }
    }

    /// Sets the company name.
    #[must_use]
    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    /// Sets the sector.
    #[must_use]
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Sets the market capitalization category.
    #[must_use]
    pub fn with_mcap_category(mut self, category: impl Into<String>) -> Self {
        self.mcap_category = Some(category.into());
        self
    }

    /// Sets the market capitalization.
    #[must_use]
    pub const fn with_mcap(mut self, mcap: f64) -> Self {
        self.mcap = Some(mcap);
        self
    }

    /// Extracts a single attribute from the row.
    #[must_use]
    pub fn attribute(&self, attribute: Attribute) -> AttributeValue {
        match attribute {
            Attribute::CompanyName => AttributeValue::from_text(self.company_name.as_ref()),
            Attribute::Sector => AttributeValue::from_text(self.sector.as_ref()),
            Attribute::McapCategory => AttributeValue::from_text(self.mcap_category.as_ref()),
            Attribute::Mcap => self.mcap.map_or(AttributeValue::Null, AttributeValue::Number),
        }
    }
}
