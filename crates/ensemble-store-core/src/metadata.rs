//! Per-vector metadata of summary (time-series) data.
//!
//! Metadata is attached to each vector at import time and is immutable
//! afterwards. It travels with the data as Arrow field metadata, which the
//! Parquet writer embeds in the artifact footer, so reopening an artifact
//! restores it without touching the source files.
//!
//! Field metadata keys follow the summary export convention:
//!
//! | key             | value                                |
//! |-----------------|--------------------------------------|
//! | `unit`          | unit string, e.g. `SM3/DAY`          |
//! | `is_total`      | `True` / `False`                     |
//! | `is_rate`       | `True` / `False`                     |
//! | `is_historical` | `True` / `False`                     |
//! | `keyword`       | summary keyword, e.g. `WOPR`         |
//! | `wgname`        | well/group name, or `None`           |
//! | `get_num`       | integer owner number, or `None`      |

use std::collections::HashMap;

use arrow::datatypes::Field;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

const KEY_UNIT: &str = "unit";
const KEY_IS_TOTAL: &str = "is_total";
const KEY_IS_RATE: &str = "is_rate";
const KEY_IS_HISTORICAL: &str = "is_historical";
const KEY_KEYWORD: &str = "keyword";
const KEY_WGNAME: &str = "wgname";
const KEY_GET_NUM: &str = "get_num";

/// Errors decoding vector metadata from field metadata.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MetadataError {
    /// A required key is absent while others are present.
    #[snafu(display("vector '{vector}': metadata key '{key}' is missing"))]
    MissingKey {
        /// Vector (column) name.
        vector: String,
        /// The missing key.
        key: &'static str,
    },

    /// A boolean key holds something other than `True`/`False`.
    #[snafu(display("vector '{vector}': metadata key '{key}' has non-boolean value '{value}'"))]
    InvalidBool {
        /// Vector (column) name.
        vector: String,
        /// The offending key.
        key: &'static str,
        /// The offending value.
        value: String,
    },

    /// `get_num` is neither an integer nor `None`.
    #[snafu(display("vector '{vector}': metadata key 'get_num' has non-integer value '{value}'"))]
    InvalidNumber {
        /// Vector (column) name.
        vector: String,
        /// The offending value.
        value: String,
    },
}

/// Metadata describing one summary vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Unit of the values.
    pub unit: String,
    /// Cumulative quantity.
    pub is_total: bool,
    /// Rate quantity (value describes the interval ending at its date).
    pub is_rate: bool,
    /// Historical (observed) rather than simulated vector.
    pub is_historical: bool,
    /// Summary keyword the vector was derived from.
    pub source_keyword: String,
    /// Well or group the vector belongs to, if any.
    pub owner_name: Option<String>,
    /// Numeric owner (region, block, ...), if any.
    pub owner_number: Option<i64>,
}

impl VectorMetadata {
    /// Decode metadata from an Arrow field.
    ///
    /// Returns `Ok(None)` if the field carries no vector metadata at all.
    pub fn from_field(field: &Field) -> Result<Option<Self>, MetadataError> {
        Self::from_map(field.name(), field.metadata())
    }

    /// Decode metadata from a field-metadata map.
    pub fn from_map(
        vector: &str,
        map: &HashMap<String, String>,
    ) -> Result<Option<Self>, MetadataError> {
        if !map.contains_key(KEY_UNIT) && !map.contains_key(KEY_KEYWORD) {
            return Ok(None);
        }

        let required = |key: &'static str| {
            map.get(key)
                .map(String::as_str)
                .context(MissingKeySnafu { vector, key })
        };
        let flag = |key: &'static str| -> Result<bool, MetadataError> {
            match map.get(key).map(|s| s.trim()) {
                None => Ok(false),
                Some("True" | "true" | "1") => Ok(true),
                Some("False" | "false" | "0") => Ok(false),
                Some(other) => InvalidBoolSnafu { vector, key, value: other }.fail(),
            }
        };

        let owner_name = map
            .get(KEY_WGNAME)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && *s != "None")
            .map(str::to_string);

        let owner_number = match map.get(KEY_GET_NUM).map(|s| s.trim()) {
            None | Some("") | Some("None") => None,
            Some(raw) => Some(
                raw.parse::<i64>()
                    .ok()
                    .context(InvalidNumberSnafu { vector, value: raw })?,
            ),
        };

        Ok(Some(VectorMetadata {
            unit: required(KEY_UNIT)?.to_string(),
            is_total: flag(KEY_IS_TOTAL)?,
            is_rate: flag(KEY_IS_RATE)?,
            is_historical: flag(KEY_IS_HISTORICAL)?,
            source_keyword: required(KEY_KEYWORD)?.to_string(),
            owner_name,
            owner_number,
        }))
    }

    /// Encode as field metadata (inverse of [`VectorMetadata::from_map`]).
    pub fn to_field_metadata(&self) -> HashMap<String, String> {
        let b = |v: bool| if v { "True" } else { "False" }.to_string();
        HashMap::from([
            (KEY_UNIT.to_string(), self.unit.clone()),
            (KEY_IS_TOTAL.to_string(), b(self.is_total)),
            (KEY_IS_RATE.to_string(), b(self.is_rate)),
            (KEY_IS_HISTORICAL.to_string(), b(self.is_historical)),
            (KEY_KEYWORD.to_string(), self.source_keyword.clone()),
            (
                KEY_WGNAME.to_string(),
                self.owner_name.clone().unwrap_or_else(|| "None".to_string()),
            ),
            (
                KEY_GET_NUM.to_string(),
                self.owner_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            ),
        ])
    }

    /// Name of the first attribute that differs between two metadata
    /// records for the same vector, or `None` if they agree.
    ///
    /// Compared attributes: unit, total/rate/historical flags, keyword.
    pub fn first_mismatch(&self, other: &VectorMetadata) -> Option<&'static str> {
        if self.unit != other.unit {
            Some("unit")
        } else if self.is_total != other.is_total {
            Some("is_total")
        } else if self.is_rate != other.is_rate {
            Some("is_rate")
        } else if self.is_historical != other.is_historical {
            Some("is_historical")
        } else if self.source_keyword != other.source_keyword {
            Some("keyword")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    fn wopr() -> VectorMetadata {
        VectorMetadata {
            unit: "SM3/DAY".to_string(),
            is_total: false,
            is_rate: true,
            is_historical: false,
            source_keyword: "WOPR".to_string(),
            owner_name: Some("OP_1".to_string()),
            owner_number: None,
        }
    }

    #[test]
    fn field_metadata_roundtrips() -> Result<(), MetadataError> {
        let meta = wopr();
        let field = Field::new("WOPR:OP_1", DataType::Float64, true)
            .with_metadata(meta.to_field_metadata());
        assert_eq!(VectorMetadata::from_field(&field)?, Some(meta));
        Ok(())
    }

    #[test]
    fn plain_field_has_no_metadata() -> Result<(), MetadataError> {
        let field = Field::new("PORO", DataType::Float64, true);
        assert_eq!(VectorMetadata::from_field(&field)?, None);
        Ok(())
    }

    #[test]
    fn exporter_spelling_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
        let map: HashMap<String, String> = [
            ("unit", "SM3"),
            ("is_total", "True"),
            ("is_rate", "False"),
            ("is_historical", "False"),
            ("keyword", "FOPT"),
            ("wgname", "None"),
            ("get_num", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let meta = VectorMetadata::from_map("FOPT", &map)?.ok_or("expected metadata")?;
        assert!(meta.is_total);
        assert!(!meta.is_rate);
        assert_eq!(meta.owner_name, None);
        assert_eq!(meta.owner_number, Some(0));
        Ok(())
    }

    #[test]
    fn malformed_values_are_format_errors() {
        let mut map = wopr().to_field_metadata();
        map.insert("is_rate".to_string(), "maybe".to_string());
        let err = VectorMetadata::from_map("WOPR:OP_1", &map).expect_err("bad bool");
        assert!(matches!(err, MetadataError::InvalidBool { key: "is_rate", .. }));

        let mut map = wopr().to_field_metadata();
        map.insert("get_num".to_string(), "x1".to_string());
        let err = VectorMetadata::from_map("WOPR:OP_1", &map).expect_err("bad number");
        assert!(matches!(err, MetadataError::InvalidNumber { .. }));

        let mut map = wopr().to_field_metadata();
        map.remove("keyword");
        let err = VectorMetadata::from_map("WOPR:OP_1", &map).expect_err("missing keyword");
        assert!(matches!(err, MetadataError::MissingKey { key: "keyword", .. }));
    }

    #[test]
    fn first_mismatch_reports_attribute() {
        let a = wopr();
        let mut b = wopr();
        assert_eq!(a.first_mismatch(&b), None);

        b.owner_name = Some("OTHER".to_string());
        assert_eq!(a.first_mismatch(&b), None);

        b.unit = "STB/DAY".to_string();
        assert_eq!(a.first_mismatch(&b), Some("unit"));
    }
}
