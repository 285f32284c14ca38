use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// Patient identifier. Integer ids compare numerically; anything else compares
/// as text and sorts after every integer id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Uid {
    Numeric(i64),
    Text(String),
}

impl Uid {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(value) => Uid::Numeric(value),
            Err(_) => Uid::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uid::Numeric(value) => write!(f, "{value}"),
            Uid::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub uid: Uid,
    /// Missing cells are absent from the map.
    pub attributes: BTreeMap<String, f64>,
    pub risk: bool,
}

impl PatientRecord {
    pub fn cell(&self, column: &Column) -> CellValue {
        match column {
            Column::Uid => CellValue::Id(self.uid.clone()),
            Column::Risk => CellValue::Flag(self.risk),
            Column::Attribute(name) => self
                .attributes
                .get(name)
                .map_or(CellValue::Missing, |value| CellValue::Number(*value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingPoint {
    pub index: usize,
    pub coordinates: [f64; 3],
    pub color_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub group: String,
    pub metrics: BTreeMap<String, f64>,
}

/// A column of the patient table. The uid and risk columns are addressed by
/// role so that header spelling in the source file does not matter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Uid,
    Risk,
    Attribute(String),
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Uid => f.write_str("uid"),
            Column::Risk => f.write_str("risk"),
            Column::Attribute(name) => f.write_str(name),
        }
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Id(Uid),
    Number(f64),
    Flag(bool),
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_uids_order_numerically() {
        assert!(Uid::parse("2") < Uid::parse("10"));
        assert!(Uid::parse("10") < Uid::parse("A-1"));
        assert_eq!(Uid::parse(" 42 "), Uid::Numeric(42));
    }

    #[test]
    fn missing_attribute_reads_as_missing_cell() {
        let record = PatientRecord {
            uid: Uid::Numeric(1),
            attributes: BTreeMap::from([("age".to_string(), 39.0)]),
            risk: true,
        };
        assert_eq!(record.cell(&Column::Attribute("age".into())), CellValue::Number(39.0));
        assert_eq!(record.cell(&Column::Attribute("glucose".into())), CellValue::Missing);
        assert_eq!(record.cell(&Column::Risk), CellValue::Flag(true));
    }

    #[test]
    fn columns_serialize_as_plain_names() {
        let json = serde_json::to_string(&vec![Column::Uid, Column::Attribute("sysBP".into())])
            .expect("serialize");
        assert_eq!(json, r#"["uid","sysBP"]"#);
    }
}
