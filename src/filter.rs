use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Column, PatientRecord, Uid};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("invalid filter: unknown column '{0}'")]
    UnknownColumn(String),
    #[error("invalid filter: '{predicate}' cannot be applied to column '{column}'")]
    TypeMismatch { column: String, predicate: String },
    #[error("invalid filter: cannot parse '{0}'")]
    InvalidExpression(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Flag(value) => write!(f, "{value}"),
            Operand::Number(value) => write!(f, "{value}"),
            Operand::Text(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    Eq(Operand),
    Ne(Operand),
    Lt(f64),
    Le(f64),
    Gt(f64),
    Ge(f64),
    Contains(String),
}

pub type FilterSet = BTreeMap<Column, Predicate>;

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(operand) => write!(f, "eq {operand}"),
            Predicate::Ne(operand) => write!(f, "ne {operand}"),
            Predicate::Lt(bound) => write!(f, "lt {bound}"),
            Predicate::Le(bound) => write!(f, "le {bound}"),
            Predicate::Gt(bound) => write!(f, "gt {bound}"),
            Predicate::Ge(bound) => write!(f, "ge {bound}"),
            Predicate::Contains(needle) => write!(f, "contains \"{needle}\""),
        }
    }
}

impl Predicate {
    /// Rejects predicates that have no meaning for the column's type.
    pub fn check(&self, column: &Column) -> Result<(), FilterError> {
        let supported = match (column, self) {
            (Column::Uid, Predicate::Eq(operand) | Predicate::Ne(operand)) => {
                !matches!(operand, Operand::Flag(_))
            }
            (Column::Uid, _) => true,
            (Column::Risk, Predicate::Eq(operand) | Predicate::Ne(operand)) => {
                as_flag(operand).is_some()
            }
            (Column::Risk, _) => false,
            (Column::Attribute(_), Predicate::Eq(operand) | Predicate::Ne(operand)) => {
                matches!(operand, Operand::Number(_))
            }
            (Column::Attribute(_), Predicate::Contains(_)) => false,
            (Column::Attribute(_), _) => true,
        };

        if supported {
            Ok(())
        } else {
            Err(FilterError::TypeMismatch {
                column: column.to_string(),
                predicate: self.to_string(),
            })
        }
    }

    /// Evaluates a checked predicate. Missing values never match, except that
    /// `ne` holds for them.
    pub fn matches(&self, column: &Column, record: &PatientRecord) -> bool {
        match column {
            Column::Uid => self.matches_uid(&record.uid),
            Column::Risk => match self {
                Predicate::Eq(operand) => as_flag(operand) == Some(record.risk),
                Predicate::Ne(operand) => as_flag(operand).is_some_and(|flag| flag != record.risk),
                _ => false,
            },
            Column::Attribute(name) => match record.attributes.get(name) {
                Some(value) => self.matches_number(*value),
                None => matches!(self, Predicate::Ne(_)),
            },
        }
    }

    fn matches_number(&self, value: f64) -> bool {
        match self {
            Predicate::Eq(Operand::Number(target)) => value == *target,
            Predicate::Ne(Operand::Number(target)) => value != *target,
            Predicate::Lt(bound) => value < *bound,
            Predicate::Le(bound) => value <= *bound,
            Predicate::Gt(bound) => value > *bound,
            Predicate::Ge(bound) => value >= *bound,
            _ => false,
        }
    }

    fn matches_uid(&self, uid: &Uid) -> bool {
        match self {
            Predicate::Eq(operand) => uid_equals(uid, operand),
            Predicate::Ne(operand) => !uid_equals(uid, operand),
            Predicate::Contains(needle) => uid.to_string().contains(needle.as_str()),
            _ => match uid {
                Uid::Numeric(value) => self.matches_number(*value as f64),
                Uid::Text(_) => false,
            },
        }
    }
}

fn as_flag(operand: &Operand) -> Option<bool> {
    match operand {
        Operand::Flag(flag) => Some(*flag),
        Operand::Number(value) if *value == 1.0 => Some(true),
        Operand::Number(value) if *value == 0.0 => Some(false),
        _ => None,
    }
}

fn uid_equals(uid: &Uid, operand: &Operand) -> bool {
    match (uid, operand) {
        (Uid::Numeric(value), Operand::Number(target)) => *value as f64 == *target,
        (uid, Operand::Text(target)) => uid.to_string() == *target,
        _ => false,
    }
}

/// A row passes when it satisfies every predicate in the set.
pub fn passes(filters: &FilterSet, record: &PatientRecord) -> bool {
    filters
        .iter()
        .all(|(column, predicate)| predicate.matches(column, record))
}

const SYMBOLS: [&str; 7] = [">=", "<=", "!=", "==", "=", ">", "<"];

/// Parses expressions such as `eq 1`, `> 120`, `<=99.5`, `= true` or
/// `contains 12`.
impl FromStr for Predicate {
    type Err = FilterError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let invalid = || FilterError::InvalidExpression(expression.to_string());
        let trimmed = expression.trim();

        let (operator, rest) = SYMBOLS
            .iter()
            .find_map(|symbol| trimmed.strip_prefix(symbol).map(|rest| (*symbol, rest)))
            .or_else(|| trimmed.split_once(char::is_whitespace))
            .ok_or_else(invalid)?;
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(invalid());
        }

        let bound = || rest.parse::<f64>().map_err(|_| invalid());
        let predicate = match operator.to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Predicate::Eq(parse_operand(rest)),
            "!=" | "ne" => Predicate::Ne(parse_operand(rest)),
            "<" | "lt" => Predicate::Lt(bound()?),
            "<=" | "le" => Predicate::Le(bound()?),
            ">" | "gt" => Predicate::Gt(bound()?),
            ">=" | "ge" => Predicate::Ge(bound()?),
            "contains" => Predicate::Contains(unquote(rest).to_string()),
            _ => return Err(invalid()),
        };
        Ok(predicate)
    }
}

fn parse_operand(raw: &str) -> Operand {
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Operand::Flag(true),
        "false" => return Operand::Flag(false),
        _ => {}
    }
    match raw.parse::<f64>() {
        Ok(value) => Operand::Number(value),
        Err(_) => Operand::Text(unquote(raw).to_string()),
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixture;

    fn attribute(name: &str) -> Column {
        Column::Attribute(name.to_string())
    }

    fn parse(expression: &str) -> Predicate {
        expression.parse().expect("valid expression")
    }

    #[test]
    fn parses_word_and_symbol_operators() {
        assert_eq!(parse("eq 1"), Predicate::Eq(Operand::Number(1.0)));
        assert_eq!(parse("> 120"), Predicate::Gt(120.0));
        assert_eq!(parse("<=99.5"), Predicate::Le(99.5));
        assert_eq!(parse("= true"), Predicate::Eq(Operand::Flag(true)));
        assert_eq!(parse("NE \"A-7\""), Predicate::Ne(Operand::Text("A-7".to_string())));
        assert_eq!(parse("contains 12"), Predicate::Contains("12".to_string()));
    }

    #[test]
    fn rejects_unparseable_expressions() {
        for expression in ["", "eq", "gt high", "between 1 2", "120"] {
            let err = expression.parse::<Predicate>().expect_err(expression);
            assert!(matches!(err, FilterError::InvalidExpression(_)), "{expression}");
        }
    }

    #[test]
    fn type_checks_follow_column_kind() {
        assert!(parse("eq 1").check(&Column::Risk).is_ok());
        assert!(parse("eq true").check(&Column::Risk).is_ok());
        assert!(parse("gt 0").check(&Column::Risk).is_err());
        assert!(parse("eq 2").check(&Column::Risk).is_err());
        assert!(parse("contains 1").check(&attribute("age")).is_err());
        assert!(parse("eq true").check(&attribute("age")).is_err());
        assert!(parse("contains 1").check(&Column::Uid).is_ok());
        assert!(parse("ge 2").check(&Column::Uid).is_ok());
    }

    #[test]
    fn missing_values_fail_comparisons() {
        let snapshot = fixture();
        let patient = &snapshot.patients()[2];
        assert!(!parse("gt 0").matches(&attribute("sysBP"), patient));
        assert!(!parse("le 1000").matches(&attribute("sysBP"), patient));
        assert!(parse("ne 120").matches(&attribute("sysBP"), patient));
    }

    #[test]
    fn risk_filter_matches_flag_and_numeric_labels() {
        let snapshot = fixture();
        let at_risk: Vec<bool> = snapshot
            .patients()
            .iter()
            .map(|patient| parse("eq 1").matches(&Column::Risk, patient))
            .collect();
        assert_eq!(at_risk, [false, true, false, true]);
    }

    #[test]
    fn uid_search_uses_display_text() {
        let snapshot = fixture();
        let hits: Vec<String> = snapshot
            .patients()
            .iter()
            .filter(|patient| parse("contains 3").matches(&Column::Uid, patient))
            .map(|patient| patient.uid.to_string())
            .collect();
        assert_eq!(hits, ["3"]);
    }

    #[test]
    fn conjunction_is_order_independent() {
        let snapshot = fixture();
        let age = (attribute("age"), parse("ge 50"));
        let risk = (Column::Risk, parse("eq true"));

        let both: FilterSet = [age.clone(), risk.clone()].into_iter().collect();
        let combined: Vec<_> = snapshot.patients().iter().filter(|p| passes(&both, p)).collect();

        let sequential: Vec<_> = snapshot
            .patients()
            .iter()
            .filter(|p| risk.1.matches(&risk.0, p))
            .filter(|p| age.1.matches(&age.0, p))
            .collect();
        let reversed: Vec<_> = snapshot
            .patients()
            .iter()
            .filter(|p| age.1.matches(&age.0, p))
            .filter(|p| risk.1.matches(&risk.0, p))
            .collect();

        assert_eq!(combined, sequential);
        assert_eq!(combined, reversed);
        assert_eq!(combined.len(), 2);
    }
}
