use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static DAY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("malformed day id regex"));
static WEEK_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-W\d{2}$").expect("malformed week id regex"));
static MONTH_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").expect("malformed month id regex"));
static YEAR_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}$").expect("malformed year id regex"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("invalid {scope_type} id {id:?}, expected {expected}")]
    InvalidId {
        scope_type: ScopeType,
        id: String,
        expected: &'static str,
    },

    #[error("unrecognized scope id {0:?}")]
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Day,
    Week,
    Month,
    Year,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Day => "day",
            ScopeType::Week => "week",
            ScopeType::Month => "month",
            ScopeType::Year => "year",
        }
    }

    /// The scope containing today's local date.
    pub fn current(&self) -> Scope {
        let today = chrono::Local::now().date_naive();
        match self {
            ScopeType::Day => Scope::day_of(today),
            ScopeType::Week => Scope::week_of(today),
            ScopeType::Month => Scope::month_of(today),
            ScopeType::Year => Scope::year_of(today),
        }
    }
}

impl std::fmt::Display for ScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScopeType {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(ScopeType::Day),
            "week" => Ok(ScopeType::Week),
            "month" => Ok(ScopeType::Month),
            "year" => Ok(ScopeType::Year),
            other => Err(ScopeError::Unrecognized(other.to_string())),
        }
    }
}

/// A time bucket: `(type, id)` where the id format is bound to the type
/// (day `2025-01-31`, week `2025-W05`, month `2025-01`, year `2025`).
/// Immutable once attached to a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub id: String,
}

impl Scope {
    /// Validates `id` against the format contract for `scope_type`.
    pub fn new(scope_type: ScopeType, id: &str) -> Result<Scope, ScopeError> {
        let invalid = |expected: &'static str| ScopeError::InvalidId {
            scope_type,
            id: id.to_string(),
            expected,
        };

        match scope_type {
            ScopeType::Day => {
                if !DAY_ID.is_match(id)
                    || NaiveDate::parse_from_str(id, "%Y-%m-%d").is_err()
                {
                    return Err(invalid("a calendar date formatted yyyy-MM-dd"));
                }
            }
            ScopeType::Week => {
                if !WEEK_ID.is_match(id) {
                    return Err(invalid("an ISO week formatted yyyy-Www"));
                }
                let (year, week) = id
                    .split_once("-W")
                    .and_then(|(y, w)| Some((y.parse::<i32>().ok()?, w.parse::<u32>().ok()?)))
                    .ok_or_else(|| invalid("an ISO week formatted yyyy-Www"))?;
                if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
                    return Err(invalid("an ISO week that exists in that year"));
                }
            }
            ScopeType::Month => {
                if !MONTH_ID.is_match(id) {
                    return Err(invalid("a month formatted yyyy-MM"));
                }
                let month: u32 = id[5..].parse().map_err(|_| invalid("a month formatted yyyy-MM"))?;
                if !(1..=12).contains(&month) {
                    return Err(invalid("a month between 01 and 12"));
                }
            }
            ScopeType::Year => {
                if !YEAR_ID.is_match(id) {
                    return Err(invalid("a year formatted yyyy"));
                }
            }
        }

        Ok(Scope {
            scope_type,
            id: id.to_string(),
        })
    }

    /// Infers the scope type from the id shape alone.
    pub fn infer(id: &str) -> Result<Scope, ScopeError> {
        for scope_type in [
            ScopeType::Day,
            ScopeType::Week,
            ScopeType::Month,
            ScopeType::Year,
        ] {
            if let Ok(scope) = Scope::new(scope_type, id) {
                return Ok(scope);
            }
        }
        Err(ScopeError::Unrecognized(id.to_string()))
    }

    pub fn day_of(date: NaiveDate) -> Scope {
        Scope {
            scope_type: ScopeType::Day,
            id: date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn week_of(date: NaiveDate) -> Scope {
        let iso = date.iso_week();
        Scope {
            scope_type: ScopeType::Week,
            id: format!("{:04}-W{:02}", iso.year(), iso.week()),
        }
    }

    pub fn month_of(date: NaiveDate) -> Scope {
        Scope {
            scope_type: ScopeType::Month,
            id: format!("{:04}-{:02}", date.year(), date.month()),
        }
    }

    pub fn year_of(date: NaiveDate) -> Scope {
        Scope {
            scope_type: ScopeType::Year,
            id: format!("{:04}", date.year()),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wellformed_ids() {
        assert!(Scope::new(ScopeType::Day, "2025-01-31").is_ok());
        assert!(Scope::new(ScopeType::Week, "2025-W05").is_ok());
        assert!(Scope::new(ScopeType::Month, "2025-12").is_ok());
        assert!(Scope::new(ScopeType::Year, "2025").is_ok());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(Scope::new(ScopeType::Day, "2025-1-31").is_err());
        assert!(Scope::new(ScopeType::Day, "2025-02-30").is_err());
        assert!(Scope::new(ScopeType::Day, "not-a-date").is_err());
        assert!(Scope::new(ScopeType::Week, "2025-05").is_err());
        assert!(Scope::new(ScopeType::Week, "2025-W54").is_err());
        assert!(Scope::new(ScopeType::Month, "2025-13").is_err());
        assert!(Scope::new(ScopeType::Year, "25").is_err());
    }

    #[test]
    fn week_53_exists_only_in_long_years() {
        // 2020 is a long ISO year, 2021 is not.
        assert!(Scope::new(ScopeType::Week, "2020-W53").is_ok());
        assert!(Scope::new(ScopeType::Week, "2021-W53").is_err());
    }

    #[test]
    fn infers_type_from_shape() {
        assert_eq!(
            Scope::infer("2025-01-31").unwrap().scope_type,
            ScopeType::Day
        );
        assert_eq!(
            Scope::infer("2025-W05").unwrap().scope_type,
            ScopeType::Week
        );
        assert_eq!(Scope::infer("2025-01").unwrap().scope_type, ScopeType::Month);
        assert_eq!(Scope::infer("2025").unwrap().scope_type, ScopeType::Year);
        assert!(Scope::infer("banana").is_err());
    }

    #[test]
    fn derives_ids_from_dates() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(Scope::day_of(date).id, "2025-01-01");
        // 2025-01-01 is a Wednesday, ISO week 1 of 2025.
        assert_eq!(Scope::week_of(date).id, "2025-W01");
        assert_eq!(Scope::month_of(date).id, "2025-01");
        assert_eq!(Scope::year_of(date).id, "2025");

        // 2024-12-30 is a Monday belonging to ISO week 1 of 2025.
        let spill = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(Scope::week_of(spill).id, "2025-W01");
    }

    #[test]
    fn serializes_with_type_tag() {
        let scope = Scope::new(ScopeType::Day, "2025-01-01").unwrap();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, r#"{"type":"day","id":"2025-01-01"}"#);
        let back: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scope);
    }
}
