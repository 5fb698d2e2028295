//! Academic term keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Season within an academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// First regular semester.
    Spring,
    /// Summer session.
    Summer,
    /// Second regular semester.
    Fall,
    /// Winter session.
    Winter,
}

impl Season {
    /// Return the season as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Fall => "fall",
            Self::Winter => "winter",
        }
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spring" | "1" => Ok(Self::Spring),
            "summer" => Ok(Self::Summer),
            "fall" | "autumn" | "2" => Ok(Self::Fall),
            "winter" => Ok(Self::Winter),
            other => Err(format!("unknown season: {other}")),
        }
    }
}

/// A year and season pair scoping resources and credit ledgers.
///
/// Written as `2025-fall`. Numeric semesters (`2025-1`, `2025-2`) are
/// accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TermKey {
    /// Academic year.
    pub year: u16,
    /// Season within the year.
    pub season: Season,
}

impl TermKey {
    /// Create a term key.
    pub const fn new(year: u16, season: Season) -> Self {
        Self { year, season }
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.season.as_str())
    }
}

impl FromStr for TermKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, season) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("term must look like 2025-fall, got '{s}'"))?;
        let year = year
            .parse::<u16>()
            .map_err(|e| format!("invalid term year '{year}': {e}"))?;
        Ok(Self {
            year,
            season: season.parse()?,
        })
    }
}

impl TryFrom<String> for TermKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TermKey> for String {
    fn from(term: TermKey) -> Self {
        term.to_string()
    }
}
