//! Closed borough vocabulary and its one-hot encoding.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Borough {
    Bronx,
    Brooklyn,
    Manhattan,
    Queens,
    StatenIsland,
}

impl Borough {
    /// Vocabulary in one-hot column order.
    pub const ALL: [Borough; 5] = [
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Manhattan,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    /// Trims and lower-cases before matching against the vocabulary.
    pub fn parse(raw: &str) -> Result<Borough> {
        let normalized = raw.trim().to_lowercase();
        Borough::ALL
            .iter()
            .copied()
            .find(|b| b.as_str() == normalized)
            .ok_or(PipelineError::InvalidCategory { value: normalized })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Borough::Bronx => "bronx",
            Borough::Brooklyn => "brooklyn",
            Borough::Manhattan => "manhattan",
            Borough::Queens => "queens",
            Borough::StatenIsland => "staten island",
        }
    }

    pub fn column_name(&self) -> String {
        format!("borough_{}", self.as_str().replace(' ', "_"))
    }

    /// Column names of the full one-hot block.
    pub fn column_names() -> Vec<String> {
        Borough::ALL.iter().map(|b| b.column_name()).collect()
    }

    /// Full-width one-hot block: every vocabulary column, exactly one set to 1.
    pub fn one_hot(&self) -> Vec<(String, f64)> {
        Borough::ALL
            .iter()
            .map(|b| (b.column_name(), if b == self { 1.0 } else { 0.0 }))
            .collect()
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Borough {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        Borough::parse(&value)
    }
}

impl From<Borough> for String {
    fn from(b: Borough) -> String {
        b.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        assert_eq!(Borough::parse("  Brooklyn ").unwrap(), Borough::Brooklyn);
        assert_eq!(Borough::parse("STATEN ISLAND").unwrap(), Borough::StatenIsland);
        assert_eq!(Borough::parse("\tqueens\n").unwrap(), Borough::Queens);
    }

    #[test]
    fn parse_rejects_outside_vocabulary() {
        for raw in ["", "citywide", "staten_island", "new york"] {
            match Borough::parse(raw) {
                Err(PipelineError::InvalidCategory { .. }) => {}
                other => panic!("expected InvalidCategory for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn one_hot_has_full_width_and_single_one() {
        for raw in ["bronx", " BROOKLYN", "Manhattan ", "queens", "Staten Island"] {
            let encoded = Borough::parse(raw).unwrap().one_hot();
            assert_eq!(encoded.len(), Borough::ALL.len());
            assert_eq!(encoded.iter().filter(|(_, v)| *v == 1.0).count(), 1);
            assert_eq!(encoded.iter().filter(|(_, v)| *v == 0.0).count(), 4);
        }
    }

    #[test]
    fn column_names_use_underscores() {
        assert_eq!(
            Borough::column_names(),
            vec![
                "borough_bronx",
                "borough_brooklyn",
                "borough_manhattan",
                "borough_queens",
                "borough_staten_island"
            ]
        );
    }
}
