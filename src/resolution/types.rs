use serde::{Deserialize, Serialize};

/// Proposed (or on-chain) market outcome. Discriminants are the contract's codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Undecided = 0,
    Yes = 1,
    No = 2,
}

impl Outcome {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Outcome::Undecided),
            1 => Some(Outcome::Yes),
            2 => Some(Outcome::No),
            _ => None,
        }
    }

    /// Case-insensitive parse of the reasoning service's label
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Outcome::Yes),
            "NO" => Some(Outcome::No),
            "UNDECIDED" => Some(Outcome::Undecided),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Undecided => "UNDECIDED",
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive odds bounds in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OddsRange {
    pub min: u32,
    pub max: u32,
}

impl OddsRange {
    pub fn new(min: u32, max: u32) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    pub fn clamp(&self, odds: i64) -> u32 {
        odds.clamp(self.min as i64, self.max as i64) as u32
    }

    pub fn midpoint(&self) -> u32 {
        self.min + (self.max - self.min) / 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCandidate {
    pub outcome: Outcome,
    pub confidence: f64,
    pub suggested_odds_yes: u32,
    pub suggested_odds_no: u32,
    pub reasoning: String,
    pub evidence_sources: Vec<String>,
}
