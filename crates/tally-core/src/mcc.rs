//! Merchant category code sets
//!
//! Categories carry an ordered, duplicate-free set of MCC codes. In the
//! database the set is stored as a compact JSON array (`[5411,5499]`, `[]` when
//! empty). Older rows used a comma-separated string (`5411,5499`), which is
//! still accepted on read.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered set of MCC codes (first insertion wins the position)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<i32>", into = "Vec<i32>")]
pub struct MccCodes(Vec<i32>);

impl MccCodes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a code, returning false if it was already present
    pub fn insert(&mut self, code: i32) -> bool {
        if self.0.contains(&code) {
            return false;
        }
        self.0.push(code);
        true
    }

    /// Add every code from `other` that is not already present
    pub fn extend_from(&mut self, other: &MccCodes) {
        for code in &other.0 {
            self.insert(*code);
        }
    }

    pub fn contains(&self, code: i32) -> bool {
        self.0.contains(&code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &i32> {
        self.0.iter()
    }

    /// Order-independent comparison
    pub fn same_codes(&self, other: &MccCodes) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mine: HashSet<i32> = self.0.iter().copied().collect();
        other.0.iter().all(|c| mine.contains(c))
    }

    /// De-duplicated union of several sets, in argument order
    pub fn union<'a>(sets: impl IntoIterator<Item = &'a MccCodes>) -> MccCodes {
        let mut merged = MccCodes::new();
        for set in sets {
            merged.extend_from(set);
        }
        merged
    }

    /// Compact textual form stored in the `mcc_codes` column
    pub fn encode(&self) -> String {
        // Serializing a Vec<i32> cannot fail
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse the stored form. NULL/blank and the legacy comma list are accepted.
    pub fn decode(raw: Option<&str>) -> Result<Self> {
        let text = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::new()),
            Some(t) => t,
        };

        if text.starts_with('[') {
            let codes: Vec<i32> = serde_json::from_str(text)
                .map_err(|e| Error::InvalidData(format!("Invalid MCC code array '{}': {}", text, e)))?;
            return Ok(codes.into());
        }

        let mut codes = Self::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let code = part
                .parse::<i32>()
                .map_err(|_| Error::InvalidData(format!("Invalid MCC code '{}'", part)))?;
            codes.insert(code);
        }
        Ok(codes)
    }
}

impl From<Vec<i32>> for MccCodes {
    fn from(codes: Vec<i32>) -> Self {
        let mut set = Self::new();
        for code in codes {
            set.insert(code);
        }
        set
    }
}

impl From<MccCodes> for Vec<i32> {
    fn from(codes: MccCodes) -> Self {
        codes.0
    }
}

impl FromIterator<i32> for MccCodes {
    fn from_iter<T: IntoIterator<Item = i32>>(iter: T) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl FromStr for MccCodes {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(Some(s))
    }
}

impl fmt::Display for MccCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
