//! Destination × origin requirement matrix

use crate::{is_valid_code, PowerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Travel-document requirement for an origin passport entering a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequirementLevel {
    SameCountry,
    VisaFree,
    VisaOnArrival,
    ElectronicTravelAuthorization,
    VisaRequired,
}

impl RequirementLevel {
    pub const ALL: [RequirementLevel; 5] = [
        RequirementLevel::SameCountry,
        RequirementLevel::VisaFree,
        RequirementLevel::VisaOnArrival,
        RequirementLevel::ElectronicTravelAuthorization,
        RequirementLevel::VisaRequired,
    ];

    /// Label used in the long table's `Visa Requirements` column
    pub fn label(&self) -> &'static str {
        match self {
            Self::SameCountry => "Same Country",
            Self::VisaFree => "Visa Free",
            Self::VisaOnArrival => "Visa on Arrival",
            Self::ElectronicTravelAuthorization => "Electronic Travel Authorization",
            Self::VisaRequired => "Visa Required",
        }
    }
}

impl fmt::Display for RequirementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RequirementLevel {
    type Err = PowerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "SAME COUNTRY" => Ok(Self::SameCountry),
            "VISA FREE" | "COM_C_VF" => Ok(Self::VisaFree),
            "VISA ON ARRIVAL" | "COM_C_VOA" => Ok(Self::VisaOnArrival),
            "ELECTRONIC TRAVEL AUTHORIZATION" | "COM_C_ETA" => {
                Ok(Self::ElectronicTravelAuthorization)
            }
            "VISA REQUIRED" => Ok(Self::VisaRequired),
            _ => Err(PowerError::Data(format!(
                "unknown visa requirement {:?}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for RequirementLevel {
    type Error = PowerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RequirementLevel> for String {
    fn from(level: RequirementLevel) -> Self {
        level.label().to_string()
    }
}

/// Requirement levels keyed by (destination, origin).
///
/// Unset cells read as [`RequirementLevel::VisaRequired`], the diagonal as
/// [`RequirementLevel::SameCountry`].
#[derive(Debug, Clone, Default)]
pub struct RequirementMatrix {
    codes: Vec<String>,
    index: HashMap<String, usize>,
    cells: HashMap<(usize, usize), RequirementLevel>,
}

impl RequirementMatrix {
    /// Create an empty matrix over the given country codes (rows and columns)
    pub fn new<I, S>(codes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut matrix = Self::default();
        for code in codes {
            let code = code.into();
            if matrix.index.contains_key(&code) {
                return Err(PowerError::Validation(format!(
                    "country code {:?} appears twice in the matrix axis",
                    code
                )));
            }
            matrix.push_code(code);
        }
        Ok(matrix)
    }

    /// Build from explicit (destination, origin, level) rows, adding codes in
    /// first-seen order. A pair listed twice is malformed.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String, RequirementLevel)>,
    {
        let mut matrix = Self::default();
        for (destination, origin, level) in entries {
            let d = matrix.intern(destination);
            let o = matrix.intern(origin);
            if matrix.cells.insert((d, o), level).is_some() {
                return Err(PowerError::Data(format!(
                    "duplicate requirement for destination {} / origin {}",
                    matrix.codes[d], matrix.codes[o]
                )));
            }
        }
        Ok(matrix)
    }

    fn push_code(&mut self, code: String) -> usize {
        let i = self.codes.len();
        self.index.insert(code.clone(), i);
        self.codes.push(code);
        i
    }

    fn intern(&mut self, code: String) -> usize {
        match self.index.get(&code) {
            Some(&i) => i,
            None => self.push_code(code),
        }
    }

    fn position(&self, code: &str) -> Result<usize> {
        self.index.get(code).copied().ok_or_else(|| PowerError::Lookup {
            what: "matrix axis",
            codes: vec![code.to_string()],
        })
    }

    /// Record the requirement for holders of `origin` entering `destination`
    pub fn set(&mut self, destination: &str, origin: &str, level: RequirementLevel) -> Result<()> {
        let d = self.position(destination)?;
        let o = self.position(origin)?;
        self.cells.insert((d, o), level);
        Ok(())
    }

    /// Requirement for `origin` entering `destination`, with defaults applied.
    ///
    /// `None` when either code is not on the matrix axis.
    pub fn get(&self, destination: &str, origin: &str) -> Option<RequirementLevel> {
        let d = *self.index.get(destination)?;
        let o = *self.index.get(origin)?;
        Some(self.level_at(d, o))
    }

    fn level_at(&self, d: usize, o: usize) -> RequirementLevel {
        match self.cells.get(&(d, o)) {
            Some(level) => *level,
            None if d == o => RequirementLevel::SameCountry,
            None => RequirementLevel::VisaRequired,
        }
    }

    /// Axis codes in insertion order, placeholders included
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Number of axis codes that are not placeholders
    pub fn distinct_valid_countries(&self) -> usize {
        self.codes.iter().filter(|c| is_valid_code(c)).count()
    }

    /// Every cell as (destination, origin, level), destination-major
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, RequirementLevel)> + '_ {
        let n = self.codes.len();
        (0..n).flat_map(move |d| {
            (0..n).map(move |o| (self.codes[d].as_str(), self.codes[o].as_str(), self.level_at(d, o)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_and_tokens() {
        assert_eq!("Visa Free".parse::<RequirementLevel>().unwrap(), RequirementLevel::VisaFree);
        assert_eq!("visa on arrival".parse::<RequirementLevel>().unwrap(), RequirementLevel::VisaOnArrival);
        assert_eq!("COM_C_ETA".parse::<RequirementLevel>().unwrap(), RequirementLevel::ElectronicTravelAuthorization);
        assert_eq!(" Same Country ".parse::<RequirementLevel>().unwrap(), RequirementLevel::SameCountry);
        assert!(matches!("e-Visa".parse::<RequirementLevel>(), Err(PowerError::Data(_))));
    }

    #[test]
    fn test_label_roundtrip_for_every_level() {
        for level in RequirementLevel::ALL {
            assert_eq!(level.label().parse::<RequirementLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_defaults() {
        let mut m = RequirementMatrix::new(["AR", "AL", "AM"]).unwrap();
        m.set("AL", "AR", RequirementLevel::VisaFree).unwrap();

        assert_eq!(m.get("AL", "AR"), Some(RequirementLevel::VisaFree));
        assert_eq!(m.get("AM", "AR"), Some(RequirementLevel::VisaRequired));
        assert_eq!(m.get("AR", "AR"), Some(RequirementLevel::SameCountry));
        assert_eq!(m.get("AR", "ZZ"), None);
    }

    #[test]
    fn test_set_unknown_code_fails() {
        let mut m = RequirementMatrix::new(["AR"]).unwrap();
        let err = m.set("ZZ", "AR", RequirementLevel::VisaFree).unwrap_err();
        assert!(matches!(err, PowerError::Lookup { .. }));
    }

    #[test]
    fn test_duplicate_axis_code_rejected() {
        assert!(RequirementMatrix::new(["AR", "AR"]).is_err());
    }

    #[test]
    fn test_from_entries_rejects_duplicate_pair() {
        let rows = vec![
            ("AL".to_string(), "AR".to_string(), RequirementLevel::VisaFree),
            ("AL".to_string(), "AR".to_string(), RequirementLevel::VisaRequired),
        ];
        assert!(matches!(RequirementMatrix::from_entries(rows), Err(PowerError::Data(_))));
    }

    #[test]
    fn test_cells_cover_full_square() {
        let m = RequirementMatrix::new(["AR", "0", "AL"]).unwrap();
        assert_eq!(m.cells().count(), 9);
        assert_eq!(m.distinct_valid_countries(), 2);
    }
}
