//! Requirement level → admissibility score
//!
//! | Level                           | Score |
//! |---------------------------------|-------|
//! | Same Country                    | 1     |
//! | Visa Free                       | 1     |
//! | Visa on Arrival                 | 1     |
//! | Electronic Travel Authorization | 1     |
//! | Visa Required                   | 0     |

use crate::{RequirementLevel, Result};

/// 0 or 1
pub type Admissibility = u8;

pub const ADMISSIBLE: Admissibility = 1;
pub const INADMISSIBLE: Admissibility = 0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReachEncoder;

impl ReachEncoder {
    pub const fn encode(level: RequirementLevel) -> Admissibility {
        match level {
            RequirementLevel::SameCountry
            | RequirementLevel::VisaFree
            | RequirementLevel::VisaOnArrival
            | RequirementLevel::ElectronicTravelAuthorization => ADMISSIBLE,
            RequirementLevel::VisaRequired => INADMISSIBLE,
        }
    }

    /// Encode a raw `Visa Requirements` cell; unknown labels are an error
    pub fn encode_label(label: &str) -> Result<Admissibility> {
        Ok(Self::encode(label.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PowerError;

    #[test]
    fn test_every_level_is_mapped() {
        for level in RequirementLevel::ALL {
            let expected = if level == RequirementLevel::VisaRequired { 0 } else { 1 };
            assert_eq!(ReachEncoder::encode(level), expected, "{}", level);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        for level in RequirementLevel::ALL {
            assert_eq!(ReachEncoder::encode(level), ReachEncoder::encode(level));
        }
    }

    #[test]
    fn test_unknown_label_is_error() {
        assert_eq!(ReachEncoder::encode_label("Visa on Arrival").unwrap(), 1);
        assert!(matches!(
            ReachEncoder::encode_label("MC_EVISA"),
            Err(PowerError::Data(_))
        ));
    }
}
