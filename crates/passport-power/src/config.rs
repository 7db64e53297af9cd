//! Pipeline configuration

use crate::{PowerError, Result, DEFAULT_MIN_COUNTRIES};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Which destinations a combination is scored over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationJoin {
    /// Every destination for which any member has a row
    #[default]
    Union,
    /// Only destinations the first member has a row for; later members fill
    /// in where they have a row
    LeadingOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Valid origins must number strictly more than this
    pub min_countries: usize,
    pub join: DestinationJoin,
    /// Compute single passport reach
    pub single: bool,
    /// Compute pairs
    pub dual: bool,
    /// Compute triads (the expensive one)
    pub triad: bool,
    /// Write the per-destination dual/triad row tables
    pub write_subset_tables: bool,
    /// Rayon worker threads; rayon's default when unset
    pub threads: Option<usize>,
    /// Ranked rows logged per report
    pub top: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_countries: DEFAULT_MIN_COUNTRIES,
            join: DestinationJoin::Union,
            single: true,
            dual: true,
            triad: true,
            write_subset_tables: true,
            threads: None,
            top: 10,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading pipeline config from {:?}", path);

        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.single || self.dual || self.triad) {
            return Err(PowerError::Configuration(
                "no arity selected: enable at least one of single, dual, triad".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(PowerError::Configuration("threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_countries, 180);
        assert_eq!(config.join, DestinationJoin::Union);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"join": "leading-origin", "triad": false}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.join, DestinationJoin::LeadingOrigin);
        assert!(!config.triad);
        assert!(config.dual);
        assert_eq!(config.min_countries, 180);
    }

    #[test]
    fn test_nothing_selected_is_rejected() {
        let config = PipelineConfig {
            single: false,
            dual: false,
            triad: false,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PowerError::Configuration(_))));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = PipelineConfig {
            threads: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
