//! # minvar-rs - Minority Variant Co-infection Analysis Tool
//!
//! Detects low-frequency ("minority") variants in multi-sample variant call
//! files (VCF) and classifies samples carrying an anomalous number of them
//! as co-infection candidates.

pub mod filter;
pub mod report;
pub mod utils;
pub mod vcf;

use serde::{Deserialize, Serialize};

/// Configuration parameters for the minority-variant filter stage
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Minimum total read depth for a call to count toward candidacy
    pub min_allele_depth: u32,
    /// Minimum fraction of called (non-N) samples per position
    pub min_coverage: f64,
    /// Minimum frequency for the minority allele to be counted
    pub min_freq: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_allele_depth: 10,
            min_coverage: 0.8,
            min_freq: 0.2,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> MinvarResult<()> {
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(MinvarError::InvalidConfig(
                "min_coverage must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_freq) {
            return Err(MinvarError::InvalidConfig(
                "min_freq must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which samples enter the mean/stddev population of the outlier cutoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationPolicy {
    /// Only samples carrying at least one minority mutation
    ObservedOnly,
    /// Every sample seen in the retained position data, zero counts included
    IncludeZeroCounts,
}

/// Configuration parameters for the outlier-classification stage
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Standard-deviation multiplier for the statistical cutoff
    pub deviation_lowfreq: f64,
    /// Hard cutoff override; when set, the statistical cutoff is not computed
    pub min_lowfreq: Option<u32>,
    pub population: PopulationPolicy,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            deviation_lowfreq: 2.0,
            min_lowfreq: None,
            population: PopulationPolicy::ObservedOnly,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> MinvarResult<()> {
        if self.deviation_lowfreq < 0.0 {
            return Err(MinvarError::InvalidConfig(
                "deviation_lowfreq must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error types for the minvar library
#[derive(Debug, thiserror::Error)]
pub enum MinvarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid variant record: {0}")]
    InvalidRecord(String),

    #[error("Mandatory FORMAT field '{0}' is missing")]
    MissingFormatField(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type MinvarResult<T> = Result<T, MinvarError>;
