use crate::io::record::{round_half_even, MeasurementRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default band for [`preprocess`]: ±20 % around the mean.
pub const DEFAULT_OUTLIER_PCT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("cannot compute statistics of an empty PPI sequence")]
    EmptyInput,
    #[error("at least two PPI values are required")]
    InsufficientData,
}

/// Time-domain summary of a PPI sequence (ms, bpm).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HrvSummary {
    pub n: usize,
    pub mean_ppi: f64,
    pub mean_hr: f64,
    pub rmssd: f64,
    pub sdnn: f64,
}

/// Successive differences `ppi[i + 1] - ppi[i]`.
pub fn diff(ppi: &[i32]) -> Result<Vec<i32>, AnalysisError> {
    if ppi.len() < 2 {
        return Err(AnalysisError::InsufficientData);
    }
    Ok(ppi.windows(2).map(|w| w[1] - w[0]).collect())
}

pub fn mean_ppi(ppi: &[i32]) -> Result<f64, AnalysisError> {
    if ppi.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }
    Ok(ppi.iter().map(|&x| x as f64).sum::<f64>() / ppi.len() as f64)
}

pub fn mean_hr(ppi: &[i32]) -> Result<f64, AnalysisError> {
    Ok(60_000.0 / mean_ppi(ppi)?)
}

pub fn rmssd(ppi: &[i32]) -> Result<f64, AnalysisError> {
    let diffs = diff(ppi)?;
    let sum: f64 = diffs.iter().map(|&d| (d as f64).powi(2)).sum();
    Ok((sum / (ppi.len() as f64 - 1.0)).sqrt())
}

pub fn sdnn(ppi: &[i32]) -> Result<f64, AnalysisError> {
    if ppi.len() < 2 {
        return Err(AnalysisError::InsufficientData);
    }
    let mean = mean_ppi(ppi)?;
    let sum: f64 = ppi.iter().map(|&x| (x as f64 - mean).powi(2)).sum();
    Ok((sum / (ppi.len() as f64 - 1.0)).sqrt())
}

/// Drops values outside `(mean * (1 - pct), mean * (1 + pct))` in one pass.
pub fn preprocess(ppi: &[i32], pct: f64) -> Result<Vec<i32>, AnalysisError> {
    let mean = mean_ppi(ppi)?;
    let low = mean * (1.0 - pct);
    let high = mean * (1.0 + pct);
    Ok(ppi
        .iter()
        .copied()
        .filter(|&x| low < x as f64 && (x as f64) < high)
        .collect())
}

pub fn summarize(ppi: &[i32]) -> Result<HrvSummary, AnalysisError> {
    Ok(HrvSummary {
        n: ppi.len(),
        mean_ppi: mean_ppi(ppi)?,
        mean_hr: mean_hr(ppi)?,
        rmssd: rmssd(ppi)?,
        sdnn: sdnn(ppi)?,
    })
}

/// Outlier filter followed by the rounded local statistics, stamped with
/// `stamp` as both `id` and `timestamp`.
pub fn full_analysis(ppi: &[i32], stamp: i64) -> Result<MeasurementRecord, AnalysisError> {
    let filtered = preprocess(ppi, DEFAULT_OUTLIER_PCT)?;
    let summary = summarize(&filtered)?;
    Ok(MeasurementRecord {
        id: stamp,
        timestamp: stamp,
        mean_hr: round_half_even(summary.mean_hr),
        mean_ppi: round_half_even(summary.mean_ppi),
        rmssd: round_half_even(summary.rmssd),
        sdnn: round_half_even(summary.sdnn),
        sns: None,
        pns: None,
        phys_age: None,
    })
}
