//! Per-feature standardization fitted once on the training subset.
//!
//! Parameters are frozen at training time and reused verbatim when scoring,
//! so scores never depend on the batch being scored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    /// Population mean and standard deviation per column.
    /// A constant column gets a scale of 1.0.
    pub fn fit(samples: &[Vec<f64>], dims: usize) -> Self {
        let n = samples.len() as f64;
        let mut mean = vec![0.0; dims];
        let mut scale = vec![1.0; dims];
        if samples.is_empty() {
            return Self { mean, scale };
        }

        for j in 0..dims {
            let m = samples.iter().map(|s| s[j]).sum::<f64>() / n;
            let var = samples.iter().map(|s| (s[j] - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean[j] = m;
            scale[j] = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }
        Self { mean, scale }
    }

    pub fn dims(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    /// Internal consistency of restored parameters.
    pub fn is_consistent(&self) -> bool {
        self.mean.len() == self.scale.len()
            && self.mean.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let samples = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = Standardizer::fit(&samples, 2);
        assert_eq!(s.mean(), &[2.0, 5.0]);
        // population std of [1, 3] is 1; constant column falls back to 1
        assert_eq!(s.scale(), &[1.0, 1.0]);
        assert_eq!(s.transform(&[3.0, 7.0]), vec![1.0, 2.0]);
        assert!(s.is_consistent());
    }

    #[test]
    fn test_parameters_frozen_after_fit() {
        let s = Standardizer::fit(&[vec![0.0], vec![4.0]], 1);
        let before = s.transform(&[100.0]);
        let _ = s.transform(&[-50.0]);
        assert_eq!(s.transform(&[100.0]), before);
    }
}
