//! Geometry scan: many straight tracks from the origin through one geometry.
//!
//! **Context**: The quickest check of a detector description is to fire a
//! large number of tracks through it and look at what they hit and how much
//! material they cross as a function of direction.
//!
//! **How it Works**: Directions are drawn up front from a single seeded
//! generator, uniform in phi and in pseudorapidity. The tracks are then
//! propagated in parallel with rayon, each with its own navigation state over
//! the shared geometry, so the result does not depend on the thread count.

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::propagator::{PropagationOutcome, PropagationResult, Propagator, PropagatorOptions, SurfaceKind};

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn eta_zero_is_transverse() {
        let dir = direction(0.0, 0.5 * PI);
        assert_relative_eq!(dir, Vector3::y(), epsilon = 1e-12);
        let forward = direction(3.0, 0.0);
        assert!(forward.z > 0.9 && forward.x > 0.0);
        assert_relative_eq!(direction(-1.3, 2.0).norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn seeded_directions_repeat() {
        let config = ScanConfig {
            num_tracks: 50,
            seed: Some(7),
            ..ScanConfig::default()
        };
        let a = sample_directions(&config);
        let b = sample_directions(&config);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a
            .iter()
            .all(|&(eta, phi)| (config.eta_min..=config.eta_max).contains(&eta) && (-PI..PI).contains(&phi)));
    }

    #[test]
    fn empty_eta_range_is_rejected() {
        let reversed = ScanConfig {
            eta_min: 1.0,
            eta_max: -1.0,
            ..ScanConfig::default()
        };
        assert!(reversed.check().is_err());
        let nan = ScanConfig {
            eta_max: f64::NAN,
            ..ScanConfig::default()
        };
        assert!(nan.check().is_err());
        let single = ScanConfig {
            eta_min: 0.5,
            eta_max: 0.5,
            ..ScanConfig::default()
        };
        assert!(single.check().is_ok());
        assert!(ScanConfig::default().check().is_ok());
    }

    #[test]
    fn summary_of_nothing() {
        let summary = ScanSummary::from_records(&[]);
        assert_eq!(summary.tracks, 0);
        assert_eq!(summary.mean_hits, 0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default = "default_num_tracks")]
    pub num_tracks: usize,
    #[serde(default = "default_eta_min")]
    pub eta_min: f64,
    #[serde(default = "default_eta_max")]
    pub eta_max: f64,
    /// Seed of the direction generator; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Show a progress bar.
    #[serde(default)]
    pub progress: bool,
}

fn default_num_tracks() -> usize {
    1000
}

fn default_eta_min() -> f64 {
    -1.0
}

fn default_eta_max() -> f64 {
    1.0
}

impl ScanConfig {
    /// Rejects an empty or non-finite eta range.
    pub fn check(&self) -> Result<()> {
        if !(self.eta_min.is_finite() && self.eta_max.is_finite()) {
            bail!("eta range must be finite: [{}, {}]", self.eta_min, self.eta_max);
        }
        if self.eta_min > self.eta_max {
            bail!("eta range is empty: [{}, {}]", self.eta_min, self.eta_max);
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            num_tracks: default_num_tracks(),
            eta_min: default_eta_min(),
            eta_max: default_eta_max(),
            seed: None,
            progress: false,
        }
    }
}

/// Unit direction at pseudorapidity `eta` and azimuth `phi`.
pub fn direction(eta: f64, phi: f64) -> Vector3<f64> {
    let theta = 2.0 * (-eta).exp().atan();
    Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
}

/// `(eta, phi)` of every track, in track order.
///
/// # Panics
///
/// If the eta range of `config` fails [`ScanConfig::check`].
pub fn sample_directions(config: &ScanConfig) -> Vec<(f64, f64)> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    (0..config.num_tracks)
        .map(|_| {
            let eta = rng.random_range(config.eta_min..=config.eta_max);
            let phi = rng.random_range(-PI..PI);
            (eta, phi)
        })
        .collect()
}

/// One scanned track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub index: usize,
    pub eta: f64,
    pub phi: f64,
    pub direction: Vector3<f64>,
    pub result: PropagationResult,
}

/// Propagates the tracks of a [`ScanConfig`] from the origin.
#[derive(Debug, Clone)]
pub struct GeometryScan<'g> {
    propagator: Propagator<'g>,
    options: PropagatorOptions,
    config: ScanConfig,
}

impl<'g> GeometryScan<'g> {
    pub fn new(propagator: Propagator<'g>, options: PropagatorOptions, config: ScanConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            propagator,
            options,
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn track(&self, index: usize, eta: f64, phi: f64) -> TrackRecord {
        let direction = direction(eta, phi);
        let result = self
            .propagator
            .propagate(Point3::origin(), direction, &self.options, None);
        TrackRecord {
            index,
            eta,
            phi,
            direction,
            result,
        }
    }

    /// Runs all tracks in parallel.
    pub fn run(&self) -> Vec<TrackRecord> {
        let directions = sample_directions(&self.config);
        info!("scanning {} tracks, eta in [{}, {}]", directions.len(), self.config.eta_min, self.config.eta_max);

        let pb = if self.config.progress {
            ProgressBar::new(directions.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▇▆▅▄▃▂▁"),
        );
        pb.set_message("tracks".to_string());

        let records: Vec<TrackRecord> = directions
            .par_iter()
            .enumerate()
            .map(|(index, &(eta, phi))| {
                let record = self.track(index, eta, phi);
                pb.inc(1);
                record
            })
            .collect();

        pb.finish_with_message("done");
        records
    }

    /// Runs all tracks on the calling thread.
    pub fn run_sequential(&self) -> Vec<TrackRecord> {
        sample_directions(&self.config)
            .into_iter()
            .enumerate()
            .map(|(index, (eta, phi))| self.track(index, eta, phi))
            .collect()
    }
}

/// Aggregate numbers of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub tracks: usize,
    pub mean_hits: f64,
    pub mean_sensitive_hits: f64,
    pub mean_x0: f64,
    pub max_x0: f64,
    pub geometry_exhausted: usize,
    pub target_reached: usize,
    pub max_steps_reached: usize,
}

impl ScanSummary {
    pub fn from_records(records: &[TrackRecord]) -> Self {
        let mut summary = ScanSummary {
            tracks: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return summary;
        }
        let n = records.len() as f64;
        for record in records {
            let result = &record.result;
            summary.mean_hits += result.hits.len() as f64 / n;
            summary.mean_sensitive_hits += result
                .hits
                .iter()
                .filter(|h| h.kind == SurfaceKind::Sensitive)
                .count() as f64
                / n;
            summary.mean_x0 += result.material_in_x0 / n;
            summary.max_x0 = summary.max_x0.max(result.material_in_x0);
            match result.outcome {
                PropagationOutcome::GeometryExhausted => summary.geometry_exhausted += 1,
                PropagationOutcome::TargetReached => summary.target_reached += 1,
                PropagationOutcome::MaxStepsReached => summary.max_steps_reached += 1,
            }
        }
        summary
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scan:
  - Tracks: {}
  - Mean Hits: {:.3}
  - Mean Sensitive Hits: {:.3}
  - Mean Material (X0): {:.6}
  - Max Material (X0): {:.6}
  - Left Geometry: {}
  - Reached Target: {}
  - Hit Step Limit: {}
  ",
            self.tracks,
            self.mean_hits,
            self.mean_sensitive_hits,
            self.mean_x0,
            self.max_x0,
            self.geometry_exhausted,
            self.target_reached,
            self.max_steps_reached,
        )
    }
}
