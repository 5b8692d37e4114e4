//! One- and two-dimensional binning of surface positions.
//!
//! A [`BinningData`] describes one axis (the quantity binned, open or closed,
//! equidistant or arbitrary boundaries). A [`BinUtility`] combines up to two
//! axes with an optional local frame and maps global positions to a flat bin
//! index, `i0 + n0 * i1`.

use itertools::Itertools;
use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{GeometryError, Result};


/// Quantity a binning axis is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningValue {
    Phi,
    Z,
    R,
    X,
    Y,
}

impl BinningValue {
    pub fn value(self, point: &Point3<f64>) -> f64 {
        match self {
            BinningValue::Phi => point.y.atan2(point.x),
            BinningValue::Z => point.z,
            BinningValue::R => point.coords.xy().norm(),
            BinningValue::X => point.x,
            BinningValue::Y => point.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningType {
    Equidistant,
    Arbitrary,
}

/// Closed axes wrap around (phi).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningOption {
    Open,
    Closed,
}

/// A single binning axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BinningData {
    pub value: BinningValue,
    pub option: BinningOption,
    pub kind: BinningType,
    boundaries: Vec<f64>,
}

impl BinningData {
    pub fn equidistant(
        value: BinningValue,
        option: BinningOption,
        bins: usize,
        min: f64,
        max: f64,
    ) -> Result<Self> {
        if bins == 0 {
            return Err(GeometryError::InvalidBinning {
                value,
                reason: "zero bins".to_string(),
            });
        }
        if max <= min || max.is_nan() || min.is_nan() {
            return Err(GeometryError::InvalidBinning {
                value,
                reason: format!("empty range [{min}, {max}]"),
            });
        }
        let step = (max - min) / bins as f64;
        let boundaries = (0..=bins).map(|i| min + step * i as f64).collect();
        Ok(Self {
            value,
            option,
            kind: BinningType::Equidistant,
            boundaries,
        })
    }

    pub fn arbitrary(value: BinningValue, option: BinningOption, boundaries: Vec<f64>) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(GeometryError::InvalidBinning {
                value,
                reason: format!("{} boundaries define no bin", boundaries.len()),
            });
        }
        if boundaries.iter().tuple_windows().any(|(a, b)| !(b > a)) {
            return Err(GeometryError::InvalidBinning {
                value,
                reason: "boundaries are not strictly increasing".to_string(),
            });
        }
        Ok(Self {
            value,
            option,
            kind: BinningType::Arbitrary,
            boundaries,
        })
    }

    pub fn bins(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn min(&self) -> f64 {
        self.boundaries[0]
    }

    pub fn max(&self) -> f64 {
        self.boundaries[self.bins()]
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn width(&self, bin: usize) -> f64 {
        self.boundaries[bin + 1] - self.boundaries[bin]
    }

    pub fn center(&self, bin: usize) -> f64 {
        0.5 * (self.boundaries[bin] + self.boundaries[bin + 1])
    }

    fn period(&self) -> f64 {
        self.max() - self.min()
    }

    /// Brings `x` into the axis range for closed axes.
    fn wrap(&self, x: f64) -> f64 {
        match self.option {
            BinningOption::Closed => self.min() + (x - self.min()).rem_euclid(self.period()),
            BinningOption::Open => x,
        }
    }

    /// Bin containing `x`, `None` outside an open axis.
    pub fn search(&self, x: f64) -> Option<usize> {
        let x = self.wrap(x);
        if x < self.min() || x > self.max() {
            return None;
        }
        let bin = match self.kind {
            BinningType::Equidistant => ((x - self.min()) / self.width(0)).floor() as usize,
            BinningType::Arbitrary => self.boundaries.partition_point(|&b| b <= x).saturating_sub(1),
        };
        Some(bin.min(self.bins() - 1))
    }

    /// Like [`search`](Self::search), but values outside map to the edge bins.
    pub fn clamped(&self, x: f64) -> usize {
        self.search(x).unwrap_or(if x < self.min() { 0 } else { self.bins() - 1 })
    }

    /// The bin and its direct neighbours, wrapping for closed axes.
    pub fn neighbors(&self, bin: usize) -> Vec<usize> {
        let n = self.bins() as isize;
        let bin = bin as isize;
        (bin - 1..=bin + 1)
            .filter_map(|i| match self.option {
                BinningOption::Closed => Some(i.rem_euclid(n)),
                BinningOption::Open => (0..n).contains(&i).then_some(i),
            })
            .map(|i| i as usize)
            .unique()
            .collect()
    }

    /// Distance of `x` from the centre of `bin`, in units of the bin width.
    pub fn distance(&self, x: f64, bin: usize) -> f64 {
        let mut d = (self.wrap(x) - self.center(bin)).abs();
        if self.option == BinningOption::Closed {
            d = d.min(self.period() - d);
        }
        d / self.width(bin)
    }
}

/// Up to two binning axes, optionally in a local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BinUtility {
    axes: Vec<BinningData>,
    transform: Option<Isometry3<f64>>,
}

impl BinUtility {
    pub fn new(axes: Vec<BinningData>, transform: Option<Isometry3<f64>>) -> Self {
        assert!(
            (1..=2).contains(&axes.len()),
            "bin utility needs one or two axes, got {}",
            axes.len()
        );
        Self { axes, transform }
    }

    pub fn axes(&self) -> &[BinningData] {
        &self.axes
    }

    pub fn bins(&self) -> usize {
        self.axes.iter().map(BinningData::bins).product()
    }

    fn local(&self, point: &Point3<f64>) -> Point3<f64> {
        match &self.transform {
            Some(t) => t.inverse_transform_point(point),
            None => *point,
        }
    }

    fn values(&self, point: &Point3<f64>) -> Vec<f64> {
        let local = self.local(point);
        self.axes.iter().map(|a| a.value.value(&local)).collect()
    }

    fn flatten(&self, local_bins: &[usize]) -> usize {
        match local_bins {
            [i0] => *i0,
            [i0, i1] => i0 + self.axes[0].bins() * i1,
            _ => unreachable!("bin utility has one or two axes"),
        }
    }

    fn unflatten(&self, bin: usize) -> Vec<usize> {
        let n0 = self.axes[0].bins();
        match self.axes.len() {
            1 => vec![bin],
            _ => vec![bin % n0, bin / n0],
        }
    }

    /// Global bin of `point`, `None` if outside any open axis.
    pub fn bin(&self, point: &Point3<f64>) -> Option<usize> {
        let local: Option<Vec<usize>> = self
            .values(point)
            .iter()
            .zip(&self.axes)
            .map(|(x, axis)| axis.search(*x))
            .collect();
        local.map(|l| self.flatten(&l))
    }

    pub fn bin_clamped(&self, point: &Point3<f64>) -> usize {
        let local: Vec<usize> = self
            .values(point)
            .iter()
            .zip(&self.axes)
            .map(|(x, axis)| axis.clamped(*x))
            .collect();
        self.flatten(&local)
    }

    /// Global bins in the neighbourhood of `point` (3 per axis at most).
    pub fn neighbors(&self, point: &Point3<f64>) -> Vec<usize> {
        let centre = self.unflatten(self.bin_clamped(point));
        let per_axis: Vec<Vec<usize>> = self
            .axes
            .iter()
            .zip(&centre)
            .map(|(axis, &b)| axis.neighbors(b))
            .collect();
        per_axis
            .into_iter()
            .multi_cartesian_product()
            .map(|local| self.flatten(&local))
            .collect()
    }

    /// Distance of `point` from the centre of a global bin, in bin widths.
    pub fn distance(&self, point: &Point3<f64>, bin: usize) -> f64 {
        self.values(point)
            .iter()
            .zip(self.unflatten(bin))
            .zip(&self.axes)
            .map(|((x, b), axis)| axis.distance(*x, b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Full phi range used by closed phi axes.
pub const PHI_RANGE: (f64, f64) = (-PI, PI);
