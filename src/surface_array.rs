use itertools::Itertools;
use nalgebra::Point3;

use crate::binning::BinUtility;
use crate::surface::Surface;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::binning::{BinningData, BinningOption, BinningValue};
    use nalgebra::Isometry3;

    fn strip(xs: &[f64]) -> Vec<Surface> {
        xs.iter()
            .map(|&x| Surface::rectangle(Isometry3::translation(x, 0.0, 0.0), 0.5, 0.5).as_sensitive())
            .collect()
    }

    fn x_binning(bins: usize, min: f64, max: f64) -> BinUtility {
        BinUtility::new(
            vec![BinningData::equidistant(BinningValue::X, BinningOption::Open, bins, min, max).unwrap()],
            None,
        )
    }

    #[test]
    fn surfaces_filled_by_centre() {
        let array = SurfaceArray::new(strip(&[-1.5, -0.5, 0.5, 1.5]), x_binning(4, -2.0, 2.0));
        let found = array.surfaces_at(&Point3::new(0.6, 0.0, 0.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].center().x, 0.5);
        assert!(array.unreachable().is_empty());
    }

    #[test]
    fn empty_bins_completed_with_closest() {
        let array = SurfaceArray::new(strip(&[-1.5, 1.5]), x_binning(4, -2.0, 2.0));
        let found = array.surfaces_at(&Point3::new(-0.4, 0.0, 0.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].center().x, -1.5);
    }

    #[test]
    fn neighbourhood_is_deduplicated() {
        let array = SurfaceArray::new(strip(&[-1.5, -0.5, 0.5, 1.5]), x_binning(4, -2.0, 2.0));
        let found = array.neighbors(&Point3::new(-1.9, 0.0, 0.0));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn surfaces_outside_range_are_unreachable() {
        let array = SurfaceArray::new(strip(&[-1.5, 5.0]), x_binning(2, -2.0, 2.0));
        assert_eq!(array.unreachable(), vec![1]);
    }
}

/// Sensitive surfaces of a layer with a bin lookup.
///
/// Each bin holds the indices of the surfaces whose centre falls in it;
/// bins without any are completed with the surface closest to the bin centre
/// so that every in-range position resolves to at least one surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceArray {
    surfaces: Vec<Surface>,
    binning: BinUtility,
    grid: Vec<Vec<usize>>,
}

impl SurfaceArray {
    pub fn new(surfaces: Vec<Surface>, binning: BinUtility) -> Self {
        let mut grid = vec![Vec::new(); binning.bins()];
        for (index, surface) in surfaces.iter().enumerate() {
            if let Some(bin) = binning.bin(&surface.center()) {
                grid[bin].push(index);
            }
        }

        for (bin, entries) in grid.iter_mut().enumerate() {
            if !entries.is_empty() {
                continue;
            }
            let closest = surfaces
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    binning
                        .distance(&a.center(), bin)
                        .total_cmp(&binning.distance(&b.center(), bin))
                })
                .map(|(index, _)| index);
            entries.extend(closest);
        }

        Self {
            surfaces,
            binning,
            grid,
        }
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub(crate) fn surfaces_mut(&mut self) -> &mut [Surface] {
        &mut self.surfaces
    }

    pub fn binning(&self) -> &BinUtility {
        &self.binning
    }

    /// Surfaces in the bin of `point` (edge bin if outside).
    pub fn surfaces_at(&self, point: &Point3<f64>) -> Vec<&Surface> {
        self.grid[self.binning.bin_clamped(point)]
            .iter()
            .map(|&i| &self.surfaces[i])
            .collect()
    }

    /// Surfaces of the bin of `point` and the surrounding bins, each once.
    pub fn neighbors(&self, point: &Point3<f64>) -> Vec<&Surface> {
        self.binning
            .neighbors(point)
            .into_iter()
            .flat_map(|bin| self.grid[bin].iter().copied())
            .unique()
            .map(|i| &self.surfaces[i])
            .collect()
    }

    /// Indices of surfaces that no bin refers to.
    pub fn unreachable(&self) -> Vec<usize> {
        let mut seen = vec![false; self.surfaces.len()];
        for &i in self.grid.iter().flatten() {
            seen[i] = true;
        }
        seen.iter()
            .enumerate()
            .filter(|(_, &s)| !s)
            .map(|(i, _)| i)
            .collect()
    }
}
