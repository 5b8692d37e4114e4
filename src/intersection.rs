use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::identifier::GeometryId;
use crate::surface::Surface;

#[cfg(test)]
mod tests {

    use super::*;
    use nalgebra::Isometry3;

    fn plane_at(z: f64) -> Surface {
        Surface::rectangle(Isometry3::translation(0.0, 0.0, z), 10.0, 10.0)
    }

    #[test]
    fn candidates_sorted_by_path_then_id() {
        let near = plane_at(1.0).with_geo_id(GeometryId::new(1).with_sensitive(2));
        let tied_low = plane_at(5.0).with_geo_id(GeometryId::new(1).with_sensitive(1));
        let tied_high = plane_at(5.0).with_geo_id(GeometryId::new(1).with_sensitive(3));

        fn at(s: &Surface, path: f64) -> Candidate<'_, Surface> {
            Candidate::new(
                s,
                s,
                Intersection::new(Point3::new(0.0, 0.0, path), path, true),
            )
        }
        let list = Candidates::new(vec![
            at(&tied_high, 5.0),
            at(&near, 1.0),
            at(&tied_low, 5.0),
        ]);

        let order: Vec<u32> = list.iter().map(|c| c.object.geo_id().sensitive).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn iterator_advances_to_end() {
        let surface = plane_at(2.0);
        let mut list = Candidates::new(vec![Candidate::new(
            &surface,
            &surface,
            Intersection::new(Point3::origin(), 2.0, true),
        )]);
        assert!(list.is_pending());
        list.advance();
        assert!(!list.is_pending());
        assert!(list.current().is_none());
        list.advance();
        assert_eq!(list.index(), 1);
    }

    #[test]
    fn backward_direction_flips() {
        let dir = Vector3::new(0.0, 0.0, 1.0);
        assert_eq!(NavigationDirection::Backward.apply(&dir), -dir);
        assert_eq!(NavigationDirection::Forward.sign(), 1.0);
    }
}

/// Sense in which path length is measured along the trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationDirection {
    #[default]
    Forward,
    Backward,
}

impl NavigationDirection {
    pub fn sign(self) -> f64 {
        match self {
            NavigationDirection::Forward => 1.0,
            NavigationDirection::Backward => -1.0,
        }
    }

    /// The direction of motion for a momentum direction `dir`.
    pub fn apply(self, dir: &Vector3<f64>) -> Vector3<f64> {
        dir * self.sign()
    }
}

/// Result of intersecting a ray with a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Intersection {
    pub position: Point3<f64>,
    pub path_length: f64,
    pub valid: bool,
}

impl Intersection {
    pub fn new(position: Point3<f64>, path_length: f64, valid: bool) -> Self {
        Self {
            position,
            path_length,
            valid,
        }
    }

    pub fn invalid() -> Self {
        Self {
            position: Point3::origin(),
            path_length: f64::INFINITY,
            valid: false,
        }
    }
}

/// Options for a single intersection estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectOptions {
    /// Reject solutions outside the surface bounds.
    pub check_bounds: bool,
    /// Minimum accepted path length and slack on the bounds check.
    /// Solutions closer than this are the surface we are standing on.
    pub tolerance: f64,
    /// Maximum accepted path length.
    pub path_limit: f64,
}

impl IntersectOptions {
    pub fn new(tolerance: f64) -> Self {
        Self {
            check_bounds: true,
            tolerance,
            path_limit: f64::INFINITY,
        }
    }

    pub fn without_bounds(self) -> Self {
        Self {
            check_bounds: false,
            ..self
        }
    }
}

/// Objects that can be ordered deterministically among equidistant candidates.
pub trait Identified {
    fn geo_id(&self) -> GeometryId;
}

impl Identified for Surface {
    fn geo_id(&self) -> GeometryId {
        Surface::geo_id(self)
    }
}

/// A navigation candidate: an object of the geometry, the surface that
/// represents it for intersection, and the intersection at resolution time.
#[derive(Debug)]
pub struct Candidate<'g, T> {
    pub object: &'g T,
    pub surface: &'g Surface,
    pub intersection: Intersection,
}

impl<T> Clone for Candidate<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Candidate<'_, T> {}

impl<'g, T> Candidate<'g, T> {
    pub fn new(object: &'g T, surface: &'g Surface, intersection: Intersection) -> Self {
        Self {
            object,
            surface,
            intersection,
        }
    }

    pub fn path_length(&self) -> f64 {
        self.intersection.path_length
    }
}

impl<T: Identified> Candidate<'_, T> {
    /// Increasing path length, exact ties broken by identifier.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.intersection
            .path_length
            .total_cmp(&other.intersection.path_length)
            .then_with(|| self.object.geo_id().cmp(&other.object.geo_id()))
            .then_with(|| self.surface.geo_id().cmp(&other.surface.geo_id()))
    }
}

/// A sorted candidate sequence with a cursor on the next unconsumed entry.
#[derive(Debug)]
pub struct Candidates<'g, T> {
    candidates: Vec<Candidate<'g, T>>,
    next: usize,
}

impl<T> Default for Candidates<'_, T> {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            next: 0,
        }
    }
}

impl<'g, T: Identified> Candidates<'g, T> {
    pub fn new(mut candidates: Vec<Candidate<'g, T>>) -> Self {
        candidates.sort_by(|a, b| a.compare(b));
        Self {
            candidates,
            next: 0,
        }
    }

    /// Replaces the content and rewinds the cursor.
    pub fn replace(&mut self, candidates: Vec<Candidate<'g, T>>) {
        *self = Self::new(candidates);
    }
}

impl<'g, T> Candidates<'g, T> {
    pub fn current(&self) -> Option<&Candidate<'g, T>> {
        self.candidates.get(self.next)
    }

    pub fn current_mut(&mut self) -> Option<&mut Candidate<'g, T>> {
        self.candidates.get_mut(self.next)
    }

    pub fn advance(&mut self) {
        if self.next < self.candidates.len() {
            self.next += 1;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.next < self.candidates.len()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.next = 0;
    }

    /// Position of the cursor; equals `len()` once exhausted.
    pub fn index(&self) -> usize {
        self.next
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate<'g, T>> {
        self.candidates.iter()
    }

    pub fn remaining(&self) -> &[Candidate<'g, T>] {
        &self.candidates[self.next..]
    }
}
