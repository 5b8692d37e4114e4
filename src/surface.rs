use nalgebra::{Isometry3, Point3, Vector3};
use std::f64::consts::PI;

use crate::identifier::GeometryId;
use crate::intersection::{IntersectOptions, Intersection};
use crate::material::SurfaceMaterial;


/// Shape of a surface, in its local frame.
///
/// Cylinders have their axis along local z, discs and rectangles lie in the
/// local xy plane with the normal along local z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceBounds {
    Cylinder { radius: f64, half_z: f64 },
    Disc { r_min: f64, r_max: f64 },
    Rectangle { half_x: f64, half_y: f64 },
}

impl SurfaceBounds {
    /// Whether a local point lies within the bounds, with slack `tol`.
    pub fn inside(&self, local: &Point3<f64>, tol: f64) -> bool {
        match *self {
            SurfaceBounds::Cylinder { half_z, .. } => local.z.abs() <= half_z + tol,
            SurfaceBounds::Disc { r_min, r_max } => {
                let r = local.coords.xy().norm();
                r >= r_min - tol && r <= r_max + tol
            }
            SurfaceBounds::Rectangle { half_x, half_y } => {
                local.x.abs() <= half_x + tol && local.y.abs() <= half_y + tol
            }
        }
    }
}

/// Represents a surface of the tracking geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    transform: Isometry3<f64>,          // placement of the local frame
    bounds: SurfaceBounds,              // shape in the local frame
    material: Option<SurfaceMaterial>,  // associated material
    sensitive: bool,                    // backed by a detector element
    geo_id: GeometryId,                 // set when the geometry is closed
}

impl Surface {
    pub fn new(transform: Isometry3<f64>, bounds: SurfaceBounds) -> Self {
        Self {
            transform,
            bounds,
            material: None,
            sensitive: false,
            geo_id: GeometryId::default(),
        }
    }

    pub fn cylinder(transform: Isometry3<f64>, radius: f64, half_z: f64) -> Self {
        Self::new(transform, SurfaceBounds::Cylinder { radius, half_z })
    }

    pub fn disc(transform: Isometry3<f64>, r_min: f64, r_max: f64) -> Self {
        Self::new(transform, SurfaceBounds::Disc { r_min, r_max })
    }

    pub fn rectangle(transform: Isometry3<f64>, half_x: f64, half_y: f64) -> Self {
        Self::new(transform, SurfaceBounds::Rectangle { half_x, half_y })
    }

    pub fn with_material(mut self, material: SurfaceMaterial) -> Self {
        self.material = Some(material);
        self
    }

    /// Marks the surface as a detector element.
    pub fn as_sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub(crate) fn with_geo_id(mut self, geo_id: GeometryId) -> Self {
        self.geo_id = geo_id;
        self
    }

    pub(crate) fn set_geo_id(&mut self, geo_id: GeometryId) {
        self.geo_id = geo_id;
    }

    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    pub fn bounds(&self) -> &SurfaceBounds {
        &self.bounds
    }

    pub fn material(&self) -> Option<&SurfaceMaterial> {
        self.material.as_ref()
    }

    pub fn geo_id(&self) -> GeometryId {
        self.geo_id
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn has_material(&self) -> bool {
        self.material.is_some()
    }

    /// Neither sensitive nor carrying material.
    pub fn is_passive(&self) -> bool {
        !self.sensitive && self.material.is_none()
    }

    /// Origin of the local frame in global coordinates.
    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.transform.translation.vector)
    }

    pub fn to_local(&self, position: &Point3<f64>) -> Point3<f64> {
        self.transform.inverse_transform_point(position)
    }

    /// Unit normal at a (global) position on the surface.
    /// Cylinders point radially outwards, planar surfaces along local z.
    pub fn normal(&self, position: &Point3<f64>) -> Vector3<f64> {
        match self.bounds {
            SurfaceBounds::Cylinder { .. } => {
                let local = self.to_local(position);
                let radial = Vector3::new(local.x, local.y, 0.0);
                let radial = if radial.norm() > 0.0 {
                    radial.normalize()
                } else {
                    Vector3::x()
                };
                self.transform * radial
            }
            SurfaceBounds::Disc { .. } | SurfaceBounds::Rectangle { .. } => {
                self.transform * Vector3::z()
            }
        }
    }

    /// Distance of a position from the (unbounded) surface.
    pub fn distance(&self, position: &Point3<f64>) -> f64 {
        let local = self.to_local(position);
        match self.bounds {
            SurfaceBounds::Cylinder { radius, .. } => (local.coords.xy().norm() - radius).abs(),
            SurfaceBounds::Disc { .. } | SurfaceBounds::Rectangle { .. } => local.z.abs(),
        }
    }

    /// Whether `position` lies on the surface within `tolerance`.
    pub fn is_on_surface(&self, position: &Point3<f64>, tolerance: f64, check_bounds: bool) -> bool {
        if self.distance(position) > tolerance {
            return false;
        }
        !check_bounds || self.bounds.inside(&self.to_local(position), tolerance)
    }

    /// Intersects the ray `position + s * direction` with the surface.
    ///
    /// The closest solution with `tolerance < s <= path_limit` (and inside the
    /// bounds, if requested) is returned; solutions at the start point are
    /// skipped so the surface the ray stands on is excluded.
    pub fn intersect(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        options: &IntersectOptions,
    ) -> Intersection {
        let local_pos = self.to_local(position);
        let local_dir = self.transform.inverse_transform_vector(direction);

        let solutions = match self.bounds {
            SurfaceBounds::Cylinder { radius, .. } => solve_cylinder(&local_pos, &local_dir, radius),
            SurfaceBounds::Disc { .. } | SurfaceBounds::Rectangle { .. } => {
                solve_plane(&local_pos, &local_dir)
            }
        };

        solutions
            .into_iter()
            .flatten()
            .filter(|&s| s > options.tolerance && s <= options.path_limit)
            .find(|&s| {
                !options.check_bounds
                    || self
                        .bounds
                        .inside(&(local_pos + s * local_dir), options.tolerance)
            })
            .map_or_else(Intersection::invalid, |s| {
                Intersection::new(position + s * direction, s, true)
            })
    }

    /// Points on the outline of the surface in global coordinates, used to
    /// compute the extent of a set of surfaces. Curved outlines are sampled
    /// with `segments` points per circle.
    pub fn vertices(&self, segments: usize) -> Vec<Point3<f64>> {
        let segments = segments.max(4);
        let circle = |r: f64, z: f64| {
            (0..segments).map(move |i| {
                let phi = -PI + 2.0 * PI * i as f64 / segments as f64;
                Point3::new(r * phi.cos(), r * phi.sin(), z)
            })
        };
        let local: Vec<Point3<f64>> = match self.bounds {
            SurfaceBounds::Cylinder { radius, half_z } => circle(radius, -half_z)
                .chain(circle(radius, half_z))
                .collect(),
            SurfaceBounds::Disc { r_min, r_max } => {
                circle(r_min, 0.0).chain(circle(r_max, 0.0)).collect()
            }
            SurfaceBounds::Rectangle { half_x, half_y } => vec![
                Point3::new(-half_x, -half_y, 0.0),
                Point3::new(half_x, -half_y, 0.0),
                Point3::new(half_x, half_y, 0.0),
                Point3::new(-half_x, half_y, 0.0),
                // edge midpoints
                Point3::new(0.0, -half_y, 0.0),
                Point3::new(half_x, 0.0, 0.0),
                Point3::new(0.0, half_y, 0.0),
                Point3::new(-half_x, 0.0, 0.0),
            ],
        };
        local.iter().map(|p| self.transform * p).collect()
    }
}

/// Path lengths at which the ray crosses the local plane z = 0.
fn solve_plane(pos: &Point3<f64>, dir: &Vector3<f64>) -> [Option<f64>; 2] {
    if dir.z.abs() < f64::EPSILON {
        return [None, None];
    }
    [Some(-pos.z / dir.z), None]
}

/// Path lengths at which the ray crosses a cylinder of radius `r` around local z, ascending.
fn solve_cylinder(pos: &Point3<f64>, dir: &Vector3<f64>, r: f64) -> [Option<f64>; 2] {
    let a = dir.x * dir.x + dir.y * dir.y;
    if a < f64::EPSILON {
        return [None, None];
    }
    let b = 2.0 * (pos.x * dir.x + pos.y * dir.y);
    let c = pos.x * pos.x + pos.y * pos.y - r * r;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return [None, None];
    }
    let sqrt = discriminant.sqrt();
    [Some((-b - sqrt) / (2.0 * a)), Some((-b + sqrt) / (2.0 * a))]
}
