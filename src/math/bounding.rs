//! Bounding sphere used for per-command culling volumes.

use glam::{DMat4, DVec3};

use super::{Ellipsoid, MapProjection};

/// A sphere enclosing a set of positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub const EMPTY: BoundingSphere = BoundingSphere {
        center: DVec3::ZERO,
        radius: 0.0,
    };

    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Sphere around the centroid of `points`. Deterministic for a given
    /// input ordering; not minimal, but tight enough for culling.
    pub fn from_points(points: &[DVec3]) -> Self {
        if points.is_empty() {
            return Self::EMPTY;
        }

        let mut center = DVec3::ZERO;
        for p in points {
            center += *p;
        }
        center /= points.len() as f64;

        let mut radius_sq = 0.0f64;
        for p in points {
            radius_sq = radius_sq.max(center.distance_squared(*p));
        }

        Self {
            center,
            radius: radius_sq.sqrt(),
        }
    }

    /// Smallest sphere containing both `self` and `other`.
    pub fn union(&self, other: &BoundingSphere) -> BoundingSphere {
        let to_other = other.center - self.center;
        let distance = to_other.length();

        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }

        let radius = (self.radius + distance + other.radius) * 0.5;
        let center = if distance > 0.0 {
            self.center + to_other * ((radius - self.radius) / distance)
        } else {
            self.center
        };

        BoundingSphere { center, radius }
    }

    /// Apply an affine transform. Radius is scaled by the largest axis scale
    /// so the result still encloses the transformed geometry.
    pub fn transform(&self, matrix: &DMat4) -> BoundingSphere {
        let center = matrix.transform_point3(self.center);
        let scale = matrix
            .x_axis
            .truncate()
            .length()
            .max(matrix.y_axis.truncate().length())
            .max(matrix.z_axis.truncate().length());

        BoundingSphere {
            center,
            radius: self.radius * scale,
        }
    }

    /// Derive the 2D/Columbus-view volume by projecting the center and
    /// keeping the radius. Returns `None` when the center cannot be
    /// expressed in cartographic coordinates (degenerate positions near the
    /// ellipsoid center).
    pub fn project_to_2d(
        &self,
        ellipsoid: &Ellipsoid,
        projection: &dyn MapProjection,
    ) -> Option<BoundingSphere> {
        let cartographic = ellipsoid.cartesian_to_cartographic(self.center)?;
        Some(BoundingSphere {
            center: projection.project(&cartographic),
            radius: self.radius,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::GeographicProjection;

    #[test]
    fn test_from_points_encloses_input() {
        let points = [
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ];
        let sphere = BoundingSphere::from_points(&points);

        for p in &points {
            assert!(sphere.center.distance(*p) <= sphere.radius + 1e-9);
        }
    }

    #[test]
    fn test_from_points_empty() {
        assert_eq!(BoundingSphere::from_points(&[]), BoundingSphere::EMPTY);
    }

    #[test]
    fn test_union_contains_both() {
        let a = BoundingSphere::new(DVec3::ZERO, 1.0);
        let b = BoundingSphere::new(DVec3::new(10.0, 0.0, 0.0), 2.0);
        let u = a.union(&b);

        assert!(u.center.distance(a.center) + a.radius <= u.radius + 1e-9);
        assert!(u.center.distance(b.center) + b.radius <= u.radius + 1e-9);
    }

    #[test]
    fn test_union_contained_sphere_is_identity() {
        let big = BoundingSphere::new(DVec3::ZERO, 10.0);
        let small = BoundingSphere::new(DVec3::new(1.0, 0.0, 0.0), 1.0);
        assert_eq!(big.union(&small), big);
        assert_eq!(small.union(&big), big);
    }

    #[test]
    fn test_transform_scales_radius() {
        let sphere = BoundingSphere::new(DVec3::new(1.0, 2.0, 3.0), 1.0);
        let matrix = DMat4::from_scale(DVec3::new(2.0, 1.0, 1.0));
        let out = sphere.transform(&matrix);

        assert_eq!(out.center, DVec3::new(2.0, 2.0, 3.0));
        assert!((out.radius - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_project_to_2d_keeps_radius() {
        let ellipsoid = Ellipsoid::WGS84;
        let projection = GeographicProjection::new(&ellipsoid);
        let surface = DVec3::new(ellipsoid.radii().x, 0.0, 0.0);
        let sphere = BoundingSphere::new(surface, 123.0);

        let projected = sphere
            .project_to_2d(&ellipsoid, &projection)
            .expect("surface point projects");
        assert_eq!(projected.radius, 123.0);
    }
}
