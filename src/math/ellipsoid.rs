//! Reference ellipsoid and cartographic conversion.

use glam::DVec3;

/// Geodetic position: longitude/latitude in radians, height in meters above
/// the ellipsoid surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cartographic {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

/// Quadric surface of the form x²/a² + y²/b² + z²/c² = 1, centered at the
/// origin with axis-aligned radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    radii: DVec3,
    one_over_radii_squared: DVec3,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        radii: DVec3::new(6378137.0, 6378137.0, 6356752.3142451793),
        one_over_radii_squared: DVec3::new(
            1.0 / (6378137.0 * 6378137.0),
            1.0 / (6378137.0 * 6378137.0),
            1.0 / (6356752.3142451793 * 6356752.3142451793),
        ),
    };

    pub fn new(radii: DVec3) -> Self {
        Self {
            radii,
            one_over_radii_squared: DVec3::new(
                1.0 / (radii.x * radii.x),
                1.0 / (radii.y * radii.y),
                1.0 / (radii.z * radii.z),
            ),
        }
    }

    pub fn radii(&self) -> DVec3 {
        self.radii
    }

    pub fn maximum_radius(&self) -> f64 {
        self.radii.x.max(self.radii.y).max(self.radii.z)
    }

    /// Outward unit normal of the surface point closest to `position`.
    pub fn geodetic_surface_normal(&self, position: DVec3) -> DVec3 {
        (position * self.one_over_radii_squared).normalize()
    }

    /// Convert an earth-fixed cartesian position to cartographic
    /// coordinates. Returns `None` for positions too close to the center
    /// for a geodetic normal to be meaningful.
    pub fn cartesian_to_cartographic(&self, position: DVec3) -> Option<Cartographic> {
        let surface = self.scale_to_geodetic_surface(position)?;
        let normal = self.geodetic_surface_normal(surface);
        let height_vector = position - surface;

        let longitude = normal.y.atan2(normal.x);
        let latitude = normal.z.clamp(-1.0, 1.0).asin();
        let height = height_vector.dot(position).signum() * height_vector.length();

        Some(Cartographic {
            longitude,
            latitude,
            height,
        })
    }

    /// Project `position` onto the ellipsoid along the geodetic normal.
    ///
    /// Solves for lambda in q_i = p_i / (1 + lambda * d_i) with
    /// d_i = 1/r_i² via Newton iteration on
    /// f(lambda) = sum(p_i² d_i / (1 + lambda d_i)²) - 1.
    fn scale_to_geodetic_surface(&self, position: DVec3) -> Option<DVec3> {
        let d = self.one_over_radii_squared;
        let p2 = position * position;

        // Degenerate near the center: no unique surface point.
        let norm = p2.x * d.x + p2.y * d.y + p2.z * d.z;
        if norm < 1.0e-12 {
            return None;
        }

        let mut lambda = 0.0f64;
        for _ in 0..32 {
            let s = DVec3::new(
                1.0 + lambda * d.x,
                1.0 + lambda * d.y,
                1.0 + lambda * d.z,
            );
            let f = (p2.x * d.x) / (s.x * s.x) + (p2.y * d.y) / (s.y * s.y)
                + (p2.z * d.z) / (s.z * s.z)
                - 1.0;
            if f.abs() < 1.0e-12 {
                break;
            }
            let df = -2.0
                * ((p2.x * d.x * d.x) / (s.x * s.x * s.x)
                    + (p2.y * d.y * d.y) / (s.y * s.y * s.y)
                    + (p2.z * d.z * d.z) / (s.z * s.z * s.z));
            lambda -= f / df;
        }

        Some(DVec3::new(
            position.x / (1.0 + lambda * d.x),
            position.y / (1.0 + lambda * d.y),
            position.z / (1.0 + lambda * d.z),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_point_has_zero_height() {
        let ellipsoid = Ellipsoid::WGS84;
        let surface = DVec3::new(ellipsoid.radii().x, 0.0, 0.0);
        let carto = ellipsoid.cartesian_to_cartographic(surface).unwrap();

        assert!(carto.height.abs() < 1e-6);
        assert!(carto.longitude.abs() < 1e-12);
        assert!(carto.latitude.abs() < 1e-12);
    }

    #[test]
    fn test_elevated_point_height() {
        let ellipsoid = Ellipsoid::WGS84;
        let position = DVec3::new(ellipsoid.radii().x + 1000.0, 0.0, 0.0);
        let carto = ellipsoid.cartesian_to_cartographic(position).unwrap();

        assert!((carto.height - 1000.0).abs() < 1e-4);
    }

    #[test]
    fn test_pole_latitude() {
        let ellipsoid = Ellipsoid::WGS84;
        let pole = DVec3::new(0.0, 0.0, ellipsoid.radii().z);
        let carto = ellipsoid.cartesian_to_cartographic(pole).unwrap();

        assert!((carto.latitude - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_center_is_rejected() {
        let ellipsoid = Ellipsoid::WGS84;
        assert!(ellipsoid.cartesian_to_cartographic(DVec3::ZERO).is_none());
    }
}
