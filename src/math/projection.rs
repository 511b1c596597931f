//! Map projections for 2D and Columbus-view rendering.

use glam::DVec3;

use super::{Cartographic, Ellipsoid};

/// Maps cartographic coordinates onto the 2D/Columbus plane. Implementations
/// must be pure: combining runs on a worker thread and replays projections
/// deterministically.
pub trait MapProjection: Send + Sync {
    fn project(&self, cartographic: &Cartographic) -> DVec3;
}

/// Equirectangular (plate carrée) projection: meters along the equator per
/// radian of longitude/latitude, height passed through.
#[derive(Debug, Clone, Copy)]
pub struct GeographicProjection {
    semimajor_axis: f64,
}

impl GeographicProjection {
    pub fn new(ellipsoid: &Ellipsoid) -> Self {
        Self {
            semimajor_axis: ellipsoid.maximum_radius(),
        }
    }
}

impl Default for GeographicProjection {
    fn default() -> Self {
        Self::new(&Ellipsoid::WGS84)
    }
}

impl MapProjection for GeographicProjection {
    fn project(&self, cartographic: &Cartographic) -> DVec3 {
        DVec3::new(
            cartographic.longitude * self.semimajor_axis,
            cartographic.latitude * self.semimajor_axis,
            cartographic.height,
        )
    }
}
