//! Geometry math support: bounding volumes, the reference ellipsoid,
//! map projections, and the f64 -> (high, low) f32 precision split used for
//! relative-to-eye rendering.

mod bounding;
mod ellipsoid;
mod encoded;
mod projection;

pub use bounding::BoundingSphere;
pub use ellipsoid::{Cartographic, Ellipsoid};
pub use encoded::{split_f64, EncodedVec3};
pub use projection::{GeographicProjection, MapProjection};
