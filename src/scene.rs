//! Per-frame interface types: scene mode, frame state, appearance, material.
//!
//! These are the caller-facing collaborator descriptions; the crate consumes
//! them but does not implement camera or material systems.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::math::{Ellipsoid, GeographicProjection, MapProjection};

/// Projection mode the scene is currently rendering in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneMode {
    Scene3d,
    Scene2d,
    ColumbusView,
    /// Transitioning between 2D/Columbus and 3D. Neither bounding volume is
    /// valid on its own; their union is used.
    Morphing,
}

/// Which passes the scene requests this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassState {
    pub render: bool,
    pub pick: bool,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            render: true,
            pick: false,
        }
    }
}

/// Per-frame scene state handed to `Primitive::update`.
#[derive(Clone)]
pub struct FrameState {
    pub mode: SceneMode,
    pub projection: Arc<dyn MapProjection>,
    pub ellipsoid: Ellipsoid,
    pub passes: PassState,
    pub frame_number: u64,
}

impl FrameState {
    pub fn new(mode: SceneMode) -> Self {
        Self {
            mode,
            projection: Arc::new(GeographicProjection::default()),
            ellipsoid: Ellipsoid::WGS84,
            passes: PassState::default(),
            frame_number: 0,
        }
    }
}

/// Fixed-function state carried onto draw commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub depth_test: bool,
    pub blending: bool,
    pub cull_back_faces: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            blending: false,
            cull_back_faces: true,
        }
    }
}

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_APPEARANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Uniform-value map with an identity. Replacing a primitive's material (a
/// new identity) triggers a shader/uniform rebuild; mutating uniform values
/// in place does not.
#[derive(Debug, Clone)]
pub struct Material {
    id: u64,
    pub uniforms: BTreeMap<String, [f32; 4]>,
}

impl Material {
    pub fn new(uniforms: BTreeMap<String, [f32; 4]>) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            uniforms,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Visual appearance shared by every instance of a primitive: render state,
/// shader sources, the vertex attributes the shader consumes, and an
/// optional material.
#[derive(Debug, Clone)]
pub struct Appearance {
    id: u64,
    pub render_state: RenderState,
    pub vertex_shader_source: String,
    pub fragment_shader_source: String,
    /// Vertex attribute names the color shader reads. Validated against the
    /// combined layout at program build time.
    pub vertex_attributes: Vec<String>,
    pub material: Option<Material>,
}

impl Appearance {
    pub fn new(
        render_state: RenderState,
        vertex_shader_source: impl Into<String>,
        fragment_shader_source: impl Into<String>,
        vertex_attributes: Vec<String>,
    ) -> Self {
        Self {
            id: NEXT_APPEARANCE_ID.fetch_add(1, Ordering::Relaxed),
            render_state,
            vertex_shader_source: vertex_shader_source.into(),
            fragment_shader_source: fragment_shader_source.into(),
            vertex_attributes,
            material: None,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn material_id(&self) -> Option<u64> {
        self.material.as_ref().map(Material::id)
    }
}
