//! Draw commands: per-frame descriptions of GPU work, consumed by the scene.
//!
//! A primitive emits one command per merged geometry per requested pass.
//! Commands reference shared resources (`Arc`); emitting them every frame is
//! cheap and carries no GPU calls of its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::DMat4;

use crate::gpu::{ShaderProgram, VertexArray};
use crate::math::BoundingSphere;
use crate::scene::RenderState;

/// Render pass a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Visible color output.
    Color,
    /// Offscreen pick-id output.
    Pick,
}

/// One draw: a vertex array, a program, transform, culling volume, uniform
/// values, and fixed-function state.
#[derive(Clone)]
pub struct DrawCommand {
    pub pass: Pass,
    pub vertex_array: Arc<VertexArray>,
    pub program: Arc<dyn ShaderProgram>,
    pub model_matrix: DMat4,
    /// Culling volume in world coordinates; `model_matrix` is already
    /// applied to it.
    pub bounding_volume: BoundingSphere,
    pub render_state: RenderState,
    /// Material uniform values, empty without a material.
    pub uniforms: BTreeMap<String, [f32; 4]>,
    pub index_count: u32,
}
