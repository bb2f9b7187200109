//! Headless scene backend.
//!
//! Exercises the full pipeline without an HMD: textures are counted,
//! the composed scene is logged, and the viewer pose is fixed looking
//! down −Z. A real renderer replaces this behind the same trait.

use glam::{Quat, Vec3};
use tracing::{debug, info};
use vmir_core::{RenderBackend, SceneQuad, TextureId, ViewerPose};

/// Counting, logging `RenderBackend` with a fixed forward pose.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_texture: u64,
    live_textures: u64,
    uploads: u64,
    rebuilds: u64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn live_textures(&self) -> u64 {
        self.live_textures
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId {
        self.next_texture += 1;
        self.live_textures += 1;
        debug!(id = self.next_texture, width, height, "texture created");
        TextureId(self.next_texture)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.live_textures = self.live_textures.saturating_sub(1);
        debug!(id = id.0, "texture destroyed");
    }

    fn upload_frame(&mut self, id: TextureId, width: u32, height: u32, _rgba: &[u8]) {
        self.uploads += 1;
        debug!(id = id.0, width, height, "frame uploaded");
    }

    fn set_scene(&mut self, quads: &[SceneQuad]) {
        self.rebuilds += 1;
        info!(quads = quads.len(), rebuild = self.rebuilds, "scene rebuilt");
    }

    fn viewer_pose(&self) -> ViewerPose {
        ViewerPose {
            position: Vec3::ZERO,
            look: Vec3::NEG_Z,
            rotation: Quat::IDENTITY,
        }
    }
}
