//! Scene composition on the graphics-owning thread.
//!
//! [`SceneRenderer`] is the only code that touches backend textures.
//! It executes the drained [`FrameBatch`]: uploads first (recreating a
//! mirror's texture whenever its captured dimensions changed), then a
//! single rebuild that recomputes every quad's world-space corners and
//! auto-places mirrors that have never been positioned.

use std::sync::Arc;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::bridge::SceneMailbox;
use crate::mirror::{Mirror, QuadCorners, TextureId, TextureSlot, lock};
use crate::picker::FocusPicker;

/// Mirrors hang this far in front of their anchor point, pre-rotation.
pub const QUAD_BASE_DEPTH: f32 = -5.0;

// ── Backend seam ─────────────────────────────────────────────────

/// Viewer head pose as the HMD reports it.
#[derive(Debug, Clone, Copy)]
pub struct ViewerPose {
    /// Head position in world space.
    pub position: Vec3,
    /// Unit forward gaze direction.
    pub look: Vec3,
    /// Head orientation.
    pub rotation: glam::Quat,
}

impl Default for ViewerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            look: Vec3::NEG_Z,
            rotation: glam::Quat::IDENTITY,
        }
    }
}

/// One textured quad handed to the backend per placed mirror.
#[derive(Debug, Clone, Copy)]
pub struct SceneQuad {
    pub texture: TextureId,
    pub corners: QuadCorners,
    pub opacity: u8,
}

/// The graphics backend the composed scene is produced to. Texture
/// storage, lens distortion, and pose tracking live behind this seam.
pub trait RenderBackend: Send {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId;
    fn destroy_texture(&mut self, id: TextureId);
    fn upload_frame(&mut self, id: TextureId, width: u32, height: u32, rgba: &[u8]);
    fn set_scene(&mut self, quads: &[SceneQuad]);
    fn viewer_pose(&self) -> ViewerPose;
}

// ── SceneRenderer ────────────────────────────────────────────────

/// Executes scene requests against a backend.
pub struct SceneRenderer<B: RenderBackend> {
    backend: B,
}

impl<B: RenderBackend> SceneRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Upload a mirror's captured pixels, recreating its texture if
    /// the dimensions changed since it was allocated.
    pub fn upload(&mut self, mirror: &Mirror) {
        let frame = lock(&mirror.frame);
        if frame.is_empty() {
            warn!(mirror = %mirror.name(), "upload requested before first capture");
            return;
        }

        let mut slot = lock(&mirror.texture);
        let dimensions_changed = slot
            .map(|s| s.width != frame.width() || s.height != frame.height())
            .unwrap_or(true);
        if dimensions_changed {
            if let Some(old) = slot.take() {
                debug!(
                    mirror = %mirror.name(),
                    old_w = old.width,
                    old_h = old.height,
                    new_w = frame.width(),
                    new_h = frame.height(),
                    "window resized; recreating texture"
                );
                self.backend.destroy_texture(old.id);
            }
            let id = self.backend.create_texture(frame.width(), frame.height());
            *slot = Some(TextureSlot {
                id,
                width: frame.width(),
                height: frame.height(),
            });
        }

        // Slot is always present here.
        if let Some(s) = *slot {
            self.backend
                .upload_frame(s.id, frame.width(), frame.height(), frame.pixels());
        }
    }

    /// Recompose the draw list: auto-place never-positioned mirrors in
    /// front of the viewer, recompute every quad's corners, and hand
    /// the visible quads to the backend.
    pub fn rebuild(&mut self, mirrors: &[Arc<Mirror>], pose: &ViewerPose) {
        let mut quads = Vec::with_capacity(mirrors.len());

        for mirror in mirrors {
            let placement = {
                let mut placement = lock(&mirror.placement);
                if !placement.placed {
                    placement.position = pose.look - pose.position;
                    placement.rotation = pose.rotation;
                    placement.placed = true;
                    info!(
                        mirror = %mirror.name(),
                        window = %mirror.handle(),
                        "auto-placed in front of viewer"
                    );
                }
                *placement
            };

            let (width, height) = {
                let frame = lock(&mirror.frame);
                (frame.width(), frame.height())
            };
            let half_w = width as f32 / 2.0 * placement.scale;
            let half_h = height as f32 / 2.0 * placement.scale;

            let corner = |x: f32, y: f32| {
                placement.rotation * Vec3::new(x, y, QUAD_BASE_DEPTH)
                    + pose.position
                    + placement.position
            };
            let corners = QuadCorners {
                ld: corner(-half_w, -half_h),
                rd: corner(half_w, -half_h),
                lu: corner(-half_w, half_h),
                ru: corner(half_w, half_h),
            };
            *lock(&mirror.corners) = Some(corners);

            if let Some(slot) = *lock(&mirror.texture) {
                quads.push(SceneQuad {
                    texture: slot.id,
                    corners,
                    opacity: placement.opacity,
                });
            }
        }

        debug!(quads = quads.len(), "scene rebuilt");
        self.backend.set_scene(&quads);
    }
}

/// One graphics-thread frame: drain the mailbox, run uploads, run at
/// most one rebuild, acknowledge it, then hand the fresh corner data
/// to the focus picker.
pub fn drain_frame<B: RenderBackend>(
    mailbox: &mut SceneMailbox,
    renderer: &mut SceneRenderer<B>,
    picker: &FocusPicker,
) {
    let batch = mailbox.collect_frame();
    for mirror in &batch.uploads {
        renderer.upload(mirror);
    }
    if let Some(mirrors) = &batch.rebuild {
        let pose = renderer.backend().viewer_pose();
        renderer.rebuild(mirrors, &pose);
        mailbox.acknowledge(batch.rebuild_requests);
        picker.after_rebuild(mirrors, &pose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{DEFAULT_UPDATE_INTERVAL, WindowHandle};
    use glam::Quat;

    /// Records backend calls; pose is fixed looking down -Z.
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        next_id: u64,
        pub created: Vec<(TextureId, u32, u32)>,
        pub destroyed: Vec<TextureId>,
        pub uploads: Vec<(TextureId, u32, u32)>,
        pub scenes: Vec<usize>,
    }

    impl RenderBackend for RecordingBackend {
        fn create_texture(&mut self, width: u32, height: u32) -> TextureId {
            self.next_id += 1;
            let id = TextureId(self.next_id);
            self.created.push((id, width, height));
            id
        }

        fn destroy_texture(&mut self, id: TextureId) {
            self.destroyed.push(id);
        }

        fn upload_frame(&mut self, id: TextureId, width: u32, height: u32, rgba: &[u8]) {
            assert_eq!(rgba.len(), width as usize * height as usize * 4);
            self.uploads.push((id, width, height));
        }

        fn set_scene(&mut self, quads: &[SceneQuad]) {
            self.scenes.push(quads.len());
        }

        fn viewer_pose(&self) -> ViewerPose {
            ViewerPose::default()
        }
    }

    fn mirror_with_frame(id: u32, w: u32, h: u32) -> Arc<Mirror> {
        let m = Arc::new(Mirror::new(
            WindowHandle(id),
            format!("w{id}"),
            DEFAULT_UPDATE_INTERVAL,
        ));
        lock(&m.frame).ensure_size(w, h);
        m
    }

    #[test]
    fn upload_before_first_capture_is_skipped() {
        let mut renderer = SceneRenderer::new(RecordingBackend::default());
        let m = Arc::new(Mirror::new(
            WindowHandle(1),
            "empty".into(),
            DEFAULT_UPDATE_INTERVAL,
        ));
        renderer.upload(&m);
        assert!(renderer.backend().uploads.is_empty());
    }

    #[test]
    fn texture_recreated_when_dimensions_change() {
        let mut renderer = SceneRenderer::new(RecordingBackend::default());
        let m = mirror_with_frame(1, 4, 4);

        renderer.upload(&m);
        renderer.upload(&m); // same size: reuse
        assert_eq!(renderer.backend().created.len(), 1);
        assert!(renderer.backend().destroyed.is_empty());

        lock(&m.frame).ensure_size(8, 2);
        renderer.upload(&m);
        assert_eq!(renderer.backend().created.len(), 2);
        assert_eq!(renderer.backend().destroyed.len(), 1);
        assert_eq!(renderer.backend().uploads.last(), Some(&(TextureId(2), 8, 2)));
    }

    #[test]
    fn rebuild_auto_places_unpositioned_mirrors() {
        let mut renderer = SceneRenderer::new(RecordingBackend::default());
        let m = mirror_with_frame(1, 2, 2);
        renderer.upload(&m);

        let pose = ViewerPose::default();
        renderer.rebuild(std::slice::from_ref(&m), &pose);

        let placement = *lock(&m.placement);
        assert!(placement.placed);
        assert_eq!(placement.position, Vec3::NEG_Z);
        assert!(lock(&m.corners).is_some());
        assert_eq!(renderer.backend().scenes, vec![1]);
    }

    #[test]
    fn corners_follow_scale_and_placement() {
        let mut renderer = SceneRenderer::new(RecordingBackend::default());
        let m = mirror_with_frame(1, 4, 2);
        renderer.upload(&m);
        {
            let mut placement = lock(&m.placement);
            placement.position = Vec3::new(0.0, 0.0, -1.0);
            placement.rotation = Quat::IDENTITY;
            placement.scale = 0.5;
            placement.placed = true;
        }

        renderer.rebuild(std::slice::from_ref(&m), &ViewerPose::default());
        let corners = lock(&m.corners).unwrap();
        // Half extents 1.0 × 0.5, hung at base depth -5 behind the anchor.
        assert_eq!(corners.ld, Vec3::new(-1.0, -0.5, -6.0));
        assert_eq!(corners.ru, Vec3::new(1.0, 0.5, -6.0));
    }

    #[test]
    fn mirror_without_texture_gets_corners_but_no_quad() {
        let mut renderer = SceneRenderer::new(RecordingBackend::default());
        let m = mirror_with_frame(1, 2, 2); // captured but never uploaded

        renderer.rebuild(std::slice::from_ref(&m), &ViewerPose::default());
        assert!(lock(&m.corners).is_some());
        assert_eq!(renderer.backend().scenes, vec![0]);
    }
}
