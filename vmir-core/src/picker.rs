//! Gaze-ray focus arbitration.
//!
//! After every scene rebuild the picker casts the viewer's forward ray
//! against each mirror's quad. The nearest hit wins the z-order and,
//! when it differs from the desktop's current input focus, the focus
//! is transferred and the window raised. In drag mode picking is
//! suspended and the focused mirror rides the gaze instead.
//!
//! Runs on the graphics thread — corner data is written there during
//! the rebuild that immediately precedes each pick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::mirror::{Mirror, QuadCorners, WindowHandle, lock};
use crate::port::WindowSystemPort;
use crate::scene::ViewerPose;

/// Guards against grazing/parallel rays and hits behind the viewer.
const INTERSECT_EPSILON: f32 = 1e-6;

// ── Ray tests ────────────────────────────────────────────────────

/// Möller–Trumbore ray/triangle intersection.
///
/// Returns the ray parameter `t` of the hit. Backfacing and
/// near-parallel triangles are rejected via the determinant, then the
/// barycentrics `u` and `v`, then `t` itself — in exactly that order.
pub fn ray_triangle_intersect(
    orig: Vec3,
    dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<f32> {
    let v0v1 = v1 - v0;
    let v0v2 = v2 - v0;
    let pvec = dir.cross(v0v2);
    let det = v0v1.dot(pvec);
    // Negative: backfacing. Near zero: ray parallel to the plane.
    if det < INTERSECT_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = orig - v0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(v0v1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = v0v2.dot(qvec) * inv_det;
    (t > INTERSECT_EPSILON).then_some(t)
}

/// Ray against a mirror quad: triangles {ld, rd, lu} then {rd, ru, lu}.
///
/// The second triangle is only consulted when the first misses, so a
/// ray down the shared diagonal is counted exactly once and the quad
/// surface has no gap.
pub fn ray_quad_intersect(orig: Vec3, dir: Vec3, corners: &QuadCorners) -> Option<f32> {
    ray_triangle_intersect(orig, dir, corners.ld, corners.rd, corners.lu)
        .or_else(|| ray_triangle_intersect(orig, dir, corners.rd, corners.ru, corners.lu))
}

// ── FocusPicker ──────────────────────────────────────────────────

/// Picks the mirror the user is looking at and keeps desktop input
/// focus in sync with it.
pub struct FocusPicker {
    port: Arc<dyn WindowSystemPort>,
    drag_mode: AtomicBool,
    /// Sticky: a gaze miss keeps the previous pick.
    focused: Mutex<Option<Arc<Mirror>>>,
    /// Viewer position of the previous pass, for drag distance.
    last_position: Mutex<Vec3>,
    /// Ray parameter of the last hit, surfaced in the HUD.
    last_hit_t: Mutex<Option<f32>>,
}

impl FocusPicker {
    pub fn new(port: Arc<dyn WindowSystemPort>) -> Self {
        Self {
            port,
            drag_mode: AtomicBool::new(false),
            focused: Mutex::new(None),
            last_position: Mutex::new(Vec3::ZERO),
            last_hit_t: Mutex::new(None),
        }
    }

    /// Flip drag mode; returns the new state.
    pub fn toggle_drag(&self) -> bool {
        let on = !self.drag_mode.load(Ordering::Acquire);
        self.drag_mode.store(on, Ordering::Release);
        on
    }

    pub fn drag_mode(&self) -> bool {
        self.drag_mode.load(Ordering::Acquire)
    }

    /// The mirror the user is (last known to be) looking at.
    pub fn focused_mirror(&self) -> Option<Arc<Mirror>> {
        lock(&self.focused).clone()
    }

    /// Drop the sticky pick if it refers to `handle` (its mirror was
    /// blacklisted or swept).
    pub fn clear_focus(&self, handle: WindowHandle) {
        let mut focused = lock(&self.focused);
        if focused.as_ref().is_some_and(|m| m.handle() == handle) {
            *focused = None;
        }
    }

    /// One-line status for the in-scene HUD.
    pub fn hud_line(&self) -> String {
        let name = self
            .focused_mirror()
            .map(|m| m.name())
            .unwrap_or_else(|| "---".into());
        match *lock(&self.last_hit_t) {
            Some(t) => format!("t: {t:2.1} - [{name}]"),
            None => format!("t: --- - [{name}]"),
        }
    }

    /// Entry point, called by the graphics thread right after each
    /// rebuild has refreshed corner data.
    pub fn after_rebuild(&self, mirrors: &[Arc<Mirror>], pose: &ViewerPose) {
        if self.drag_mode() {
            self.track_drag(pose);
        } else {
            self.pick(mirrors, pose);
        }
        *lock(&self.last_position) = pose.position;
    }

    /// Cast the gaze ray, arbitrate z-order by nearest t, and align
    /// desktop focus with the result.
    fn pick(&self, mirrors: &[Arc<Mirror>], pose: &ViewerPose) {
        // The world moves around the viewer; the ray starts at the
        // scene origin and follows the gaze.
        let orig = Vec3::ZERO;
        let dir = pose.look;

        let mut nearest: Option<(f32, Arc<Mirror>)> = None;
        for mirror in mirrors {
            let Some(corners) = *lock(&mirror.corners) else {
                continue;
            };
            if let Some(t) = ray_quad_intersect(orig, dir, &corners) {
                if nearest.as_ref().is_none_or(|(best, _)| t < *best) {
                    nearest = Some((t, Arc::clone(mirror)));
                }
            }
        }

        let target = {
            let mut focused = lock(&self.focused);
            if let Some((t, mirror)) = nearest {
                *lock(&self.last_hit_t) = Some(t);
                debug!(mirror = %mirror.name(), t = %t, "gaze hit");
                *focused = Some(mirror);
            }
            focused.clone()
        };
        let Some(target) = target else {
            return;
        };

        match self.port.current_input_focus() {
            Ok(current) if current != target.handle() => {
                info!(
                    from = %current,
                    to = %target.handle(),
                    mirror = %target.name(),
                    "transferring desktop input focus"
                );
                if let Err(e) = self.port.set_input_focus(target.handle()) {
                    warn!(error = %e, "input focus transfer failed");
                    return;
                }
                if let Err(e) = self.port.raise_window(target.handle()) {
                    warn!(error = %e, "raise failed");
                }
                for mirror in mirrors {
                    mirror.set_has_focus(mirror.handle() == target.handle());
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "cannot query desktop input focus"),
        }
    }

    /// Drag mode: the focused mirror follows the gaze at the distance
    /// it sat at when the drag began.
    fn track_drag(&self, pose: &ViewerPose) {
        let Some(mirror) = self.focused_mirror() else {
            return;
        };
        let mut placement = lock(&mirror.placement);
        let distance = (*lock(&self.last_position) + placement.position).length();
        placement.position = pose.look * distance - pose.position;
        placement.rotation = pose.rotation;
        placement.placed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::mirror::DEFAULT_UPDATE_INTERVAL;
    use crate::port::RawWindowImage;

    /// Minimal fake: scripted focus, records transfers.
    #[derive(Default)]
    struct FocusPort {
        focus: Mutex<u32>,
        transfers: Mutex<Vec<u32>>,
        raises: Mutex<Vec<u32>>,
    }

    impl WindowSystemPort for FocusPort {
        fn list_top_level_windows(
            &self,
        ) -> Result<Vec<(WindowHandle, Option<String>)>, MirrorError> {
            Ok(Vec::new())
        }

        fn capture_window_pixels(
            &self,
            _window: WindowHandle,
        ) -> Result<RawWindowImage, MirrorError> {
            Err(MirrorError::MalformedProperty("not used"))
        }

        fn pointer_position(
            &self,
            _window: WindowHandle,
        ) -> Result<Option<(i32, i32)>, MirrorError> {
            Ok(None)
        }

        fn current_input_focus(&self) -> Result<WindowHandle, MirrorError> {
            Ok(WindowHandle(*self.focus.lock().unwrap()))
        }

        fn set_input_focus(&self, window: WindowHandle) -> Result<(), MirrorError> {
            *self.focus.lock().unwrap() = window.0;
            self.transfers.lock().unwrap().push(window.0);
            Ok(())
        }

        fn raise_window(&self, window: WindowHandle) -> Result<(), MirrorError> {
            self.raises.lock().unwrap().push(window.0);
            Ok(())
        }
    }

    /// Unit square facing the viewer at the given depth.
    fn flat_quad(z: f32) -> QuadCorners {
        QuadCorners {
            ld: Vec3::new(-1.0, -1.0, z),
            rd: Vec3::new(1.0, -1.0, z),
            lu: Vec3::new(-1.0, 1.0, z),
            ru: Vec3::new(1.0, 1.0, z),
        }
    }

    fn mirror_with_quad(id: u32, corners: QuadCorners) -> Arc<Mirror> {
        let m = Arc::new(Mirror::new(
            WindowHandle(id),
            format!("w{id}"),
            DEFAULT_UPDATE_INTERVAL,
        ));
        *lock(&m.corners) = Some(corners);
        m
    }

    #[test]
    fn center_ray_hits_quad_at_t5() {
        let t = ray_quad_intersect(Vec3::ZERO, Vec3::NEG_Z, &flat_quad(-5.0));
        assert_eq!(t, Some(5.0));
    }

    #[test]
    fn diagonal_ray_is_counted_exactly_once() {
        let corners = flat_quad(-5.0);
        // A point on the shared diagonal (ld–…–lu edge structure puts
        // the diagonal between rd and lu). Aim halfway along it.
        let dir = Vec3::new(0.0, 0.0, -5.0).normalize();
        let first =
            ray_triangle_intersect(Vec3::ZERO, dir, corners.ld, corners.rd, corners.lu);
        assert!(first.is_some(), "diagonal belongs to the first triangle");
        // The quad test short-circuits: exactly one triangle
        // contributes, with the same t either way.
        let quad = ray_quad_intersect(Vec3::ZERO, dir, &corners);
        assert_eq!(quad, first);
    }

    #[test]
    fn backfacing_quad_is_rejected() {
        // Same quad seen from behind.
        let t = ray_quad_intersect(Vec3::new(0.0, 0.0, -10.0), Vec3::Z, &flat_quad(-5.0));
        assert_eq!(t, None);
    }

    #[test]
    fn ray_misses_outside_quad() {
        let t = ray_quad_intersect(Vec3::ZERO, Vec3::new(0.9, 0.0, -1.0).normalize(), &flat_quad(-5.0));
        assert_eq!(t, None);
    }

    #[test]
    fn hit_behind_viewer_is_rejected() {
        let t = ray_quad_intersect(Vec3::ZERO, Vec3::NEG_Z, &flat_quad(5.0));
        assert_eq!(t, None);
    }

    #[test]
    fn nearest_quad_wins_z_order_and_takes_focus() {
        let port = Arc::new(FocusPort::default());
        let picker = FocusPicker::new(Arc::clone(&port) as Arc<dyn WindowSystemPort>);
        let far = mirror_with_quad(1, flat_quad(-9.0));
        let near = mirror_with_quad(2, flat_quad(-5.0));
        let mirrors = vec![far, Arc::clone(&near)];

        picker.after_rebuild(&mirrors, &ViewerPose::default());

        assert_eq!(
            picker.focused_mirror().map(|m| m.handle()),
            Some(WindowHandle(2))
        );
        assert_eq!(*port.transfers.lock().unwrap(), vec![2]);
        assert_eq!(*port.raises.lock().unwrap(), vec![2]);
        assert!(near.has_focus());
        assert!(!mirrors[0].has_focus());
    }

    #[test]
    fn miss_keeps_previous_focus_sticky() {
        let port = Arc::new(FocusPort::default());
        let picker = FocusPicker::new(Arc::clone(&port) as Arc<dyn WindowSystemPort>);
        let m = mirror_with_quad(1, flat_quad(-5.0));
        let mirrors = vec![Arc::clone(&m)];

        picker.after_rebuild(&mirrors, &ViewerPose::default());
        assert_eq!(port.transfers.lock().unwrap().len(), 1);

        // Look away: the pick is kept, no second transfer happens.
        let away = ViewerPose {
            look: Vec3::Y,
            ..ViewerPose::default()
        };
        picker.after_rebuild(&mirrors, &away);
        assert_eq!(
            picker.focused_mirror().map(|m| m.handle()),
            Some(WindowHandle(1))
        );
        assert_eq!(port.transfers.lock().unwrap().len(), 1);
    }

    #[test]
    fn matching_desktop_focus_causes_no_transfer() {
        let port = Arc::new(FocusPort::default());
        *port.focus.lock().unwrap() = 1;
        let picker = FocusPicker::new(Arc::clone(&port) as Arc<dyn WindowSystemPort>);
        let mirrors = vec![mirror_with_quad(1, flat_quad(-5.0))];

        picker.after_rebuild(&mirrors, &ViewerPose::default());
        assert!(port.transfers.lock().unwrap().is_empty());
    }

    #[test]
    fn drag_mode_skips_picking_and_tracks_gaze() {
        let port = Arc::new(FocusPort::default());
        let picker = FocusPicker::new(Arc::clone(&port) as Arc<dyn WindowSystemPort>);
        let m = mirror_with_quad(1, flat_quad(-5.0));
        let mirrors = vec![Arc::clone(&m)];

        // Acquire focus, then enter drag mode.
        picker.after_rebuild(&mirrors, &ViewerPose::default());
        {
            let mut placement = lock(&m.placement);
            placement.position = Vec3::new(0.0, 0.0, -2.0);
            placement.placed = true;
        }
        assert!(picker.toggle_drag());

        // Look up: the mirror follows at its previous distance (2.0).
        let up = ViewerPose {
            look: Vec3::Y,
            ..ViewerPose::default()
        };
        picker.after_rebuild(&mirrors, &up);

        let placement = *lock(&m.placement);
        assert_eq!(placement.position, Vec3::new(0.0, 2.0, 0.0));
        // No extra focus transfer while dragging.
        assert_eq!(port.transfers.lock().unwrap().len(), 1);
    }

    #[test]
    fn clear_focus_drops_only_matching_handle() {
        let port = Arc::new(FocusPort::default());
        let picker = FocusPicker::new(Arc::clone(&port) as Arc<dyn WindowSystemPort>);
        let mirrors = vec![mirror_with_quad(3, flat_quad(-5.0))];
        picker.after_rebuild(&mirrors, &ViewerPose::default());

        picker.clear_focus(WindowHandle(4));
        assert!(picker.focused_mirror().is_some());
        picker.clear_focus(WindowHandle(3));
        assert!(picker.focused_mirror().is_none());
    }

    #[test]
    fn hud_line_names_the_pick() {
        let port = Arc::new(FocusPort::default());
        let picker = FocusPicker::new(Arc::clone(&port) as Arc<dyn WindowSystemPort>);
        assert!(picker.hud_line().contains("---"));

        let mirrors = vec![mirror_with_quad(1, flat_quad(-5.0))];
        picker.after_rebuild(&mirrors, &ViewerPose::default());
        assert!(picker.hud_line().contains("w1"));
        assert!(picker.hud_line().contains("5.0"));
    }
}
