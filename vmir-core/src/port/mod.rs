//! The narrow seam to the desktop windowing system.
//!
//! Everything the pipeline needs from the desktop — listing windows,
//! reading their pixels, moving input focus — goes through
//! [`WindowSystemPort`]. Production uses the X11 implementation in
//! [`x11`]; tests substitute fakes.

use crate::error::MirrorError;
use crate::mirror::WindowHandle;

pub mod x11;

// ── PixelMasks ───────────────────────────────────────────────────

/// Channel bit masks of a captured 32 bpp pixel.
#[derive(Debug, Clone, Copy)]
pub struct PixelMasks {
    pub red: u32,
    pub green: u32,
    pub blue: u32,
}

impl PixelMasks {
    /// Masks of the ubiquitous x8r8g8b8 layout.
    pub const XRGB: PixelMasks = PixelMasks {
        red: 0x00ff_0000,
        green: 0x0000_ff00,
        blue: 0x0000_00ff,
    };

    /// Extract one 8-bit channel from a pixel value.
    pub fn channel(mask: u32, pixel: u32) -> u8 {
        if mask == 0 {
            return 0;
        }
        ((pixel & mask) >> mask.trailing_zeros()) as u8
    }
}

// ── RawWindowImage ───────────────────────────────────────────────

/// A raw window capture as the window system hands it over.
///
/// `data` holds `height` rows of `stride` bytes each; `stride` may
/// exceed `width * 4` due to scanline padding.
#[derive(Debug, Clone)]
pub struct RawWindowImage {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
    /// Row pitch in bytes.
    pub stride: u32,
    pub masks: PixelMasks,
    pub data: Vec<u8>,
}

impl RawWindowImage {
    /// The 32-bit pixel value at `(x, y)`.
    ///
    /// Reads in native byte order: the capture connection is local, so
    /// server and client agree on it.
    pub fn pixel_u32(&self, x: u32, y: u32) -> u32 {
        let offset = y as usize * self.stride as usize + x as usize * 4;
        u32::from_ne_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }
}

// ── WindowSystemPort ─────────────────────────────────────────────

/// Query/capture primitives the mirroring core consumes.
///
/// Implementations are shared across the orchestrator and every
/// capture worker thread, so they must be `Send + Sync`.
pub trait WindowSystemPort: Send + Sync {
    /// All top-level windows with their best-effort names. A window
    /// without a usable title is reported with `None`.
    fn list_top_level_windows(&self)
    -> Result<Vec<(WindowHandle, Option<String>)>, MirrorError>;

    /// Capture the window's current pixels.
    fn capture_window_pixels(&self, window: WindowHandle)
    -> Result<RawWindowImage, MirrorError>;

    /// Pointer position relative to the window's origin, or `None`
    /// when the pointer is on another screen. Coordinates may lie
    /// outside the window's bounds.
    fn pointer_position(&self, window: WindowHandle)
    -> Result<Option<(i32, i32)>, MirrorError>;

    /// The window currently owning desktop input focus.
    fn current_input_focus(&self) -> Result<WindowHandle, MirrorError>;

    /// Transfer desktop input focus to the window.
    fn set_input_focus(&self, window: WindowHandle) -> Result<(), MirrorError>;

    /// Raise the window to the top of the desktop stacking order.
    fn raise_window(&self, window: WindowHandle) -> Result<(), MirrorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_extraction() {
        let px = 0x00a1_b2c3;
        assert_eq!(PixelMasks::channel(PixelMasks::XRGB.red, px), 0xa1);
        assert_eq!(PixelMasks::channel(PixelMasks::XRGB.green, px), 0xb2);
        assert_eq!(PixelMasks::channel(PixelMasks::XRGB.blue, px), 0xc3);
        assert_eq!(PixelMasks::channel(0, px), 0);
    }

    #[test]
    fn pixel_lookup_honors_stride() {
        // 2×2 image padded to 12-byte rows.
        let mut data = vec![0u8; 24];
        data[12..16].copy_from_slice(&0xdead_beefu32.to_ne_bytes());
        let img = RawWindowImage {
            width: 2,
            height: 2,
            bits_per_pixel: 32,
            stride: 12,
            masks: PixelMasks::XRGB,
            data,
        };
        assert_eq!(img.pixel_u32(0, 1), 0xdead_beef);
        assert_eq!(img.pixel_u32(1, 0), 0);
    }
}
