//! Pointer-cursor sprite overlaid onto captures of the focused window.

use std::path::Path;

use tracing::{info, warn};

use crate::mirror::FrameBuffer;

/// A small RGBA sprite composited at the pointer position.
#[derive(Debug, Clone)]
pub struct CursorSprite {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl CursorSprite {
    /// Decode a sprite from an image file. A missing or undecodable
    /// file is not an error — captures simply go out without a cursor.
    pub fn load(path: &Path) -> Option<Self> {
        match image::open(path) {
            Ok(img) => {
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                info!(path = %path.display(), width, height, "cursor sprite loaded");
                Some(Self {
                    width,
                    height,
                    rgba: rgba.into_raw(),
                })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "no cursor sprite");
                None
            }
        }
    }

    /// Build a sprite from raw RGBA bytes (`width * height * 4`).
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        debug_assert_eq!(rgba.len(), width as usize * height as usize * 4);
        Self { width, height, rgba }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Composite the sprite onto `frame` with its top-left corner at
    /// `(at_x, at_y)`. Transparent sprite pixels leave the frame
    /// untouched; sprite pixels falling outside the frame are clipped.
    pub fn composite_onto(&self, frame: &mut FrameBuffer, at_x: i32, at_y: i32) {
        let fw = frame.width() as i64;
        let fh = frame.height() as i64;
        let out = frame.pixels_mut();

        for sy in 0..self.height as i64 {
            let ty = at_y as i64 + sy;
            if ty < 0 || ty >= fh {
                continue;
            }
            for sx in 0..self.width as i64 {
                let tx = at_x as i64 + sx;
                if tx < 0 || tx >= fw {
                    continue;
                }
                let s = ((sy * self.width as i64 + sx) * 4) as usize;
                if self.rgba[s + 3] == 0 {
                    continue;
                }
                let d = ((ty * fw + tx) * 4) as usize;
                out[d..d + 4].copy_from_slice(&self.rgba[s..s + 4]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_sprite(w: u32, h: u32, px: [u8; 4]) -> CursorSprite {
        CursorSprite::from_rgba(w, h, px.repeat((w * h) as usize))
    }

    #[test]
    fn composite_copies_opaque_pixels() {
        let mut frame = FrameBuffer::default();
        frame.ensure_size(4, 4);
        let sprite = solid_sprite(2, 2, [1, 2, 3, 255]);

        sprite.composite_onto(&mut frame, 1, 1);

        let px = &frame.pixels()[(1 * 4 + 1) * 4..][..4];
        assert_eq!(px, &[1, 2, 3, 255]);
        // Pixel outside the sprite untouched.
        assert_eq!(&frame.pixels()[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn composite_skips_transparent_pixels() {
        let mut frame = FrameBuffer::default();
        frame.ensure_size(2, 2);
        let sprite = solid_sprite(2, 2, [9, 9, 9, 0]);

        sprite.composite_onto(&mut frame, 0, 0);
        assert!(frame.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn composite_clips_at_frame_edge() {
        let mut frame = FrameBuffer::default();
        frame.ensure_size(3, 3);
        let sprite = solid_sprite(4, 4, [7, 7, 7, 255]);

        // Hanging off the lower-right corner must not panic or wrap.
        sprite.composite_onto(&mut frame, 2, 2);
        assert_eq!(&frame.pixels()[(2 * 3 + 2) * 4..][..4], &[7, 7, 7, 255]);
        assert_eq!(&frame.pixels()[..4], &[0, 0, 0, 0]);
    }
}
