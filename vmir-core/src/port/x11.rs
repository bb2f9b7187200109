//! X11 implementation of [`WindowSystemPort`] over `x11rb`.
//!
//! Window discovery reads `_NET_CLIENT_LIST` off the root window the
//! way EWMH-compliant window managers publish it; capture goes through
//! `GetImage` in ZPixmap format. The connection is shared by the
//! orchestrator and every capture worker — `RustConnection` serializes
//! requests internally.

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ConfigureWindowAux, ConnectionExt as _, ImageFormat, InputFocus, StackMode,
    Window,
};
use x11rb::rust_connection::RustConnection;

use crate::error::MirrorError;
use crate::mirror::WindowHandle;
use crate::port::{PixelMasks, RawWindowImage, WindowSystemPort};

/// Live X11 connection plus the interned atoms the port needs.
pub struct X11Port {
    conn: RustConnection,
    root: Window,
    net_client_list: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
}

impl X11Port {
    /// Connect to the X server named by `display` (or `$DISPLAY`).
    ///
    /// Failure here is fatal to the mirroring subsystem; callers are
    /// expected to propagate it as a startup error.
    pub fn connect(display: Option<&str>) -> Result<Self, MirrorError> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let root = conn.setup().roots[screen_num].root;

        let net_client_list = conn
            .intern_atom(false, b"_NET_CLIENT_LIST")?
            .reply()?
            .atom;
        let net_wm_name = conn.intern_atom(false, b"_NET_WM_NAME")?.reply()?.atom;
        let utf8_string = conn.intern_atom(false, b"UTF8_STRING")?.reply()?.atom;

        debug!(screen = screen_num, root, "connected to X server");
        Ok(Self {
            conn,
            root,
            net_client_list,
            net_wm_name,
            utf8_string,
        })
    }

    /// Best-effort window title: `_NET_WM_NAME`, falling back to the
    /// legacy `WM_NAME`. Any failure (the window may already be gone)
    /// yields `None`.
    fn window_name(&self, window: Window) -> Option<String> {
        let utf8 = self
            .conn
            .get_property(false, window, self.net_wm_name, self.utf8_string, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        if !utf8.value.is_empty() {
            return Some(String::from_utf8_lossy(&utf8.value).into_owned());
        }

        let legacy = self
            .conn
            .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::ANY, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        if legacy.value.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&legacy.value).into_owned())
        }
    }

    /// Bits per pixel of the pixmap format serving `depth`.
    fn bits_per_pixel(&self, depth: u8) -> Option<(u8, u8)> {
        self.conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| (f.bits_per_pixel, f.scanline_pad))
    }

    /// Channel masks of the visual a captured image was drawn with.
    fn visual_masks(&self, visual: u32) -> PixelMasks {
        for screen in &self.conn.setup().roots {
            for depth in &screen.allowed_depths {
                for vt in &depth.visuals {
                    if vt.visual_id == visual {
                        return PixelMasks {
                            red: vt.red_mask,
                            green: vt.green_mask,
                            blue: vt.blue_mask,
                        };
                    }
                }
            }
        }
        warn!(visual, "unknown visual; assuming x8r8g8b8 masks");
        PixelMasks::XRGB
    }
}

impl WindowSystemPort for X11Port {
    fn list_top_level_windows(
        &self,
    ) -> Result<Vec<(WindowHandle, Option<String>)>, MirrorError> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.net_client_list,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )?
            .reply()?;
        let ids = reply
            .value32()
            .ok_or(MirrorError::MalformedProperty("_NET_CLIENT_LIST"))?;

        let mut windows = Vec::new();
        for id in ids {
            windows.push((WindowHandle(id), self.window_name(id)));
        }
        Ok(windows)
    }

    fn capture_window_pixels(
        &self,
        window: WindowHandle,
    ) -> Result<RawWindowImage, MirrorError> {
        let geo = self.conn.get_geometry(window.0)?.reply()?;
        let image = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                window.0,
                0,
                0,
                geo.width,
                geo.height,
                !0,
            )?
            .reply()?;

        let (bits_per_pixel, scanline_pad) = self
            .bits_per_pixel(image.depth)
            .unwrap_or((32, 32));
        let bits_per_row = geo.width as u32 * bits_per_pixel as u32;
        let pad = scanline_pad.max(8) as u32;
        let stride = bits_per_row.div_ceil(pad) * pad / 8;

        if image.data.len() < stride as usize * geo.height as usize {
            return Err(MirrorError::MalformedProperty("short GetImage reply"));
        }

        Ok(RawWindowImage {
            width: geo.width as u32,
            height: geo.height as u32,
            bits_per_pixel,
            stride,
            masks: self.visual_masks(image.visual),
            data: image.data,
        })
    }

    fn pointer_position(
        &self,
        window: WindowHandle,
    ) -> Result<Option<(i32, i32)>, MirrorError> {
        let reply = self.conn.query_pointer(window.0)?.reply()?;
        if reply.same_screen {
            Ok(Some((reply.win_x as i32, reply.win_y as i32)))
        } else {
            Ok(None)
        }
    }

    fn current_input_focus(&self) -> Result<WindowHandle, MirrorError> {
        let reply = self.conn.get_input_focus()?.reply()?;
        Ok(WindowHandle(reply.focus))
    }

    fn set_input_focus(&self, window: WindowHandle) -> Result<(), MirrorError> {
        self.conn
            .set_input_focus(InputFocus::PARENT, window.0, x11rb::CURRENT_TIME)?
            .check()?;
        Ok(())
    }

    fn raise_window(&self, window: WindowHandle) -> Result<(), MirrorError> {
        // XMapRaised: map, then lift to the top of the stacking order.
        self.conn.map_window(window.0)?.check()?;
        self.conn
            .configure_window(
                window.0,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?
            .check()?;
        self.conn.flush()?;
        Ok(())
    }
}
