//! Protocol-level clipboard access for Linux desktops.
//!
//! # What is the point of this?
//!
//! Most clipboard crates either wrap a helper binary or assume the caller
//! has a window. This one speaks the selection protocols directly and works
//! from any process:
//!
//! - On Wayland it drives the `data-control` protocol from wlroots (no
//!   surface focus needed), falling back to the core `wl_data_device` path.
//! - On X11 it implements both sides of the ICCCM selection protocol on the
//!   CLIPBOARD selection, including chunked INCR transfers for payloads
//!   beyond the server's request limit.
//!
//! Written content also outlives the writing process. Both protocols are
//! owner-served: whoever set the selection must answer every paste. After a
//! write, a forked child inherits the display connection and keeps answering
//! until another client claims the selection, so a short-lived tool can copy
//! something and exit without the clipboard going blank.
//!
//! # Usage
//!
//! ```no_run
//! use linger_clipboard::{Clipboard, ClipboardFormat};
//!
//! # fn main() -> linger_clipboard::Result<()> {
//! let mut clipboard = Clipboard::new()?;
//! clipboard.write(b"hello", ClipboardFormat::Text)?;
//! let data = clipboard.read(ClipboardFormat::Text)?;
//! assert_eq!(data.bytes(), b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! The backend is picked from `XDG_SESSION_TYPE`, with `DISPLAY` as the X11
//! fallback. Backends own their display connection exclusively and are not
//! thread-safe; use one `Clipboard` per thread.

mod daemon;
mod data;
mod error;
pub mod wayland;
pub mod x11;

use std::env;

use log::debug;

pub use crate::data::{ClipboardData, ClipboardFormat};
pub use crate::error::{Error, Result};
use crate::wayland::WaylandClipboard;
use crate::x11::X11Clipboard;

/// Display protocol of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Wayland,
    X11,
}

fn platform_from(session_type: Option<&str>, have_display: bool) -> Option<Platform> {
    match session_type {
        Some("wayland") => Some(Platform::Wayland),
        Some("x11") => Some(Platform::X11),
        _ if have_display => Some(Platform::X11),
        _ => None,
    }
}

fn detect_platform() -> Option<Platform> {
    let session_type = env::var("XDG_SESSION_TYPE").ok();
    platform_from(session_type.as_deref(), env::var_os("DISPLAY").is_some())
}

enum Backend {
    Wayland(WaylandClipboard),
    X11(X11Clipboard),
}

/// The platform-selecting clipboard handle.
///
/// Picks the Wayland backend on Wayland sessions and the X11 backend
/// otherwise. A Wayland session whose compositor is unreachable degrades to
/// X11 when a display is configured (Xwayland-only setups).
pub struct Clipboard {
    backend: Backend,
}

impl Clipboard {
    pub fn new() -> Result<Clipboard> {
        let platform = detect_platform().ok_or(Error::UnsupportedPlatform)?;
        let backend = match platform {
            Platform::Wayland => match WaylandClipboard::new() {
                Ok(backend) => Backend::Wayland(backend),
                Err(err) if env::var_os("DISPLAY").is_some() => {
                    debug!("wayland unavailable ({}), degrading to x11", err);
                    Backend::X11(X11Clipboard::new()?)
                }
                Err(err) => return Err(err),
            },
            Platform::X11 => Backend::X11(X11Clipboard::new()?),
        };
        Ok(Clipboard { backend })
    }

    /// Read the selection in one concrete format.
    pub fn read(&mut self, format: ClipboardFormat) -> Result<ClipboardData> {
        match &mut self.backend {
            Backend::Wayland(backend) => backend.read(format),
            Backend::X11(backend) => backend.read(format),
        }
    }

    /// Read the selection in the best format the owner can produce.
    ///
    /// Wayland prefers text over binary payloads; X11 negotiates through
    /// TARGETS and prefers images so binary payloads keep their fidelity.
    pub fn read_auto(&mut self) -> Result<ClipboardData> {
        match &mut self.backend {
            Backend::Wayland(backend) => backend.read_auto(),
            Backend::X11(backend) => backend.read_best(),
        }
    }

    /// Put `bytes` on the clipboard. The buffer is copied; the caller may
    /// drop it as soon as this returns.
    pub fn write(&mut self, bytes: &[u8], format: ClipboardFormat) -> Result<()> {
        match &mut self.backend {
            Backend::Wayland(backend) => backend.write(bytes, format),
            Backend::X11(backend) => backend.write(bytes, format),
        }
    }

    /// Read the selection as UTF-8 text.
    pub fn read_text(&mut self) -> Result<String> {
        let data = self.read(ClipboardFormat::Text)?;
        data.as_text().map(str::to_owned)
    }

    /// Put a string on the clipboard, offered under every text MIME type.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.write(text.as_bytes(), ClipboardFormat::Text)
    }

    /// Release ownership of the selection (CLIPBOARD and, on X11, PRIMARY).
    pub fn clear(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Wayland(backend) => backend.clear(),
            Backend::X11(backend) => backend.clear(),
        }
    }

    /// The formats recognized in the current offer, deduplicated, in the
    /// order the owner advertises them.
    pub fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>> {
        match &mut self.backend {
            Backend::Wayland(backend) => backend.available_formats(),
            Backend::X11(backend) => backend.available_formats(),
        }
    }

    /// Block until the next selection change and return its contents.
    /// Wayland only; X11 sessions report [`Error::UnsupportedPlatform`].
    pub fn wait_for_change(&mut self) -> Result<ClipboardData> {
        match &mut self.backend {
            Backend::Wayland(backend) => backend.wait_for_change(),
            Backend::X11(_) => Err(Error::UnsupportedPlatform),
        }
    }

    /// Start an event-driven selection watcher on its own connection, so it
    /// can block without tying up this handle. Wayland only.
    pub fn monitor(&self) -> Result<ClipboardMonitor> {
        match &self.backend {
            Backend::Wayland(_) => ClipboardMonitor::new(),
            Backend::X11(_) => Err(Error::UnsupportedPlatform),
        }
    }
}

/// Event-driven watcher over clipboard changes (Wayland only).
///
/// Emits one payload per compositor-announced selection change, in delivery
/// order, without deduplicating identical contents. Callers wanting
/// coalescing do it themselves.
pub struct ClipboardMonitor {
    backend: WaylandClipboard,
}

impl ClipboardMonitor {
    pub fn new() -> Result<ClipboardMonitor> {
        match detect_platform() {
            Some(Platform::Wayland) => Ok(ClipboardMonitor {
                backend: WaylandClipboard::new()?,
            }),
            _ => Err(Error::UnsupportedPlatform),
        }
    }

    /// Block until the next selection change and return its contents.
    /// A cleared selection reports [`Error::NoData`].
    pub fn wait(&mut self) -> Result<ClipboardData> {
        self.backend.wait_for_change()
    }
}

impl Iterator for ClipboardMonitor {
    type Item = Result<ClipboardData>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.wait())
    }
}

#[cfg(test)]
mod tests {
    use super::{platform_from, Platform};

    #[test]
    fn wayland_session() {
        assert_eq!(platform_from(Some("wayland"), false), Some(Platform::Wayland));
        assert_eq!(platform_from(Some("wayland"), true), Some(Platform::Wayland));
    }

    #[test]
    fn x11_session() {
        assert_eq!(platform_from(Some("x11"), false), Some(Platform::X11));
        assert_eq!(platform_from(Some("x11"), true), Some(Platform::X11));
    }

    #[test]
    fn headless_with_display_configured() {
        assert_eq!(platform_from(None, true), Some(Platform::X11));
        assert_eq!(platform_from(Some("tty"), true), Some(Platform::X11));
    }

    #[test]
    fn nothing_available() {
        assert_eq!(platform_from(None, false), None);
        assert_eq!(platform_from(Some("tty"), false), None);
    }
}
