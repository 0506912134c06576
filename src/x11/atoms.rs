//! Eagerly interned atoms and the mapping between target atoms and logical
//! formats. This is the X11 rendition of the shared MIME table in `data`.

use xcb::{Atom, Connection};

use crate::data::ClipboardFormat;
use crate::error::{Error, Result};

/// Every atom the backend talks about, interned once at connect time.
pub(super) struct Atoms {
    pub clipboard: Atom,
    pub targets: Atom,
    pub incr: Atom,
    /// Our private transfer property on the proxy window.
    pub property: Atom,
    pub utf8_string: Atom,
    pub text: Atom,
    pub text_plain: Atom,
    pub text_plain_utf8: Atom,
    pub text_html: Atom,
    pub application_rtf: Atom,
    pub image_png: Atom,
    pub image_jpeg: Atom,
    pub image_gif: Atom,
    pub image_bmp: Atom,
    pub image_avif: Atom,
    pub image_jxl: Atom,
    pub image_tiff: Atom,
    pub image_webp: Atom,
}

fn get_atom(connection: &Connection, name: &str) -> Result<Atom> {
    xcb::intern_atom(connection, false, name)
        .get_reply()
        .map(|reply| reply.atom())
        .map_err(Error::init)
}

impl Atoms {
    pub fn intern_all(connection: &Connection) -> Result<Atoms> {
        Ok(Atoms {
            clipboard: get_atom(connection, "CLIPBOARD")?,
            targets: get_atom(connection, "TARGETS")?,
            incr: get_atom(connection, "INCR")?,
            property: get_atom(connection, "XCLIP_OUT")?,
            utf8_string: get_atom(connection, "UTF8_STRING")?,
            text: get_atom(connection, "TEXT")?,
            text_plain: get_atom(connection, "text/plain")?,
            text_plain_utf8: get_atom(connection, "text/plain;charset=utf-8")?,
            text_html: get_atom(connection, "text/html")?,
            application_rtf: get_atom(connection, "application/rtf")?,
            image_png: get_atom(connection, "image/png")?,
            image_jpeg: get_atom(connection, "image/jpeg")?,
            image_gif: get_atom(connection, "image/gif")?,
            image_bmp: get_atom(connection, "image/bmp")?,
            image_avif: get_atom(connection, "image/avif")?,
            image_jxl: get_atom(connection, "image/jxl")?,
            image_tiff: get_atom(connection, "image/tiff")?,
            image_webp: get_atom(connection, "image/webp")?,
        })
    }

    fn image_atoms(&self) -> [Atom; 8] {
        [
            self.image_png,
            self.image_jpeg,
            self.image_gif,
            self.image_bmp,
            self.image_avif,
            self.image_jxl,
            self.image_tiff,
            self.image_webp,
        ]
    }

    fn text_atoms(&self) -> [Atom; 5] {
        [
            self.utf8_string,
            xcb::ATOM_STRING,
            self.text,
            self.text_plain,
            self.text_plain_utf8,
        ]
    }

    /// The target requested when the caller names a concrete format.
    pub fn canonical_target(&self, format: ClipboardFormat) -> Atom {
        match format {
            ClipboardFormat::Text => self.utf8_string,
            ClipboardFormat::Image => self.image_png,
            ClipboardFormat::Html => self.text_html,
            ClipboardFormat::Rtf => self.application_rtf,
        }
    }

    /// Preference order when negotiating through TARGETS. Modern image
    /// codecs come first so fidelity survives the transfer.
    pub fn preferred_targets(&self, format: ClipboardFormat) -> Vec<Atom> {
        match format {
            ClipboardFormat::Image => vec![
                self.image_avif,
                self.image_webp,
                self.image_jxl,
                self.image_jpeg,
                self.image_png,
                self.image_tiff,
                self.image_gif,
                self.image_bmp,
            ],
            ClipboardFormat::Text => vec![
                self.utf8_string,
                self.text_plain,
                xcb::ATOM_STRING,
                self.text,
            ],
            ClipboardFormat::Html => vec![self.text_html],
            ClipboardFormat::Rtf => vec![self.application_rtf],
        }
    }

    /// Map a property's type atom back to the logical format of the payload
    /// it carried. Unknown types are treated as text.
    pub fn format_of(&self, atom: Atom) -> ClipboardFormat {
        if atom == self.text_html {
            ClipboardFormat::Html
        } else if atom == self.application_rtf {
            ClipboardFormat::Rtf
        } else if self.image_atoms().contains(&atom) {
            ClipboardFormat::Image
        } else {
            ClipboardFormat::Text
        }
    }

    /// Map one entry of a TARGETS reply to a readable format. Side-band
    /// targets like TIMESTAMP or MULTIPLE map to nothing.
    pub fn format_of_target(&self, atom: Atom) -> Option<ClipboardFormat> {
        if self.text_atoms().contains(&atom) {
            Some(ClipboardFormat::Text)
        } else if self.image_atoms().contains(&atom) {
            Some(ClipboardFormat::Image)
        } else if atom == self.text_html {
            Some(ClipboardFormat::Html)
        } else if atom == self.application_rtf {
            Some(ClipboardFormat::Rtf)
        } else {
            None
        }
    }

    /// Everything a TARGETS request is answered with for the given payload
    /// format.
    pub fn advertised_targets(&self, format: ClipboardFormat) -> Vec<Atom> {
        let mut targets = vec![self.targets];
        match format {
            ClipboardFormat::Text => targets.extend(self.text_atoms()),
            other => targets.push(self.canonical_target(other)),
        }
        targets
    }
}
