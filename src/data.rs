//! The logical formats and payloads exchanged with either backend, plus the
//! one MIME alias table both of them negotiate through.

use crate::error::{Error, Result};

/// The logical formats the clipboard can carry.
///
/// Wire-level MIME strings and X11 target atoms both map onto these four.
/// The mapping is permissive on input (all the historical text aliases, any
/// `image/*` type) and canonical-only on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipboardFormat {
    Text,
    Image,
    Html,
    Rtf,
}

/// MIME strings offered when writing text, in the order they go on the wire.
pub(crate) const TEXT_MIMES: [&str; 5] = [
    "text/plain",
    "text/plain;charset=utf-8",
    "TEXT",
    "STRING",
    "UTF8_STRING",
];

impl ClipboardFormat {
    /// The MIME string this format is written under.
    pub fn canonical_mime(self) -> &'static str {
        match self {
            ClipboardFormat::Text => "text/plain",
            ClipboardFormat::Image => "image/png",
            ClipboardFormat::Html => "text/html",
            ClipboardFormat::Rtf => "application/rtf",
        }
    }

    /// Map an advertised MIME string to a format.
    pub fn from_mime(mime: &str) -> Option<ClipboardFormat> {
        if TEXT_MIMES.contains(&mime) {
            Some(ClipboardFormat::Text)
        } else if mime.starts_with("image/") {
            Some(ClipboardFormat::Image)
        } else if mime == "text/html" {
            Some(ClipboardFormat::Html)
        } else if mime == "application/rtf" {
            Some(ClipboardFormat::Rtf)
        } else {
            None
        }
    }

    /// Everything a written payload of this format is offered as.
    pub(crate) fn offered_mimes(self) -> &'static [&'static str] {
        match self {
            ClipboardFormat::Text => &TEXT_MIMES,
            ClipboardFormat::Image => &["image/png"],
            ClipboardFormat::Html => &["text/html"],
            ClipboardFormat::Rtf => &["application/rtf"],
        }
    }
}

/// Fetch order per format. Anything the format accepts but is not listed
/// here is taken in offer order.
fn receive_preference(format: ClipboardFormat) -> &'static [&'static str] {
    match format {
        ClipboardFormat::Text => &[
            "text/plain;charset=utf-8",
            "text/plain",
            "UTF8_STRING",
            "STRING",
            "TEXT",
        ],
        ClipboardFormat::Image => &["image/png"],
        ClipboardFormat::Html => &["text/html"],
        ClipboardFormat::Rtf => &["application/rtf"],
    }
}

/// Pick the MIME string to fetch `format` through, out of what the offer
/// advertises.
pub(crate) fn choose_mime(format: ClipboardFormat, offered: &[String]) -> Option<String> {
    for preferred in receive_preference(format) {
        if offered.iter().any(|mime| mime == preferred) {
            return Some((*preferred).to_owned());
        }
    }
    offered
        .iter()
        .find(|mime| ClipboardFormat::from_mime(mime) == Some(format))
        .cloned()
}

/// Formats recognized in an offer's MIME list, offer order kept, duplicates
/// dropped.
pub(crate) fn offered_formats(mimes: &[String]) -> Vec<ClipboardFormat> {
    let mut formats = Vec::new();
    for mime in mimes {
        if let Some(format) = ClipboardFormat::from_mime(mime) {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
    }
    formats
}

/// Format preference for format-less reads on Wayland.
pub(crate) const WAYLAND_AUTO_PRIORITY: [ClipboardFormat; 4] = [
    ClipboardFormat::Text,
    ClipboardFormat::Image,
    ClipboardFormat::Html,
    ClipboardFormat::Rtf,
];

/// X11 negotiation puts images first so binary payloads keep their fidelity
/// when an owner offers both renditions.
pub(crate) const X11_AUTO_PRIORITY: [ClipboardFormat; 4] = [
    ClipboardFormat::Image,
    ClipboardFormat::Text,
    ClipboardFormat::Html,
    ClipboardFormat::Rtf,
];

/// An owned clipboard payload.
///
/// Always a private copy: backends duplicate their caches into fresh buffers
/// and never hand out references to internal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardData {
    bytes: Vec<u8>,
    format: ClipboardFormat,
}

impl ClipboardData {
    /// Wrap a completed transfer. An empty transfer is reported as the
    /// absence of data, never as an empty payload.
    pub(crate) fn new(bytes: Vec<u8>, format: ClipboardFormat) -> Result<ClipboardData> {
        if bytes.is_empty() {
            return Err(Error::NoData);
        }
        Ok(ClipboardData { bytes, format })
    }

    pub fn format(&self) -> ClipboardFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// View the payload as text. Fails unless it was read as [`ClipboardFormat::Text`]
    /// and holds valid UTF-8.
    pub fn as_text(&self) -> Result<&str> {
        if self.format != ClipboardFormat::Text {
            return Err(Error::InvalidData);
        }
        std::str::from_utf8(&self.bytes).map_err(|_| Error::InvalidData)
    }

    /// View the payload as encoded image bytes.
    pub fn as_image(&self) -> Result<&[u8]> {
        if self.format != ClipboardFormat::Image {
            return Err(Error::InvalidData);
        }
        Ok(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime(s: &str) -> Option<ClipboardFormat> {
        ClipboardFormat::from_mime(s)
    }

    fn offer(mimes: &[&str]) -> Vec<String> {
        mimes.iter().map(|m| (*m).to_owned()).collect()
    }

    #[test] fn text_plain() { assert_eq!(mime("text/plain"), Some(ClipboardFormat::Text)); }
    #[test] fn text_plain_utf8() { assert_eq!(mime("text/plain;charset=utf-8"), Some(ClipboardFormat::Text)); }
    #[test] fn legacy_text() { assert_eq!(mime("TEXT"), Some(ClipboardFormat::Text)); }
    #[test] fn legacy_string() { assert_eq!(mime("STRING"), Some(ClipboardFormat::Text)); }
    #[test] fn legacy_utf8_string() { assert_eq!(mime("UTF8_STRING"), Some(ClipboardFormat::Text)); }
    #[test] fn image_png() { assert_eq!(mime("image/png"), Some(ClipboardFormat::Image)); }
    #[test] fn image_family() { assert_eq!(mime("image/webp"), Some(ClipboardFormat::Image)); }
    #[test] fn html() { assert_eq!(mime("text/html"), Some(ClipboardFormat::Html)); }
    #[test] fn rtf() { assert_eq!(mime("application/rtf"), Some(ClipboardFormat::Rtf)); }
    #[test] fn unknown() { assert_eq!(mime("application/pdf"), None); }

    #[test]
    fn canonical_mime_round_trips() {
        for format in [
            ClipboardFormat::Text,
            ClipboardFormat::Image,
            ClipboardFormat::Html,
            ClipboardFormat::Rtf,
        ] {
            assert_eq!(ClipboardFormat::from_mime(format.canonical_mime()), Some(format));
        }
    }

    #[test]
    fn text_offer_order() {
        assert_eq!(
            ClipboardFormat::Text.offered_mimes(),
            &["text/plain", "text/plain;charset=utf-8", "TEXT", "STRING", "UTF8_STRING"],
        );
    }

    #[test]
    fn text_fetch_prefers_utf8_mime() {
        let offered = offer(&["TEXT", "text/plain;charset=utf-8", "text/html"]);
        assert_eq!(
            choose_mime(ClipboardFormat::Text, &offered).as_deref(),
            Some("text/plain;charset=utf-8"),
        );
    }

    #[test]
    fn text_fetch_falls_back_to_aliases() {
        let offered = offer(&["TEXT"]);
        assert_eq!(choose_mime(ClipboardFormat::Text, &offered).as_deref(), Some("TEXT"));
    }

    #[test]
    fn image_fetch_prefers_png() {
        let offered = offer(&["image/webp", "image/png"]);
        assert_eq!(choose_mime(ClipboardFormat::Image, &offered).as_deref(), Some("image/png"));
    }

    #[test]
    fn image_fetch_accepts_any_image() {
        let offered = offer(&["image/webp"]);
        assert_eq!(choose_mime(ClipboardFormat::Image, &offered).as_deref(), Some("image/webp"));
    }

    #[test]
    fn nothing_to_fetch() {
        let offered = offer(&["application/pdf"]);
        assert_eq!(choose_mime(ClipboardFormat::Image, &offered), None);
    }

    #[test]
    fn offered_formats_deduplicates() {
        let offered = offer(&["text/plain", "UTF8_STRING", "text/html", "text/plain"]);
        assert_eq!(
            offered_formats(&offered),
            vec![ClipboardFormat::Text, ClipboardFormat::Html],
        );
    }

    #[test]
    fn legacy_aliases_alone_report_text() {
        let offered = offer(&["TEXT", "STRING"]);
        assert_eq!(offered_formats(&offered), vec![ClipboardFormat::Text]);
    }

    #[test]
    fn auto_priorities() {
        assert_eq!(WAYLAND_AUTO_PRIORITY[0], ClipboardFormat::Text);
        assert_eq!(X11_AUTO_PRIORITY[0], ClipboardFormat::Image);
    }

    #[test]
    fn empty_payload_is_no_data() {
        assert!(matches!(
            ClipboardData::new(Vec::new(), ClipboardFormat::Text),
            Err(Error::NoData),
        ));
    }

    #[test]
    fn text_coercion() {
        let data = ClipboardData::new(b"hello".to_vec(), ClipboardFormat::Text).unwrap();
        assert_eq!(data.as_text().unwrap(), "hello");
        assert!(matches!(data.as_image(), Err(Error::InvalidData)));
    }

    #[test]
    fn image_coercion() {
        let data = ClipboardData::new(vec![0x89, b'P', b'N', b'G'], ClipboardFormat::Image).unwrap();
        assert_eq!(data.as_image().unwrap(), &[0x89, b'P', b'N', b'G']);
        assert!(matches!(data.as_text(), Err(Error::InvalidData)));
    }

    #[test]
    fn invalid_utf8_text() {
        let data = ClipboardData::new(vec![0xff, 0xfe], ClipboardFormat::Text).unwrap();
        assert!(matches!(data.as_text(), Err(Error::InvalidData)));
    }
}
