//! Receipt format detection from magic numbers.
//!
//! The declared content type is only a hint. The stored type always comes from
//! the bytes.

/// A receipt format the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptFormat {
    Jpeg,
    Png,
    Webp,
    Heic,
    Pdf,
}

/// ISO-BMFF major brands used by HEIC/HEIF stills and sequences.
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

impl ReceiptFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ReceiptFormat::Jpeg => "image/jpeg",
            ReceiptFormat::Png => "image/png",
            ReceiptFormat::Webp => "image/webp",
            ReceiptFormat::Heic => "image/heic",
            ReceiptFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReceiptFormat::Jpeg => "jpg",
            ReceiptFormat::Png => "png",
            ReceiptFormat::Webp => "webp",
            ReceiptFormat::Heic => "heic",
            ReceiptFormat::Pdf => "pdf",
        }
    }

    /// Map a declared MIME type (parameters ignored) to a format.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match normalize_mime_type(content_type).as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ReceiptFormat::Jpeg),
            "image/png" => Some(ReceiptFormat::Png),
            "image/webp" => Some(ReceiptFormat::Webp),
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
                Some(ReceiptFormat::Heic)
            }
            "application/pdf" | "application/x-pdf" => Some(ReceiptFormat::Pdf),
            _ => None,
        }
    }

    /// Detect the format from the leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ReceiptFormat::Jpeg);
        }

        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ReceiptFormat::Png);
        }

        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ReceiptFormat::Webp);
        }

        if data.len() >= 12
            && &data[4..8] == b"ftyp"
            && HEIF_BRANDS.iter().any(|brand| &data[8..12] == brand.as_slice())
        {
            return Some(ReceiptFormat::Heic);
        }

        // PDF readers tolerate leading junk before the header, up to 1 KiB.
        let head = &data[..data.len().min(1024)];
        if head.windows(5).any(|w| w == b"%PDF-") {
            return Some(ReceiptFormat::Pdf);
        }

        None
    }
}

/// Strip parameters and lowercase: `"Image/JPEG; q=1"` -> `"image/jpeg"`.
pub fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(content_type)
        .to_ascii_lowercase()
}

/// Labels that carry no format information; the sniffed format is used instead.
pub fn is_generic_label(content_type: &str) -> bool {
    let normalized = normalize_mime_type(content_type);
    normalized.is_empty() || normalized == "application/octet-stream"
}
