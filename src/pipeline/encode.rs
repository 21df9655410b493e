//! Image encoding: page images and image files → `data:` URLs.
//!
//! The chat-completions API accepts images inline as
//! `data:<mime>;base64,<payload>`. Rendered pages are JPEG-encoded before
//! wrapping; files on disk are wrapped as-is with a MIME type inferred from
//! the extension.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// MIME type of every encoded page.
pub const PAGE_MIME: &str = "image/jpeg";

/// Wrap raw bytes as a `data:` URL.
pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Split a base64 `data:` URL back into its MIME type and bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}

/// MIME type for an image file, by extension. Unknown extensions fall back
/// to JPEG.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Encode an image file from disk.
pub fn encode_file(path: &Path) -> Result<String, std::io::Error> {
    let bytes = std::fs::read(path)?;
    let url = data_url(mime_for_path(path), &bytes);
    debug!("Encoded {} → {} bytes data URL", path.display(), url.len());
    Ok(url)
}

/// Encode a rasterised page as a JPEG data URL.
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_page(img: &DynamicImage) -> Result<String, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;

    let url = data_url(PAGE_MIME, &buf);
    debug!("Encoded page image → {} bytes data URL", url.len());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Write;

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let url = encode_page(&img).expect("encode should succeed");
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let (mime, bytes) = decode_data_url(&url).expect("valid data URL");
        assert_eq!(mime, "image/jpeg");
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let back = image::load_from_memory(&bytes).expect("decodable JPEG");
        assert_eq!((back.width(), back.height()), (10, 10));
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for_path(Path::new("a.png")), "image/png");
        assert_eq!(mime_for_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for_path(Path::new("a.gif")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn file_round_trip_is_byte_identical() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut f = tempfile::Builder::new().suffix(".webp").tempfile().unwrap();
        f.write_all(&bytes).unwrap();

        let url = encode_file(f.path()).unwrap();
        let (mime, decoded) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/webp");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn missing_file_propagates_io_error() {
        let err = encode_file(Path::new("/definitely/not/here.png")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn decode_rejects_non_data_urls() {
        assert!(decode_data_url("https://example.com/a.png").is_none());
        assert!(decode_data_url("data:image/png,plain").is_none());
    }
}
