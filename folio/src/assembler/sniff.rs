//! Format sniffing and JPEG frame header parsing.

/// PNG file signature.
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// JPEG start-of-image marker followed by the first marker prefix.
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Raster formats the assembler can place on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Baseline or progressive JPEG, embedded as-is.
    Jpeg,
    /// PNG, decoded to raw samples.
    Png,
}

/// Detect the raster format from the byte signature.
///
/// On failure returns a best-effort name of what the bytes look like.
pub fn sniff(bytes: &[u8]) -> Result<RasterFormat, &'static str> {
    if bytes.starts_with(JPEG_SIGNATURE) {
        return Ok(RasterFormat::Jpeg);
    }
    if bytes.starts_with(PNG_SIGNATURE) {
        return Ok(RasterFormat::Png);
    }
    Err(describe_unsupported(bytes))
}

fn describe_unsupported(bytes: &[u8]) -> &'static str {
    if bytes.is_empty() {
        "empty"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else if bytes.starts_with(b"BM") {
        "bmp"
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        "tiff"
    } else if bytes.starts_with(b"%PDF") {
        "pdf"
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        "heif"
    } else {
        "unknown"
    }
}

/// Frame parameters of a JPEG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of color components (1, 3 or 4).
    pub components: u8,
    /// Whether an Adobe APP14 segment was seen (inverted CMYK).
    pub adobe: bool,
}

/// Walk the marker segments up to the first start-of-frame.
pub fn jpeg_info(bytes: &[u8]) -> Result<JpegInfo, String> {
    if !bytes.starts_with(JPEG_SIGNATURE) {
        return Err("missing start-of-image marker".into());
    }

    let mut pos = 2;
    let mut adobe = false;

    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(format!("expected marker at offset {pos}"));
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        pos += 2;

        match marker {
            0x01 | 0xD0..=0xD8 => continue,
            0xD9 | 0xDA => return Err("no frame header before scan data".into()),
            _ => {}
        }

        let Some(len_bytes) = bytes.get(pos..pos + 2) else {
            return Err("truncated segment length".into());
        };
        let seg_len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        if seg_len < 2 || pos + seg_len > bytes.len() {
            return Err(format!("invalid segment length {seg_len} at offset {pos}"));
        }
        let segment = &bytes[pos + 2..pos + seg_len];

        if is_start_of_frame(marker) {
            return parse_frame(segment, adobe);
        }
        if marker == 0xEE && segment.starts_with(b"Adobe") {
            adobe = true;
        }
        pos += seg_len;
    }

    Err("no frame header found".into())
}

const fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn parse_frame(segment: &[u8], adobe: bool) -> Result<JpegInfo, String> {
    if segment.len() < 6 {
        return Err("truncated frame header".into());
    }
    let precision = segment[0];
    let height = u32::from(u16::from_be_bytes([segment[1], segment[2]]));
    let width = u32::from(u16::from_be_bytes([segment[3], segment[4]]));
    let components = segment[5];

    if precision != 8 {
        return Err(format!("unsupported sample precision {precision}"));
    }
    if width == 0 || height == 0 {
        return Err(format!("invalid dimensions {width}x{height}"));
    }
    if !matches!(components, 1 | 3 | 4) {
        return Err(format!("unsupported component count {components}"));
    }

    Ok(JpegInfo {
        width,
        height,
        components,
        adobe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SOI, APP0 stub, SOF0 for a 3x2 RGB image, EOI.
    fn tiny_jpeg_header() -> Vec<u8> {
        let mut b = vec![0xFF, 0xD8];
        b.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        b.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x02, 0x00, 0x03, 0x03, 0x01, 0x22, 0x00, 0x02,
            0x11, 0x01, 0x03, 0x11, 0x01,
        ]);
        b.extend_from_slice(&[0xFF, 0xD9]);
        b
    }

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(sniff(&tiny_jpeg_header()), Ok(RasterFormat::Jpeg));
        assert_eq!(sniff(PNG_SIGNATURE), Ok(RasterFormat::Png));
        assert_eq!(sniff(b"GIF89a...."), Err("gif"));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), Err("webp"));
        assert_eq!(sniff(b""), Err("empty"));
        assert_eq!(sniff(b"hello world"), Err("unknown"));
    }

    #[test]
    fn test_jpeg_frame_header() {
        let info = jpeg_info(&tiny_jpeg_header()).unwrap();
        assert_eq!(info.width, 3);
        assert_eq!(info.height, 2);
        assert_eq!(info.components, 3);
        assert!(!info.adobe);
    }

    #[test]
    fn test_jpeg_adobe_marker() {
        let mut b = vec![0xFF, 0xD8];
        b.extend_from_slice(&[0xFF, 0xEE, 0x00, 0x07, b'A', b'd', b'o', b'b', b'e']);
        b.extend_from_slice(&tiny_jpeg_header()[2..]);
        assert!(jpeg_info(&b).unwrap().adobe);
    }

    #[test]
    fn test_jpeg_without_frame() {
        let b = [0xFF, 0xD8, 0xFF, 0xD9];
        assert!(jpeg_info(&b).is_err());

        let truncated = &tiny_jpeg_header()[..10];
        assert!(jpeg_info(truncated).is_err());
    }
}
