//! Document assembler: an ordered batch of images becomes one PDF.
//!
//! Each image is sniffed by its byte signature and dispatched to the matching
//! decoder. Every page is sized to its image's pixel dimensions and the image
//! fills it from the origin. Any failure aborts the whole batch.

mod pdf;
mod sniff;

pub use sniff::{JpegInfo, RasterFormat, jpeg_info, sniff};

use crate::error::{AssembleError, AssembleResult};
use pdf::{PageImage, PdfBuilder};
use tracing::{debug, info};

/// Dimensions of one page, in PDF units (one unit per source pixel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    /// Serialized PDF.
    pub bytes: Vec<u8>,
    /// Page sizes in input order.
    pub pages: Vec<PageSize>,
}

impl AssembledDocument {
    /// Number of pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Assemble `images` into a PDF with one page per image.
///
/// # Errors
///
/// Returns [`AssembleError::Empty`] for an empty batch, or the first
/// unsupported/undecodable image together with its index.
pub fn assemble(images: Vec<Vec<u8>>) -> AssembleResult<AssembledDocument> {
    if images.is_empty() {
        return Err(AssembleError::Empty);
    }

    let mut builder = PdfBuilder::new();
    let mut pages = Vec::with_capacity(images.len());

    for (index, bytes) in images.into_iter().enumerate() {
        let (size, image) = decode(index, bytes)?;
        debug!(index, width = size.width, height = size.height, "page decoded");
        builder.add_page(size, image)?;
        pages.push(size);
    }

    let bytes = builder.finish()?;
    info!(pages = pages.len(), size = bytes.len(), "document assembled");
    Ok(AssembledDocument { bytes, pages })
}

fn decode(index: usize, bytes: Vec<u8>) -> AssembleResult<(PageSize, PageImage)> {
    match sniff(&bytes) {
        Ok(RasterFormat::Jpeg) => decode_jpeg(index, bytes),
        Ok(RasterFormat::Png) => decode_png(index, &bytes),
        Err(format) => Err(AssembleError::Unsupported { index, format }),
    }
}

fn decode_jpeg(index: usize, bytes: Vec<u8>) -> AssembleResult<(PageSize, PageImage)> {
    let info = jpeg_info(&bytes).map_err(|e| AssembleError::decode(index, e))?;

    // The stream is embedded verbatim, so make sure a viewer can decode it.
    image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)
        .map_err(|e| AssembleError::decode(index, e))?;

    let size = PageSize {
        width: info.width,
        height: info.height,
    };
    Ok((
        size,
        PageImage::Dct {
            data: bytes,
            components: info.components,
            inverted: info.adobe,
        },
    ))
}

fn decode_png(index: usize, bytes: &[u8]) -> AssembleResult<(PageSize, PageImage)> {
    let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| AssembleError::decode(index, e))?;

    let color = img.color();
    let gray = !color.has_color();
    let alpha = color
        .has_alpha()
        .then(|| img.to_rgba8().pixels().map(|p| p.0[3]).collect::<Vec<u8>>());
    let samples = if gray {
        img.to_luma8().into_raw()
    } else {
        img.to_rgb8().into_raw()
    };

    let size = PageSize {
        width: img.width(),
        height: img.height(),
    };
    Ok((
        size,
        PageImage::Raw {
            samples,
            gray,
            alpha,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn rgb(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 10])))
    }

    fn media_boxes(bytes: &[u8]) -> Vec<(i64, i64)> {
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_object(*id).unwrap().as_dict().unwrap();
                let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
                (mb[2].as_i64().unwrap(), mb[3].as_i64().unwrap())
            })
            .collect()
    }

    #[test]
    fn test_pages_follow_input_order_and_size() {
        let images = vec![
            encode(&rgb(40, 30), ImageFormat::Jpeg),
            encode(&rgb(12, 64), ImageFormat::Png),
            encode(&rgb(33, 33), ImageFormat::Jpeg),
        ];
        let doc = assemble(images).unwrap();

        assert_eq!(doc.page_count(), 3);
        assert_eq!(
            doc.pages,
            vec![
                PageSize { width: 40, height: 30 },
                PageSize { width: 12, height: 64 },
                PageSize { width: 33, height: 33 },
            ]
        );
        assert_eq!(media_boxes(&doc.bytes), vec![(40, 30), (12, 64), (33, 33)]);
    }

    #[test]
    fn test_png_with_alpha_and_gray() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 7, Rgba([1, 2, 3, 128])));
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(9, 4));
        let doc = assemble(vec![
            encode(&rgba, ImageFormat::Png),
            encode(&gray, ImageFormat::Png),
        ])
        .unwrap();
        assert_eq!(media_boxes(&doc.bytes), vec![(5, 7), (9, 4)]);
    }

    #[test]
    fn test_empty_batch() {
        assert!(matches!(assemble(Vec::new()), Err(AssembleError::Empty)));
    }

    #[test]
    fn test_unsupported_format_aborts_batch() {
        let images = vec![
            encode(&rgb(4, 4), ImageFormat::Png),
            b"GIF89a\x01\x00\x01\x00".to_vec(),
        ];
        let err = assemble(images).unwrap_err();
        assert!(matches!(
            err,
            AssembleError::Unsupported {
                index: 1,
                format: "gif"
            }
        ));
    }

    #[test]
    fn test_corrupt_png_is_decode_error() {
        let mut png = encode(&rgb(8, 8), ImageFormat::Png);
        png.truncate(30);
        let err = assemble(vec![png]).unwrap_err();
        assert!(matches!(err, AssembleError::Decode { index: 0, .. }));
    }

    #[test]
    fn test_truncated_jpeg_is_decode_error() {
        let mut jpeg = encode(&rgb(16, 16), ImageFormat::Jpeg);
        jpeg.truncate(jpeg.len() / 3);
        let err = assemble(vec![encode(&rgb(2, 2), ImageFormat::Jpeg), jpeg]).unwrap_err();
        assert!(matches!(err, AssembleError::Decode { index: 1, .. }));
    }
}
