//! PDF serialization with `lopdf`.

use super::PageSize;
use crate::error::{AssembleError, AssembleResult};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// Name under which each page references its image.
const IMAGE_NAME: &[u8] = b"Im0";

/// Pixel data ready to be embedded.
pub(super) enum PageImage {
    /// JPEG stream copied verbatim.
    Dct {
        /// Original file bytes.
        data: Vec<u8>,
        /// Color components from the frame header.
        components: u8,
        /// Adobe-style inverted CMYK.
        inverted: bool,
    },
    /// Uncompressed 8-bit samples.
    Raw {
        /// Gray or RGB samples, row-major.
        samples: Vec<u8>,
        /// Single channel.
        gray: bool,
        /// Optional alpha channel, one byte per pixel.
        alpha: Option<Vec<u8>>,
    },
}

/// Incrementally builds a document with one image per page.
pub(super) struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub(super) fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Append a page of exactly `size` with `image` covering it.
    pub(super) fn add_page(&mut self, size: PageSize, image: PageImage) -> AssembleResult<()> {
        let width = i64::from(size.width);
        let height = i64::from(size.height);
        let image_id = self.add_image(width, height, image);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0i64.into(),
                        0i64.into(),
                        height.into(),
                        0i64.into(),
                        0i64.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| AssembleError::Encode(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0i64.into(), 0i64.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn add_image(&mut self, width: i64, height: i64, image: PageImage) -> ObjectId {
        match image {
            PageImage::Dct {
                data,
                components,
                inverted,
            } => {
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => dct_color_space(components),
                    "BitsPerComponent" => 8i64,
                    "Filter" => "DCTDecode",
                };
                if components == 4 && inverted {
                    dict.set(
                        "Decode",
                        [1i64, 0, 1, 0, 1, 0, 1, 0]
                            .into_iter()
                            .map(Object::from)
                            .collect::<Vec<_>>(),
                    );
                }
                self.doc
                    .add_object(Stream::new(dict, data).with_compression(false))
            }
            PageImage::Raw {
                samples,
                gray,
                alpha,
            } => {
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => if gray { "DeviceGray" } else { "DeviceRGB" },
                    "BitsPerComponent" => 8i64,
                };
                if let Some(alpha) = alpha {
                    let mask_id = self.doc.add_object(Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => width,
                            "Height" => height,
                            "ColorSpace" => "DeviceGray",
                            "BitsPerComponent" => 8i64,
                        },
                        alpha,
                    ));
                    dict.set("SMask", mask_id);
                }
                self.doc.add_object(Stream::new(dict, samples))
            }
        }
    }

    /// Write the page tree and catalog, then serialize.
    pub(super) fn finish(mut self) -> AssembleResult<Vec<u8>> {
        let count = i64::try_from(self.kids.len())
            .map_err(|_| AssembleError::Encode("too many pages".into()))?;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal("folio"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        // Flate-compresses every stream that allows it; DCT streams opt out.
        self.doc.compress();

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| AssembleError::Encode(e.to_string()))?;
        Ok(out)
    }
}

const fn dct_color_space(components: u8) -> &'static str {
    match components {
        1 => "DeviceGray",
        4 => "DeviceCMYK",
        _ => "DeviceRGB",
    }
}
