//! PDF text and embedded-image extraction.
//!
//! Text comes from `pdf-extract` (all pages, in page order). Images are
//! enumerated with `lopdf`, page by page, in the order of each page's
//! XObject dictionary, and re-wrapped into a format an OCR engine can read:
//! JPEG/JPEG 2000 streams are passed through, raw samples in gray, RGB,
//! CMYK, ICC-based or indexed colour are expanded to 8-bit PGM/PPM, and
//! 1-bit images become PBM. Streams that cannot be decoded (CCITT fax,
//! JBIG2, unknown colour spaces) are skipped.

use std::panic::{AssertUnwindSafe, catch_unwind};

use lopdf::{Dictionary, Document, Object, Stream};

use super::error::{ExtractError, ExtractResult};

/// An image embedded in a PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub page: u32,
    /// Encoded image bytes (JPEG, JPEG 2000, PBM, PGM or PPM).
    pub data: Vec<u8>,
}

/// Extract the text of every page, concatenated in page order.
pub fn extract_text(data: &[u8]) -> ExtractResult<String> {
    // pdf-extract panics on some malformed inputs.
    let result = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data)));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf {
            message: e.to_string(),
        }),
        Err(_) => Err(ExtractError::Pdf {
            message: "text extractor panicked on malformed input".to_string(),
        }),
    }
}

/// Extract every decodable embedded image, in page order then in-page order.
pub fn extract_images(data: &[u8]) -> ExtractResult<Vec<PageImage>> {
    let doc = Document::load_mem(data).map_err(|e| ExtractError::Pdf {
        message: format!("failed to load PDF: {e}"),
    })?;

    let mut images = Vec::new();
    for (page, page_id) in doc.get_pages() {
        let page_images = doc.get_page_images(page_id).map_err(|e| ExtractError::Pdf {
            message: format!("failed to list images on page {page}: {e}"),
        })?;

        for image in page_images {
            let Ok(stream) = doc.get_object(image.id).and_then(Object::as_stream) else {
                tracing::warn!(page, "skipping unreadable image stream {:?}", image.id);
                continue;
            };
            match encode_image(&doc, stream) {
                Some(data) => images.push(PageImage { page, data }),
                None => tracing::debug!(page, "skipping undecodable image {:?}", image.id),
            }
        }
    }
    Ok(images)
}

// ── Image decoding ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorSpace>, lookup: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

/// Decoded 8-bit pixels.
enum Pixels {
    Gray(Vec<u8>),
    Rgb(Vec<u8>),
}

/// Turn an image XObject stream into self-describing image bytes, or
/// `None` if the samples cannot be decoded.
fn encode_image(doc: &Document, stream: &Stream) -> Option<Vec<u8>> {
    let dict = &stream.dict;
    let filters = stream_filters(dict);

    if let [only] = filters.as_slice() {
        if only == b"DCTDecode" || only == b"JPXDecode" {
            return Some(stream.content.clone());
        }
    }
    let opaque: [&[u8]; 4] = [b"DCTDecode", b"JPXDecode", b"CCITTFaxDecode", b"JBIG2Decode"];
    if filters.iter().any(|f| opaque.contains(&f.as_slice())) {
        return None;
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().ok()?
    };

    let width = usize::try_from(dict.get(b"Width").and_then(Object::as_i64).ok()?).ok()?;
    let height = usize::try_from(dict.get(b"Height").and_then(Object::as_i64).ok()?).ok()?;
    if width == 0 || height == 0 {
        return None;
    }

    let image_mask = dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    let (space, bits) = if image_mask {
        (ColorSpace::Gray, 1)
    } else {
        let space = color_space(doc, dict.get(b"ColorSpace").ok()?)?;
        let bits = dict
            .get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .unwrap_or(8);
        (space, usize::try_from(bits).ok()?)
    };
    if !matches!(bits, 1 | 2 | 4 | 8) {
        return None;
    }

    if bits == 1 && space == ColorSpace::Gray {
        let row_bytes = width.div_ceil(8);
        let packed = samples.get(..row_bytes * height)?;
        // PDF gray: 0 is black. PBM: 1 is black. A [1 0] Decode array flips PDF.
        let flip = !decode_inverted(dict);
        let bits: Vec<u8> = packed.iter().map(|b| if flip { !b } else { *b }).collect();
        return Some(pnm("P4", width, height, None, &bits));
    }

    let values = unpack(&samples, width, height, space.components(), bits)?;
    let pixels = match &space {
        ColorSpace::Indexed { base, lookup } => expand_palette(&values, base, lookup)?,
        other => {
            let scaled: Vec<u8> = values.iter().map(|v| scale(*v, bits)).collect();
            to_pixels(other, &scaled)?
        }
    };

    Some(match pixels {
        Pixels::Gray(data) => pnm("P5", width, height, Some(255), &data),
        Pixels::Rgb(data) => pnm("P6", width, height, Some(255), &data),
    })
}

/// Resolve `/ColorSpace`, following references and ICC profile `/N`.
fn color_space(doc: &Document, object: &Object) -> Option<ColorSpace> {
    match resolve(doc, object) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            _ => None,
        },
        Object::Array(items) => {
            let family = resolve(doc, items.first()?).as_name().ok()?;
            match family {
                b"CalGray" => Some(ColorSpace::Gray),
                b"CalRGB" => Some(ColorSpace::Rgb),
                b"ICCBased" => {
                    let profile = resolve(doc, items.get(1)?).as_stream().ok()?;
                    match profile.dict.get(b"N").and_then(Object::as_i64).ok()? {
                        1 => Some(ColorSpace::Gray),
                        3 => Some(ColorSpace::Rgb),
                        4 => Some(ColorSpace::Cmyk),
                        _ => None,
                    }
                }
                b"Indexed" | b"I" => {
                    let base = color_space(doc, items.get(1)?)?;
                    if matches!(base, ColorSpace::Indexed { .. }) {
                        return None;
                    }
                    let lookup = match resolve(doc, items.get(3)?) {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(table) => table
                            .decompressed_content()
                            .unwrap_or_else(|_| table.content.clone()),
                        _ => return None,
                    };
                    Some(ColorSpace::Indexed {
                        base: Box::new(base),
                        lookup,
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Follow indirect references (bounded, so reference cycles terminate).
fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> &'a Object {
    for _ in 0..8 {
        match object {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => object = target,
                Err(_) => break,
            },
            _ => break,
        }
    }
    object
}

/// Whether `/Decode` starts at 1 (`[1 0]`), inverting sample values.
fn decode_inverted(dict: &Dictionary) -> bool {
    let Ok(Object::Array(decode)) = dict.get(b"Decode") else {
        return false;
    };
    match decode.first() {
        Some(Object::Integer(v)) => *v == 1,
        Some(Object::Real(v)) => (*v as f32 - 1.0).abs() < f32::EPSILON,
        _ => false,
    }
}

/// Unpack `bits`-wide samples into one byte per component. Rows are
/// padded to a byte boundary.
fn unpack(samples: &[u8], width: usize, height: usize, comps: usize, bits: usize) -> Option<Vec<u8>> {
    let per_row = width * comps;
    let row_bytes = (per_row * bits).div_ceil(8);
    if samples.len() < row_bytes * height {
        return None;
    }
    if bits == 8 {
        return Some(samples[..row_bytes * height].to_vec());
    }

    let mask = (1u16 << bits) - 1;
    let mut values = Vec::with_capacity(per_row * height);
    for row in samples.chunks(row_bytes).take(height) {
        for i in 0..per_row {
            let bit = i * bits;
            let byte = row[bit / 8] as u16;
            let shift = 8 - bits - (bit % 8);
            values.push(((byte >> shift) & mask) as u8);
        }
    }
    Some(values)
}

/// Scale a `bits`-wide value to 0..=255.
fn scale(value: u8, bits: usize) -> u8 {
    let max = (1u16 << bits) - 1;
    ((value as u16 * 255) / max) as u8
}

fn to_pixels(space: &ColorSpace, values: &[u8]) -> Option<Pixels> {
    match space {
        ColorSpace::Gray => Some(Pixels::Gray(values.to_vec())),
        ColorSpace::Rgb => Some(Pixels::Rgb(values.to_vec())),
        ColorSpace::Cmyk => Some(Pixels::Rgb(
            values.chunks_exact(4).flat_map(cmyk_to_rgb).collect(),
        )),
        ColorSpace::Indexed { .. } => None,
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> [u8; 3] {
    let k = 255 - cmyk[3] as u16;
    let channel = |c: u8| ((255 - c as u16) * k / 255) as u8;
    [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
}

/// Map palette indices through the lookup table of an indexed colour space.
fn expand_palette(indices: &[u8], base: &ColorSpace, lookup: &[u8]) -> Option<Pixels> {
    let n = base.components();
    let mut values = Vec::with_capacity(indices.len() * n);
    for &index in indices {
        let start = index as usize * n;
        match lookup.get(start..start + n) {
            Some(entry) => values.extend_from_slice(entry),
            None => values.extend(std::iter::repeat_n(0, n)),
        }
    }
    to_pixels(base, &values)
}

fn pnm(magic: &str, width: usize, height: usize, maxval: Option<u8>, data: &[u8]) -> Vec<u8> {
    let mut out = match maxval {
        Some(max) => format!("{magic}\n{width} {height}\n{max}\n"),
        None => format!("{magic}\n{width} {height}\n"),
    }
    .into_bytes();
    out.extend_from_slice(data);
    out
}

/// `/Filter` as a list of names (a single name or an array).
fn stream_filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};

    /// An image XObject to embed in a test PDF.
    pub(crate) struct TestImage {
        /// Device colour space name; the base space when `palette` is set.
        pub color_space: &'static str,
        /// Use `[/ICCBased <</N n>>]` instead of `color_space`.
        pub icc_components: Option<i64>,
        /// Use `[/Indexed color_space hival <palette>]`.
        pub palette: Option<Vec<u8>>,
        pub filter: Option<&'static str>,
        pub bits: i64,
        pub width: i64,
        pub height: i64,
        pub data: Vec<u8>,
    }

    impl TestImage {
        pub(crate) fn jpeg(data: &[u8]) -> Self {
            Self {
                filter: Some("DCTDecode"),
                ..Self::raw("DeviceRGB", 4, 4, data)
            }
        }

        pub(crate) fn raw(color_space: &'static str, width: i64, height: i64, data: &[u8]) -> Self {
            Self {
                color_space,
                icc_components: None,
                palette: None,
                filter: None,
                bits: 8,
                width,
                height,
                data: data.to_vec(),
            }
        }
    }

    /// Build a PDF with one text line per page and the given images.
    pub(crate) fn build_pdf(pages: &[(&str, Vec<TestImage>)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut kids = Vec::new();
        for (text, images) in pages {
            let mut xobjects = Dictionary::new();
            for (i, image) in images.iter().enumerate() {
                let color_space: Object = if let Some(n) = image.icc_components {
                    let profile = doc.add_object(Stream::new(dictionary! { "N" => n }, Vec::new()));
                    vec![Object::Name(b"ICCBased".to_vec()), profile.into()].into()
                } else if let Some(palette) = &image.palette {
                    let hival = (palette.len() / 3) as i64 - 1;
                    vec![
                        Object::Name(b"Indexed".to_vec()),
                        image.color_space.into(),
                        hival.into(),
                        Object::string_literal(palette.clone()),
                    ]
                    .into()
                } else {
                    image.color_space.into()
                };
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width,
                    "Height" => image.height,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => image.bits,
                };
                if let Some(filter) = image.filter {
                    dict.set("Filter", filter);
                }
                let image_id = doc.add_object(Stream::new(dict, image.data.clone()));
                xobjects.set(format!("Im{i}"), image_id);
            }

            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let resources_id = doc.add_object(dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            });
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn text_from_non_pdf_is_error() {
        assert!(extract_text(b"This is not a PDF").is_err());
    }

    #[test]
    fn images_from_non_pdf_is_error() {
        assert!(matches!(
            extract_images(b"This is not a PDF"),
            Err(ExtractError::Pdf { .. })
        ));
    }

    #[test]
    fn text_in_page_order() {
        let pdf = build_pdf(&[("Alpha", vec![]), ("Bravo", vec![])]);
        let text = extract_text(&pdf).unwrap();
        let alpha = text.find("Alpha").unwrap();
        let bravo = text.find("Bravo").unwrap();
        assert!(alpha < bravo);
    }

    #[test]
    fn images_in_page_and_in_page_order() {
        let pdf = build_pdf(&[
            (
                "One",
                vec![TestImage::jpeg(b"jpeg-one-a"), TestImage::jpeg(b"jpeg-one-b")],
            ),
            ("Two", vec![]),
            ("Three", vec![TestImage::jpeg(b"jpeg-three")]),
        ]);
        let images = extract_images(&pdf).unwrap();
        let summary: Vec<(u32, &[u8])> =
            images.iter().map(|i| (i.page, i.data.as_slice())).collect();
        assert_eq!(
            summary,
            vec![
                (1, &b"jpeg-one-a"[..]),
                (1, &b"jpeg-one-b"[..]),
                (3, &b"jpeg-three"[..]),
            ]
        );
    }

    #[test]
    fn raw_gray_image_wrapped_as_pgm() {
        let pdf = build_pdf(&[(
            "Gray",
            vec![TestImage::raw("DeviceGray", 2, 2, &[0, 255, 255, 0])],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data, b"P5\n2 2\n255\n\x00\xff\xff\x00");
    }

    #[test]
    fn icc_based_rgb_wrapped_as_ppm() {
        let pdf = build_pdf(&[(
            "Icc",
            vec![TestImage {
                icc_components: Some(3),
                ..TestImage::raw("DeviceRGB", 1, 1, &[10, 20, 30])
            }],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(images[0].data, b"P6\n1 1\n255\n\x0a\x14\x1e");
    }

    #[test]
    fn icc_based_gray_wrapped_as_pgm() {
        let pdf = build_pdf(&[(
            "Icc",
            vec![TestImage {
                icc_components: Some(1),
                ..TestImage::raw("DeviceGray", 2, 1, &[7, 9])
            }],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(images[0].data, b"P5\n2 1\n255\n\x07\x09");
    }

    #[test]
    fn one_bit_scan_becomes_inverted_pbm() {
        // 10 pixels wide: two bytes per row, second byte padded.
        let pdf = build_pdf(&[(
            "Bilevel",
            vec![TestImage {
                bits: 1,
                ..TestImage::raw("DeviceGray", 10, 1, &[0b1010_1010, 0b1100_0000])
            }],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(images[0].data, b"P4\n10 1\n\x55\x3f");
    }

    #[test]
    fn indexed_palette_expanded_to_rgb() {
        let pdf = build_pdf(&[(
            "Indexed",
            vec![TestImage {
                palette: Some(vec![0, 0, 0, 255, 128, 0]),
                ..TestImage::raw("DeviceRGB", 2, 1, &[1, 0])
            }],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(
            images[0].data,
            b"P6\n2 1\n255\n\xff\x80\x00\x00\x00\x00"
        );
    }

    #[test]
    fn four_bit_gray_scaled_to_eight_bits() {
        let pdf = build_pdf(&[(
            "Nibbles",
            vec![TestImage {
                bits: 4,
                ..TestImage::raw("DeviceGray", 2, 1, &[0xf0])
            }],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(images[0].data, b"P5\n2 1\n255\n\xff\x00");
    }

    #[test]
    fn fax_and_unknown_images_are_skipped() {
        let pdf = build_pdf(&[(
            "Skipped",
            vec![
                TestImage {
                    filter: Some("CCITTFaxDecode"),
                    bits: 1,
                    ..TestImage::raw("DeviceGray", 8, 1, &[0x00])
                },
                TestImage::raw("Separation", 1, 1, &[0]),
                TestImage::jpeg(b"kept"),
            ],
        )]);
        let images = extract_images(&pdf).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data, b"kept");
    }

    #[test]
    fn truncated_samples_are_skipped() {
        let pdf = build_pdf(&[("Short", vec![TestImage::raw("DeviceRGB", 4, 4, &[1, 2, 3])])]);
        assert!(extract_images(&pdf).unwrap().is_empty());
    }

    #[test]
    fn pdf_without_images() {
        let pdf = build_pdf(&[("Only text", vec![])]);
        assert!(extract_images(&pdf).unwrap().is_empty());
    }
}
