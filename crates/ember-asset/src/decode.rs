//! Parallel decoding of scene images to RGBA8.

use std::borrow::Cow;
use std::path::PathBuf;

use rayon::prelude::*;

/// A decoded RGBA8 image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub pixels: Vec<u8>,
    /// Colour data (sRGB) as opposed to linear data such as normals.
    pub srgb: bool,
}

/// Where the encoded bytes of an image live.
#[derive(Clone, Debug)]
pub enum ImageSource<'a> {
    /// Encoded bytes in memory: a buffer view, the GLB chunk or a decoded
    /// `data:` URI.
    Bytes {
        bytes: Cow<'a, [u8]>,
        mime_type: Option<&'a str>,
    },
    /// External file relative to the scene.
    File(PathBuf),
    /// A source this loader cannot read; carries the reason.
    Unsupported(String),
}

/// Decode every source into RGBA8, in parallel.
///
/// Work is split into one contiguous chunk per hardware thread. The result
/// keeps the input order. Images that fail to decode come back as `None`
/// and a warning is logged; callers substitute a default texture.
pub fn decode_images(sources: &[ImageSource<'_>], srgb: &[bool]) -> Vec<Option<ImageData>> {
    if sources.is_empty() {
        return Vec::new();
    }
    let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    let chunk_size = sources.len().div_ceil(threads).max(1);
    tracing::debug!(
        "Decoding {} images on {} threads ({} per chunk)",
        sources.len(),
        threads,
        chunk_size
    );

    sources
        .par_chunks(chunk_size)
        .enumerate()
        .flat_map_iter(|(chunk_index, chunk)| {
            chunk.iter().enumerate().map(move |(offset, source)| {
                let index = chunk_index * chunk_size + offset;
                let is_srgb = srgb.get(index).copied().unwrap_or(true);
                match decode_one(source) {
                    Ok(image) => Some(ImageData {
                        srgb: is_srgb,
                        ..image
                    }),
                    Err(reason) => {
                        tracing::warn!("Image {index} could not be decoded: {reason}");
                        None
                    }
                }
            })
        })
        .collect()
}

fn decode_one(source: &ImageSource<'_>) -> Result<ImageData, String> {
    let decoded = match source {
        ImageSource::Bytes { bytes, mime_type } => {
            match mime_type.and_then(image::ImageFormat::from_mime_type) {
                Some(format) => image::load_from_memory_with_format(bytes, format),
                None => image::load_from_memory(bytes),
            }
            .map_err(|e| e.to_string())?
        }
        ImageSource::File(path) => {
            image::open(path).map_err(|e| format!("{}: {e}", path.display()))?
        }
        ImageSource::Unsupported(reason) => return Err(reason.clone()),
    };

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err("image has zero size".into());
    }
    Ok(ImageData {
        width,
        height,
        pixels: rgba.into_raw(),
        srgb: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decodes_in_input_order() {
        let pngs: Vec<_> = (0..9u8)
            .map(|i| encode_png(u32::from(i) + 1, 1, [i, 0, 0, 255]))
            .collect();
        let sources: Vec<_> = pngs
            .iter()
            .map(|bytes| ImageSource::Bytes {
                bytes: Cow::Borrowed(bytes.as_slice()),
                mime_type: Some("image/png"),
            })
            .collect();
        let srgb: Vec<_> = (0..9).map(|i| i % 2 == 0).collect();

        let decoded = decode_images(&sources, &srgb);
        assert_eq!(decoded.len(), 9);
        for (i, image) in decoded.iter().enumerate() {
            let image = image.as_ref().unwrap();
            assert_eq!(image.width, i as u32 + 1);
            assert_eq!(image.pixels[0], i as u8);
            assert_eq!(image.srgb, i % 2 == 0);
            assert_eq!(image.pixels.len(), (image.width * 4) as usize);
        }
    }

    #[test]
    fn undecodable_images_become_none() {
        let png = encode_png(2, 2, [255; 4]);
        let sources = [
            ImageSource::Bytes {
                bytes: Cow::Borrowed(&b"not an image"[..]),
                mime_type: None,
            },
            ImageSource::Bytes {
                bytes: Cow::Borrowed(png.as_slice()),
                mime_type: None,
            },
            ImageSource::Unsupported("unsupported data URI encoding".into()),
            ImageSource::File(PathBuf::from("missing/texture.png")),
        ];
        let decoded = decode_images(&sources, &[]);
        assert!(decoded[0].is_none());
        assert!(decoded[1].is_some());
        assert!(decoded[2].is_none());
        assert!(decoded[3].is_none());
    }

    #[test]
    fn empty_input() {
        assert!(decode_images(&[], &[]).is_empty());
    }
}
