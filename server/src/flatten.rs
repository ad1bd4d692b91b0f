use std::io::Cursor;

use image::{imageops, DynamicImage, ImageFormat, RgbaImage};

use crate::error::StoreError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, StoreError> {
    if !bytes.starts_with(&PNG_SIGNATURE) {
        return Err(StoreError::BadImage("mask is not a PNG".to_string()));
    }
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(image.to_rgba8())
}

pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>, StoreError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Composites `incoming` over `previous`, anchored at the top-left corner. The result covers
/// both inputs.
pub fn flatten_masks(previous: Option<&[u8]>, incoming: &[u8]) -> Result<Vec<u8>, StoreError> {
    let incoming = decode_png(incoming)?;
    let Some(previous) = previous else {
        return encode_png(incoming);
    };
    let previous = decode_png(previous)?;
    let width = previous.width().max(incoming.width());
    let height = previous.height().max(incoming.height());
    let mut canvas = RgbaImage::new(width, height);
    imageops::overlay(&mut canvas, &previous, 0, 0);
    imageops::overlay(&mut canvas, &incoming, 0, 0);
    encode_png(canvas)
}

pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([234, 93, 86, 255]);
    const BLUE: Rgba<u8> = Rgba([83, 167, 245, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn png(width: u32, height: u32, paint: &[(u32, u32, Rgba<u8>)]) -> Vec<u8> {
        let mut image = RgbaImage::from_pixel(width, height, CLEAR);
        for &(x, y, color) in paint {
            image.put_pixel(x, y, color);
        }
        encode_png(image).unwrap()
    }

    #[test]
    fn first_mask_is_stored_as_is() {
        let flattened = flatten_masks(None, &png(4, 4, &[(1, 1, RED)])).unwrap();
        let image = decode_png(&flattened).unwrap();
        assert_eq!(image.get_pixel(1, 1), &RED);
        assert_eq!(image.get_pixel(0, 0), &CLEAR);
    }

    #[test]
    fn later_strokes_accumulate_over_earlier_ones() {
        let previous = png(4, 4, &[(1, 1, RED), (2, 2, RED)]);
        let incoming = png(4, 4, &[(2, 2, BLUE), (3, 3, BLUE)]);
        let image = decode_png(&flatten_masks(Some(&previous), &incoming).unwrap()).unwrap();
        assert_eq!(image.get_pixel(1, 1), &RED);
        assert_eq!(image.get_pixel(2, 2), &BLUE);
        assert_eq!(image.get_pixel(3, 3), &BLUE);
    }

    #[test]
    fn flattened_mask_covers_both_sizes() {
        let previous = png(6, 2, &[(5, 1, RED)]);
        let incoming = png(2, 6, &[(1, 5, BLUE)]);
        let image = decode_png(&flatten_masks(Some(&previous), &incoming).unwrap()).unwrap();
        assert_eq!(image.dimensions(), (6, 6));
        assert_eq!(image.get_pixel(5, 1), &RED);
        assert_eq!(image.get_pixel(1, 5), &BLUE);
    }

    #[test]
    fn non_png_payloads_are_rejected() {
        assert!(matches!(
            flatten_masks(None, b"GIF89a"),
            Err(StoreError::BadImage(_))
        ));
    }
}
