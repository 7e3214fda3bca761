// src/crop.rs
//
// Cut a detection's pixels out of the frame and JPEG-encode them for the
// crop archive and the description service.

use anyhow::{Context, Result};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;

use crate::geometry::BoundingBox;
use crate::types::Frame;

/// Owned RGB pixels of one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CropImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// `frame[y1:y2, x1:x2]` with the box clamped to the frame.
/// None when nothing is left (zero width/height or fully outside).
pub fn extract_crop(frame: &Frame, bbox: &BoundingBox) -> Option<CropImage> {
    let (tl, br) = bbox.corners();
    let clamp_x = |v: i32| (v.max(0) as usize).min(frame.width);
    let clamp_y = |v: i32| (v.max(0) as usize).min(frame.height);

    let (x1, x2) = (clamp_x(tl.x), clamp_x(br.x));
    let (y1, y2) = (clamp_y(tl.y), clamp_y(br.y));
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    if frame.data.len() < frame.width * frame.height * 3 {
        return None;
    }

    let width = x2 - x1;
    let height = y2 - y1;
    let stride = frame.width * 3;
    let mut data = Vec::with_capacity(width * height * 3);
    for row in y1..y2 {
        let start = row * stride + x1 * 3;
        data.extend_from_slice(&frame.data[start..start + width * 3]);
    }

    Some(CropImage {
        data,
        width,
        height,
    })
}

pub fn encode_jpeg(crop: &CropImage, quality: u8) -> Result<Vec<u8>> {
    let img: RgbImage =
        ImageBuffer::from_raw(crop.width as u32, crop.height as u32, crop.data.clone())
            .context("crop buffer does not match its dimensions")?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .context("JPEG encoding failed")?;
    Ok(buf.into_inner())
}
