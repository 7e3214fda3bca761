// src/render.rs
//
// Frame overlay and output.
//
// The overlay is the monitored region (green, double line width) plus one
// box per tracked detection, coloured by track id. `HeadlessDisplay` can dump
// annotated frames to disk; `WindowDisplay` (opencv feature) shows them live,
// quits on `q` and echoes mouse positions for region calibration.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::PathBuf;
use tracing::info;

use crate::geometry::Region;
use crate::pipeline::extractor::Annotation;
use crate::types::Frame;

pub const REGION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Ultralytics default palette, RGB.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

/// Label tag: pixels per character, and height before line width.
const TAG_CHAR_W: u32 = 8;
const TAG_BASE_H: u32 = 12;

pub fn track_color(track_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[track_id as usize % PALETTE.len()])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    Quit,
}

pub trait FrameDisplay: Send {
    fn show(
        &mut self,
        frame: &Frame,
        region: &Region,
        annotations: &[Annotation],
    ) -> Result<DisplayControl>;
}

/// Draw region and boxes onto a copy of the frame.
pub fn annotate(
    frame: &Frame,
    region: &Region,
    annotations: &[Annotation],
    line_width: u32,
) -> Result<RgbImage> {
    let mut canvas = RgbImage::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
        .context("frame buffer does not match its dimensions")?;
    let lw = line_width.max(1) as i32;

    // Region is drawn at twice the box width.
    for (a, b) in region.segments() {
        for dx in -lw..lw {
            for dy in -lw..lw {
                draw_line_segment_mut(
                    &mut canvas,
                    ((a.x + dx) as f32, (a.y + dy) as f32),
                    ((b.x + dx) as f32, (b.y + dy) as f32),
                    REGION_COLOR,
                );
            }
        }
    }

    for ann in annotations {
        let color = track_color(ann.track_id);
        let (tl, br) = ann.bbox.corners();
        for inset in 0..lw {
            let w = br.x - tl.x - 2 * inset;
            let h = br.y - tl.y - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(tl.x + inset, tl.y + inset).of_size(w as u32, h as u32),
                color,
            );
        }

        draw_filled_rect_mut(&mut canvas, label_tag(ann, line_width), color);
    }

    Ok(canvas)
}

/// Tag sitting on top of a box, sized for its label and kept inside the top
/// edge of the frame.
pub fn label_tag(ann: &Annotation, line_width: u32) -> Rect {
    let (tl, _) = ann.bbox.corners();
    let w = (ann.label.len() as u32 * TAG_CHAR_W).max(TAG_CHAR_W);
    let h = TAG_BASE_H + 2 * line_width.max(1);
    Rect::at(tl.x, (tl.y - h as i32).max(0)).of_size(w, h)
}

// ============================================================================
// HEADLESS
// ============================================================================

pub struct HeadlessDisplay {
    output_dir: Option<PathBuf>,
    line_width: u32,
}

impl HeadlessDisplay {
    pub fn new(output_dir: Option<PathBuf>, line_width: u32) -> Result<Self> {
        if let Some(dir) = &output_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            info!("🖼️  Saving annotated frames to {}", dir.display());
        }
        Ok(Self {
            output_dir,
            line_width,
        })
    }
}

impl FrameDisplay for HeadlessDisplay {
    fn show(
        &mut self,
        frame: &Frame,
        region: &Region,
        annotations: &[Annotation],
    ) -> Result<DisplayControl> {
        if let Some(dir) = &self.output_dir {
            let canvas = annotate(frame, region, annotations, self.line_width)?;
            let path = dir.join(format!("frame_{:06}.jpg", frame.frame_id));
            canvas
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(DisplayControl::Continue)
    }
}

// ============================================================================
// WINDOW (opencv)
// ============================================================================

#[cfg(feature = "opencv")]
pub struct WindowDisplay {
    window: String,
    line_width: u32,
}

#[cfg(feature = "opencv")]
impl WindowDisplay {
    pub fn new(window: &str, line_width: u32) -> Result<Self> {
        use opencv::highgui;

        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
        highgui::set_mouse_callback(
            window,
            Some(Box::new(|event, x, y, _flags| {
                if event == highgui::EVENT_MOUSEMOVE {
                    info!("Mouse Position: x={}, y={}", x, y);
                }
            })),
        )?;

        Ok(Self {
            window: window.to_string(),
            line_width,
        })
    }
}

#[cfg(feature = "opencv")]
impl FrameDisplay for WindowDisplay {
    fn show(
        &mut self,
        frame: &Frame,
        region: &Region,
        annotations: &[Annotation],
    ) -> Result<DisplayControl> {
        use opencv::{
            core::{self, Mat},
            highgui, imgproc,
            prelude::*,
        };

        let canvas = annotate(frame, region, annotations, self.line_width)?;
        let flat = Mat::from_slice(canvas.as_raw())?;
        let rgb = flat.reshape(3, frame.height as i32)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color(&*rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;

        // "ID: n | type" on each box's tag
        for ann in annotations {
            let tag = label_tag(ann, self.line_width);
            imgproc::put_text(
                &mut bgr,
                &ann.label,
                core::Point::new(tag.left() + 2, tag.bottom() - 3),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.4,
                core::Scalar::new(255.0, 255.0, 255.0, 0.0),
                1,
                imgproc::LINE_AA,
                false,
            )?;
        }

        highgui::imshow(&self.window, &bgr)?;
        if highgui::wait_key(1)? & 0xFF == 'q' as i32 {
            return Ok(DisplayControl::Quit);
        }
        Ok(DisplayControl::Continue)
    }
}

#[cfg(feature = "opencv")]
impl Drop for WindowDisplay {
    fn drop(&mut self) {
        let _ = opencv::highgui::destroy_all_windows();
    }
}
