// src/source.rs
//
// Frame sources. Every frame is resized to the configured working size
// (640x360 by default) before the tracker sees it; region coordinates are in
// that space.

use anyhow::Result;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::types::{Frame, VideoConfig};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Nominal frame spacing for sources without their own clock.
const NOMINAL_FRAME_MS: f64 = 1000.0 / 30.0;

pub trait FrameSource: Send {
    /// Next frame, or None at end of stream. Frame ids start at 1.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Pick a source for `path`: a directory (or single image) is read as an
/// image sequence, anything else needs the `opencv` feature.
pub fn open_source(path: &Path, video: &VideoConfig) -> Result<Box<dyn FrameSource>> {
    if !path.exists() {
        return Err(ConfigError::MissingSource(path.to_path_buf()).into());
    }

    if path.is_dir() || is_image(path) {
        return Ok(Box::new(ImageSequenceSource::open(
            path,
            video.frame_width,
            video.frame_height,
        )?));
    }

    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(VideoFileSource::open(
            path,
            video.frame_width,
            video.frame_height,
        )?))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Err(ConfigError::UnsupportedSource(path.to_path_buf()).into())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ============================================================================
// IMAGE SEQUENCE
// ============================================================================

pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    next_id: u64,
    width: u32,
    height: u32,
}

impl ImageSequenceSource {
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self> {
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_image(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        let source = Self {
            files,
            cursor: 0,
            next_id: 1,
            width,
            height,
        };
        if source.is_empty() {
            warn!("⚠️  No frame images in {}", path.display());
        } else {
            info!("📂 Found {} frame image(s) in {}", source.len(), path.display());
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.files.get(self.cursor) {
            self.cursor += 1;

            let img = match image::open(path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("⚠️  Skipping unreadable frame {}: {}", path.display(), e);
                    continue;
                }
            };

            let rgb = img.to_rgb8();
            let rgb = if rgb.dimensions() == (self.width, self.height) {
                rgb
            } else {
                image::imageops::resize(&rgb, self.width, self.height, FilterType::Triangle)
            };

            let frame_id = self.next_id;
            self.next_id += 1;
            return Ok(Some(Frame::new(
                rgb.into_raw(),
                self.width as usize,
                self.height as usize,
                frame_id,
                (frame_id - 1) as f64 * NOMINAL_FRAME_MS,
            )));
        }
        Ok(None)
    }
}

// ============================================================================
// VIDEO FILE (opencv)
// ============================================================================

#[cfg(feature = "opencv")]
pub struct VideoFileSource {
    cap: opencv::videoio::VideoCapture,
    fps: f64,
    next_id: u64,
    width: i32,
    height: i32,
}

#[cfg(feature = "opencv")]
impl VideoFileSource {
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self> {
        use anyhow::Context as _;
        use opencv::videoio::{self, VideoCapture, VideoCaptureTraitConst};

        info!("Opening video: {}", path.display());
        let path_str = path
            .to_str()
            .with_context(|| format!("non UTF-8 path {}", path.display()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("❌ Failed to open video file '{}'", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i64;
        info!("Video properties: {:.1} FPS, {} frames", fps, total);

        Ok(Self {
            cap,
            fps: if fps > 0.0 { fps } else { 30.0 },
            next_id: 1,
            width: width as i32,
            height: height as i32,
        })
    }
}

#[cfg(feature = "opencv")]
impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::{
            core::{Mat, Size},
            imgproc,
            prelude::*,
            videoio::VideoCaptureTrait,
        };

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        let mut resized = Mat::default();
        imgproc::resize(
            &mat,
            &mut resized,
            Size::new(self.width, self.height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        let mut rgb = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let frame_id = self.next_id;
        self.next_id += 1;
        Ok(Some(Frame::new(
            rgb.data_bytes()?.to_vec(),
            self.width as usize,
            self.height as usize,
            frame_id,
            (frame_id - 1) as f64 / self.fps * 1000.0,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_image_sequence_is_sorted_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(32, 16, Rgb([255, 0, 0]))
            .save(dir.path().join("frame_002.png"))
            .unwrap();
        RgbImage::from_pixel(32, 16, Rgb([0, 0, 255]))
            .save(dir.path().join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 8, 4).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.frame_id, 1);
        assert_eq!((first.width, first.height), (8, 4));
        assert_eq!(first.data.len(), 8 * 4 * 3);
        assert_eq!(&first.data[..3], &[0, 0, 255]);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.frame_id, 2);
        assert_eq!(&second.data[..3], &[255, 0, 0]);

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_unreadable_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"garbage").unwrap();
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]))
            .save(dir.path().join("b.png"))
            .unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 4, 4).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.frame_id, 1);
        assert_eq!(&frame.data[..3], &[1, 2, 3]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_directory_without_images_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), "no frames here").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 4, 4).unwrap();
        assert!(source.is_empty());
        assert_eq!(source.len(), 0);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_source_is_a_config_error() {
        let err = open_source(Path::new("/no/such/video.mp4"), &VideoConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingSource(_))
        ));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_video_file_needs_opencv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();
        let err = open_source(&path, &VideoConfig::default()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnsupportedSource(_))
        ));
    }
}
