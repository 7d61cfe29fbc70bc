use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};

/// A frame file picked for a photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAsset {
    /// 1 or 2.
    pub number: u8,
    pub path: PathBuf,
}

/// The two decorative frames, alternated by the parity of the photo number.
#[derive(Debug, Clone)]
pub struct FrameSet {
    frames: [PathBuf; 2],
}

impl FrameSet {
    pub fn new(frame1: impl Into<PathBuf>, frame2: impl Into<PathBuf>) -> Self {
        Self {
            frames: [frame1.into(), frame2.into()],
        }
    }

    /// `frame1.png` and `frame2.png` inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("frame1.png"), dir.join("frame2.png"))
    }

    /// Pick the frame for `photo_name`, falling back to the other one if the file is gone.
    pub fn select(&self, photo_name: &str) -> Result<FrameAsset, PostProcessError> {
        let preferred = preferred_frame(photo_name);
        let fallback = 3 - preferred;
        for number in [preferred, fallback] {
            let path = &self.frames[usize::from(number - 1)];
            if path.is_file() {
                if number != preferred {
                    tracing::warn!(
                        photo_name,
                        missing = %self.frames[usize::from(preferred - 1)].display(),
                        "Preferred frame missing, using the other one"
                    );
                }
                return Ok(FrameAsset {
                    number,
                    path: path.clone(),
                });
            }
        }
        Err(PostProcessError::AssetMissing(format!(
            "no frame found at {} or {}",
            self.frames[0].display(),
            self.frames[1].display()
        )))
    }

    /// Pick and read the frame for `photo_name`.
    pub async fn load(&self, photo_name: &str) -> Result<(FrameAsset, Vec<u8>), PostProcessError> {
        let asset = self.select(photo_name)?;
        let bytes = tokio::fs::read(&asset.path).await?;
        Ok((asset, bytes))
    }
}

/// Frame 1 for an odd trailing number or no number at all, frame 2 for even.
pub fn preferred_frame(photo_name: &str) -> u8 {
    match photo_name.chars().last().and_then(|c| c.to_digit(10)) {
        Some(digit) if digit % 2 == 0 => 2,
        _ => 1,
    }
}

/// Lay `frame` over `base` and encode the result as PNG.
///
/// The frame is cover-fitted (scaled and centre-cropped) to the base image's exact
/// dimensions. Pure: identical inputs always give identical bytes.
pub fn compose(base: &[u8], frame: &[u8]) -> Result<Vec<u8>, PostProcessError> {
    let base = image::load_from_memory(base)?.to_rgba8();
    let (width, height) = base.dimensions();

    let fitted = image::load_from_memory(frame)?
        .resize_to_fill(width, height, FilterType::Lanczos3)
        .to_rgba8();

    let mut canvas = RgbaImage::new(width, height);
    imageops::overlay(&mut canvas, &base, 0, 0);
    imageops::overlay(&mut canvas, &fitted, 0, 0);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[derive(Debug, thiserror::Error)]
pub enum PostProcessError {
    #[error("Frame asset missing: {0}")]
    AssetMissing(String),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to read frame: {0}")]
    Io(#[from] std::io::Error),
}
