//! Image and frame fixtures generated on the fly

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use photo_ia_backend::services::post_processor::FrameSet;
use tempfile::TempDir;

/// Border colour of frame1.png
pub const FRAME1_COLOR: [u8; 4] = [220, 30, 30, 255];
/// Border colour of frame2.png
pub const FRAME2_COLOR: [u8; 4] = [30, 30, 220, 255];

fn encode(img: RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Solid PNG.
pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    encode(RgbaImage::from_pixel(width, height, Rgba(color)))
}

/// PNG with an opaque border a quarter of the width thick and a transparent middle.
///
/// The border is wide enough that its corner survives downscaling unblended.
pub fn frame_png(width: u32, height: u32, border: [u8; 4]) -> Vec<u8> {
    let edge = width.min(height) / 4;
    encode(RgbaImage::from_fn(width, height, |x, y| {
        if x < edge || y < edge || x >= width - edge || y >= height - edge {
            Rgba(border)
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

/// Assert a pixel matches `expected` up to resampling rounding.
pub fn assert_color_near(actual: [u8; 4], expected: [u8; 4]) {
    for (got, want) in actual.iter().zip(expected) {
        assert!(got.abs_diff(want) <= 2, "pixel {actual:?}, expected {expected:?}");
    }
}

/// A temporary frame directory. Dropping it removes the files.
pub struct FrameDir {
    pub dir: TempDir,
}

impl FrameDir {
    /// Both frames present.
    pub fn complete() -> Self {
        let fixture = Self::empty();
        fixture.write(1, FRAME1_COLOR);
        fixture.write(2, FRAME2_COLOR);
        fixture
    }

    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn write(&self, number: u8, border: [u8; 4]) {
        std::fs::write(
            self.dir.path().join(format!("frame{number}.png")),
            frame_png(64, 64, border),
        )
        .expect("write frame");
    }

    pub fn frames(&self) -> FrameSet {
        FrameSet::from_dir(self.dir.path())
    }
}
