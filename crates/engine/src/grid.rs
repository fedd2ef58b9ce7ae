//! RGBA8 pixel buffer the evaluator reads from and swaps into, plus the
//! raster codec bridge to the `image` crate.
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageError, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to open image {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("failed to save image {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Transparent black grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Rgba) -> Self {
        let mut grid = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                grid.set_pixel(x, y, f(x, y));
            }
        }
        grid
    }

    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let image = image::open(path).map_err(|source| CodecError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from(image.to_rgba8()))
    }

    /// Format follows the extension; formats without alpha drop it.
    pub fn save(&self, path: &Path) -> Result<(), CodecError> {
        let image = DynamicImage::ImageRgba8(self.to_image());
        let drops_alpha = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
            .unwrap_or(false);
        let result = if drops_alpha {
            image.to_rgb8().save(path)
        } else {
            image.save(path)
        };
        result.map_err(|source| CodecError::Save {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let offset = self.offset(x, y);
        let p = &self.data[offset..offset + 4];
        Rgba::new(p[0], p[1], p[2], p[3])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Rgba) {
        let offset = self.offset(x, y);
        self.data[offset..offset + 4].copy_from_slice(&pixel.to_array());
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_vec(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Swaps in a fully evaluated buffer of the same dimensions.
    pub(crate) fn commit(&mut self, data: Vec<u8>) {
        debug_assert_eq!(data.len(), self.data.len());
        self.data = data;
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} grid",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * 4
    }
}

impl From<RgbaImage> for PixelGrid {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_are_row_major_rgba() {
        let grid = PixelGrid::from_fn(3, 2, |x, y| Rgba::new(x as u8, y as u8, 7, 255));
        assert_eq!(grid.pixel(2, 1), Rgba::new(2, 1, 7, 255));
        assert_eq!(&grid.as_raw()[4..8], &[1, 0, 7, 255]);
        assert_eq!(grid.as_raw().len(), 3 * 2 * 4);
    }

    #[test]
    #[should_panic(expected = "outside 2x2 grid")]
    fn out_of_bounds_panics() {
        PixelGrid::new(2, 2).pixel(2, 0);
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("grid.png");
        let grid = PixelGrid::from_fn(5, 4, |x, y| {
            Rgba::new((x * 50) as u8, (y * 60) as u8, 3, (x * y * 10) as u8)
        });

        grid.save(&path).expect("save png");
        assert_eq!(PixelGrid::open(&path).expect("open png"), grid);
    }

    #[test]
    fn saves_jpeg_without_alpha() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("grid.jpg");
        PixelGrid::from_fn(4, 4, |_, _| Rgba::new(10, 20, 30, 40))
            .save(&path)
            .expect("save jpeg");
        let reopened = PixelGrid::open(&path).unwrap();
        assert_eq!(reopened.pixel(0, 0).a, 255);
    }

    #[test]
    fn open_reports_the_path() {
        let err = PixelGrid::open(Path::new("/definitely/missing.png")).unwrap_err();
        assert!(err.to_string().contains("/definitely/missing.png"));
    }
}
