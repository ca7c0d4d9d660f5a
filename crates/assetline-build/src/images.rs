//! Image cleaning, copying and PNG recompression.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageEncoder;
use walkdir::WalkDir;

/// Errors from image processing.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Failed to decode {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("Failed to encode {}: {message}", .path.display())]
    Encode { path: PathBuf, message: String },
}

/// Outcome of recompressing one PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngSavings {
    /// Size of the source file
    pub original: u64,
    /// Size of the written file
    pub written: u64,
}

impl PngSavings {
    /// Percentage saved, 0 when nothing was gained.
    pub fn percent(&self) -> f64 {
        if self.original == 0 || self.written >= self.original {
            return 0.0;
        }
        (self.original - self.written) as f64 * 100.0 / self.original as f64
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
///
/// Returns the number of entries removed. A missing directory is empty.
pub fn clean_dir(dir: &Path) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
        removed += 1;
    }

    Ok(removed)
}

/// Re-encode a PNG with maximum compression and adaptive filtering.
///
/// Keeps the original bytes when re-encoding does not make the file
/// smaller.
pub fn recompress_png(source: &Path, dest: &Path) -> Result<PngSavings, ImageError> {
    let original = fs::read(source).map_err(|e| ImageError::Decode {
        path: source.to_path_buf(),
        message: e.to_string(),
    })?;

    let decoded =
        image::load_from_memory_with_format(&original, image::ImageFormat::Png).map_err(|e| {
            ImageError::Decode {
                path: source.to_path_buf(),
                message: e.to_string(),
            }
        })?;

    let mut encoded = Vec::new();
    PngEncoder::new_with_quality(
        Cursor::new(&mut encoded),
        CompressionType::Best,
        FilterType::Adaptive,
    )
    .write_image(
        decoded.as_bytes(),
        decoded.width(),
        decoded.height(),
        decoded.color().into(),
    )
    .map_err(|e| ImageError::Encode {
        path: source.to_path_buf(),
        message: e.to_string(),
    })?;

    let bytes = if encoded.len() < original.len() {
        &encoded
    } else {
        &original
    };

    fs::write(dest, bytes).map_err(|e| ImageError::Encode {
        path: dest.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(PngSavings {
        original: original.len() as u64,
        written: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn write_png(path: &Path) {
        let img = RgbaImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([20, 40, 80, 255])
            }
        });
        // Fast, unfiltered encoding leaves room for recompression.
        PngEncoder::new_with_quality(
            fs::File::create(path).unwrap(),
            CompressionType::Fast,
            FilterType::NoFilter,
        )
        .write_image(img.as_raw(), 64, 64, image::ExtendedColorType::Rgba8)
        .unwrap();
    }

    #[test]
    fn recompressed_png_is_never_larger() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("logo.png");
        let dest = temp.path().join("logo.min.png");
        write_png(&src);

        let savings = recompress_png(&src, &dest).unwrap();

        assert!(savings.written <= savings.original);
        assert_eq!(fs::metadata(&dest).unwrap().len(), savings.written);
        let decoded = image::open(&dest).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn rejects_files_that_are_not_png() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("fake.png");
        fs::write(&src, b"not an image").unwrap();

        let err = recompress_png(&src, &temp.path().join("out.png")).unwrap_err();

        assert!(matches!(err, ImageError::Decode { .. }));
    }

    #[test]
    fn cleans_directory_contents() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("images");
        fs::create_dir_all(dir.join("icons")).unwrap();
        fs::write(dir.join("a.jpg"), b"a").unwrap();
        fs::write(dir.join("icons/b.png"), b"b").unwrap();

        assert_eq!(clean_dir(&dir).unwrap(), 2);
        assert!(dir.exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        assert_eq!(clean_dir(&temp.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn savings_percent() {
        let s = PngSavings {
            original: 200,
            written: 150,
        };
        assert_eq!(s.percent(), 25.0);
        assert_eq!(
            PngSavings {
                original: 10,
                written: 10
            }
            .percent(),
            0.0
        );
    }
}
