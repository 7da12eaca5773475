//! Image dimensions and resized copies for the `image_size` and
//! `resized_image` filters.

use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use landing_cache::{Cache, CacheExt, DEFAULT_TTL};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::SiteError;

/// Returned by `resized_image` when anything goes wrong: a 1x1 transparent
/// GIF.
pub const TRANSPARENT_GIF: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// URL prefix resized images are served under.
pub const RESIZES_URL: &str = "/__resizes/";

const JPEG_QUALITY: u8 = 85;

/// Pixel dimensions; zero when unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// How a source image is placed into the target box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleMode {
    /// Scale to cover the box and crop the overflow.
    #[default]
    Cover,
    /// Scale to fit inside the box, padding with white.
    Fit,
    /// Center without scaling, cropping or padding as needed.
    Unscaled,
    /// Stretch to the box ignoring the aspect ratio.
    Exact,
}

impl ScaleMode {
    /// Parse a filter argument; unknown names fall back to cover.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "fit" | "show_all" => Self::Fit,
            "unscaled" | "no_scale" => Self::Unscaled,
            "fill" | "exact" => Self::Exact,
            _ => Self::Cover,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Fit => "fit",
            Self::Unscaled => "unscaled",
            Self::Exact => "exact",
        }
    }
}

pub(crate) fn sha1_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha1::digest(bytes.as_ref()))
}

/// Dimensions of the image at `file`, cached by path and by content hash.
///
/// Undecodable images report `0x0`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the cache fails.
pub fn image_size(cache: &dyn Cache, file: &Path) -> Result<ImageSize, SiteError> {
    let path_key = format!("image_size.file.{}", sha1_hex(file.display().to_string()));
    cache.get(&path_key, DEFAULT_TTL, || {
        let bytes = fs::read(file).map_err(|e| SiteError::io(e, file))?;
        let hash_key = format!("image_size.hash.{}", sha1_hex(&bytes));
        cache.get(&hash_key, DEFAULT_TTL, || Ok::<_, SiteError>(decode_size(&bytes)))
    })
}

fn decode_size(bytes: &[u8]) -> ImageSize {
    let dimensions = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());
    match dimensions {
        Some((width, height)) => ImageSize { width, height },
        None => ImageSize::default(),
    }
}

/// Location of a resized copy, relative to the resizes directory.
///
/// `<w>x<h>/<h[0]>/<h[0..2]>/<h[0..4]>/<h>.jpg` where `h` hashes the source
/// path, plus the mode when it is not the default.
#[must_use]
pub fn resized_path(source: &Path, width: u32, height: u32, mode: ScaleMode) -> String {
    let mut key = source.display().to_string();
    if mode != ScaleMode::Cover {
        key.push('#');
        key.push_str(mode.name());
    }
    let hash = sha1_hex(key);
    format!(
        "{width}x{height}/{}/{}/{}/{hash}.jpg",
        &hash[..1],
        &hash[..2],
        &hash[..4]
    )
}

/// Resize `source` into `resizes_dir` unless already done, and return the
/// URL it is served under.
///
/// # Errors
///
/// Returns an error if the size is zero or the source cannot be decoded or
/// the JPEG cannot be written.
pub fn resized_image(
    source: &Path,
    resizes_dir: &Path,
    width: u32,
    height: u32,
    mode: ScaleMode,
) -> Result<String, SiteError> {
    if width == 0 || height == 0 {
        return Err(SiteError::InvalidImageSize { width, height });
    }
    let relative = resized_path(source, width, height, mode);
    let target = resizes_dir.join(&relative);
    if !target.is_file() {
        let image = image::open(source)?;
        let resized = resize(&image, width, height, mode);
        write_jpeg(&resized, &target)?;
        debug!(source = %source.display(), target = %target.display(), "Resized image");
    }
    Ok(format!("{RESIZES_URL}{relative}"))
}

fn resize(image: &DynamicImage, width: u32, height: u32, mode: ScaleMode) -> RgbImage {
    match mode {
        ScaleMode::Cover => image.resize_to_fill(width, height, FilterType::Lanczos3).to_rgb8(),
        ScaleMode::Exact => image.resize_exact(width, height, FilterType::Lanczos3).to_rgb8(),
        ScaleMode::Fit => centered(&image.resize(width, height, FilterType::Lanczos3), width, height),
        ScaleMode::Unscaled => centered(image, width, height),
    }
}

/// Draw `image` centered on a white canvas.
fn centered(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let top = image.to_rgb8();
    let x = (i64::from(width) - i64::from(top.width())) / 2;
    let y = (i64::from(height) - i64::from(top.height())) / 2;
    imageops::overlay(&mut canvas, &top, x, y);
    canvas
}

fn write_jpeg(image: &RgbImage, target: &Path) -> Result<(), SiteError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| SiteError::io(e, parent))?;
    }
    let partial = PathBuf::from(format!("{}.part", target.display()));
    {
        let file = fs::File::create(&partial).map_err(|e| SiteError::io(e, &partial))?;
        let mut writer = BufWriter::new(file);
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(image)?;
        writer.flush().map_err(|e| SiteError::io(e, &partial))?;
    }
    fs::rename(&partial, target).map_err(|e| SiteError::io(e, target))
}
