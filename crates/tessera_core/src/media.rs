//! Media resolution for images and videos.
//!
//! Turns the raw bytes of an image, or the locator of a video, into a
//! [`DisplayHandle`] a renderer can bind. Decoded handles are cached per
//! image index so textures sharing a source decode it once.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::codecs::png::PngDecoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur during media resolution.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to decode media: {0}")]
    Decode(String),

    #[error("Video has an empty locator")]
    EmptyLocator,
}

impl From<image::ImageError> for MediaError {
    fn from(error: image::ImageError) -> Self {
        MediaError::Decode(error.to_string())
    }
}

pub type MediaResult<T> = Result<T, MediaError>;

/// PNG file signature, `89 50 4E 47 0D 0A 1A 0A`.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "m4v", "webm"];

/// Input to the resolver.
#[derive(Clone, Copy, Debug)]
pub enum MediaSource<'a> {
    /// Encoded still image. `mime_type` is trusted when present.
    Image { data: &'a [u8], mime_type: Option<&'a str> },
    /// Streaming video, bound by locator and never read up front.
    Video { locator: &'a str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Decide whether a referenced resource is a still image or a video.
///
/// The MIME type wins when present; otherwise the URI's extension (or the
/// media type of a `data:` URI) decides. Anything unrecognized is an image.
pub fn classify(mime_type: Option<&str>, uri: Option<&str>) -> MediaKind {
    if let Some(mime) = mime_type {
        return if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Image
        };
    }

    let Some(uri) = uri else {
        return MediaKind::Image;
    };
    if let Some(data) = uri.strip_prefix("data:") {
        return if data.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Image
        };
    }

    let path = uri.split(|c| c == '?' || c == '#').next().unwrap_or(uri);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
        _ => MediaKind::Image,
    }
}

/// A decoded RGBA8 image.
#[derive(Clone, Debug)]
pub struct Bitmap {
    pub pixels: RgbaImage,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Get total size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

/// A video bound to its locator. Opening the stream is the player's job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoStream {
    pub locator: String,
}

/// Decoded, displayable media.
#[derive(Clone, Debug)]
pub enum DisplayHandle {
    Image(Arc<Bitmap>),
    Video(Arc<VideoStream>),
}

impl DisplayHandle {
    pub fn kind(&self) -> MediaKind {
        match self {
            DisplayHandle::Image(_) => MediaKind::Image,
            DisplayHandle::Video(_) => MediaKind::Video,
        }
    }

    pub fn as_bitmap(&self) -> Option<&Bitmap> {
        match self {
            DisplayHandle::Image(bitmap) => Some(bitmap),
            DisplayHandle::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoStream> {
        match self {
            DisplayHandle::Video(video) => Some(video),
            DisplayHandle::Image(_) => None,
        }
    }
}

/// Media decoding options.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MediaOptions {
    /// Decode PNG signatures with the dedicated PNG decoder instead of the
    /// generic loader.
    pub png_direct_decode: bool,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            png_direct_decode: true,
        }
    }
}

/// Resolves media sources to display handles, caching by image index.
#[derive(Default)]
pub struct MediaResolver {
    options: MediaOptions,
    handles: HashMap<usize, DisplayHandle>,
}

impl MediaResolver {
    pub fn new(options: MediaOptions) -> Self {
        Self {
            options,
            handles: HashMap::new(),
        }
    }

    /// Resolve a source without caching.
    pub fn resolve(&self, source: MediaSource<'_>) -> MediaResult<DisplayHandle> {
        match source {
            MediaSource::Image { data, mime_type } => {
                let bitmap = self.decode_image(data, mime_type)?;
                log::debug!(
                    "Decoded image ({}x{}, {:.1} KB)",
                    bitmap.width(),
                    bitmap.height(),
                    bitmap.size_bytes() as f32 / 1024.0
                );
                Ok(DisplayHandle::Image(Arc::new(bitmap)))
            }
            MediaSource::Video { locator } => {
                if locator.is_empty() {
                    return Err(MediaError::EmptyLocator);
                }
                log::debug!("Bound video stream: {}", locator);
                Ok(DisplayHandle::Video(Arc::new(VideoStream {
                    locator: locator.to_string(),
                })))
            }
        }
    }

    /// Resolve the source of image `index`, using the cache if available.
    pub fn resolve_cached(&mut self, index: usize, source: MediaSource<'_>) -> MediaResult<DisplayHandle> {
        if let Some(handle) = self.handles.get(&index) {
            return Ok(handle.clone());
        }

        let handle = self.resolve(source)?;
        self.handles.insert(index, handle.clone());
        Ok(handle)
    }

    /// Get a cached handle without resolving.
    pub fn get(&self, index: usize) -> Option<DisplayHandle> {
        self.handles.get(&index).cloned()
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.handles.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Get total memory usage of cached bitmaps.
    pub fn total_size_bytes(&self) -> usize {
        self.handles
            .values()
            .filter_map(DisplayHandle::as_bitmap)
            .map(Bitmap::size_bytes)
            .sum()
    }

    fn decode_image(&self, data: &[u8], mime_type: Option<&str>) -> MediaResult<Bitmap> {
        if self.options.png_direct_decode && data.starts_with(&PNG_SIGNATURE) {
            return decode_png(data);
        }

        let format = match mime_type.and_then(ImageFormat::from_mime_type) {
            Some(format) => format,
            None => {
                if let Some(mime) = mime_type {
                    log::debug!("Unrecognized image MIME type {}, sniffing", mime);
                }
                image::guess_format(data)
                    .map_err(|e| MediaError::Decode(format!("Unknown image format: {}", e)))?
            }
        };

        let image = image::load_from_memory_with_format(data, format)?;
        Ok(Bitmap {
            pixels: image.to_rgba8(),
        })
    }
}

/// Decode PNG bytes with the dedicated PNG decoder.
fn decode_png(data: &[u8]) -> MediaResult<Bitmap> {
    let decoder = PngDecoder::new(Cursor::new(data))?;
    let image = DynamicImage::from_decoder(decoder)?;
    Ok(Bitmap {
        pixels: image.to_rgba8(),
    })
}
