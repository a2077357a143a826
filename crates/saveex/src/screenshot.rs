use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;

/// Web-stored screenshots always capture at this scale, regardless of the
/// configured save scale, to bound key-value quota use.
pub const WEB_SCREENSHOT_SCALE: u32 = 20;

/// Save scales below this are clamped up.
pub const MIN_SAVE_SCALE: u32 = 10;

/// Configured border thickness is in tens of source pixels; the effective
/// stroke shrinks with the capture scale.
const BORDER_THICKNESS_SCALE: u32 = 10;

/// A raw RGBA framebuffer snapshot handed over by the host surface.
#[derive(Debug, Clone)]
pub struct Snapshot {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Anything that is not `jpeg` normalizes to lossless PNG.
    pub fn from_name(name: &str) -> ImageFormat {
        if name == "jpeg" {
            ImageFormat::Jpeg
        } else {
            ImageFormat::Png
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

/// An encoded screenshot ready for persistence. Owned exclusively by the
/// save operation that produced it until handed to the backend.
#[derive(Debug, Clone)]
pub struct ScreenshotArtifact {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("snapshot pixel count mismatch: expected {expected} bytes, got {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },
    #[error("failed to encode {format:?} screenshot: {message}")]
    Encode { format: ImageFormat, message: String },
}

impl Snapshot {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ScreenshotError> {
        let expected = width as usize * height as usize * 4;
        let actual = rgba.len();
        if expected != actual {
            return Err(ScreenshotError::PixelCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    pub scale_percent: u32,
    pub border_color: [u8; 3],
    pub border_thickness: u32,
    pub format: ImageFormat,
    pub jpeg_quality: u8,
}

/// Scales, frames, and encodes snapshots. Holds at most one uncommitted
/// artifact: producing a new one before the previous is persisted replaces
/// it. The host only ever has one save operation in flight.
#[derive(Debug, Default)]
pub struct ScreenshotCodec {
    pending: Option<ScreenshotArtifact>,
}

impl ScreenshotCodec {
    pub fn capture_into_pending(
        &mut self,
        snapshot: &Snapshot,
        options: &ProcessOptions,
    ) -> Result<&ScreenshotArtifact, ScreenshotError> {
        let artifact = process(snapshot, options)?;
        Ok(self.pending.insert(artifact))
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Hands the uncommitted artifact to the save operation.
    pub fn take_pending(&mut self) -> Option<ScreenshotArtifact> {
        self.pending.take()
    }
}

/// Scales the snapshot to `scale_percent`, strokes the border frame, and
/// encodes to the requested format.
pub fn process(
    snapshot: &Snapshot,
    options: &ProcessOptions,
) -> Result<ScreenshotArtifact, ScreenshotError> {
    let scale = options.scale_percent.max(MIN_SAVE_SCALE);
    let target_width = (snapshot.width * scale / 100).max(1);
    let target_height = (snapshot.height * scale / 100).max(1);

    let mut pixels = resample_nearest(snapshot, target_width, target_height);

    let stroke = (options.border_thickness * BORDER_THICKNESS_SCALE * scale + 50) / 100;
    if stroke > 0 {
        stroke_frame(
            &mut pixels,
            target_width,
            target_height,
            stroke,
            options.border_color,
        );
    }

    let bytes = encode(&pixels, target_width, target_height, options)?;
    Ok(ScreenshotArtifact {
        width: target_width,
        height: target_height,
        format: options.format,
        bytes,
    })
}

fn resample_nearest(snapshot: &Snapshot, target_width: u32, target_height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(target_width as usize * target_height as usize * 4);
    for y in 0..target_height {
        let source_y = (y as u64 * snapshot.height as u64 / target_height as u64) as u32;
        for x in 0..target_width {
            let source_x = (x as u64 * snapshot.width as u64 / target_width as u64) as u32;
            let offset = (source_y as usize * snapshot.width as usize + source_x as usize) * 4;
            pixels.extend_from_slice(&snapshot.rgba[offset..offset + 4]);
        }
    }
    pixels
}

fn stroke_frame(pixels: &mut [u8], width: u32, height: u32, stroke: u32, color: [u8; 3]) {
    for y in 0..height {
        for x in 0..width {
            let on_frame = x < stroke
                || y < stroke
                || x >= width.saturating_sub(stroke)
                || y >= height.saturating_sub(stroke);
            if !on_frame {
                continue;
            }
            let offset = (y as usize * width as usize + x as usize) * 4;
            pixels[offset] = color[0];
            pixels[offset + 1] = color[1];
            pixels[offset + 2] = color[2];
            pixels[offset + 3] = 255;
        }
    }
}

fn encode(
    pixels: &[u8],
    width: u32,
    height: u32,
    options: &ProcessOptions,
) -> Result<Vec<u8>, ScreenshotError> {
    let mut bytes = Vec::new();
    let result = match options.format {
        ImageFormat::Png => PngEncoder::new(&mut bytes).write_image(
            pixels,
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        ImageFormat::Jpeg => {
            // The JPEG encoder takes opaque RGB; quality zero is clamped to
            // the encoder's minimum instead of erroring.
            let rgb = pixels
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect::<Vec<u8>>();
            let quality = options.jpeg_quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut bytes, quality).write_image(
                &rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
    };
    result.map_err(|error| ScreenshotError::Encode {
        format: options.format,
        message: error.to_string(),
    })?;
    Ok(bytes)
}

/// Parses a `#rrggbb` (or bare `rrggbb`) color.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let digits = value.strip_prefix('#').unwrap_or(value);
    if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}
