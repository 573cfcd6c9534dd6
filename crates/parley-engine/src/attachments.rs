use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use parley_contracts::error::ChatError;

pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "py", "js", "html", "css", "json", "xml", "csv"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Images are downsampled to fit inside a square of this many pixels.
pub const IMAGE_MAX_DIM: u32 = 800;
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentPayload {
    Text(String),
    Image {
        data_uri: String,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub size_bytes: u64,
    pub payload: AttachmentPayload,
    /// Human-readable descriptor, e.g. `image: cat.png (800x600)`.
    pub info: String,
}

impl Attachment {
    /// Inline text for text files, the data URI for images.
    pub fn content(&self) -> &str {
        match &self.payload {
            AttachmentPayload::Text(text) => text,
            AttachmentPayload::Image { data_uri, .. } => data_uri,
        }
    }
}

/// Converts a file into inline text or a base64 JPEG data URI.
///
/// Every failure is reported as a [`ChatError`]; nothing here panics.
pub fn process_attachment(path: &Path, max_file_size: u64) -> Result<Attachment, ChatError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            return Err(ChatError::AttachmentMissing {
                path: path.display().to_string(),
            })
        }
    };
    let size_bytes = metadata.len();
    if size_bytes > max_file_size {
        return Err(ChatError::too_large(size_bytes, max_file_size));
    }

    let file_name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        let bytes = fs::read(path).map_err(|err| ChatError::decode_failure(err.to_string()))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        tracing::debug!(file = %file_name, size_bytes, "loaded text attachment");
        return Ok(Attachment {
            info: format!("file: {file_name} ({size_bytes} bytes)"),
            file_name,
            size_bytes,
            payload: AttachmentPayload::Text(text),
        });
    }

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        let (bytes, width, height) = prepare_image_jpeg(path, IMAGE_MAX_DIM)?;
        let data_uri = format!("data:image/jpeg;base64,{}", BASE64.encode(bytes));
        tracing::debug!(file = %file_name, width, height, "encoded image attachment");
        return Ok(Attachment {
            info: format!("image: {file_name} ({width}x{height})"),
            file_name,
            size_bytes,
            payload: AttachmentPayload::Image {
                data_uri,
                width,
                height,
            },
        });
    }

    Err(ChatError::AttachmentUnsupportedType {
        extension: if extension.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{extension}")
        },
    })
}

/// Decodes an image, flattens transparency onto white, shrinks it to fit
/// `max_dim` x `max_dim` and re-encodes it as JPEG.
fn prepare_image_jpeg(path: &Path, max_dim: u32) -> Result<(Vec<u8>, u32, u32), ChatError> {
    let image = image::open(path).map_err(|err| ChatError::decode_failure(err.to_string()))?;
    let mut rgb = flatten_to_rgb(&image);
    if rgb.width() > max_dim || rgb.height() > max_dim {
        rgb = DynamicImage::ImageRgb8(rgb)
            .resize(max_dim, max_dim, FilterType::Lanczos3)
            .to_rgb8();
    }
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(rgb))
        .map_err(|err| ChatError::decode_failure(err.to_string()))?;
    Ok((bytes, width, height))
}

fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

#[cfg(test)]
mod tests {
    use std::fs;

    use base64::Engine as _;
    use image::{Rgba, RgbaImage};
    use parley_contracts::error::ChatError;

    use super::{process_attachment, AttachmentPayload, BASE64, IMAGE_MAX_DIM};

    const LIMIT: u64 = 10 * 1024 * 1024;

    #[test]
    fn missing_file_is_reported() {
        let err = process_attachment(std::path::Path::new("/definitely/not/here.txt"), LIMIT)
            .err();
        assert!(matches!(err, Some(ChatError::AttachmentMissing { .. })));
    }

    #[test]
    fn oversized_file_reports_size() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("big.txt");
        let file = fs::File::create(&path)?;
        file.set_len(3 * 1024 * 1024)?;

        let err = process_attachment(&path, 2 * 1024 * 1024).err();
        let Some(ChatError::AttachmentTooLarge { size_bytes, .. }) = err.clone() else {
            panic!("expected too-large error, got {err:?}");
        };
        assert_eq!(size_bytes, 3 * 1024 * 1024);
        let text = err.map(|err| err.to_string()).unwrap_or_default();
        assert!(text.contains("3.0MB"), "unexpected message: {text}");
        Ok(())
    }

    #[test]
    fn text_file_contents_are_returned_exactly() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("Notes.MD");
        let body = "# Title\n\nline with <tags> & unicode é\n";
        fs::write(&path, body)?;

        let attachment = process_attachment(&path, LIMIT)?;
        assert_eq!(attachment.payload, AttachmentPayload::Text(body.to_string()));
        assert_eq!(attachment.content(), body);
        assert_eq!(
            attachment.info,
            format!("file: Notes.MD ({} bytes)", body.len())
        );
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("data.csv");
        fs::write(&path, [b'a', b',', 0xff, b'b'])?;

        let attachment = process_attachment(&path, LIMIT)?;
        assert_eq!(attachment.content(), "a,\u{fffd}b");
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("archive.zip");
        fs::write(&path, b"PK")?;

        let err = process_attachment(&path, LIMIT).err();
        assert_eq!(
            err,
            Some(ChatError::AttachmentUnsupportedType {
                extension: ".zip".to_string()
            })
        );
        Ok(())
    }

    #[test]
    fn large_image_is_downsampled_preserving_aspect() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.png");
        RgbaImage::from_pixel(1600, 800, Rgba([10, 200, 30, 128])).save(&path)?;

        let attachment = process_attachment(&path, LIMIT)?;
        let AttachmentPayload::Image {
            data_uri,
            width,
            height,
        } = &attachment.payload
        else {
            panic!("expected image payload");
        };
        assert_eq!((*width, *height), (IMAGE_MAX_DIM, 400));
        assert_eq!(attachment.info, "image: wide.png (800x400)");

        let encoded = data_uri
            .strip_prefix("data:image/jpeg;base64,")
            .unwrap_or_default();
        let decoded = image::load_from_memory(&BASE64.decode(encoded)?)?;
        assert_eq!((decoded.width(), decoded.height()), (800, 400));
        Ok(())
    }

    #[test]
    fn small_image_is_not_upscaled() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("icon.bmp");
        RgbaImage::from_pixel(32, 20, Rgba([0, 0, 0, 255])).save(&path)?;

        let attachment = process_attachment(&path, LIMIT)?;
        assert_eq!(attachment.info, "image: icon.bmp (32x20)");
        Ok(())
    }

    #[test]
    fn corrupt_image_is_a_decode_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("broken.png");
        fs::write(&path, b"not really a png")?;

        let err = process_attachment(&path, LIMIT).err();
        let Some(ChatError::AttachmentDecodeFailure { detail }) = err else {
            panic!("expected decode failure, got {err:?}");
        };
        assert!(detail.chars().count() <= 100);
        Ok(())
    }
}
