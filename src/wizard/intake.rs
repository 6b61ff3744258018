//! File intake: media type and size checks, then preview rendering.

use std::{io::Cursor, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};

use crate::error::IntakeError;

use super::state::{FilePreview, SelectedFile};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const PREVIEW_MAX_DIMENSION: u32 = 480;

pub const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// A file handed over by the picker, camera or drop zone.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    /// As declared by the source; the content is not sniffed.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Rejections are checked in order: media type, then size.
pub fn check(upload: &FileUpload) -> Result<(), IntakeError> {
    if !ACCEPTED_MEDIA_TYPES.contains(&upload.media_type.as_str()) {
        return Err(IntakeError::UnsupportedFile {
            media_type: upload.media_type.clone(),
        });
    }
    if upload.size() > MAX_FILE_SIZE {
        return Err(IntakeError::FileTooLarge {
            size: upload.size(),
            limit: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

/// Checks the upload and renders its preview off the async runtime.
pub async fn accept(upload: FileUpload) -> Result<SelectedFile, IntakeError> {
    check(&upload)?;

    let size = upload.size();
    let bytes: Arc<[u8]> = Arc::from(upload.bytes);
    let media_type = upload.media_type;

    let preview = if media_type.starts_with("image/") {
        let source = Arc::clone(&bytes);
        match tokio::task::spawn_blocking(move || render_image_preview(&source)).await {
            Ok(preview) => preview,
            Err(err) => {
                log_debug!("preview task failed for {}: {}", upload.name, err);
                FilePreview::Placeholder
            }
        }
    } else if media_type == "application/pdf" {
        FilePreview::PdfIcon
    } else {
        FilePreview::Document
    };

    Ok(SelectedFile {
        name: upload.name,
        media_type,
        size,
        bytes,
        preview,
        rotation: 0,
    })
}

fn render_image_preview(bytes: &[u8]) -> FilePreview {
    match image::load_from_memory(bytes) {
        Ok(decoded) => encode_thumbnail(&decoded).unwrap_or(FilePreview::Placeholder),
        Err(err) => {
            log_debug!("image could not be decoded for preview: {}", err);
            FilePreview::Placeholder
        }
    }
}

fn encode_thumbnail(image: &DynamicImage) -> Option<FilePreview> {
    let thumbnail = image.thumbnail(PREVIEW_MAX_DIMENSION, PREVIEW_MAX_DIMENSION);
    let mut png = Vec::new();
    if let Err(err) = thumbnail.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
        log_debug!("thumbnail encoding failed: {}", err);
        return None;
    }
    Some(FilePreview::Image {
        data_url: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
        width: thumbnail.width(),
        height: thumbnail.height(),
    })
}

/// Human-readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([0, 102, 204]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let upload = FileUpload::new("notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(
            check(&upload),
            Err(IntakeError::UnsupportedFile {
                media_type: "text/plain".into()
            })
        );
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let at_limit = FileUpload::new("a.pdf", "application/pdf", vec![0; MAX_FILE_SIZE as usize]);
        assert!(check(&at_limit).is_ok());

        let over = FileUpload::new("b.pdf", "application/pdf", vec![0; MAX_FILE_SIZE as usize + 1]);
        assert!(matches!(check(&over), Err(IntakeError::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_image_preview_is_bounded() {
        let upload = FileUpload::new("scan.png", "image/png", png_bytes(1200, 600));
        let file = accept(upload).await.unwrap();
        match file.preview {
            FilePreview::Image {
                data_url,
                width,
                height,
            } => {
                assert!(data_url.starts_with("data:image/png;base64,"));
                assert_eq!(width, 480);
                assert_eq!(height, 240);
            }
            other => panic!("expected image preview, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_image_previews() {
        let pdf = accept(FileUpload::new("r.pdf", "application/pdf", vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(pdf.preview, FilePreview::PdfIcon);

        let doc = accept(FileUpload::new("r.doc", "application/msword", vec![1]))
            .await
            .unwrap();
        assert_eq!(doc.preview, FilePreview::Document);

        let broken = accept(FileUpload::new("x.jpg", "image/jpeg", vec![0xFF, 0x00]))
            .await
            .unwrap();
        assert_eq!(broken.preview, FilePreview::Placeholder);
        assert_eq!(broken.size, 2);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }
}
