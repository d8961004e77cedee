use crate::utils::error::ClassifierError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str, max_size: usize) -> Result<DynamicImage> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = match base64_data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => base64_data,
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        Self::from_bytes(&image_bytes, max_size)
    }

    /// 从字节加载图像
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> Result<DynamicImage> {
        Self::validate_bytes(bytes, max_size)?;
        Ok(image::load_from_memory(bytes)?)
    }

    /// 从文件路径加载图像，解码失败直接返回错误
    pub fn from_path(path: &Path) -> Result<DynamicImage> {
        Ok(image::open(path)?)
    }

    /// 检查大小和格式，不做完整解码
    pub fn validate_bytes(bytes: &[u8], max_size: usize) -> Result<ImageFormat> {
        if bytes.is_empty() {
            return Err(ClassifierError::InvalidInput("Empty file".to_string()));
        }

        if bytes.len() > max_size {
            return Err(ClassifierError::FileTooLarge(bytes.len(), max_size));
        }

        let format = Self::detect_format(bytes).ok_or_else(|| {
            ClassifierError::UnsupportedFormat("unrecognized image data".to_string())
        })?;

        if !Self::is_supported_format(format) {
            return Err(ClassifierError::UnsupportedFormat(format!("{:?}", format)));
        }

        Ok(format)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Gif
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    /// 扩展名是否属于允许上传的图像类型
    pub fn has_image_extension(file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| {
                matches!(
                    ext.as_str(),
                    "png" | "jpg" | "jpeg" | "bmp" | "gif" | "tif" | "tiff" | "webp"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = ImageBuffer::from_pixel(2, 2, Rgb([10u8, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn loads_png_bytes() {
        let image = ImageLoader::from_bytes(&png_bytes(), 1024 * 1024).unwrap();
        assert_eq!((image.width(), image.height()), (2, 2));
    }

    #[test]
    fn loads_data_url() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes());
        let data_url = format!("data:image/png;base64,{}", encoded);
        assert!(ImageLoader::from_base64(&data_url, 1024 * 1024).is_ok());
        assert!(ImageLoader::from_base64(&encoded, 1024 * 1024).is_ok());
    }

    #[test]
    fn rejects_invalid_payloads() {
        assert!(matches!(
            ImageLoader::validate_bytes(b"", 10),
            Err(ClassifierError::InvalidInput(_))
        ));
        assert!(matches!(
            ImageLoader::validate_bytes(&png_bytes(), 10),
            Err(ClassifierError::FileTooLarge(_, 10))
        ));
        assert!(matches!(
            ImageLoader::validate_bytes(b"hello world, not an image", 1024),
            Err(ClassifierError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ImageLoader::from_base64("***", 1024),
            Err(ClassifierError::Base64(_))
        ));
    }

    #[test]
    fn truncated_image_fails_to_decode() {
        let bytes = png_bytes();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            ImageLoader::from_bytes(truncated, 1024 * 1024),
            Err(ClassifierError::ImageDecode(_))
        ));
    }

    #[test]
    fn checks_extensions() {
        assert!(ImageLoader::has_image_extension("photo.JPG"));
        assert!(ImageLoader::has_image_extension("scan.tiff"));
        assert!(!ImageLoader::has_image_extension("notes.txt"));
        assert!(!ImageLoader::has_image_extension("no_extension"));
    }
}
