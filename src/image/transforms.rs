use crate::utils::error::ClassifierError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

/// ImageNet 统计量，与骨干网络预训练时一致
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 推理前的固定预处理：短边缩放 → 中心裁剪 → 归一化
#[derive(Debug, Clone)]
pub struct ImageTransforms {
    resize: u32,
    crop: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for ImageTransforms {
    fn default() -> Self {
        Self {
            resize: 256,
            crop: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl ImageTransforms {
    pub fn crop_size(&self) -> u32 {
        self.crop
    }

    /// 图像 → `[1, 3, crop, crop]` 张量
    pub fn apply(&self, image: &DynamicImage) -> Result<Array4<f32>> {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ClassifierError::ImageProcessing(
                "image has zero width or height".to_string(),
            ));
        }

        let cropped = self.crop_and_resize(&rgb);
        Ok(self.to_tensor(&cropped))
    }

    /// 等价于短边缩放到 `resize` 后中心裁剪 `crop`
    ///
    /// 先在原图坐标系中确定裁剪窗口，只缩放窗口内的像素，
    /// 避免极端长宽比的图像在缩放阶段产生巨大的中间缓冲区。
    fn crop_and_resize(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        let (left, top, side) = self.crop_window(w, h);

        let window = imageops::crop_imm(image, left, top, side, side).to_image();
        if side == self.crop {
            return window;
        }
        imageops::resize(&window, self.crop, self.crop, FilterType::Triangle)
    }

    /// 原图坐标系中的正方形裁剪窗口 `(left, top, side)`
    fn crop_window(&self, w: u32, h: u32) -> (u32, u32, u32) {
        let short = w.min(h);
        let (resize, crop) = (self.resize as f64, self.crop as f64);
        let side = ((crop * short as f64 / resize).round() as u32).clamp(1, short);

        let offset = |len: u32| {
            // 缩放后该边的长度，与整数缩放结果一致
            let scaled = (len as u64 * self.resize as u64 / short as u64) as f64;
            let start = ((scaled - crop) / 2.0).round() * short as f64 / resize;
            (start.round().max(0.0) as u32).min(len - side)
        };

        (offset(w), offset(h), side)
    }

    /// HWC u8 → NCHW f32，缩放到 [0, 1] 后按通道归一化
    fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let (w, h) = image.dimensions();
        Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
            let value = image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - self.mean[c]) / self.std[c]
        })
    }
}
