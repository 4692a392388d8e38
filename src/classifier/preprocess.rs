use image::{imageops::FilterType, RgbImage};

/// torchvision ImageNet statistics, RGB order.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, planar channels (PyTorch exports).
    Nchw,
    /// `[1, H, W, 3]`, interleaved channels (TensorFlow exports).
    Nhwc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Channel value / 255.
    UnitRange,
    /// (value / 255 - mean) / std, per channel.
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    pub fn imagenet() -> Self {
        Normalization::MeanStd {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    fn apply(&self, channel: usize, value: u8) -> f32 {
        let unit = value as f32 / 255.0;
        match self {
            Normalization::UnitRange => unit,
            Normalization::MeanStd { mean, std } => (unit - mean[channel]) / std[channel],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl TensorLayout {
    pub fn shape(&self, size: u32) -> [usize; 4] {
        let s = size as usize;
        match self {
            TensorLayout::Nchw => [1, 3, s, s],
            TensorLayout::Nhwc => [1, s, s, 3],
        }
    }
}

/// Resizes to `size`x`size` with bilinear filtering and lays the pixels out
/// as a float tensor.
pub fn preprocess(
    image: &RgbImage,
    size: u32,
    layout: TensorLayout,
    normalization: Normalization,
) -> InputTensor {
    let resized = if image.dimensions() == (size, size) {
        image.clone()
    } else {
        image::imageops::resize(image, size, size, FilterType::Triangle)
    };

    let plane = (size * size) as usize;
    let mut data = vec![0f32; plane * 3];

    for (idx, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            let value = normalization.apply(channel, pixel[channel]);
            let offset = match layout {
                TensorLayout::Nchw => channel * plane + idx,
                TensorLayout::Nhwc => idx * 3 + channel,
            };
            data[offset] = value;
        }
    }

    InputTensor {
        shape: layout.shape(size),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn unit_range_nhwc_interleaves_channels() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]));
        let tensor = preprocess(&img, 2, TensorLayout::Nhwc, Normalization::UnitRange);

        assert_eq!(tensor.shape, [1, 2, 2, 3]);
        assert_eq!(tensor.data.len(), 12);
        assert_eq!(&tensor.data[0..3], &[1.0, 0.0, 0.2]);
    }

    #[test]
    fn nchw_groups_channels_into_planes() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let tensor = preprocess(&img, 2, TensorLayout::Nchw, Normalization::UnitRange);

        assert_eq!(tensor.shape, [1, 3, 2, 2]);
        assert!(tensor.data[0..4].iter().all(|v| *v == 1.0));
        assert!(tensor.data[4..12].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn imagenet_normalization_centers_the_mean() {
        let mean_px = [
            (IMAGENET_MEAN[0] * 255.0).round() as u8,
            (IMAGENET_MEAN[1] * 255.0).round() as u8,
            (IMAGENET_MEAN[2] * 255.0).round() as u8,
        ];
        let img = RgbImage::from_pixel(1, 1, Rgb(mean_px));
        let tensor = preprocess(&img, 1, TensorLayout::Nchw, Normalization::imagenet());

        for value in tensor.data {
            assert!(value.abs() < 0.02, "expected ~0, got {value}");
        }
    }

    #[test]
    fn input_is_resized_to_model_size() {
        let img = RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]));
        let tensor = preprocess(&img, 224, TensorLayout::Nhwc, Normalization::UnitRange);

        assert_eq!(tensor.shape, [1, 224, 224, 3]);
        assert_eq!(tensor.data.len(), 224 * 224 * 3);
    }
}
