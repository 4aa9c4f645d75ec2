//! 画像前処理
//!
//! エンコード済み画像を [1, 224, 224, 3] のテンソルに変換します。
//! 手順: デコード → バッチ次元追加 → バイリニア補間でリサイズ → 形状確認
//!
//! 画素値の正規化は行いません。同梱モデルは0-255の値で学習されているため、
//! ここで値域を変えるとモデルとの互換性が失われます。

use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::RgbImage;

use crate::error::ClassifyError;
use crate::types::{ImageTensor, IMAGE_SIZE, INPUT_SHAPE};

/// エンコード済みバイト列をRGB画像にデコード
///
/// アルファ付き・グレースケール画像はRGBに変換します。
pub fn decode_image(raw: &[u8]) -> Result<RgbImage, ClassifyError> {
    let image = image::load_from_memory(raw).map_err(ClassifyError::Decode)?;
    let rgb = image.to_rgb8();

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(ClassifyError::Decode(ImageError::Parameter(
            ParameterError::from_kind(ParameterErrorKind::DimensionMismatch),
        )));
    }

    Ok(rgb)
}

/// 先頭にバッチ次元を追加 [H, W, 3] -> [1, H, W, 3]
pub fn expand_dims(image: &RgbImage) -> Result<ImageTensor, ClassifyError> {
    let (width, height) = image.dimensions();
    let data = image.as_raw().iter().map(|&v| v as f32).collect();
    ImageTensor::from_shape_vec([1, height as usize, width as usize, 3], data)
}

/// バイリニア補間で空間方向のみリサイズ
///
/// 角合わせ・ピクセル中心補正なしのサンプリング（`src = dst * in / out`）。
/// 右端・下端の隣接画素は最終行・最終列にクランプします。
/// 切り抜きは行わないため、アスペクト比は保持されません。
pub fn resize_bilinear(
    input: &ImageTensor,
    out_height: usize,
    out_width: usize,
) -> Result<ImageTensor, ClassifyError> {
    let [batch, in_height, in_width, channels] = input.shape();
    if in_height == 0 || in_width == 0 {
        return Err(ClassifyError::InputShape {
            expected: vec![batch, out_height, out_width, channels],
            actual: input.shape().to_vec(),
        });
    }
    let src = input.as_slice();
    let mut data = Vec::with_capacity(batch * out_height * out_width * channels);

    let plane = in_height * in_width * channels;

    for b in 0..batch {
        let base = b * plane;
        for y in 0..out_height {
            let src_y = (y * in_height) as f32 / out_height as f32;
            let y0 = (src_y.floor() as usize).min(in_height - 1);
            let y1 = (y0 + 1).min(in_height - 1);
            let dy = src_y - y0 as f32;

            for x in 0..out_width {
                let src_x = (x * in_width) as f32 / out_width as f32;
                let x0 = (src_x.floor() as usize).min(in_width - 1);
                let x1 = (x0 + 1).min(in_width - 1);
                let dx = src_x - x0 as f32;

                for c in 0..channels {
                    let at = |yy: usize, xx: usize| src[base + (yy * in_width + xx) * channels + c];

                    let top_left = at(y0, x0);
                    let top_right = at(y0, x1);
                    let bottom_left = at(y1, x0);
                    let bottom_right = at(y1, x1);

                    let top = top_left + (top_right - top_left) * dx;
                    let bottom = bottom_left + (bottom_right - bottom_left) * dx;
                    data.push(top + (bottom - top) * dy);
                }
            }
        }
    }

    ImageTensor::from_shape_vec([batch, out_height, out_width, channels], data)
}

/// 最終形状がモデル入力 [1, 224, 224, 3] であることを確認
pub fn ensure_input_shape(tensor: ImageTensor) -> Result<ImageTensor, ClassifyError> {
    if tensor.shape() != INPUT_SHAPE {
        return Err(ClassifyError::InputShape {
            expected: INPUT_SHAPE.to_vec(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(tensor)
}

/// デコードからリサイズまでをまとめて実行
pub fn preprocess(raw: &[u8]) -> Result<ImageTensor, ClassifyError> {
    let image = decode_image(raw)?;
    let batched = expand_dims(&image)?;
    let resized = resize_bilinear(&batched, IMAGE_SIZE, IMAGE_SIZE)?;
    ensure_input_shape(resized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
    use rand::Rng;
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb(color));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_preprocess_shape_for_any_dimensions() {
        let mut rng = rand::thread_rng();
        for _ in 0..8 {
            let width = rng.gen_range(1..=640);
            let height = rng.gen_range(1..=640);
            let tensor = preprocess(&solid_png(width, height, [10, 20, 30])).unwrap();
            assert_eq!(tensor.shape(), [1, 224, 224, 3], "{}x{}", width, height);
        }
    }

    #[test]
    fn test_preprocess_jpeg_shape() {
        let img = ImageBuffer::from_fn(300, 120, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        let tensor = preprocess(&bytes).unwrap();
        assert_eq!(tensor.shape(), INPUT_SHAPE);
    }

    #[test]
    fn test_values_are_not_normalized() {
        let tensor = preprocess(&solid_png(300, 300, [128, 64, 255])).unwrap();
        assert_eq!(tensor.get(0, 0, 0), Some(128.0));
        assert_eq!(tensor.get(100, 37, 1), Some(64.0));
        assert_eq!(tensor.get(223, 223, 2), Some(255.0));
        assert!(tensor.as_slice().iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[test]
    fn test_same_size_passes_through() {
        let img = ImageBuffer::from_fn(224, 224, |x, y| Rgb([x as u8, y as u8, ((x + y) % 256) as u8]));
        let tensor = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)).unwrap();
        assert_eq!(tensor.get(5, 17, 0), Some(17.0));
        assert_eq!(tensor.get(5, 17, 1), Some(5.0));
        assert_eq!(tensor.get(200, 100, 2), Some(44.0));
    }

    #[test]
    fn test_bilinear_sampling_rule() {
        // 2x1画像 [0, 200] を幅224に拡大
        let input = ImageTensor::from_shape_vec([1, 1, 2, 1], vec![0.0, 200.0]).unwrap();
        let resized = resize_bilinear(&input, 1, 224).unwrap();
        assert_eq!(resized.shape(), [1, 1, 224, 1]);
        assert_eq!(resized.get(0, 0, 0), Some(0.0));
        assert_eq!(resized.get(0, 56, 0), Some(100.0));
        // src_x >= 1 は右端にクランプ
        assert_eq!(resized.get(0, 112, 0), Some(200.0));
        assert_eq!(resized.get(0, 223, 0), Some(200.0));
    }

    #[test]
    fn test_downscale_picks_sampled_pixels() {
        // 4x4 -> 2x2: src = dst * 2 なので補間なしで該当画素を取る
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let input = ImageTensor::from_shape_vec([1, 4, 4, 1], data).unwrap();
        let resized = resize_bilinear(&input, 2, 2).unwrap();
        assert_eq!(resized.as_slice(), &[0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let img = ImageBuffer::from_pixel(50, 80, Rgba([1u8, 2, 3, 4]));
        let tensor = preprocess(&encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)).unwrap();
        assert_eq!(tensor.shape(), INPUT_SHAPE);
        assert_eq!(tensor.get(10, 10, 2), Some(3.0));
    }

    #[test]
    fn test_non_image_bytes_fail_with_decode_error() {
        let result = preprocess(b"definitely not an image");
        assert!(matches!(result, Err(ClassifyError::Decode(_))));

        let result = preprocess(&[]);
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }

    #[test]
    fn test_ensure_input_shape_rejects_other_shapes() {
        let tensor = ImageTensor::from_shape_vec([1, 2, 2, 3], vec![0.0; 12]).unwrap();
        assert!(matches!(
            ensure_input_shape(tensor),
            Err(ClassifyError::InputShape { .. })
        ));
    }
}
