use crate::error::AppError;
use crate::models::classify_types::{ImageInput, Prediction};
use crate::services::classifier::backend::InferenceBackend;
use crate::services::classifier::labels::LabelSet;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use ndarray::Array4;
use std::cmp::Ordering;
use std::io::Cursor;

/// Side length the InceptionV3 Food-101 model was trained on.
pub const INPUT_SIZE: u32 = 299;

/// Number of ranked predictions returned per image.
pub const TOP_K: usize = 5;

// Scores a hair outside [0, 1] from float rounding in the softmax layer are clamped.
const PROBABILITY_SLACK: f32 = 1e-4;

/// Decodes `bytes` and applies any EXIF orientation, so camera photos come
/// out upright.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AppError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Decode(format!("Failed to read image header: {}", e)))?
        .into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Stretches `img` to `size`×`size` with bilinear filtering and scales every
/// channel into [0, 1]. Output layout is NHWC: `(1, size, size, 3)`.
pub fn preprocess_image(img: &DynamicImage, size: u32) -> Result<Array4<f32>, AppError> {
    let rgb = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();

    // RgbImage rows are already HWC-interleaved, so no transpose is needed.
    let data: Vec<f32> = rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();

    Array4::from_shape_vec((1, size as usize, size as usize, 3), data)
        .map_err(|e| AppError::Inference(format!("Failed to create tensor: {}", e)))
}

pub fn preprocess_input(input: &ImageInput) -> Result<Array4<f32>, AppError> {
    let img = decode_image(&input.bytes)
        .map_err(|e| match e {
            AppError::Decode(msg) => AppError::Decode(format!("{}: {}", input.source, msg)),
            other => other,
        })?;
    preprocess_image(&img, INPUT_SIZE)
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

/// Indices and scores of the `k` highest scores, descending. Equal scores keep
/// ascending index order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    // sort_by is stable, so ties stay in index order
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    indexed.truncate(k);
    indexed
}

/// Validates a raw score vector against the label set and turns it into the
/// ranked prediction list.
pub fn postprocess(
    scores: Vec<f32>,
    labels: &LabelSet,
    k: usize,
    output_is_logits: bool,
) -> Result<Vec<Prediction>, AppError> {
    if scores.len() != labels.len() {
        return Err(AppError::LabelMismatch {
            expected: labels.len(),
            actual: scores.len(),
        });
    }

    if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
        return Err(AppError::Inference(format!(
            "Model produced a non-finite score for class {}",
            idx
        )));
    }

    let probabilities = if output_is_logits {
        softmax(&scores)
    } else {
        if let Some(&bad) = scores
            .iter()
            .find(|&&s| !(-PROBABILITY_SLACK..=1.0 + PROBABILITY_SLACK).contains(&s))
        {
            return Err(AppError::Inference(format!(
                "Model output {} is not a probability; enable output_is_logits for this model",
                bad
            )));
        }
        scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect()
    };

    top_k(&probabilities, k)
        .into_iter()
        .map(|(idx, confidence)| {
            let class_name = labels.get(idx).ok_or(AppError::LabelMismatch {
                expected: labels.len(),
                actual: idx + 1,
            })?;
            Ok(Prediction {
                class_index: idx,
                class_name: class_name.to_string(),
                confidence,
            })
        })
        .collect()
}

pub fn run_inference(
    backend: &mut dyn InferenceBackend,
    input: Array4<f32>,
    labels: &LabelSet,
    output_is_logits: bool,
) -> Result<Vec<Prediction>, AppError> {
    let scores = backend.forward(input)?;
    postprocess(scores, labels, TOP_K, output_is_logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn preprocess_produces_nhwc_unit_range_tensor() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([255, 0, 51])));
        let tensor = preprocess_image(&img, INPUT_SIZE).unwrap();

        assert_eq!(tensor.shape(), &[1, 299, 299, 3]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 150, 150, 1]].abs() < 1e-6);
        assert!((tensor[[0, 298, 298, 2]] - 0.2).abs() < 1e-6);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn alpha_and_grayscale_inputs_become_three_channels() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([10, 20, 30, 0])));
        assert_eq!(preprocess_image(&rgba, 8).unwrap().shape(), &[1, 8, 8, 3]);

        let gray = DynamicImage::new_luma8(17, 5);
        assert_eq!(preprocess_image(&gray, 8).unwrap().shape(), &[1, 8, 8, 3]);
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &b in bytes {
            crc ^= b as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    /// PNG of `width`×`height` carrying an eXIf chunk with orientation 6
    /// (rotate 90° clockwise to display).
    fn rotated_png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        let png = buf.into_inner();

        let exif: [u8; 26] = [
            b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08, // big-endian TIFF header
            0x00, 0x01, // one IFD entry
            0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x00, // Orientation = 6
            0x00, 0x00, 0x00, 0x00, // no next IFD
        ];
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&(exif.len() as u32).to_be_bytes());
        chunk.extend_from_slice(b"eXIf");
        chunk.extend_from_slice(&exif);
        chunk.extend_from_slice(&crc32(&chunk[4..]).to_be_bytes());

        // signature (8) + IHDR chunk (25)
        let ihdr_end = 33;
        let mut out = png[..ihdr_end].to_vec();
        out.extend_from_slice(&chunk);
        out.extend_from_slice(&png[ihdr_end..]);
        out
    }

    #[test]
    fn exif_orientation_is_applied_on_decode() {
        let img = decode_image(&rotated_png(4, 2)).unwrap();
        assert_eq!((img.width(), img.height()), (2, 4));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let input = ImageInput::from_bytes("notes.txt", b"definitely not an image".to_vec());
        let err = preprocess_input(&input).unwrap_err();
        assert!(matches!(err, AppError::Decode(ref msg) if msg.starts_with("notes.txt")));
    }

    #[test]
    fn top_k_orders_descending_and_breaks_ties_by_index() {
        let scores = [0.1, 0.3, 0.05, 0.3, 0.2, 0.3, 0.05];
        let top = top_k(&scores, 5);
        let indices: Vec<usize> = top.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 3, 5, 4, 0]);
    }

    #[test]
    fn top_k_with_fewer_scores_than_k() {
        assert_eq!(top_k(&[0.4, 0.6], 5), vec![(1, 0.6), (0, 0.4)]);
    }

    #[test]
    fn softmax_sums_to_one_and_preserves_order() {
        let probs = softmax(&[2.0, 1.0, 0.1, 5.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > probs[0] && probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn postprocess_rejects_wrong_width() {
        let labels = LabelSet::food_101();
        let err = postprocess(vec![0.001; 1000], &labels, TOP_K, false).unwrap_err();
        assert_eq!(
            err,
            AppError::LabelMismatch {
                expected: 101,
                actual: 1000
            }
        );
    }

    #[test]
    fn postprocess_rejects_nan_and_non_probabilities() {
        let labels = LabelSet::food_101();

        let mut scores = vec![0.0; 101];
        scores[7] = f32::NAN;
        assert!(matches!(
            postprocess(scores, &labels, TOP_K, false),
            Err(AppError::Inference(_))
        ));

        let mut scores = vec![0.0; 101];
        scores[3] = 4.2;
        assert!(matches!(
            postprocess(scores.clone(), &labels, TOP_K, false),
            Err(AppError::Inference(_))
        ));

        let preds = postprocess(scores, &labels, TOP_K, true).unwrap();
        assert_eq!(preds[0].class_name, "beef_carpaccio");
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
    }

    #[test]
    fn postprocess_maps_indices_through_labels() {
        let labels = LabelSet::food_101();
        let mut scores = vec![0.0; 101];
        scores[100] = 0.6;
        scores[0] = 0.25;
        scores[76] = 0.1;
        scores[53] = 0.05;

        let preds = postprocess(scores, &labels, TOP_K, false).unwrap();
        let names: Vec<&str> = preds.iter().map(|p| p.class_name.as_str()).collect();
        // index 1 wins the zero-score tie for fifth place
        assert_eq!(
            names,
            vec!["waffles", "apple_pie", "pizza", "hamburger", "baby_back_ribs"]
        );
    }
}
