use burn::prelude::*;

use crate::error::{InpaintError, Result};

/// Per-pixel reconstruction weights for a `height` x `width` hole, row-major.
///
/// With `from_boundary` the exponent is the distance to the nearest hole edge,
/// so edge pixels weigh 1.0 and the interior decays towards the center.
/// Otherwise the exponent is the Chebyshev distance to the hole center.
/// Weights that would underflow `f32` are held at `f32::MIN_POSITIVE`, so every
/// pixel keeps a strictly positive weight whatever `gamma` and hole size.
pub fn spatial_discount(gamma: f64, shape: [usize; 2], from_boundary: bool) -> Result<Vec<f32>> {
    if !(gamma > 0.0 && gamma < 1.0) {
        return Err(InpaintError::InvalidGamma(gamma));
    }
    let [height, width] = shape;
    if height == 0 || width == 0 {
        return Ok(Vec::new());
    }
    let center_row = (height - 1) as f64 / 2.0;
    let center_col = (width - 1) as f64 / 2.0;

    let mut weights = Vec::with_capacity(height * width);
    for row in 0..height {
        for col in 0..width {
            let distance = if from_boundary {
                row.min(height - 1 - row).min(col).min(width - 1 - col) as i32
            } else {
                let dr = (row as f64 - center_row).abs();
                let dc = (col as f64 - center_col).abs();
                dr.max(dc).floor() as i32
            };
            weights.push((gamma.powi(distance) as f32).max(f32::MIN_POSITIVE));
        }
    }
    Ok(weights)
}

pub fn discount_map<B: Backend>(
    gamma: f64,
    shape: [usize; 2],
    from_boundary: bool,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let weights = spatial_discount(gamma, shape, from_boundary)?;
    Ok(Tensor::from_data(
        TensorData::new(weights, shape).convert::<B::FloatElem>(),
        device,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;

    #[test]
    fn weights_lie_in_unit_interval() {
        for from_boundary in [true, false] {
            let weights = spatial_discount(0.9, [17, 12], from_boundary).unwrap();
            assert_eq!(weights.len(), 17 * 12);
            assert!(weights.iter().all(|&w| w > 0.0 && w <= 1.0));
        }
    }

    #[test]
    fn boundary_convention_decays_inwards() {
        let weights = spatial_discount(0.8, [9, 9], true).unwrap();
        let row = &weights[4 * 9..5 * 9];
        assert_relative_eq!(row[0], 1.0);
        assert_relative_eq!(row[8], 1.0);
        for col in 0..4 {
            assert!(row[col] > row[col + 1]);
        }
        assert_relative_eq!(row[4], 0.8f32.powi(4), epsilon = 1e-6);
        assert_eq!(row[3], row[5]);
    }

    #[test]
    fn center_convention_decays_outwards() {
        let weights = spatial_discount(0.8, [9, 9], false).unwrap();
        let row = &weights[4 * 9..5 * 9];
        assert_relative_eq!(row[4], 1.0);
        for col in 0..4 {
            assert!(row[col] < row[col + 1]);
        }
        assert_relative_eq!(weights[0], 0.8f32.powi(4), epsilon = 1e-6);
    }

    #[test]
    fn small_gamma_on_large_hole_stays_positive() {
        for from_boundary in [true, false] {
            let weights = spatial_discount(0.01, [256, 256], from_boundary).unwrap();
            assert!(weights.iter().all(|&w| w > 0.0 && w <= 1.0));
            assert!(weights.iter().any(|&w| w == f32::MIN_POSITIVE));
        }
    }

    #[test]
    fn gamma_outside_open_interval_is_rejected() {
        for gamma in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                spatial_discount(gamma, [4, 4], true),
                Err(InpaintError::InvalidGamma(_))
            ));
        }
    }

    #[test]
    fn map_broadcasts_over_batch_and_channels() {
        let device = Default::default();
        let map = discount_map::<NdArray<f32>>(0.999, [64, 64], true, &device).unwrap();
        assert_eq!(map.dims(), [64, 64]);

        let expanded = map
            .clone()
            .unsqueeze::<4>()
            .repeat_dim(0, 2)
            .repeat_dim(1, 3);
        let plain = map.into_data().to_vec::<f32>().unwrap();
        let expanded = expanded.into_data().to_vec::<f32>().unwrap();
        for chunk in expanded.chunks(64 * 64) {
            assert_eq!(chunk, plain.as_slice());
        }
    }
}
