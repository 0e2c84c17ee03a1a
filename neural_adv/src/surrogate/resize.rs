//! Differentiable bilinear resize.
//!
//! Resizing is expressed as two matrix products with fixed interpolation weights, so it
//! only needs `matmul` on the backend and gradients flow back to the rendered image.

use burn::prelude::*;

/// Row-stochastic `[out, in]` bilinear weights (half-pixel centers, edge clamped).
pub fn bilinear_weights(input: usize, output: usize) -> Vec<f32> {
    let mut weights = vec![0.0f32; output * input];
    if input == 0 || output == 0 {
        return weights;
    }
    let scale = input as f32 / output as f32;
    for o in 0..output {
        let src = ((o as f32 + 0.5) * scale - 0.5).clamp(0.0, (input - 1) as f32);
        let i0 = src.floor() as usize;
        let i1 = (i0 + 1).min(input - 1);
        let t = src - i0 as f32;
        weights[o * input + i0] += 1.0 - t;
        weights[o * input + i1] += t;
    }
    weights
}

/// Bilinear resize of `[N, C, H, W]` images.
#[derive(Debug, Clone)]
pub struct BilinearResize<B: Backend> {
    /// `[H_in, H_out]`
    rows_t: Tensor<B, 2>,
    /// `[W_in, W_out]`
    cols_t: Tensor<B, 2>,
    input: [usize; 2],
    output: [usize; 2],
}

impl<B: Backend> BilinearResize<B> {
    /// Build the weights for `input` `[H, W]` to `output` `[H, W]`.
    pub fn new(input: [usize; 2], output: [usize; 2], device: &B::Device) -> Self {
        let rows = Tensor::<B, 1>::from_floats(bilinear_weights(input[0], output[0]).as_slice(), device)
            .reshape([output[0], input[0]]);
        let cols = Tensor::<B, 1>::from_floats(bilinear_weights(input[1], output[1]).as_slice(), device)
            .reshape([output[1], input[1]]);
        Self {
            rows_t: rows.transpose(),
            cols_t: cols.transpose(),
            input,
            output,
        }
    }

    /// Input size this resize was built for.
    pub fn input_size(&self) -> [usize; 2] {
        self.input
    }

    /// Resize `x`, which must be `[N, C, input[0], input[1]]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = x.dims();
        let [ho, wo] = self.output;

        // Columns: [N*C*H, W] x [W, Wo]
        let x = x.reshape([n * c * h, w]).matmul(self.cols_t.clone());
        // Rows: move H last, [N*C*Wo, H] x [H, Ho]
        let x = x.reshape([n, c, h, wo]).swap_dims(2, 3).reshape([n * c * wo, h]);
        let x = x.matmul(self.rows_t.clone());
        x.reshape([n, c, wo, ho]).swap_dims(2, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_weights_rows_sum_to_one() {
        for (i, o) in [(4, 8), (8, 3), (5, 5), (1, 4)] {
            let w = bilinear_weights(i, o);
            for row in w.chunks(i) {
                let sum: f32 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_identity_size() {
        let w = bilinear_weights(3, 3);
        assert_eq!(w, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_resize_constant_image() {
        let device = Default::default();
        let resize = BilinearResize::<TestBackend>::new([4, 6], [7, 3], &device);
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 4, 6], &device) * 0.25;
        let y = resize.forward(x);
        assert_eq!(y.dims(), [2, 3, 7, 3]);

        let values = y.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_resize_preserves_horizontal_ramp() {
        let device = Default::default();
        let ramp: Vec<f32> = (0..4).flat_map(|_| [0.0, 1.0, 2.0, 3.0]).collect();
        let x = Tensor::<TestBackend, 1>::from_floats(ramp.as_slice(), &device).reshape([1, 1, 4, 4]);
        let y = BilinearResize::<TestBackend>::new([4, 4], [2, 2], &device).forward(x);
        let values = y.into_data().to_vec::<f32>().unwrap();
        // Downsampling by 2 averages neighbouring columns
        assert!((values[0] - 0.5).abs() < 1e-6);
        assert!((values[1] - 2.5).abs() < 1e-6);
        assert!((values[2] - 0.5).abs() < 1e-6);
    }
}
