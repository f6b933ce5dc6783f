//! Conversion of host batches into burn tensors.

use crate::types::Batch;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

pub struct BurnBatch<B: Backend> {
    /// `[n, 224, 224, 3]`, channels last, values in 0..=255.
    pub images: Tensor<B, 4>,
    /// `[n]` class codes.
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> BurnBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Batch {
    pub fn to_burn<B: Backend>(&self, device: &B::Device) -> BurnBatch<B> {
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(self.images.clone(), self.image_shape()),
            device,
        );
        let labels: Vec<i64> = self.labels.iter().map(|&l| i64::from(l)).collect();
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [self.len()]), device);
        BurnBatch { images, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sample, IMAGE_BYTES};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn converts_shapes_and_labels() {
        let mut batch = Batch::with_capacity(2);
        batch.push(Sample {
            image: vec![1.0; IMAGE_BYTES],
            label: 4,
        });
        batch.push(Sample {
            image: vec![2.0; IMAGE_BYTES],
            label: 7,
        });

        let device = Default::default();
        let burn_batch = batch.to_burn::<TestBackend>(&device);
        assert_eq!(burn_batch.images.dims(), [2, 224, 224, 3]);
        assert_eq!(burn_batch.len(), 2);

        let labels: Vec<i64> = burn_batch.labels.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(labels, vec![4, 7]);
        let sum: f32 = burn_batch.images.sum().into_scalar();
        assert_eq!(sum, 3.0 * IMAGE_BYTES as f32);
    }
}
