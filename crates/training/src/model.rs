//! Small classification head trained on top of raw record images.

use burn::module::Module;
use burn::nn;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use record_dataset::IMAGE_CHANNELS;

#[derive(Debug, Clone)]
pub struct ClassifierHeadConfig {
    pub num_classes: usize,
    /// Spatial size after adaptive pooling (square).
    pub pooled: usize,
    pub hidden: usize,
}

impl Default for ClassifierHeadConfig {
    fn default() -> Self {
        Self {
            num_classes: 10,
            pooled: 8,
            hidden: 512,
        }
    }
}

impl ClassifierHeadConfig {
    pub fn with_classes(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Self::default()
        }
    }

    fn flat_dim(&self) -> usize {
        IMAGE_CHANNELS * self.pooled * self.pooled
    }
}

/// `[n, h, w, 3]` pixels in 0..=255 → `[n, num_classes]` logits.
#[derive(Debug, Module)]
pub struct ClassifierHead<B: Backend> {
    pool: AdaptiveAvgPool2d,
    hidden: nn::Linear<B>,
    logits: nn::Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(cfg: &ClassifierHeadConfig, device: &B::Device) -> Self {
        let pooled = cfg.pooled.max(1);
        let pool = AdaptiveAvgPool2dConfig::new([pooled, pooled]).init();
        let hidden = nn::LinearConfig::new(cfg.flat_dim(), cfg.hidden).init(device);
        let logits = nn::LinearConfig::new(cfg.hidden, cfg.num_classes.max(1)).init(device);
        Self {
            pool,
            hidden,
            logits,
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.permute([0, 3, 1, 2]).div_scalar(255.0);
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = relu(self.hidden.forward(x));
        self.logits.forward(x)
    }
}
