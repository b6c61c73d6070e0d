use burn::{
    module::Module,
    nn::{Linear, LinearConfig, Sigmoid},
    prelude::*,
};

use crate::model::{
    features::{FeatureExtractor, FeatureExtractorConfig},
    layers::glorot,
};

#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    features: FeatureExtractor<B>,
    out_layer: Linear<B>,
    sig: Sigmoid,
}
impl<B: Backend> Discriminator<B> {
    /// One validity score per image channel: `[batch, channels]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let output = self.features.forward(images);
        let output = self.out_layer.forward(output);

        self.sig.forward(output).clamp(0.00001, 0.99999)
    }
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    pub features: FeatureExtractorConfig,
}
impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let features = self.features.init(device);
        let out_layer = LinearConfig::new(self.features.output_features(), self.features.channels)
            .with_initializer(glorot())
            .init(device);
        let sig = Sigmoid::new();

        Discriminator {
            features,
            out_layer,
            sig,
        }
    }
}
