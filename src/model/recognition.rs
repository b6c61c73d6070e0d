use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{relu, softmax},
};

use crate::model::{
    features::{FeatureExtractor, FeatureExtractorConfig},
    layers::glorot,
};

/// The "Q" network: predicts the categorical code that produced an image.
#[derive(Module, Debug)]
pub struct Recognition<B: Backend> {
    features: FeatureExtractor<B>,
    fc_layer: Linear<B>,
    out_layer: Linear<B>,
}
impl<B: Backend> Recognition<B> {
    /// Class distribution `[batch, num_classes]`, each row summing to one.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let output = self.features.forward(images);
        let output = relu(self.fc_layer.forward(output));
        let output = self.out_layer.forward(output);

        softmax(output, 1)
    }
}

#[derive(Config, Debug)]
pub struct RecognitionConfig {
    pub features: FeatureExtractorConfig,
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 128)]
    pub hidden: usize,
}
impl RecognitionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Recognition<B> {
        let features = self.features.init(device);
        let fc_layer = LinearConfig::new(self.features.output_features(), self.hidden)
            .with_initializer(glorot())
            .init(device);
        let out_layer = LinearConfig::new(self.hidden, self.num_classes)
            .with_initializer(glorot())
            .init(device);

        Recognition {
            features,
            fc_layer,
            out_layer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn test_rows_are_distributions() {
        let device = Default::default();
        let config = RecognitionConfig::new(FeatureExtractorConfig::new());
        let recognition = config.init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::random(
            [3, 3, 32, 32],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let output = recognition.forward(images);
        assert_eq!(output.dims(), [3, 10]);

        let sums = output.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {sum}");
        }
    }
}
