use burn::{
    module::Module,
    nn::{BatchNorm, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::{
    error::{self, InfoGanError},
    model::layers::{batch_norm, glorot, DenseBlock, SameConv2d, UpBlock},
};

#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    dense: DenseBlock<B>,
    project: Linear<B>,
    project_bn: BatchNorm<B, 2>,
    up_layers: Vec<UpBlock<B>>,
    out_layer: SameConv2d<B>,
    base_channels: usize,
    base_size: usize,
}
impl<B: Backend> Generator<B> {
    /// `[batch, latent_dim]` -> `[batch, channels, size, size]` in [-1, 1]
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch_size, _] = latent.dims();

        let output = self.dense.forward(latent);
        let output = relu(self.project.forward(output));
        let output = output.reshape([
            batch_size,
            self.base_channels,
            self.base_size,
            self.base_size,
        ]);
        let output = self.project_bn.forward(output);

        let output = self
            .up_layers
            .iter()
            .fold(output, |output, layer| layer.forward(output));
        let output = self.out_layer.forward(output);

        burn::tensor::activation::tanh(output)
    }
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    #[config(default = 134)]
    pub latent_dim: usize,
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 1024)]
    pub hidden: usize,
    #[config(default = 448)]
    pub base_channels: usize,
    #[config(default = 4)]
    pub base_size: usize,
    #[config(default = "vec![256, 128, 64]")]
    pub filters: Vec<usize>,
}
impl GeneratorConfig {
    /// Side length of generated images.
    pub fn image_size(&self) -> usize {
        self.base_size << self.filters.len()
    }

    pub fn validate(&self) -> error::Result<()> {
        let dims = [
            self.latent_dim,
            self.channels,
            self.hidden,
            self.base_channels,
            self.base_size,
        ];
        if dims.contains(&0) || self.filters.contains(&0) {
            return Err(InfoGanError::InvalidConfig(
                "generator dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let dense = DenseBlock::new(self.latent_dim, self.hidden, device);
        // normalized per channel after the reshape
        let project = LinearConfig::new(
            self.hidden,
            self.base_channels * self.base_size * self.base_size,
        )
        .with_initializer(glorot())
        .init(device);
        let project_bn = batch_norm(self.base_channels, device);

        let mut up_layers = Vec::with_capacity(self.filters.len());
        let mut in_channels = self.base_channels;
        for &filters in &self.filters {
            up_layers.push(UpBlock::new([in_channels, filters], device));
            in_channels = filters;
        }

        let out_layer = SameConv2d::new([in_channels, self.channels], 4, 1, device);

        Generator {
            dense,
            project,
            project_bn,
            up_layers,
            out_layer,
            base_channels: self.base_channels,
            base_size: self.base_size,
        }
    }
}
