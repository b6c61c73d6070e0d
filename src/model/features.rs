use burn::{module::Module, prelude::*};

use crate::{
    error::{self, InfoGanError},
    model::layers::{down_output_size, DownBlock},
};

/// Convolutional trunk used by both the discriminator and the recognition network.
///
/// Each network owns its own instance; weights are never shared between the two.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    blocks: Vec<DownBlock<B>>,
}
impl<B: Backend> FeatureExtractor<B> {
    /// `[batch, channels, size, size]` -> `[batch, features]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let output = self
            .blocks
            .iter()
            .fold(input, |output, block| block.forward(output));

        output.flatten(1, 3)
    }
}

#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 32)]
    pub image_size: usize,
    #[config(default = "vec![64, 128, 256]")]
    pub filters: Vec<usize>,
}
impl FeatureExtractorConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.filters.is_empty() {
            return Err(InfoGanError::InvalidConfig(
                "feature extractor needs at least one filter size".to_string(),
            ));
        }
        if self.channels == 0 || self.image_size == 0 || self.filters.contains(&0) {
            return Err(InfoGanError::InvalidConfig(
                "feature extractor dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The first block skips normalization, the middle blocks pad their trailing edge by one,
    /// and the last block always uses the final filter size.
    fn layout(&self) -> Vec<([usize; 2], bool, bool)> {
        let last = self.filters.len() - 1;
        let mut layout = vec![([self.channels, self.filters[0]], false, false)];
        for window in self.filters[..last].windows(2) {
            layout.push(([window[0], window[1]], true, true));
        }
        let prev = if last == 0 {
            self.filters[0]
        } else {
            self.filters[last - 1]
        };
        layout.push(([prev, self.filters[last]], false, true));

        layout
    }

    /// Length of the flattened feature vector.
    pub fn output_features(&self) -> usize {
        let (size, channels) = self
            .layout()
            .iter()
            .fold((self.image_size, self.channels), |(size, _), (ch, pad, _)| {
                (down_output_size(size, *pad), ch[1])
            });

        channels * size * size
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let blocks = self
            .layout()
            .into_iter()
            .map(|(channels, pad, normalize)| DownBlock::new(channels, pad, normalize, device))
            .collect();

        FeatureExtractor { blocks }
    }
}
