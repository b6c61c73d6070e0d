use burn::{prelude::*, tensor::TensorData};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{InfoGanError, Result};

/// Generator input split into its two parts.
#[derive(Clone, Debug)]
pub struct LatentBatch<B: Backend> {
    /// `[batch, noise_dim]`, standard normal
    pub noise: Tensor<B, 2>,
    /// `[batch, num_classes]`, one-hot rows
    pub codes: Tensor<B, 2>,
    pub labels: Vec<usize>,
}
impl<B: Backend> LatentBatch<B> {
    /// Noise and code concatenated along the feature axis.
    pub fn latent(&self) -> Tensor<B, 2> {
        Tensor::cat(vec![self.noise.clone(), self.codes.clone()], 1)
    }
}

fn check_labels(labels: &[usize], num_classes: usize) -> Result<()> {
    match labels.iter().find(|&&label| label >= num_classes) {
        Some(&class) => Err(InfoGanError::InvalidClass { class, num_classes }),
        None => Ok(()),
    }
}

/// `[labels.len(), num_classes]` rows with a single 1 at each label.
pub fn one_hot<B: Backend>(
    labels: &[usize],
    num_classes: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    check_labels(labels, num_classes)?;

    Ok(encode(labels, num_classes, device))
}

// labels must already be below num_classes
fn encode<B: Backend>(labels: &[usize], num_classes: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        values[row * num_classes + label] = 1.0;
    }

    Tensor::from_data(TensorData::new(values, [labels.len(), num_classes]), device)
}

#[derive(Debug, Clone)]
pub struct LatentSampler {
    noise_dim: usize,
    num_classes: usize,
    rng: StdRng,
}
impl LatentSampler {
    pub fn new(noise_dim: usize, num_classes: usize, seed: u64) -> Self {
        Self {
            noise_dim,
            num_classes,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Fresh noise with uniformly drawn class labels.
    pub fn sample<B: Backend>(&mut self, batch_size: usize, device: &B::Device) -> LatentBatch<B> {
        let labels = (0..batch_size)
            .map(|_| self.rng.random_range(0..self.num_classes))
            .collect::<Vec<_>>();

        self.build(labels, device)
    }

    /// Fresh noise for the given class labels.
    pub fn sample_with_labels<B: Backend>(
        &mut self,
        labels: &[usize],
        device: &B::Device,
    ) -> Result<LatentBatch<B>> {
        check_labels(labels, self.num_classes)?;

        Ok(self.build(labels.to_vec(), device))
    }

    /// Noise comes from the sampler's own generator so a seed fixes the whole latent.
    fn build<B: Backend>(&mut self, labels: Vec<usize>, device: &B::Device) -> LatentBatch<B> {
        let len = labels.len() * self.noise_dim;
        let values = (0..len)
            .map(|_| self.rng.sample::<f32, _>(StandardNormal))
            .collect::<Vec<_>>();
        let noise = Tensor::from_data(
            TensorData::new(values, [labels.len(), self.noise_dim]),
            device,
        );
        let codes = encode(&labels, self.num_classes, device);

        LatentBatch {
            noise,
            codes,
            labels,
        }
    }
}
