pub mod discriminator;
pub mod features;
pub mod generator;
pub mod layers;
pub mod recognition;

use burn::{
    module::Module,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use std::path::Path;
use tracing::{debug, info};

use crate::{
    error::{self, InfoGanError},
    model::{
        discriminator::{Discriminator, DiscriminatorConfig},
        features::FeatureExtractorConfig,
        generator::{Generator, GeneratorConfig},
        recognition::{Recognition, RecognitionConfig},
    },
};

const GENERATOR_FILE: &str = "generator";
const DISCRIMINATOR_FILE: &str = "discriminator";
const RECOGNITION_FILE: &str = "recognition";

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

#[derive(Module, Debug)]
pub struct InfoGan<B: Backend> {
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    pub recognition: Recognition<B>,
}

/// Everything the combined generator -> (discriminator, recognition) graph produces.
#[derive(Clone, Debug)]
pub struct CombinedOutput<B: Backend> {
    pub images: Tensor<B, 4>,
    pub validity: Tensor<B, 2>,
    pub code: Tensor<B, 2>,
}

/// Runs generated images through both heads. Callers freeze a head by passing a
/// `no_grad()` copy of it.
pub fn combined_forward<B: Backend>(
    generator: &Generator<B>,
    discriminator: &Discriminator<B>,
    recognition: &Recognition<B>,
    latent: Tensor<B, 2>,
) -> CombinedOutput<B> {
    let images = generator.forward(latent);
    let validity = discriminator.forward(images.clone());
    let code = recognition.forward(images.clone());

    CombinedOutput {
        images,
        validity,
        code,
    }
}

impl<B: Backend> InfoGan<B> {
    pub fn combined(&self, latent: Tensor<B, 2>) -> CombinedOutput<B> {
        combined_forward(
            &self.generator,
            &self.discriminator,
            &self.recognition,
            latent,
        )
    }

    /// Writes the weights of all three networks into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> error::Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let recorder = recorder();
        self.generator
            .clone()
            .save_file(dir.join(GENERATOR_FILE), &recorder)?;
        self.discriminator
            .clone()
            .save_file(dir.join(DISCRIMINATOR_FILE), &recorder)?;
        self.recognition
            .clone()
            .save_file(dir.join(RECOGNITION_FILE), &recorder)?;

        info!("saved model weights to {}", dir.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(
        dir: P,
        config: &ModelConfig,
        device: &B::Device,
    ) -> error::Result<Self> {
        let dir = dir.as_ref();
        let recorder = recorder();

        let generator = load_generator(dir, config, device)?;
        let discriminator = config
            .discriminator_config()
            .init::<B>(device)
            .load_file(dir.join(DISCRIMINATOR_FILE), &recorder, device)?;
        let recognition = config
            .recognition_config()
            .init::<B>(device)
            .load_file(dir.join(RECOGNITION_FILE), &recorder, device)?;

        Ok(Self {
            generator,
            discriminator,
            recognition,
        })
    }
}

/// Loads only the generator, which is all sampling needs.
pub fn load_generator<B: Backend, P: AsRef<Path>>(
    dir: P,
    config: &ModelConfig,
    device: &B::Device,
) -> error::Result<Generator<B>> {
    let path = dir.as_ref().join(GENERATOR_FILE);
    debug!("loading generator from {}", path.display());

    let generator = config
        .generator_config()
        .init::<B>(device)
        .load_file(path, &recorder(), device)?;

    Ok(generator)
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 124)]
    pub noise_dim: usize,
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 1024)]
    pub generator_hidden: usize,
    #[config(default = 448)]
    pub base_channels: usize,
    #[config(default = 4)]
    pub base_size: usize,
    #[config(default = "vec![256, 128, 64]")]
    pub generator_filters: Vec<usize>,
    #[config(default = "vec![64, 128, 256]")]
    pub trunk_filters: Vec<usize>,
    #[config(default = 128)]
    pub recognition_hidden: usize,
}
impl ModelConfig {
    /// Noise followed by the one-hot code.
    pub fn latent_dim(&self) -> usize {
        self.noise_dim + self.num_classes
    }

    pub fn image_size(&self) -> usize {
        self.generator_config().image_size()
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig::new()
            .with_latent_dim(self.latent_dim())
            .with_channels(self.channels)
            .with_hidden(self.generator_hidden)
            .with_base_channels(self.base_channels)
            .with_base_size(self.base_size)
            .with_filters(self.generator_filters.clone())
    }

    fn features_config(&self) -> FeatureExtractorConfig {
        FeatureExtractorConfig::new()
            .with_channels(self.channels)
            .with_image_size(self.image_size())
            .with_filters(self.trunk_filters.clone())
    }

    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig::new(self.features_config())
    }

    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig::new(self.features_config())
            .with_num_classes(self.num_classes)
            .with_hidden(self.recognition_hidden)
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.noise_dim == 0 || self.num_classes == 0 || self.recognition_hidden == 0 {
            return Err(InfoGanError::InvalidConfig(
                "noise, class and recognition sizes must be positive".to_string(),
            ));
        }
        self.generator_config().validate()?;
        self.features_config().validate()
    }

    /// Builds the generator and two independent trunks for the discriminator and recognition
    /// network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> InfoGan<B> {
        let generator = self.generator_config().init(device);
        let discriminator = self.discriminator_config().init(device);
        let recognition = self.recognition_config().init(device);

        InfoGan {
            generator,
            discriminator,
            recognition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    fn assert_close<const D: usize>(
        actual: Tensor<TestBackend, D>,
        expected: Tensor<TestBackend, D>,
    ) {
        let actual = actual.into_data().to_vec::<f32>().unwrap();
        let expected = expected.into_data().to_vec::<f32>().unwrap();
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-5, "{a} != {e}");
        }
    }

    fn small_config() -> ModelConfig {
        ModelConfig::new()
            .with_noise_dim(6)
            .with_num_classes(4)
            .with_generator_hidden(16)
            .with_base_channels(8)
            .with_generator_filters(vec![8, 4])
            .with_trunk_filters(vec![4, 8])
            .with_recognition_hidden(8)
    }

    #[test]
    fn test_default_latent_and_image_size() {
        let config = ModelConfig::new();
        assert_eq!(config.latent_dim(), 134);
        assert_eq!(config.image_size(), 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_combined_shapes() {
        let device = Default::default();
        let config = small_config();
        let model = config.init::<TestBackend>(&device);

        let latent = Tensor::<TestBackend, 2>::random(
            [5, config.latent_dim()],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.combined(latent);

        assert_eq!(output.images.dims(), [5, 3, 16, 16]);
        assert_eq!(output.validity.dims(), [5, 3]);
        assert_eq!(output.code.dims(), [5, 4]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let device = Default::default();
        let config = small_config();
        let model = config.init::<TestBackend>(&device);
        let dir = tempfile::tempdir().unwrap();

        model.save(dir.path()).unwrap();
        let reloaded = InfoGan::<TestBackend>::load(dir.path(), &config, &device).unwrap();

        let latent = Tensor::<TestBackend, 2>::random(
            [2, config.latent_dim()],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let expected = model.combined(latent.clone());
        let actual = reloaded.combined(latent);

        assert_close(actual.images, expected.images);
        assert_close(actual.validity, expected.validity);
        assert_close(actual.code, expected.code);
    }

    #[test]
    fn test_invalid_config() {
        let config = small_config().with_trunk_filters(vec![]);
        assert!(matches!(
            config.validate(),
            Err(InfoGanError::InvalidConfig(_))
        ));
    }
}
