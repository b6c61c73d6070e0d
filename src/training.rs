use burn::{
    config::Config,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        cast::ToElement,
        Int, Tensor,
    },
};
use std::path::Path;
use tracing::{debug, info};

use crate::{
    data::{self, ImageBatcher, ImageItem, RandomSampler},
    error::{self, InfoGanError},
    latent::LatentSampler,
    loss::{binary_accuracy, mutual_info_loss},
    model::{
        combined_forward, discriminator::Discriminator, generator::Generator,
        recognition::Recognition, InfoGan, ModelConfig,
    },
    utils::save_image_grid,
};

/// Rows in the sample grid; every column holds one class.
const SAMPLE_ROWS: usize = 10;

// ////////////////////////////////////////////////////////////////////////////
// Helpers
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepLosses {
    /// Mean of the real and fake discriminator losses.
    pub discriminator: f32,
    pub discriminator_accuracy: f32,
    /// Adversarial term of the combined loss.
    pub generator: f32,
    /// Mutual information term of the combined loss.
    pub recognition: f32,
}
impl StepLosses {
    pub fn is_finite(&self) -> bool {
        [
            self.discriminator,
            self.discriminator_accuracy,
            self.generator,
            self.recognition,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

// ////////////////////////////////////////////////////////////////////////////
// Training
#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,

    #[config(default = 50000)]
    pub iterations: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    /// Save a sample grid every `sample_interval` iterations
    #[config(default = 50)]
    pub sample_interval: usize,
    #[config(default = 2e-4)]
    pub lr: f64,
    /// Weight of the mutual information term in the combined loss
    #[config(default = 1.0)]
    pub mi_weight: f32,
    #[config(default = 42)]
    pub seed: u64,
}
impl TrainingConfig {
    /// Adam with beta1 = 0.5, the usual setting for adversarial training.
    pub fn adam() -> AdamConfig {
        AdamConfig::new().with_beta_1(0.5).with_epsilon(1e-7)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> error::Result<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|err| InfoGanError::Config {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }
}

/// Owns the three networks and their optimizers for the length of a run.
pub struct TrainingSession<B: AutodiffBackend> {
    pub model: InfoGan<B>,
    gen_optimizer: OptimizerAdaptor<Adam, Generator<B>, B>,
    disc_optimizer: OptimizerAdaptor<Adam, Discriminator<B>, B>,
    reco_optimizer: OptimizerAdaptor<Adam, Recognition<B>, B>,
    bce: BinaryCrossEntropyLoss<B>,
    latent: LatentSampler,
    lr: f64,
    mi_weight: f32,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    pub fn new(config: &TrainingConfig, device: &B::Device) -> Self {
        Self {
            model: config.model.init::<B>(device),
            gen_optimizer: config.optimizer.init(),
            disc_optimizer: config.optimizer.init(),
            reco_optimizer: config.optimizer.init(),
            bce: BinaryCrossEntropyLossConfig::new().init(device),
            latent: LatentSampler::new(
                config.model.noise_dim,
                config.model.num_classes,
                config.seed,
            ),
            lr: config.lr,
            mi_weight: config.mi_weight,
        }
    }

    /// One iteration: a discriminator update on real images, one on generated images, then a
    /// joint generator and recognition update through the frozen discriminator.
    pub fn step(&mut self, real_images: Tensor<B, 4>) -> StepLosses {
        let batch_size = real_images.dims()[0];
        let device = real_images.device();

        let sampled = self.latent.sample::<B>(batch_size, &device);
        let latent = sampled.latent();

        // detach: only the discriminator is updated from these
        let fake_images = self.model.generator.forward(latent.clone()).detach();

        let (real_loss, real_accuracy) = self.discriminator_step(real_images, true);
        let (fake_loss, fake_accuracy) = self.discriminator_step(fake_images, false);

        let (generator, recognition) = self.generator_step(latent, sampled.codes);

        StepLosses {
            discriminator: 0.5 * (real_loss + fake_loss),
            discriminator_accuracy: 0.5 * (real_accuracy + fake_accuracy),
            generator,
            recognition,
        }
    }

    fn discriminator_step(&mut self, images: Tensor<B, 4>, real: bool) -> (f32, f32) {
        let scores = self.model.discriminator.forward(images);
        let [batch_size, channels] = scores.dims();
        let device = scores.device();

        let targets = if real {
            Tensor::<B, 2, Int>::ones([batch_size, channels], &device)
        } else {
            Tensor::<B, 2, Int>::zeros([batch_size, channels], &device)
        };
        let accuracy = binary_accuracy(scores.clone().detach(), real);

        let loss = self.bce.forward(scores, targets);
        let value = loss.clone().into_scalar().to_f32();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model.discriminator);
        self.model.discriminator =
            self.disc_optimizer
                .step(self.lr, self.model.discriminator.clone(), grads);

        (value, accuracy)
    }

    fn generator_step(&mut self, latent: Tensor<B, 2>, codes: Tensor<B, 2>) -> (f32, f32) {
        // clones share their BatchNorm running statistics, so the combined pass would
        // otherwise fold generated batches into the discriminator's
        let snapshot = self.model.discriminator.clone().into_record();
        let frozen = self.model.discriminator.clone().no_grad();
        let output = combined_forward(
            &self.model.generator,
            &frozen,
            &self.model.recognition,
            latent,
        );
        self.model.discriminator = self.model.discriminator.clone().load_record(snapshot);

        let [batch_size, channels] = output.validity.dims();
        let valid = Tensor::<B, 2, Int>::ones([batch_size, channels], &output.validity.device());
        let adversarial = self.bce.forward(output.validity, valid);
        let information = mutual_info_loss(codes, output.code);

        let adversarial_value = adversarial.clone().into_scalar().to_f32();
        let information_value = information.clone().into_scalar().to_f32();

        let loss = adversarial + information * self.mi_weight;
        let mut grads = loss.backward();
        let gen_grads = GradientsParams::from_module(&mut grads, &self.model.generator);
        let reco_grads = GradientsParams::from_module(&mut grads, &self.model.recognition);

        self.model.generator =
            self.gen_optimizer
                .step(self.lr, self.model.generator.clone(), gen_grads);
        self.model.recognition =
            self.reco_optimizer
                .step(self.lr, self.model.recognition.clone(), reco_grads);

        (adversarial_value, information_value)
    }
}

/// Renders one grid: column `i` uses class `i`, every cell gets its own noise.
pub fn save_sample_grid<B: Backend, P: AsRef<Path>>(
    generator: &Generator<B>,
    sampler: &mut LatentSampler,
    path: P,
    device: &B::Device,
) -> error::Result<()> {
    let num_classes = sampler.num_classes();
    let labels = (0..SAMPLE_ROWS)
        .flat_map(|_| 0..num_classes)
        .collect::<Vec<_>>();
    let sampled = sampler.sample_with_labels::<B>(&labels, device)?;

    let images = generator.forward(sampled.latent());
    let images = images * 0.5 + 0.5;

    save_image_grid(images, num_classes, path.as_ref())?;
    debug!("saved sample grid to {}", path.as_ref().display());
    Ok(())
}

// Create the directory to save the model and model config
fn create_artifact_dir(artifact_dir: &Path) -> error::Result<()> {
    std::fs::create_dir_all(artifact_dir.join("images"))?;
    std::fs::create_dir_all(artifact_dir.join("model"))?;
    Ok(())
}

pub fn train<B: AutodiffBackend, D: Dataset<ImageItem>>(
    artifact_dir: &Path,
    config: TrainingConfig,
    dataset: &D,
    device: &B::Device,
) -> error::Result<Vec<StepLosses>> {
    config.model.validate()?;
    if config.model.image_size() != data::IMAGE_SIZE || config.model.channels != data::CHANNELS {
        return Err(InfoGanError::InvalidConfig(format!(
            "model produces {}x{}x{} images, dataset holds {}x{}x{}",
            config.model.channels,
            config.model.image_size(),
            config.model.image_size(),
            data::CHANNELS,
            data::IMAGE_SIZE,
            data::IMAGE_SIZE
        )));
    }
    if config.batch_size == 0 {
        return Err(InfoGanError::InvalidConfig(
            "batch size must be positive".to_string(),
        ));
    }
    if dataset.is_empty() {
        return Err(InfoGanError::EmptyDataset);
    }

    create_artifact_dir(artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;
    B::seed(config.seed);

    let mut session = TrainingSession::<B>::new(&config, device);
    let batcher = ImageBatcher::new();
    let mut sampler = RandomSampler::new(config.seed);
    let mut sample_latent = LatentSampler::new(
        config.model.noise_dim,
        config.model.num_classes,
        config.seed.wrapping_add(1),
    );

    info!(
        "training for {} iterations on {} images, batch size {}",
        config.iterations,
        dataset.len(),
        config.batch_size
    );

    let mut history = Vec::with_capacity(config.iterations);
    for iteration in 0..config.iterations {
        let batch = sampler.sample::<B, D>(dataset, &batcher, config.batch_size, device);
        let losses = session.step(batch.images);

        info!(
            "{} [D loss: {:.2}, acc.: {:.2}%] [Q loss: {:.2}] [G loss: {:.2}]",
            iteration,
            losses.discriminator,
            100.0 * losses.discriminator_accuracy,
            losses.recognition,
            losses.generator
        );
        history.push(losses);

        //  If at save interval => save generated image samples
        if config.sample_interval > 0 && iteration % config.sample_interval == 0 {
            let path = artifact_dir
                .join("images")
                .join(format!("{iteration}.png"));
            save_sample_grid(
                &session.model.generator.valid(),
                &mut sample_latent,
                path,
                device,
            )?;
        }
    }

    session.model.save(artifact_dir.join("model"))?;

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::CifarDataset, TestAutodiffBackend, TestBackend};
    use burn::tensor::Distribution;

    fn tiny_model() -> ModelConfig {
        // 8 -> 16 -> 32
        ModelConfig::new()
            .with_noise_dim(6)
            .with_num_classes(4)
            .with_generator_hidden(16)
            .with_base_channels(8)
            .with_base_size(8)
            .with_generator_filters(vec![8, 4])
            .with_trunk_filters(vec![4, 8])
            .with_recognition_hidden(8)
    }

    fn tiny_dataset() -> CifarDataset {
        let items = (0..8)
            .map(|label| ImageItem {
                pixels: (0..3 * 32 * 32)
                    .map(|i| ((i * (label + 1)) % 255) as f32 / 127.5 - 1.0)
                    .collect(),
                label: label % 4,
            })
            .collect();
        CifarDataset::from_items(items).unwrap()
    }

    #[test]
    fn test_step_losses_are_finite() {
        let device = Default::default();
        let config = TrainingConfig::new(tiny_model(), TrainingConfig::adam());
        let mut session = TrainingSession::<TestAutodiffBackend>::new(&config, &device);

        let real = Tensor::<TestAutodiffBackend, 4>::random(
            [4, 3, 32, 32],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let losses = session.step(real);

        assert!(losses.is_finite(), "{losses:?}");
        assert!(losses.discriminator >= 0.0);
        assert!((0.0..=1.0).contains(&losses.discriminator_accuracy));
        assert!(losses.recognition >= 0.0);
    }

    #[test]
    fn test_generator_step_leaves_discriminator_unchanged() {
        let device = Default::default();
        let config = TrainingConfig::new(tiny_model(), TrainingConfig::adam());
        let mut session = TrainingSession::<TestAutodiffBackend>::new(&config, &device);

        let images = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let before = session
            .model
            .discriminator
            .valid()
            .forward(images.clone())
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        let sampled = session.latent.sample::<TestAutodiffBackend>(4, &device);
        session.generator_step(sampled.latent(), sampled.codes);

        let after = session
            .model
            .discriminator
            .valid()
            .forward(images)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-6, "{before:?} != {after:?}");
        }
    }

    #[test]
    fn test_train_end_to_end() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig::new(tiny_model(), TrainingConfig::adam())
            .with_iterations(5)
            .with_batch_size(4)
            .with_sample_interval(2);

        let history =
            train::<TestAutodiffBackend, _>(dir.path(), config, &tiny_dataset(), &device).unwrap();

        assert_eq!(history.len(), 5);
        assert!(history.iter().all(StepLosses::is_finite));
        for iteration in [0, 2, 4] {
            assert!(dir.path().join(format!("images/{iteration}.png")).exists());
        }
        assert!(!dir.path().join("images/1.png").exists());
        assert!(dir.path().join("config.json").exists());
        assert!(dir.path().join("model/generator.mpk").exists());

        // saved artifacts reload into an inference model
        let saved = TrainingConfig::load_json(dir.path().join("config.json")).unwrap();
        assert_eq!(saved.iterations, 5);
        InfoGan::<TestBackend>::load(dir.path().join("model"), &saved.model, &device).unwrap();
    }

    #[test]
    fn test_mismatched_image_size_rejected() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config =
            TrainingConfig::new(tiny_model().with_base_size(4), TrainingConfig::adam());

        let result = train::<TestAutodiffBackend, _>(dir.path(), config, &tiny_dataset(), &device);
        assert!(matches!(result, Err(InfoGanError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TrainingConfig::new(tiny_model(), TrainingConfig::adam())
            .with_batch_size(16)
            .with_seed(7);
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load_json(&path).unwrap();
        assert_eq!(loaded.batch_size, 16);
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.model.base_size, 8);
        assert_eq!(loaded.model.generator_filters, vec![8, 4]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig::new(tiny_model(), TrainingConfig::adam())
            .with_iterations(1)
            .with_batch_size(0);

        let result = train::<TestAutodiffBackend, _>(dir.path(), config, &tiny_dataset(), &device);
        assert!(matches!(result, Err(InfoGanError::InvalidConfig(_))));
    }

    #[test]
    fn test_sample_grid_size() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = tiny_model();
        let generator = model.generator_config().init::<TestBackend>(&device);
        let mut sampler = LatentSampler::new(model.noise_dim, model.num_classes, 3);

        let path = dir.path().join("grid.png");
        save_sample_grid(&generator, &mut sampler, &path, &device).unwrap();

        let grid = image::open(&path).unwrap();
        assert_eq!(grid.width(), 4 * 32);
        assert_eq!(grid.height(), 10 * 32);
    }
}
