use burn::{
    backend::NdArray,
    config::Config,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::Device,
};
use wasm_bindgen::prelude::*;

use crate::{
    latent::LatentSampler,
    model::generator::{Generator, GeneratorRecord},
    training::TrainingConfig,
};

type WasmBackend = NdArray<f32>;

fn js_error<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Browser-side generator built from a run's `config.json` and `model/generator.mpk`.
#[wasm_bindgen]
pub struct Sampler {
    generator: Generator<WasmBackend>,
    latent: LatentSampler,
    image_size: usize,
    device: Device<WasmBackend>,
}

#[wasm_bindgen]
impl Sampler {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &[u8], weights: Vec<u8>, seed: u64) -> Result<Sampler, JsValue> {
        let device = Default::default();
        let config = TrainingConfig::load_binary(config_json).map_err(js_error)?;

        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .load::<GeneratorRecord<WasmBackend>>(weights, &device)
            .map_err(js_error)?;
        let generator = config
            .model
            .generator_config()
            .init::<WasmBackend>(&device)
            .load_record(record);
        let latent = LatentSampler::new(config.model.noise_dim, config.model.num_classes, seed);

        Ok(Self {
            generator,
            latent,
            image_size: config.model.image_size(),
            device,
        })
    }

    #[wasm_bindgen(getter)]
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// One image of class `class` as interleaved RGB values in 0..=255.
    #[wasm_bindgen]
    pub fn generate(&mut self, class: usize) -> Result<Vec<f32>, JsValue> {
        let sampled = self
            .latent
            .sample_with_labels::<WasmBackend>(&[class], &self.device)
            .map_err(js_error)?;

        // [1, C, H, W] -> [H, W, C]
        let image = self
            .generator
            .forward(sampled.latent())
            .permute([0, 2, 3, 1])
            .squeeze::<3>(0);
        let data = image
            .into_data()
            .iter::<f32>()
            .map(|c| 255.0 * ((c + 1.0) / 2.0))
            .collect::<Vec<_>>();

        Ok(data)
    }
}
