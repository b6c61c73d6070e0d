use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
    tensor::TensorData,
};
use image::imageops::FilterType;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, path::Path};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{InfoGanError, Result};

pub const IMAGE_SIZE: usize = 32;
pub const CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 10;
const PIXELS: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;
/// One label byte followed by the red, green and blue planes.
const RECORD_LEN: usize = 1 + PIXELS;

/// Maps a byte to [-1, 1].
pub fn scale_pixel(value: u8) -> f32 {
    (value as f32 - 127.5) / 127.5
}

// ////////////////////////////////////////////////////////////////////////////
// Dataset
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// Channels-first `[3, 32, 32]` values in [-1, 1].
    pub pixels: Vec<f32>,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct CifarDataset {
    items: Vec<ImageItem>,
}

impl CifarDataset {
    /// Reads the binary distribution if `dir` holds `data_batch_*.bin` files, otherwise treats
    /// `dir` as an image folder with one sub-directory per class.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if binary_batches(dir)?.is_empty() {
            Self::from_image_folder(dir)
        } else {
            Self::from_binary_dir(dir)
        }
    }

    pub fn from_binary_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut items = Vec::new();
        for path in binary_batches(dir.as_ref())? {
            let bytes = fs::read(&path)?;
            let batch = parse_binary_batch(&bytes)?;
            debug!("read {} images from {}", batch.len(), path.display());
            items.extend(batch);
        }

        info!("loaded {} training images", items.len());
        Self::from_items(items)
    }

    pub fn from_image_folder<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut classes = fs::read_dir(dir.as_ref())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect::<Vec<_>>();
        classes.sort();

        let mut items = Vec::new();
        for (label, class_dir) in classes.iter().enumerate() {
            for entry in WalkDir::new(class_dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if let Some(ext) = path.extension() {
                    if matches!(ext.to_str(), Some("jpg") | Some("jpeg") | Some("png")) {
                        items.push(load_image(path, label)?);
                    }
                }
            }
        }

        info!(
            "loaded {} training images in {} classes",
            items.len(),
            classes.len()
        );
        Self::from_items(items)
    }

    pub fn from_items(items: Vec<ImageItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(InfoGanError::EmptyDataset);
        }
        if let Some(item) = items.iter().find(|item| item.pixels.len() != PIXELS) {
            return Err(InfoGanError::InvalidDataset(format!(
                "expected {} values per image, found {}",
                PIXELS,
                item.pixels.len()
            )));
        }

        Ok(Self { items })
    }
}

impl Dataset<ImageItem> for CifarDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn binary_batches(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut batches = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("data_batch_") && name.ends_with(".bin"))
        })
        .collect::<Vec<_>>();
    batches.sort();

    Ok(batches)
}

/// Splits a CIFAR-10 binary batch into items.
pub fn parse_binary_batch(bytes: &[u8]) -> Result<Vec<ImageItem>> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(InfoGanError::InvalidDataset(format!(
            "batch file length {} is not a multiple of {}",
            bytes.len(),
            RECORD_LEN
        )));
    }

    bytes
        .chunks_exact(RECORD_LEN)
        .enumerate()
        .map(|(index, record)| {
            let label = record[0] as usize;
            if label >= NUM_CLASSES {
                return Err(InfoGanError::InvalidDataset(format!(
                    "record {index} has label {label}, expected fewer than {NUM_CLASSES}"
                )));
            }
            Ok(ImageItem {
                label,
                pixels: record[1..].iter().copied().map(scale_pixel).collect(),
            })
        })
        .collect()
}

fn load_image(path: &Path, label: usize) -> Result<ImageItem> {
    let mut image = image::open(path)?.to_rgb8();
    if image.width() as usize != IMAGE_SIZE || image.height() as usize != IMAGE_SIZE {
        image = image::imageops::resize(
            &image,
            IMAGE_SIZE as u32,
            IMAGE_SIZE as u32,
            FilterType::Triangle,
        );
    }

    // HWC -> CHW
    let mut pixels = vec![0.0; PIXELS];
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..CHANNELS {
            pixels[c * IMAGE_SIZE * IMAGE_SIZE + y as usize * IMAGE_SIZE + x as usize] =
                scale_pixel(pixel[c]);
        }
    }

    Ok(ImageItem { pixels, label })
}

// ////////////////////////////////////////////////////////////////////////////
// Batcher
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ImageBatcher {}
impl ImageBatcher {
    pub fn new() -> Self {
        Self {}
    }
}
impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let size = items.len();
        let pixels = items
            .into_iter()
            .flat_map(|item| item.pixels)
            .collect::<Vec<_>>();
        let data = TensorData::new(pixels, [size, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);

        ImageBatch {
            images: Tensor::from_data(data, device),
            size,
        }
    }
}

/// Draws batches uniformly with replacement.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
}
impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn indices(&mut self, len: usize, batch_size: usize) -> Vec<usize> {
        (0..batch_size).map(|_| self.rng.random_range(0..len)).collect()
    }

    pub fn sample<B: Backend, D: Dataset<ImageItem>>(
        &mut self,
        dataset: &D,
        batcher: &ImageBatcher,
        batch_size: usize,
        device: &B::Device,
    ) -> ImageBatch<B> {
        let items = self
            .indices(dataset.len(), batch_size)
            .into_iter()
            .filter_map(|index| dataset.get(index))
            .collect();

        batcher.batch(items, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn record(label: u8, value: u8) -> Vec<u8> {
        let mut record = vec![label];
        record.extend(std::iter::repeat_n(value, PIXELS));
        record
    }

    #[test]
    fn test_parse_binary_batch() {
        let mut bytes = record(3, 255);
        bytes.extend(record(7, 0));

        let items = parse_binary_batch(&bytes).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, 3);
        assert_eq!(items[1].label, 7);
        assert!(items[0].pixels.iter().all(|v| *v == 1.0));
        assert!(items[1].pixels.iter().all(|v| *v == -1.0));
    }

    #[test]
    fn test_truncated_batch_rejected() {
        let bytes = vec![0u8; RECORD_LEN + 5];
        assert!(matches!(
            parse_binary_batch(&bytes),
            Err(InfoGanError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_label_byte_out_of_range_rejected() {
        let mut bytes = record(9, 0);
        bytes.extend(record(10, 0));

        assert!(matches!(
            parse_binary_batch(&bytes),
            Err(InfoGanError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_open_binary_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = record(1, 128);
        bytes.extend(record(2, 64));
        fs::write(dir.path().join("data_batch_1.bin"), &bytes).unwrap();
        fs::write(dir.path().join("test_batch.bin"), record(9, 0)).unwrap();

        let dataset = CifarDataset::open(dir.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().label, 2);
    }

    #[test]
    fn test_open_image_folder() {
        let dir = tempfile::tempdir().unwrap();
        for (class, shade) in [("airplane", 0u8), ("cat", 255u8)] {
            let class_dir = dir.path().join(class);
            fs::create_dir_all(&class_dir).unwrap();
            let image = image::RgbImage::from_pixel(16, 16, image::Rgb([shade, shade, shade]));
            image.save(class_dir.join("0.png")).unwrap();
        }

        let dataset = CifarDataset::open(dir.path()).unwrap();
        assert_eq!(dataset.len(), 2);

        let cat = dataset.get(1).unwrap();
        assert_eq!(cat.label, 1);
        assert_eq!(cat.pixels.len(), PIXELS);
        assert!(cat.pixels.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        assert!(matches!(
            CifarDataset::from_items(vec![]),
            Err(InfoGanError::EmptyDataset)
        ));
    }

    #[test]
    fn test_random_batches() {
        let device = Default::default();
        let items = (0..4)
            .map(|label| ImageItem {
                pixels: vec![0.0; PIXELS],
                label,
            })
            .collect();
        let dataset = CifarDataset::from_items(items).unwrap();

        let mut sampler = RandomSampler::new(1);
        let indices = sampler.indices(dataset.len(), 64);
        assert!(indices.iter().all(|i| *i < 4));

        let batch =
            sampler.sample::<TestBackend, _>(&dataset, &ImageBatcher::new(), 6, &device);
        assert_eq!(batch.size, 6);
        assert_eq!(batch.images.dims(), [6, 3, 32, 32]);
    }
}
