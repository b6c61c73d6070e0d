use burn::record::RecorderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfoGanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("record error: {0}")]
    Record(#[from] RecorderError),

    #[error("failed to load config from {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("dataset contains no images")]
    EmptyDataset,

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("class {class} is out of range for {num_classes} classes")]
    InvalidClass { class: usize, num_classes: usize },
}

pub type Result<T> = std::result::Result<T, InfoGanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InfoGanError::EmptyDataset;
        assert!(format!("{}", err).contains("no images"));

        let err = InfoGanError::InvalidConfig("filters must not be empty".to_string());
        assert!(format!("{}", err).contains("filters must not be empty"));

        let err = InfoGanError::InvalidClass {
            class: 12,
            num_classes: 10,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("12"));
        assert!(msg.contains("10 classes"));
    }
}
