//! Error types and handling for Image Sweetener

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Image Sweetener operations
pub type Result<T> = std::result::Result<T, SweetenerError>;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum SweetenerError {
    /// I/O errors while reading inputs or writing outputs
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A file could not be decoded as a raster image
    #[error("Failed to decode image: {message} (file: {file:?})")]
    Decode {
        message: String,
        file: Option<PathBuf>,
    },

    /// The watermark asset could not be decoded
    #[error("Failed to load watermark asset: {message} (file: {file:?})")]
    Asset {
        message: String,
        file: Option<PathBuf>,
    },

    /// Out-of-range slider value, malformed aspect ratio, etc.
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Output directory cannot be created or input directory cannot be listed
    #[error("Storage error: {message} (path: {path:?})")]
    Storage { message: String, path: PathBuf },

    /// Encoder rejected the image
    #[error("Failed to encode {format}: {message} (file: {file:?})")]
    Encode {
        format: String,
        message: String,
        file: Option<PathBuf>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Worker pool errors
    #[error("Parallel processing error: {message}")]
    ParallelError { message: String },
}

impl SweetenerError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Decode {
            message: message.into(),
            file,
        }
    }

    /// Create a new watermark asset error
    pub fn asset<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Asset {
            message: message.into(),
            file,
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S, path: PathBuf) -> Self {
        Self::Storage {
            message: message.into(),
            path,
        }
    }

    /// Create a new encode error
    pub fn encode<F: Into<String>, S: Into<String>>(format: F, message: S, file: Option<PathBuf>) -> Self {
        Self::Encode {
            format: format.into(),
            message: message.into(),
            file,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new parallel processing error
    pub fn parallel<S: Into<String>>(message: S) -> Self {
        Self::ParallelError {
            message: message.into(),
        }
    }

    /// Check if this error only affects a single file, so a pass running
    /// under the skip policy can carry on with the next one
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::IoError(_)
            | Self::Decode { .. }
            | Self::Encode { .. } => true,

            Self::Asset { .. }
            | Self::InvalidParameters { .. }
            | Self::Storage { .. }
            | Self::ConfigError { .. }
            | Self::SerdeError(_)
            | Self::ParallelError { .. } => false,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Decode { file, .. }
            | Self::Asset { file, .. }
            | Self::Encode { file, .. } => file.as_ref(),

            Self::Storage { path, .. } => Some(path),

            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::IoError(e) => format!("File system error: {}", e),
            Self::Decode { file: Some(file), .. } => {
                format!("{} is not a readable image (supported: JPEG, PNG, WebP, GIF, TIFF)", file.display())
            }
            Self::Asset { file: Some(file), .. } => {
                format!("Watermark {} could not be loaded; no images were watermarked", file.display())
            }
            Self::Storage { path, message } => {
                format!("Cannot use directory {}: {}", path.display(), message)
            }
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for SweetenerError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for SweetenerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

impl From<serde_json::Error> for SweetenerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerdeError(format!("JSON parsing error: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: PathBuf) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<SweetenerError>,
{
    fn with_file_context(self, file: PathBuf) -> Result<T> {
        self.map_err(|e| match e.into() {
            SweetenerError::Decode { message, file: None } => SweetenerError::Decode {
                message,
                file: Some(file),
            },
            SweetenerError::Asset { message, file: None } => SweetenerError::Asset {
                message,
                file: Some(file),
            },
            SweetenerError::Encode { format, message, file: None } => SweetenerError::Encode {
                format,
                message,
                file: Some(file),
            },
            SweetenerError::IoError(io) => SweetenerError::IoError(std::io::Error::new(
                io.kind(),
                format!("{}: {}", file.display(), io),
            )),
            other => other,
        })
    }
}
