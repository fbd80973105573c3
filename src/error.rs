//! Error Types

use thiserror::Error;

/// Coarse classification of a failure, independent of stage wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Io,
    Processing,
    Config,
}

/// Main error type
#[derive(Debug, Error)]
pub enum AudioOptimizerError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<AudioOptimizerError>,
    },
}

impl AudioOptimizerError {
    pub fn validation<S: Into<String>>(msg: S) -> Self { Self::Validation { message: msg.into() } }
    pub fn io<S: Into<String>>(msg: S) -> Self { Self::Io { message: msg.into() } }
    pub fn processing<S: Into<String>>(msg: S) -> Self { Self::Processing { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config { message: msg.into() } }

    /// Wrap an error with the name of the pipeline stage it came from
    pub fn in_stage<S: Into<String>>(stage: S, source: Self) -> Self {
        Self::Stage { stage: stage.into(), source: Box::new(source) }
    }

    /// Kind of the innermost cause
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Io { .. } => ErrorKind::Io,
            Self::Processing { .. } => ErrorKind::Processing,
            Self::Config { .. } => ErrorKind::Config,
            Self::Stage { source, .. } => source.kind(),
        }
    }

    /// Name of the failed stage, if the error was raised inside the pipeline
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AudioOptimizerError>;

impl From<std::io::Error> for AudioOptimizerError {
    fn from(err: std::io::Error) -> Self { Self::io(err.to_string()) }
}

impl From<hound::Error> for AudioOptimizerError {
    fn from(err: hound::Error) -> Self { Self::io(format!("WAV: {}", err)) }
}
