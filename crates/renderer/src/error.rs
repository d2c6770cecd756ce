use thiserror::Error;

use crate::types::ShaderStageKind;

/// Why a submitted source pair did not become the active program.
///
/// Both variants are recoverable: the previous program keeps rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileRejection {
    #[error("{stage} shader must contain a main function")]
    MissingEntryPoint { stage: ShaderStageKind },

    #[error("shader compilation error: {message}")]
    CompilationFailed { message: String },
}

impl CompileRejection {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self::CompilationFailed {
            message: message.into(),
        }
    }
}

/// A frame could not be issued. Logged and skipped; the loop keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("draw failed: {message}")]
pub struct DrawFailure {
    pub message: String,
}

impl DrawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Screenshot capture or encoding failed.
#[derive(Debug, Error)]
pub enum EncodeFailure {
    #[error("surface has been disposed")]
    Disposed,

    #[error("framebuffer readback failed: {0}")]
    Readback(String),

    #[error("png encoding failed: {0}")]
    Png(#[from] image::ImageError),
}
