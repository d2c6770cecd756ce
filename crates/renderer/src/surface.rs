use base64::{engine::general_purpose, Engine as _};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use tracing::{debug, error, trace};

use crate::backend::RenderBackend;
use crate::error::{DrawFailure, EncodeFailure};

/// What happened to one [`SurfaceManager::draw`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn,
    /// First failure after a successful frame; worth telling the user about.
    Failed(DrawFailure),
    /// The previous frame failed too; already reported.
    StillFailing,
    /// The surface has been disposed.
    Skipped,
}

/// Owns the graphics backend and the drawing buffer size.
///
/// After [`SurfaceManager::dispose`] every method is a no-op.
#[derive(Debug)]
pub struct SurfaceManager<B> {
    backend: Option<B>,
    size: (u32, u32),
    failing: bool,
}

impl<B: RenderBackend> SurfaceManager<B> {
    pub fn new(mut backend: B, size: (u32, u32)) -> Self {
        let size = clamp_size(size);
        backend.resize(size.0, size.1);
        Self {
            backend: Some(backend),
            size,
            failing: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    /// Applies a new drawing buffer size. Returns false if nothing changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        let size = clamp_size((width, height));
        if size == self.size {
            return false;
        }
        self.size = size;
        backend.resize(size.0, size.1);
        debug!(width = size.0, height = size.1, "surface resized");
        true
    }

    /// Issues one frame. Backend failures are logged and folded into the
    /// outcome, never propagated.
    pub fn draw(&mut self, program: &B::Program, uniforms: &[u8]) -> DrawOutcome {
        let Some(backend) = self.backend.as_mut() else {
            return DrawOutcome::Skipped;
        };
        match backend.draw(program, uniforms) {
            Ok(()) => {
                if self.failing {
                    debug!("draw recovered");
                }
                self.failing = false;
                DrawOutcome::Drawn
            }
            Err(failure) if self.failing => {
                trace!(%failure, "draw still failing");
                DrawOutcome::StillFailing
            }
            Err(failure) => {
                error!(%failure, "frame skipped");
                self.failing = true;
                DrawOutcome::Failed(failure)
            }
        }
    }

    /// Renders the frame offscreen and reads it back. The caller draws to
    /// the visible surface first so both show the same frame.
    pub fn capture(
        &mut self,
        program: &B::Program,
        uniforms: &[u8],
    ) -> Result<RgbaImage, EncodeFailure> {
        let backend = self.backend.as_mut().ok_or(EncodeFailure::Disposed)?;
        backend.capture(program, uniforms)
    }

    pub fn capture_png(
        &mut self,
        program: &B::Program,
        uniforms: &[u8],
    ) -> Result<Vec<u8>, EncodeFailure> {
        let image = self.capture(program, uniforms)?;
        encode_png(&image)
    }

    /// Releases the device, the surface and the quad mesh. Only the first call
    /// has an effect.
    pub fn dispose(&mut self) {
        if self.backend.take().is_some() {
            debug!("surface disposed");
        }
    }
}

fn clamp_size((width, height): (u32, u32)) -> (u32, u32) {
    (width.max(1), height.max(1))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EncodeFailure> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(bytes)
}

pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    )
}
