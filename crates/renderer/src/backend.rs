use image::RgbaImage;

use crate::compile::PreparedProgram;
use crate::error::{DrawFailure, EncodeFailure};

/// Graphics device seam used by the compilation guard and the surface manager.
///
/// A backend owns the device, the presentation surface and the quad mesh.
/// Programs it builds are owned by the caller; dropping one releases its
/// pipeline and buffers, dropping the backend releases everything else.
pub trait RenderBackend {
    type Program;

    /// Builds a program without touching whatever is currently on screen.
    /// The error is the driver's diagnostic text.
    fn build_program(&mut self, prepared: &PreparedProgram) -> Result<Self::Program, String>;

    /// Resizes the drawing buffer. Zero-sized requests are clamped to 1x1.
    fn resize(&mut self, width: u32, height: u32);

    /// Renders one frame of `program` to the surface using `uniforms` as the
    /// std140 block contents.
    fn draw(&mut self, program: &Self::Program, uniforms: &[u8]) -> Result<(), DrawFailure>;

    /// Renders one frame offscreen at the current size and reads it back.
    fn capture(
        &mut self,
        program: &Self::Program,
        uniforms: &[u8],
    ) -> Result<RgbaImage, EncodeFailure>;
}
