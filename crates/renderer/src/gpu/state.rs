use anyhow::Result;
use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};

use crate::backend::RenderBackend;
use crate::compile::PreparedProgram;
use crate::error::{DrawFailure, EncodeFailure};
use crate::types::EngineConfig;

use super::context::{GpuContext, Presentation};
use super::pipeline::{GpuProgram, QuadMesh};
use super::readback::OffscreenTarget;

/// wgpu implementation of [`RenderBackend`].
///
/// Windowed backends present to a surface; headless ones render into an
/// offscreen texture that is only ever read back by `capture`.
pub struct GpuBackend {
    context: GpuContext,
    mesh: QuadMesh,
    headless_target: Option<OffscreenTarget>,
}

impl GpuBackend {
    pub fn windowed<T>(target: &T, config: &EngineConfig) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::windowed(target, config)?;
        Ok(Self::from_context(context))
    }

    pub fn headless(config: &EngineConfig) -> Result<Self> {
        let context = GpuContext::headless(config)?;
        Ok(Self::from_context(context))
    }

    fn from_context(context: GpuContext) -> Self {
        let mesh = QuadMesh::new(&context.device);
        let headless_target = match context.presentation {
            Presentation::Headless => Some(OffscreenTarget::new(
                &context.device,
                context.format,
                context.size,
            )),
            Presentation::Window { .. } => None,
        };
        debug!(
            adapter = %context.adapter_name,
            format = ?context.format,
            width = context.size.0,
            height = context.size.1,
            "GPU backend ready"
        );
        Self {
            context,
            mesh,
            headless_target,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }

    fn check_uniforms(program: &GpuProgram, uniforms: &[u8]) -> Result<(), String> {
        if uniforms.len() as u64 != program.uniform_size() {
            return Err(format!(
                "uniform block is {} bytes but the program expects {}",
                uniforms.len(),
                program.uniform_size()
            ));
        }
        Ok(())
    }

    /// Runs `submit` inside a validation scope and turns any captured error
    /// into `E` with `wrap`.
    fn scoped<T, E>(
        &mut self,
        submit: impl FnOnce(&mut Self) -> Result<T, E>,
        wrap: impl FnOnce(String) -> E,
    ) -> Result<T, E> {
        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let result = submit(self);
        match pollster::block_on(self.context.device.pop_error_scope()) {
            Some(error) => Err(wrap(error.to_string())),
            None => result,
        }
    }
}

impl RenderBackend for GpuBackend {
    type Program = GpuProgram;

    fn build_program(&mut self, prepared: &PreparedProgram) -> Result<GpuProgram, String> {
        GpuProgram::build(&self.context.device, self.context.format, prepared)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
        if self.headless_target.is_some() {
            self.headless_target = Some(OffscreenTarget::new(
                &self.context.device,
                self.context.format,
                self.context.size,
            ));
        }
    }

    fn draw(&mut self, program: &GpuProgram, uniforms: &[u8]) -> Result<(), DrawFailure> {
        Self::check_uniforms(program, uniforms).map_err(DrawFailure::new)?;

        self.scoped(
            |backend| {
                let acquired = match &backend.context.presentation {
                    Presentation::Window { surface, .. } => Some(surface.get_current_texture()),
                    Presentation::Headless => None,
                };
                let frame = match acquired {
                    Some(Ok(frame)) => Some(frame),
                    Some(Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated))) => {
                        warn!(error = ?err, "surface out of date; reconfiguring");
                        backend.context.reconfigure();
                        return Err(DrawFailure::new(format!("surface unavailable: {err}")));
                    }
                    Some(Err(err)) => return Err(DrawFailure::new(format!("surface error: {err}"))),
                    None => None,
                };

                let context = &backend.context;
                let mut encoder = context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("render encoder"),
                    });
                match frame {
                    Some(frame) => {
                        let view = frame
                            .texture
                            .create_view(&wgpu::TextureViewDescriptor::default());
                        program.encode(&context.queue, &mut encoder, &view, &backend.mesh, uniforms);
                        context.queue.submit(Some(encoder.finish()));
                        frame.present();
                    }
                    None => {
                        let Some(target) = backend.headless_target.as_ref() else {
                            return Err(DrawFailure::new("headless target missing"));
                        };
                        program.encode(&context.queue, &mut encoder, &target.view, &backend.mesh, uniforms);
                        context.queue.submit(Some(encoder.finish()));
                    }
                }
                Ok(())
            },
            DrawFailure::new,
        )
    }

    fn capture(&mut self, program: &GpuProgram, uniforms: &[u8]) -> Result<RgbaImage, EncodeFailure> {
        Self::check_uniforms(program, uniforms).map_err(EncodeFailure::Readback)?;

        self.scoped(
            |backend| {
                let context = &backend.context;
                let target = OffscreenTarget::new(&context.device, context.format, context.size);
                let mut encoder = context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("capture encoder"),
                    });
                program.encode(&context.queue, &mut encoder, &target.view, &backend.mesh, uniforms);
                target.read_rgba(&context.device, &context.queue, encoder)
            },
            EncodeFailure::Readback,
        )
    }
}
