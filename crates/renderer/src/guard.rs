//! Shader compilation guard.
//!
//! Owns the active program and the last-known-good source pair. New pairs are
//! built off to the side (CPU validation, then a fresh device pipeline) and
//! only replace the active program once both phases pass.

use tracing::{debug, info, warn};

use crate::backend::RenderBackend;
use crate::compile::{self, PreparedProgram};
use crate::error::CompileRejection;
use crate::types::ShaderSourcePair;
use crate::uniforms::UniformLayout;

/// Result of a successful [`CompilationGuard::attempt_compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committed {
    /// A new program was built and is now active.
    Promoted,
    /// The pair is already the active program; nothing was rebuilt.
    AlreadyActive,
}

/// A built program together with the translation it came from.
#[derive(Debug)]
pub struct ActiveProgram<P> {
    program: P,
    prepared: PreparedProgram,
}

impl<P> ActiveProgram<P> {
    pub fn program(&self) -> &P {
        &self.program
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.prepared.layout
    }

    pub fn sources(&self) -> &ShaderSourcePair {
        &self.prepared.sources
    }
}

#[derive(Debug)]
pub struct CompilationGuard<P> {
    active: Option<ActiveProgram<P>>,
    last_rejection: Option<(ShaderSourcePair, CompileRejection)>,
}

impl<P> CompilationGuard<P> {
    /// Builds `seed` and makes it the initial last-known-good program.
    pub fn seeded<B>(backend: &mut B, seed: &ShaderSourcePair) -> Result<Self, CompileRejection>
    where
        B: RenderBackend<Program = P>,
    {
        let active = build(backend, seed)?;
        debug!("seeded last-known-good program");
        Ok(Self {
            active: Some(active),
            last_rejection: None,
        })
    }

    /// Attempts to replace the active program with `sources`.
    ///
    /// On rejection the active program and last-known-good pair are left
    /// exactly as they were. Resubmitting the pair that was just rejected
    /// returns the same rejection without another build.
    pub fn attempt_compile<B>(
        &mut self,
        backend: &mut B,
        sources: &ShaderSourcePair,
    ) -> Result<Committed, CompileRejection>
    where
        B: RenderBackend<Program = P>,
    {
        if self.last_known_good() == Some(sources) {
            return Ok(Committed::AlreadyActive);
        }
        if let Some((rejected, rejection)) = &self.last_rejection {
            if rejected == sources {
                debug!("resubmitted pair was already rejected");
                return Err(rejection.clone());
            }
        }

        match build(backend, sources) {
            Ok(active) => {
                info!(block_size = active.layout().size(), "promoted new shader program");
                self.active = Some(active);
                self.last_rejection = None;
                Ok(Committed::Promoted)
            }
            Err(rejection) => {
                warn!(%rejection, "shader pair rejected; keeping last-known-good");
                self.last_rejection = Some((sources.clone(), rejection.clone()));
                Err(rejection)
            }
        }
    }

    pub fn active(&self) -> Option<&ActiveProgram<P>> {
        self.active.as_ref()
    }

    pub fn last_known_good(&self) -> Option<&ShaderSourcePair> {
        self.active.as_ref().map(ActiveProgram::sources)
    }

    /// Drops the active program, releasing its device resources.
    pub fn release(&mut self) {
        if self.active.take().is_some() {
            debug!("released active shader program");
        }
        self.last_rejection = None;
    }
}

fn build<B: RenderBackend>(
    backend: &mut B,
    sources: &ShaderSourcePair,
) -> Result<ActiveProgram<B::Program>, CompileRejection> {
    let prepared = compile::prepare(sources)?;
    let program = backend
        .build_program(&prepared)
        .map_err(CompileRejection::failed)?;
    Ok(ActiveProgram { program, prepared })
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;
    use crate::error::{DrawFailure, EncodeFailure};
    use crate::types::DEFAULT_VERTEX_SHADER;

    /// Accepts everything naga accepts, unless the fragment mentions `DEVICE_REJECT`.
    #[derive(Default)]
    struct CountingBackend {
        builds: usize,
    }

    impl RenderBackend for CountingBackend {
        type Program = usize;

        fn build_program(&mut self, prepared: &PreparedProgram) -> Result<usize, String> {
            self.builds += 1;
            if prepared.sources.fragment().contains("DEVICE_REJECT") {
                return Err("pipeline creation failed".to_string());
            }
            Ok(self.builds)
        }

        fn resize(&mut self, _width: u32, _height: u32) {}

        fn draw(&mut self, _program: &usize, _uniforms: &[u8]) -> Result<(), DrawFailure> {
            Ok(())
        }

        fn capture(&mut self, _program: &usize, _uniforms: &[u8]) -> Result<RgbaImage, EncodeFailure> {
            Ok(RgbaImage::new(1, 1))
        }
    }

    fn fragment(body: &str) -> ShaderSourcePair {
        ShaderSourcePair::new(
            DEFAULT_VERTEX_SHADER,
            format!("void main() {{\n  {body}\n}}\n"),
        )
    }

    #[test]
    fn successful_compile_promotes_and_updates_last_known_good() {
        let mut backend = CountingBackend::default();
        let mut guard = CompilationGuard::seeded(&mut backend, &ShaderSourcePair::fallback()).unwrap();
        let next = fragment("gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0);");

        assert_eq!(guard.attempt_compile(&mut backend, &next), Ok(Committed::Promoted));
        assert_eq!(guard.last_known_good(), Some(&next));
        assert_eq!(guard.active().map(|a| *a.program()), Some(2));
    }

    #[test]
    fn rejection_leaves_active_program_untouched() {
        let mut backend = CountingBackend::default();
        let mut guard = CompilationGuard::seeded(&mut backend, &ShaderSourcePair::fallback()).unwrap();

        let empty = ShaderSourcePair::new(DEFAULT_VERTEX_SHADER, "");
        assert!(matches!(
            guard.attempt_compile(&mut backend, &empty),
            Err(CompileRejection::MissingEntryPoint { .. })
        ));

        let broken = fragment("gl_FragColor = vec4(;");
        assert!(matches!(
            guard.attempt_compile(&mut backend, &broken),
            Err(CompileRejection::CompilationFailed { .. })
        ));

        let device = fragment("gl_FragColor = vec4(1.0); // DEVICE_REJECT");
        assert_eq!(
            guard.attempt_compile(&mut backend, &device),
            Err(CompileRejection::failed("pipeline creation failed"))
        );

        assert_eq!(guard.last_known_good(), Some(&ShaderSourcePair::fallback()));
        assert_eq!(guard.active().map(|a| *a.program()), Some(1));
    }

    #[test]
    fn repeated_failures_are_idempotent() {
        let mut backend = CountingBackend::default();
        let mut guard = CompilationGuard::seeded(&mut backend, &ShaderSourcePair::fallback()).unwrap();
        let device = fragment("gl_FragColor = vec4(1.0); // DEVICE_REJECT");

        let first = guard.attempt_compile(&mut backend, &device);
        let builds = backend.builds;
        let second = guard.attempt_compile(&mut backend, &device);
        assert_eq!(first, second);
        assert_eq!(backend.builds, builds);
        assert_eq!(guard.last_known_good(), Some(&ShaderSourcePair::fallback()));
    }

    #[test]
    fn resubmitting_the_active_pair_skips_the_build() {
        let mut backend = CountingBackend::default();
        let mut guard = CompilationGuard::seeded(&mut backend, &ShaderSourcePair::fallback()).unwrap();
        assert_eq!(
            guard.attempt_compile(&mut backend, &ShaderSourcePair::fallback()),
            Ok(Committed::AlreadyActive)
        );
        assert_eq!(backend.builds, 1);
    }

    #[test]
    fn release_drops_the_program() {
        let mut backend = CountingBackend::default();
        let mut guard = CompilationGuard::seeded(&mut backend, &ShaderSourcePair::fallback()).unwrap();
        guard.release();
        assert!(guard.active().is_none());
        assert!(guard.last_known_good().is_none());
    }
}
