//! Engine facade tying the binding translator, compilation guard, render
//! loop and surface manager together.
//!
//! Everything runs on the caller's thread. Each public method checks the
//! disposed flag first and silently does nothing once [`ShaderEngine::dispose`]
//! has run.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::RenderBackend;
use crate::bindings;
use crate::error::{CompileRejection, EncodeFailure};
use crate::guard::{CompilationGuard, Committed};
use crate::runtime::{FrameScheduler, FrameToken, LoopState, RenderLoop};
use crate::surface::{DrawOutcome, SurfaceManager};
use crate::types::{EngineConfig, Parameter, ProjectSnapshot, ShaderSourcePair};
use crate::uniforms::{UniformLayout, UniformState};

type ErrorHandler = Box<dyn FnMut(&str)>;

/// Outcome of [`ShaderEngine::set_shaders`] that did not reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Committed(Committed),
    /// The engine has been disposed; the pair was ignored.
    Ignored,
}

pub struct ShaderEngine<B: RenderBackend, S: FrameScheduler> {
    surface: SurfaceManager<B>,
    guard: CompilationGuard<B::Program>,
    render_loop: RenderLoop,
    scheduler: S,
    uniforms: UniformState,
    parameters: Vec<Parameter>,
    submitted: ShaderSourcePair,
    name: String,
    description: String,
    on_error: Option<ErrorHandler>,
    /// Failure reported before a handler was installed.
    unreported: Option<String>,
    disposed: bool,
}

impl<B: RenderBackend, S: FrameScheduler> ShaderEngine<B, S> {
    /// Attaches to a surface: seeds the fallback program, draws the first
    /// frame, and starts the render loop unless `config.start_paused`.
    ///
    /// Fails only if the built-in fallback pair cannot be built on `backend`.
    pub fn attach(
        mut backend: B,
        scheduler: S,
        config: &EngineConfig,
        now: Instant,
    ) -> Result<Self, CompileRejection> {
        let fallback = ShaderSourcePair::fallback();
        let guard = CompilationGuard::seeded(&mut backend, &fallback)?;
        let surface = SurfaceManager::new(backend, config.surface_size);
        let (width, height) = surface.size();

        let mut uniforms = UniformState::default();
        uniforms.set_resolution(width, height);

        let mut engine = Self {
            surface,
            guard,
            render_loop: RenderLoop::new(),
            scheduler,
            uniforms,
            parameters: Vec::new(),
            submitted: fallback,
            name: String::new(),
            description: String::new(),
            on_error: None,
            unreported: None,
            disposed: false,
        };

        if config.start_paused {
            engine.render_loop.pause(&mut engine.scheduler, now);
        } else {
            engine.render_loop.play(&mut engine.scheduler, now);
        }
        engine.draw();
        info!(width, height, paused = config.start_paused, "engine attached");
        Ok(engine)
    }

    /// Installs the `onError` callback for compile rejections and the first
    /// draw failure of a streak. A failure raised before any handler existed,
    /// such as one from the first frame drawn by [`ShaderEngine::attach`], is
    /// delivered to the new handler right away.
    pub fn set_error_handler(&mut self, handler: impl FnMut(&str) + 'static) {
        let mut handler: ErrorHandler = Box::new(handler);
        if let Some(message) = self.unreported.take() {
            handler(&message);
        }
        self.on_error = Some(handler);
    }

    /// Submits a new source pair. The screen is redrawn either way: with the
    /// new program on success, with the last-known-good one on rejection.
    pub fn set_shaders(
        &mut self,
        sources: ShaderSourcePair,
    ) -> Result<Submission, CompileRejection> {
        if self.disposed {
            return Ok(Submission::Ignored);
        }
        let result = match self.surface.backend_mut() {
            Some(backend) => self.guard.attempt_compile(backend, &sources),
            None => return Ok(Submission::Ignored),
        };
        self.submitted = sources;
        self.draw();
        match result {
            Ok(committed) => Ok(Submission::Committed(committed)),
            Err(rejection) => {
                self.report(&rejection.to_string());
                Err(rejection)
            }
        }
    }

    /// Replaces the parameter snapshot and rebinds it.
    pub fn set_parameters(&mut self, parameters: &[Parameter]) {
        if self.disposed {
            return;
        }
        self.parameters = parameters.to_vec();
        bindings::bind(&mut self.uniforms.user, parameters);
        self.draw();
    }

    pub fn play(&mut self, now: Instant) {
        if !self.disposed {
            self.render_loop.play(&mut self.scheduler, now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if !self.disposed {
            self.render_loop.pause(&mut self.scheduler, now);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.render_loop.is_playing()
    }

    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.render_loop.elapsed(now)
    }

    /// Moves the animation clock to `elapsed` and redraws.
    pub fn seek(&mut self, elapsed: Duration, now: Instant) {
        if self.disposed {
            return;
        }
        self.render_loop.seek(elapsed, now);
        self.uniforms.set_time(elapsed.as_secs_f32());
        self.draw();
    }

    /// Handles a fired frame callback from the scheduler.
    pub fn run_frame(&mut self, token: FrameToken, now: Instant) {
        if self.disposed {
            return;
        }
        if let Some(seconds) = self.render_loop.begin_frame(&mut self.scheduler, token, now) {
            self.uniforms.set_time(seconds);
            self.draw();
        }
    }

    /// Resizes the drawing buffer and redraws. No-op after dispose.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.disposed {
            return;
        }
        if self.surface.resize(width, height) {
            let (width, height) = self.surface.size();
            self.uniforms.set_resolution(width, height);
            self.draw();
        }
    }

    /// Draws one frame with the active program and current uniforms.
    pub fn draw(&mut self) {
        if self.disposed {
            return;
        }
        let Some(active) = self.guard.active() else {
            return;
        };
        let bytes = active.layout().pack(&self.uniforms);
        if let DrawOutcome::Failed(failure) = self.surface.draw(active.program(), &bytes) {
            self.report(&failure.to_string());
        }
    }

    /// Draws, then returns the frame as a PNG `data:` URL.
    pub fn screenshot(&mut self) -> Result<String, EncodeFailure> {
        let png = self.capture_png()?;
        Ok(crate::surface::png_data_url(&png))
    }

    /// Draws, then returns the frame as PNG bytes. A failed draw is reported
    /// like any other frame; the offscreen capture still runs.
    pub fn capture_png(&mut self) -> Result<Vec<u8>, EncodeFailure> {
        if self.disposed {
            return Err(EncodeFailure::Disposed);
        }
        self.draw();
        let active = self.guard.active().ok_or(EncodeFailure::Disposed)?;
        let bytes = active.layout().pack(&self.uniforms);
        self.surface.capture_png(active.program(), &bytes)
    }

    /// Loads a project: its parameters first, then its shaders.
    pub fn load(&mut self, project: ProjectSnapshot) -> Result<Submission, CompileRejection> {
        if self.disposed {
            return Ok(Submission::Ignored);
        }
        debug!(name = %project.name, parameters = project.parameters.len(), "loading project");
        let sources = project.sources();
        self.name = project.name;
        self.description = project.description;
        self.set_parameters(&project.parameters);
        self.set_shaders(sources)
    }

    /// Current editor state for the persistence layer. Sources are the last
    /// submitted pair, whether or not it compiled.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            name: self.name.clone(),
            description: self.description.clone(),
            vertex_shader: Some(self.submitted.vertex().to_string()),
            fragment_shader: self.submitted.fragment().to_string(),
            parameters: self.parameters.clone(),
        }
    }

    pub fn last_known_good(&self) -> Option<&ShaderSourcePair> {
        self.guard.last_known_good()
    }

    pub fn active_layout(&self) -> Option<&UniformLayout> {
        self.guard.active().map(|active| active.layout())
    }

    pub fn uniforms(&self) -> &UniformState {
        &self.uniforms
    }

    pub fn size(&self) -> (u32, u32) {
        self.surface.size()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn backend(&self) -> Option<&B> {
        self.surface.backend()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.surface.backend_mut()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stops the loop, releases the program, then the surface. Only the first
    /// call has an effect.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.render_loop.dispose(&mut self.scheduler);
        self.guard.release();
        self.surface.dispose();
        info!("engine disposed");
    }

    fn report(&mut self, message: &str) {
        match self.on_error.as_mut() {
            Some(handler) => handler(message),
            None => self.unreported = Some(message.to_string()),
        }
    }
}

impl<B: RenderBackend, S: FrameScheduler> Drop for ShaderEngine<B, S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
