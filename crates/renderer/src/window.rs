use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::engine::ShaderEngine;
use crate::gpu::GpuBackend;
use crate::runtime::FrameQueue;
use crate::types::{EngineConfig, ProjectSnapshot};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Everything the preview window needs besides the sources themselves.
pub struct PreviewOptions {
    pub title: String,
    pub config: EngineConfig,
    /// Files whose modification time triggers a reload.
    pub watch: Vec<PathBuf>,
    /// Where `S` drops PNG screenshots.
    pub screenshot_dir: PathBuf,
    pub poll_interval: Duration,
}

impl PreviewOptions {
    pub fn new(title: impl Into<String>, config: EngineConfig, screenshot_dir: PathBuf) -> Self {
        Self {
            title: title.into(),
            config,
            watch: Vec::new(),
            screenshot_dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn watching(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.watch.extend(paths);
        self
    }
}

/// Remembers the last seen modification time of each watched file.
#[derive(Debug)]
struct SourceWatcher {
    entries: Vec<(PathBuf, Option<SystemTime>)>,
}

impl SourceWatcher {
    fn new(paths: &[PathBuf]) -> Self {
        let entries = paths
            .iter()
            .map(|path| (path.clone(), modified(path)))
            .collect();
        Self { entries }
    }

    /// Returns true when any file changed since the previous poll.
    fn poll(&mut self) -> bool {
        let mut changed = false;
        for (path, seen) in &mut self.entries {
            let current = modified(path);
            if current != *seen {
                debug!(path = %path.display(), "source changed on disk");
                *seen = current;
                changed = true;
            }
        }
        changed
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

struct PreviewHost<L> {
    engine: ShaderEngine<GpuBackend, FrameQueue>,
    window: Arc<Window>,
    loader: L,
    watcher: SourceWatcher,
    screenshot_dir: PathBuf,
    poll_interval: Duration,
    next_poll: Instant,
}

impl<L> PreviewHost<L>
where
    L: FnMut() -> Result<ProjectSnapshot>,
{
    fn reload(&mut self) {
        match (self.loader)() {
            Ok(project) => {
                // Rejections are reported through the engine's error handler.
                let _ = self.engine.load(project);
            }
            Err(err) => warn!(error = %err, "failed to reload sources"),
        }
        self.window.request_redraw();
    }

    fn poll_sources(&mut self, now: Instant) {
        if now < self.next_poll {
            return;
        }
        self.next_poll = now + self.poll_interval;
        if self.watcher.poll() {
            self.reload();
        }
    }

    fn toggle_playback(&mut self, now: Instant) {
        if self.engine.is_playing() {
            self.engine.pause(now);
            info!("paused");
        } else {
            self.engine.play(now);
            info!("playing");
        }
        self.window.request_redraw();
    }

    fn save_screenshot(&mut self) -> Result<PathBuf> {
        let png = self.engine.capture_png()?;
        fs::create_dir_all(&self.screenshot_dir).with_context(|| {
            format!(
                "failed to create screenshot directory {}",
                self.screenshot_dir.display()
            )
        })?;
        let stamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let path = self.screenshot_dir.join(format!("shaderlab-{stamp}.png"));
        fs::write(&path, png)
            .with_context(|| format!("failed to write screenshot {}", path.display()))?;
        Ok(path)
    }

    fn redraw(&mut self, now: Instant) {
        match self.engine.scheduler_mut().take_due() {
            Some(token) => self.engine.run_frame(token, now),
            None => self.engine.draw(),
        }
    }

    /// Returns false when the key asked the preview to close.
    fn handle_key(&mut self, event: &KeyEvent, now: Instant) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return true;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return false,
            Key::Named(NamedKey::Space) => self.toggle_playback(now),
            Key::Character(value) if value.as_str() == " " => self.toggle_playback(now),
            Key::Character(value) if value.eq_ignore_ascii_case("s") => {
                match self.save_screenshot() {
                    Ok(path) => info!("screenshot saved to {}", path.display()),
                    Err(err) => error!(error = %err, "failed to save screenshot"),
                }
            }
            _ => {}
        }
        true
    }
}

/// Opens a window and runs the live preview until it is closed.
///
/// `loader` produces the project to show. It runs once up front and again
/// whenever one of `options.watch` changes on disk.
pub fn run_preview<L>(options: PreviewOptions, mut loader: L) -> Result<()>
where
    L: FnMut() -> Result<ProjectSnapshot> + 'static,
{
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = options.config.surface_size;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(options.title.as_str())
            .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
            .build(&event_loop)
            .map_err(|err| anyhow!("failed to create preview window: {err}"))?,
    );

    let inner = window.inner_size();
    let mut config = options.config.clone();
    config.surface_size = (inner.width, inner.height);

    let backend = GpuBackend::windowed(window.as_ref(), &config)?;
    info!(adapter = backend.adapter_name(), "preview window ready");
    let now = Instant::now();
    let mut engine = ShaderEngine::attach(backend, FrameQueue::new(), &config, now)
        .map_err(|err| anyhow!("fallback shader failed to build: {err}"))?;
    engine.set_error_handler(|message| error!("{message}"));

    let first = loader().context("failed to load shader sources")?;
    let _ = engine.load(first);

    let mut host = PreviewHost {
        engine,
        window,
        loader,
        watcher: SourceWatcher::new(&options.watch),
        screenshot_dir: options.screenshot_dir,
        poll_interval: options.poll_interval,
        next_poll: now + options.poll_interval,
    };

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == host.window.id() => {
            let now = Instant::now();
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    host.engine.dispose();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if !host.handle_key(&event, now) {
                        host.engine.dispose();
                        elwt.exit();
                    }
                }
                WindowEvent::Resized(size) => {
                    host.engine.resize(size.width, size.height);
                }
                WindowEvent::RedrawRequested => host.redraw(now),
                _ => {}
            }
        }
        Event::AboutToWait => {
            let now = Instant::now();
            host.poll_sources(now);
            if host.engine.scheduler().has_pending() {
                host.window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else {
                elwt.set_control_flow(ControlFlow::WaitUntil(host.next_poll));
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_notices_modified_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "void main() {}").unwrap();

        let mut watcher = SourceWatcher::new(std::slice::from_ref(&path));
        assert!(!watcher.poll());

        fs::remove_file(&path).unwrap();
        assert!(watcher.poll());
        assert!(!watcher.poll());

        fs::write(&path, "void main() { }").unwrap();
        assert!(watcher.poll());
    }

    #[test]
    fn missing_files_are_tolerated() {
        let mut watcher = SourceWatcher::new(&[PathBuf::from("/definitely/not/here.frag")]);
        assert!(!watcher.poll());
    }
}
