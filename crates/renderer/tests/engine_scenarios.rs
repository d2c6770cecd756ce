use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use renderer::{
    CompileRejection, Committed, DrawFailure, EncodeFailure, EngineConfig, FrameQueue,
    LoopState, Parameter, ParameterKind, ParameterValue, PreparedProgram,
    ProjectSnapshot, RenderBackend, ShaderEngine, ShaderSourcePair, Submission, UniformValue,
    DEFAULT_VERTEX_SHADER, FALLBACK_FRAGMENT_SHADER,
};

#[derive(Debug, Default)]
struct Log {
    builds: usize,
    draws: Vec<(String, Vec<u8>)>,
    resizes: Vec<(u32, u32)>,
    /// Makes every draw fail while set.
    fail_draws: bool,
}

/// Backend whose "program" is the fragment text it was built from.
struct RecordingBackend {
    log: Rc<RefCell<Log>>,
    size: (u32, u32),
}

impl RecordingBackend {
    fn new() -> (Self, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        (
            Self {
                log: Rc::clone(&log),
                size: (1, 1),
            },
            log,
        )
    }
}

impl RenderBackend for RecordingBackend {
    type Program = String;

    fn build_program(&mut self, prepared: &PreparedProgram) -> Result<String, String> {
        self.log.borrow_mut().builds += 1;
        Ok(prepared.sources.fragment().to_string())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.log.borrow_mut().resizes.push((width, height));
    }

    fn draw(&mut self, program: &String, uniforms: &[u8]) -> Result<(), DrawFailure> {
        self.log
            .borrow_mut()
            .draws
            .push((program.clone(), uniforms.to_vec()));
        if self.log.borrow().fail_draws {
            return Err(DrawFailure::new("device lost"));
        }
        Ok(())
    }

    fn capture(&mut self, program: &String, _uniforms: &[u8]) -> Result<RgbaImage, EncodeFailure> {
        let shade = (program.len() % 256) as u8;
        Ok(RgbaImage::from_pixel(
            self.size.0,
            self.size.1,
            Rgba([shade, 0, 255 - shade, 255]),
        ))
    }
}

const GLOW_FRAGMENT: &str = "precision mediump float;
uniform vec2 resolution;
uniform float glow;
void main() {
  vec2 uv = gl_FragCoord.xy / resolution.xy;
  gl_FragColor = vec4(uv * glow, 0.0, 1.0);
}
";

const BROKEN_FRAGMENT: &str = "precision mediump float;
void main() {
  gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0)
}
";

fn config() -> EngineConfig {
    EngineConfig {
        surface_size: (320, 240),
        ..EngineConfig::default()
    }
}

fn attach() -> (ShaderEngine<RecordingBackend, FrameQueue>, Rc<RefCell<Log>>, Instant) {
    let (backend, log) = RecordingBackend::new();
    let now = Instant::now();
    let engine = ShaderEngine::attach(backend, FrameQueue::new(), &config(), now).unwrap();
    (engine, log, now)
}

fn glow_pair() -> ShaderSourcePair {
    ShaderSourcePair::new(DEFAULT_VERTEX_SHADER, GLOW_FRAGMENT)
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn last_draw(log: &Rc<RefCell<Log>>) -> (String, Vec<u8>) {
    log.borrow().draws.last().cloned().unwrap()
}

#[test]
fn attach_draws_the_fallback_and_starts_playing() {
    let (engine, log, _) = attach();
    assert_eq!(engine.loop_state(), LoopState::Playing);
    assert!(engine.scheduler().has_pending());
    assert_eq!(last_draw(&log).0, FALLBACK_FRAGMENT_SHADER);
    assert_eq!(engine.size(), (320, 240));
    assert_eq!(engine.uniforms().reserved.resolution, [320.0, 240.0]);
}

#[test]
fn syntax_error_reports_and_keeps_the_previous_program() {
    let (mut engine, log, _) = attach();
    let errors = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&errors);
    engine.set_error_handler(move |message| sink.borrow_mut().push(message.to_string()));

    assert_eq!(
        engine.set_shaders(glow_pair()),
        Ok(Submission::Committed(Committed::Promoted))
    );

    let broken = ShaderSourcePair::new(DEFAULT_VERTEX_SHADER, BROKEN_FRAGMENT);
    let result = engine.set_shaders(broken);
    assert!(matches!(
        result,
        Err(CompileRejection::CompilationFailed { .. })
    ));

    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("fragment:"), "{}", errors[0]);
    assert_eq!(last_draw(&log).0, GLOW_FRAGMENT);
    assert_eq!(engine.last_known_good(), Some(&glow_pair()));
}

#[test]
fn missing_main_is_rejected_before_compiling() {
    let (mut engine, log, _) = attach();
    let builds = log.borrow().builds;
    let result = engine.set_shaders(ShaderSourcePair::new(DEFAULT_VERTEX_SHADER, "float x;"));
    assert!(matches!(
        result,
        Err(CompileRejection::MissingEntryPoint { .. })
    ));
    assert_eq!(log.borrow().builds, builds);
    assert_eq!(last_draw(&log).0, FALLBACK_FRAGMENT_SHADER);
}

#[test]
fn resubmitting_a_rejected_pair_does_not_rebuild() {
    let (mut engine, log, _) = attach();
    let broken = ShaderSourcePair::new(DEFAULT_VERTEX_SHADER, BROKEN_FRAGMENT);
    let first = engine.set_shaders(broken.clone()).unwrap_err();
    let builds = log.borrow().builds;
    let second = engine.set_shaders(broken).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(log.borrow().builds, builds);
}

#[test]
fn glow_parameter_reaches_the_uniform_block() {
    let (mut engine, log, _) = attach();
    engine.set_shaders(glow_pair()).unwrap();
    engine.set_parameters(&[Parameter::float("glow", 0.75)]);

    let offset = engine.active_layout().unwrap().member("glow").unwrap().offset;
    let (_, bytes) = last_draw(&log);
    assert_eq!(read_f32(&bytes, offset), 0.75);

    // Dropping the parameter leaves the last value bound.
    engine.set_parameters(&[]);
    assert_eq!(
        engine.uniforms().user.get("glow"),
        Some(UniformValue::Float(0.75))
    );
    let (_, bytes) = last_draw(&log);
    assert_eq!(read_f32(&bytes, offset), 0.75);
}

#[test]
fn reserved_names_are_not_overridden_by_parameters() {
    let (mut engine, _log, _) = attach();
    let before = engine.uniforms().reserved;
    engine.set_parameters(&[
        Parameter::float("time", 99.0),
        Parameter::new(
            "resolution",
            ParameterKind::Vec2,
            ParameterValue::Vec2([1.0, 1.0]),
        ),
    ]);
    assert_eq!(engine.uniforms().reserved, before);
    assert!(engine.uniforms().user.is_empty());
}

#[test]
fn frames_advance_time_while_playing() {
    let (mut engine, log, start) = attach();
    let draws = log.borrow().draws.len();

    let token = engine.scheduler_mut().take_due().unwrap();
    engine.run_frame(token, start + Duration::from_millis(500));

    assert_eq!(log.borrow().draws.len(), draws + 1);
    assert!((engine.uniforms().reserved.time - 0.5).abs() < 1e-4);
    assert!(engine.scheduler().has_pending());
}

#[test]
fn play_pause_play_keeps_time_monotonic() {
    let (mut engine, _log, start) = attach();
    let at = |millis| start + Duration::from_millis(millis);

    engine.pause(at(1_000));
    let paused = engine.elapsed(at(1_000));
    assert_eq!(engine.elapsed(at(5_000)), paused);
    assert!(!engine.scheduler().has_pending());

    engine.play(at(5_000));
    engine.play(at(5_100));
    let resumed = engine.elapsed(at(6_000));
    assert!(resumed >= paused);
    assert_eq!(resumed, paused + Duration::from_millis(1_000));
}

#[test]
fn paused_attach_draws_once_and_schedules_nothing() {
    let (backend, log) = RecordingBackend::new();
    let config = EngineConfig {
        start_paused: true,
        ..config()
    };
    let engine = ShaderEngine::attach(backend, FrameQueue::new(), &config, Instant::now()).unwrap();
    assert_eq!(engine.loop_state(), LoopState::Paused);
    assert!(!engine.scheduler().has_pending());
    assert_eq!(log.borrow().draws.len(), 1);
}

#[test]
fn resize_updates_resolution_and_redraws() {
    let (mut engine, log, _) = attach();
    let draws = log.borrow().draws.len();
    engine.resize(0, 600);
    assert_eq!(engine.size(), (1, 600));
    assert_eq!(engine.uniforms().reserved.resolution, [1.0, 600.0]);
    assert_eq!(log.borrow().draws.len(), draws + 1);

    engine.resize(1, 600);
    assert_eq!(log.borrow().draws.len(), draws + 1);
}

#[test]
fn dispose_is_final_and_idempotent() {
    let (mut engine, log, now) = attach();
    engine.dispose();
    engine.dispose();
    let draws = log.borrow().draws.len();
    let resizes = log.borrow().resizes.len();

    engine.resize(800, 600);
    engine.play(now);
    engine.draw();
    engine.set_parameters(&[Parameter::float("glow", 1.0)]);

    assert!(engine.is_disposed());
    assert_eq!(engine.size(), (320, 240));
    assert_eq!(log.borrow().draws.len(), draws);
    assert_eq!(log.borrow().resizes.len(), resizes);
    assert!(!engine.scheduler().has_pending());
    assert_eq!(engine.set_shaders(glow_pair()), Ok(Submission::Ignored));
}

#[test]
fn screenshot_after_dispose_fails() {
    let (mut engine, _log, _) = attach();
    engine.dispose();
    assert!(matches!(engine.screenshot(), Err(EncodeFailure::Disposed)));
}

#[test]
fn screenshot_reflects_the_active_program() {
    let (mut engine, log, _) = attach();
    let draws = log.borrow().draws.len();
    let url = engine.screenshot().unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
    assert_eq!(log.borrow().draws.len(), draws + 1);

    let png = engine.capture_png().unwrap();
    let image = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (320, 240));
    let shade = (FALLBACK_FRAGMENT_SHADER.len() % 256) as u8;
    assert_eq!(image.get_pixel(0, 0), &Rgba([shade, 0, 255 - shade, 255]));
}

#[test]
fn load_then_snapshot_round_trips_the_project() {
    let (mut engine, _log, _) = attach();
    let project = ProjectSnapshot {
        name: "glow".to_string(),
        description: "soft glow".to_string(),
        vertex_shader: None,
        fragment_shader: GLOW_FRAGMENT.to_string(),
        parameters: vec![Parameter::float("glow", 0.25).with_range(0.0, 1.0, 0.05)],
    };
    assert_eq!(
        engine.load(project.clone()),
        Ok(Submission::Committed(Committed::Promoted))
    );

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.name, "glow");
    assert_eq!(snapshot.description, "soft glow");
    assert_eq!(snapshot.vertex_shader.as_deref(), Some(DEFAULT_VERTEX_SHADER));
    assert_eq!(snapshot.fragment_shader, GLOW_FRAGMENT);
    assert_eq!(snapshot.parameters, project.parameters);
    assert_eq!(
        engine.uniforms().user.get("glow"),
        Some(UniformValue::Float(0.25))
    );
}

#[test]
fn snapshot_keeps_rejected_sources_for_the_editor() {
    let (mut engine, _log, _) = attach();
    let broken = ShaderSourcePair::new(DEFAULT_VERTEX_SHADER, BROKEN_FRAGMENT);
    let _ = engine.set_shaders(broken);
    assert_eq!(engine.snapshot().fragment_shader, BROKEN_FRAGMENT);
    assert_eq!(
        engine.last_known_good().map(ShaderSourcePair::fragment),
        Some(FALLBACK_FRAGMENT_SHADER)
    );
}

fn collect_errors(
    engine: &mut ShaderEngine<RecordingBackend, FrameQueue>,
) -> Rc<RefCell<Vec<String>>> {
    let errors = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&errors);
    engine.set_error_handler(move |message| sink.borrow_mut().push(message.to_string()));
    errors
}

#[test]
fn draw_failures_reach_the_error_handler_once_per_streak() {
    let (mut engine, log, start) = attach();
    let errors = collect_errors(&mut engine);
    log.borrow_mut().fail_draws = true;

    assert!(engine.screenshot().is_ok());
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].contains("device lost"));

    for frame in 1..=5 {
        let token = engine.scheduler_mut().take_due().unwrap();
        engine.run_frame(token, start + Duration::from_millis(16 * frame));
    }
    engine.draw();
    assert_eq!(errors.borrow().len(), 1);

    log.borrow_mut().fail_draws = false;
    engine.draw();
    log.borrow_mut().fail_draws = true;
    engine.draw();
    assert_eq!(errors.borrow().len(), 2);
}

#[test]
fn failure_on_the_first_frame_is_delivered_to_a_late_handler() {
    let (backend, log) = RecordingBackend::new();
    log.borrow_mut().fail_draws = true;
    let mut engine =
        ShaderEngine::attach(backend, FrameQueue::new(), &config(), Instant::now()).unwrap();
    assert_eq!(log.borrow().draws.len(), 1);

    let errors = collect_errors(&mut engine);
    assert_eq!(errors.borrow().as_slice(), ["draw failed: device lost".to_string()]);

    engine.draw();
    let _ = collect_errors(&mut engine);
    assert_eq!(errors.borrow().len(), 1);
}
