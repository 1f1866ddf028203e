use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::AppPaths;

use super::metrics::MetricsAccumulator;
use super::scene::SceneMachine;
use super::{
    InputSnapshot, Renderer, SceneCommand, SceneKey, SceneRegistry, System,
    UnknownScene,
};

pub const SLOW_FRAME_ENV_VAR: &str = "BUTTERFLY_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Butterfly Effect".to_string(),
            window_width: 1280,
            window_height: 720,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    UnknownScene(#[from] UnknownScene),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Opens the window and drives `start` (and whatever it hands off to) until
/// the window closes, Escape is pressed or a scene names an unknown successor.
///
/// `systems` run against the active scene's world once per fixed tick,
/// before the scene's own update.
pub fn run_app(
    config: LoopConfig,
    paths: AppPaths,
    registry: SceneRegistry,
    start: SceneKey,
    mut systems: Vec<Box<dyn System>>,
) -> Result<(), AppError> {
    let mut scenes = SceneMachine::new(registry, &start)?;
    info!(
        root = %paths.root.display(),
        asset_dir = %paths.asset_dir.display(),
        scene = %start,
        system_count = systems.len(),
        "startup"
    );

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer =
        Renderer::new(Arc::clone(&window), paths.asset_dir).map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let timing = LoopTiming::from_config(&config);
    let fixed_dt_seconds = timing.fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let mut input_collector = InputCollector::default();

    scenes.load_active();
    scenes.apply_pending_active();
    info!(
        scene = %scenes.active_scene(),
        entity_count = scenes.active_world().entity_count(),
        "scene_loaded"
    );
    info!(
        target_tps = config.target_tps.max(1),
        max_frame_delta_ms = timing.max_frame_delta.as_millis() as u64,
        max_ticks_per_frame = timing.max_ticks_per_frame,
        metrics_log_interval_ms = timing.metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %format_render_cap(timing.render_fps_cap),
        "loop_config"
    );

    let mut clock = FixedStepClock::new(&timing, Instant::now());
    let mut pacer = RenderPacer::new(timing.render_frame_target(), Instant::now());
    let mut metrics = MetricsAccumulator::new(timing.metrics_log_interval);
    let mut last_applied_title: Option<String> = None;
    let mut failure: Option<UnknownScene> = None;
    let failure_slot = &mut failure;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    input_collector.mark_quit_requested();
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(size) => {
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    input_collector.handle_keyboard_input(&event);
                    if input_collector.quit_requested {
                        info!(reason = "escape_key", "shutdown_requested");
                        window_target.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    if !slow_frame_delay.is_zero() {
                        thread::sleep(slow_frame_delay);
                    }

                    let now = Instant::now();
                    let (frame_dt, plan) = clock.advance(now);
                    for _ in 0..plan.ticks {
                        let input = input_collector.snapshot_for_tick();
                        let step = step_active_scene(
                            &mut scenes,
                            &mut systems,
                            fixed_dt_seconds,
                            &input,
                        );
                        metrics.record_tick();
                        if let Err(unknown) = step {
                            error!(
                                scene = %scenes.active_scene(),
                                requested = %unknown.name,
                                "unknown_scene"
                            );
                            *failure_slot = Some(unknown);
                            window_target.exit();
                            return;
                        }
                    }

                    if !plan.dropped_backlog.is_zero() {
                        metrics.record_dropped_backlog(plan.dropped_backlog);
                        warn!(
                            dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                            max_ticks_per_frame = timing.max_ticks_per_frame,
                            "sim_clamp_triggered"
                        );
                    }

                    let cap_sleep = pacer.sleep_needed(Instant::now());
                    if !cap_sleep.is_zero() {
                        thread::sleep(cap_sleep);
                    }

                    scenes.render_active();
                    if let Err(error) = renderer
                        .render_world(scenes.active_world(), scenes.background_color_active())
                    {
                        warn!(error = %error, "renderer_draw_failed");
                        window_target.exit();
                    }
                    pacer.mark_presented(Instant::now());

                    let next_title = scenes.debug_title_active();
                    if next_title != last_applied_title {
                        window.set_title(next_title.as_deref().unwrap_or(&config.window_title));
                        last_applied_title = next_title;
                    }

                    metrics.record_frame(frame_dt);
                    if let Some(snapshot) = metrics.maybe_snapshot(now) {
                        info!(
                            fps = snapshot.fps,
                            tps = snapshot.tps,
                            frame_time_ms = snapshot.frame_time_ms,
                            worst_frame_time_ms = snapshot.worst_frame_time_ms,
                            dropped_backlog_ms = snapshot.dropped_backlog_ms,
                            entity_count = scenes.active_world().entity_count(),
                            scene = %scenes.active_scene(),
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            Event::LoopExiting => {
                scenes.shutdown();
                info!(scene = %scenes.active_scene(), "shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)?;

    match failure {
        Some(unknown) => Err(AppError::UnknownScene(unknown)),
        None => Ok(()),
    }
}

/// One fixed tick: systems, then the scene's update, then the deferred
/// spawns/despawns, then whatever transition the tick asked for. The restart
/// key only applies when the scene itself asked for nothing.
fn step_active_scene(
    scenes: &mut SceneMachine,
    systems: &mut [Box<dyn System>],
    fixed_dt_seconds: f32,
    input: &InputSnapshot,
) -> Result<(), UnknownScene> {
    scenes.run_systems_active(systems, fixed_dt_seconds);
    let command = match scenes.update_active(fixed_dt_seconds, input) {
        SceneCommand::None if input.restart_pressed() => SceneCommand::Restart,
        command => command,
    };
    scenes.apply_pending_active();

    if scenes.apply_command(command)? {
        scenes.apply_pending_active();
        info!(
            scene = %scenes.active_scene(),
            entity_count = scenes.active_world().entity_count(),
            "scene_loaded"
        );
    }
    Ok(())
}

#[derive(Debug, Default)]
struct InputCollector {
    quit_requested: bool,
    restart_key_is_down: bool,
    restart_pressed_edge: bool,
}

impl InputCollector {
    fn mark_quit_requested(&mut self) {
        self.quit_requested = true;
    }

    fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        self.handle_restart_key_state(is_restart_key(key_event), key_event.state);
        if is_quit_key(key_event) && key_event.state == ElementState::Pressed {
            self.mark_quit_requested();
        }
    }

    fn handle_restart_key_state(&mut self, is_restart_key: bool, state: ElementState) {
        if !is_restart_key {
            return;
        }

        match state {
            ElementState::Pressed => {
                if !self.restart_key_is_down {
                    self.restart_pressed_edge = true;
                }
                self.restart_key_is_down = true;
            }
            ElementState::Released => self.restart_key_is_down = false,
        }
    }

    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot::new(self.restart_pressed_edge);
        self.restart_pressed_edge = false;
        snapshot
    }
}

/// Pacing values derived from a [`LoopConfig`]. Zero durations and zero
/// rates fall back to usable values.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LoopTiming {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    metrics_log_interval: Duration,
    render_fps_cap: Option<u32>,
}

impl LoopTiming {
    fn from_config(config: &LoopConfig) -> Self {
        let defaults = LoopConfig::default();
        Self {
            fixed_dt: Duration::from_secs_f64(1.0 / f64::from(config.target_tps.max(1))),
            max_frame_delta: non_zero_or(config.max_frame_delta, defaults.max_frame_delta),
            max_ticks_per_frame: config.max_ticks_per_frame.max(1),
            metrics_log_interval: non_zero_or(
                config.metrics_log_interval,
                defaults.metrics_log_interval,
            ),
            render_fps_cap: config.max_render_fps.filter(|fps| *fps > 0),
        }
    }

    fn render_frame_target(&self) -> Option<Duration> {
        self.render_fps_cap
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks: u32,
    dropped_backlog: Duration,
}

/// Fixed-timestep accumulator. Frame time is clamped before it is banked,
/// and whatever is still banked past the per-frame tick cap is dropped.
#[derive(Debug)]
struct FixedStepClock {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    banked: Duration,
    last_frame: Instant,
}

impl FixedStepClock {
    fn new(timing: &LoopTiming, now: Instant) -> Self {
        Self {
            fixed_dt: timing.fixed_dt,
            max_frame_delta: timing.max_frame_delta,
            max_ticks_per_frame: timing.max_ticks_per_frame,
            banked: Duration::ZERO,
            last_frame: now,
        }
    }

    /// Returns the unclamped frame time alongside the ticks to run.
    fn advance(&mut self, now: Instant) -> (Duration, StepPlan) {
        let frame_dt = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        (frame_dt, self.bank(frame_dt))
    }

    fn bank(&mut self, frame_dt: Duration) -> StepPlan {
        self.banked = self
            .banked
            .saturating_add(frame_dt.min(self.max_frame_delta));

        let mut ticks = 0u32;
        while self.banked >= self.fixed_dt && ticks < self.max_ticks_per_frame {
            self.banked -= self.fixed_dt;
            ticks += 1;
        }

        let dropped_backlog = if self.banked >= self.fixed_dt {
            std::mem::take(&mut self.banked)
        } else {
            Duration::ZERO
        };
        StepPlan {
            ticks,
            dropped_backlog,
        }
    }
}

/// Holds presents back to the optional render FPS cap. This is the only
/// place the loop sleeps for pacing.
#[derive(Debug)]
struct RenderPacer {
    frame_target: Option<Duration>,
    last_present: Instant,
}

impl RenderPacer {
    fn new(frame_target: Option<Duration>, now: Instant) -> Self {
        Self {
            frame_target,
            last_present: now,
        }
    }

    fn sleep_needed(&self, now: Instant) -> Duration {
        self.frame_target.map_or(Duration::ZERO, |target| {
            target.saturating_sub(now.saturating_duration_since(self.last_present))
        })
    }

    fn mark_presented(&mut self, now: Instant) {
        self.last_present = now;
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    cap.map_or_else(|| "off".to_string(), |value| value.to_string())
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    slow_frame_delay_from(env::var(SLOW_FRAME_ENV_VAR), config_slow_frame_ms)
}

fn slow_frame_delay_from(
    env_value: Result<String, env::VarError>,
    config_slow_frame_ms: u64,
) -> Duration {
    let fallback = Duration::from_millis(config_slow_frame_ms);
    match env_value {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            fallback
        }
    }
}

fn is_restart_key(key_event: &KeyEvent) -> bool {
    matches!(key_event.physical_key, PhysicalKey::Code(KeyCode::KeyR))
}

fn is_quit_key(key_event: &KeyEvent) -> bool {
    matches!(key_event.physical_key, PhysicalKey::Code(KeyCode::Escape))
}
