mod loop_runner;
mod metrics;
mod registry;
mod rendering;
mod scene;
mod system;

pub use loop_runner::{run_app, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use registry::{RegistryError, SceneRegistry, SceneRegistryBuilder, UnknownScene};
pub use rendering::{world_to_screen, world_to_screen_px, Renderer, Viewport, PIXELS_PER_WORLD};
pub use scene::{
    Body, Camera2D, Entity, EntityId, InputSnapshot, RenderableDesc, RenderableKind, Scene,
    SceneCommand, SceneKey, SceneWorld, Shape, Transform, Vec2, DEFAULT_BACKGROUND_COLOR,
};
pub use system::System;
