use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use tracing::info;

use super::registry::{SceneRegistry, UnknownScene};
use super::system::System;

pub const DEFAULT_BACKGROUND_COLOR: [u8; 3] = [20, 22, 28];

/// Name of a scene as registered in a [`SceneRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneKey(String);

impl SceneKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    /// Tear down the active scene and start a fresh instance of the named one.
    Replace(SceneKey),
    /// Tear down the active scene and start a fresh instance of it.
    Restart,
}

/// Per-tick input handed to scenes. `restart_pressed` is an edge: it is set
/// for exactly one tick per key press.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    restart_pressed: bool,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(restart_pressed: bool) -> Self {
        Self { restart_pressed }
    }

    pub fn restart_pressed(&self) -> bool {
        self.restart_pressed
    }

    pub fn with_restart_pressed(mut self, restart_pressed: bool) -> Self {
        self.restart_pressed = restart_pressed;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalize(self) -> Vec2 {
        let length = self.length();
        if length == 0.0 || !length.is_finite() {
            return Vec2::ZERO;
        }
        Vec2 {
            x: self.x / length,
            y: self.y / length,
        }
    }

    /// Counter-clockwise rotation.
    pub fn rotate_degrees(self, degrees: f32) -> Vec2 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Vec2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Mul<Vec2> for f32 {
    type Output = Vec2;

    fn mul(self, rhs: Vec2) -> Vec2 {
        rhs * self
    }
}

pub const CAMERA_ZOOM_DEFAULT: f32 = 1.0;
pub const CAMERA_ZOOM_MIN: f32 = 0.25;
pub const CAMERA_ZOOM_MAX: f32 = 4.0;

#[derive(Debug, Clone, Copy)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            position: Vec2::default(),
            zoom: CAMERA_ZOOM_DEFAULT,
        }
    }
}

impl Camera2D {
    pub fn effective_zoom(&self) -> f32 {
        clamp_camera_zoom(self.zoom)
    }
}

fn clamp_camera_zoom(zoom: f32) -> f32 {
    if !zoom.is_finite() {
        return CAMERA_ZOOM_DEFAULT;
    }
    zoom.clamp(CAMERA_ZOOM_MIN, CAMERA_ZOOM_MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    /// Counter-clockwise, in degrees.
    pub rotation_degrees: f32,
}

impl Transform {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            rotation_degrees: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderableKind {
    Placeholder,
    Sprite(String),
    Circle([u8; 3]),
    Square([u8; 3]),
}

#[derive(Debug, Clone)]
pub struct RenderableDesc {
    pub kind: RenderableKind,
    pub debug_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Circle,
    Square,
}

/// Rigid body state. `mass` may be `f32::INFINITY` for immovable bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub velocity: Vec2,
    pub mass: f32,
    pub shape: Shape,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub transform: Transform,
    /// Side length (squares, sprites) or diameter (circles) in world units.
    pub size: f32,
    pub renderable: RenderableDesc,
    pub body: Option<Body>,
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Default)]
pub struct SceneWorld {
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_spawns: Vec<Entity>,
    pending_despawns: Vec<EntityId>,
    camera: Camera2D,
}

impl SceneWorld {
    pub fn spawn(&mut self, transform: Transform, size: f32, renderable: RenderableDesc) -> EntityId {
        self.spawn_internal(transform, size, renderable, None)
    }

    pub fn spawn_body(
        &mut self,
        transform: Transform,
        size: f32,
        renderable: RenderableDesc,
        body: Body,
    ) -> EntityId {
        self.spawn_internal(transform, size, renderable, Some(body))
    }

    fn spawn_internal(
        &mut self,
        transform: Transform,
        size: f32,
        renderable: RenderableDesc,
        body: Option<Body>,
    ) -> EntityId {
        let id = self.allocator.allocate();
        self.pending_spawns.push(Entity {
            id,
            transform,
            size,
            renderable,
            body,
        });
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let exists_now = self.entities.iter().any(|entity| entity.id == id);
        let pending_spawn = self.pending_spawns.iter().any(|entity| entity.id == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    /// Applies queued despawns, then queued spawns in spawn order.
    pub fn apply_pending(&mut self) {
        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort_unstable();
            self.pending_despawns.dedup();
            let pending = &self.pending_despawns;
            self.entities
                .retain(|entity| pending.binary_search(&entity.id).is_err());
            self.pending_spawns
                .retain(|entity| pending.binary_search(&entity.id).is_err());
            self.pending_despawns.clear();
        }

        self.entities.append(&mut self.pending_spawns);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_spawns.is_empty() || !self.pending_despawns.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.camera = Camera2D::default();
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut SceneWorld);
    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut SceneWorld,
    ) -> SceneCommand;
    fn render(&mut self, world: &SceneWorld);
    fn unload(&mut self, world: &mut SceneWorld);
    fn background_color(&self) -> [u8; 3] {
        DEFAULT_BACKGROUND_COLOR
    }
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

struct SceneRuntime {
    key: SceneKey,
    scene: Box<dyn Scene>,
    world: SceneWorld,
    is_loaded: bool,
}

impl SceneRuntime {
    fn instantiate(registry: &SceneRegistry, key: &SceneKey) -> Result<Self, UnknownScene> {
        Ok(Self {
            key: key.clone(),
            scene: registry.instantiate(key)?,
            world: SceneWorld::default(),
            is_loaded: false,
        })
    }

    fn load(&mut self) {
        if self.is_loaded {
            return;
        }
        let (scene, world) = (&mut self.scene, &mut self.world);
        scene.load(world);
        self.is_loaded = true;
    }

    fn unload(&mut self) {
        if !self.is_loaded {
            return;
        }
        let (scene, world) = (&mut self.scene, &mut self.world);
        scene.unload(world);
        self.world.clear();
        self.is_loaded = false;
    }
}

/// Owns the registry and the single active scene.
pub(crate) struct SceneMachine {
    registry: SceneRegistry,
    active: SceneRuntime,
}

impl SceneMachine {
    pub(crate) fn new(registry: SceneRegistry, start: &SceneKey) -> Result<Self, UnknownScene> {
        let active = SceneRuntime::instantiate(&registry, start)?;
        Ok(Self { registry, active })
    }

    pub(crate) fn active_scene(&self) -> &SceneKey {
        &self.active.key
    }

    pub(crate) fn load_active(&mut self) {
        self.active.load();
    }

    pub(crate) fn run_systems_active(
        &mut self,
        systems: &mut [Box<dyn System>],
        fixed_dt_seconds: f32,
    ) {
        for system in systems.iter_mut() {
            system.update(fixed_dt_seconds, &mut self.active.world);
        }
    }

    pub(crate) fn update_active(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
    ) -> SceneCommand {
        let runtime = &mut self.active;
        let (scene, world) = (&mut runtime.scene, &mut runtime.world);
        scene.update(fixed_dt_seconds, input, world)
    }

    pub(crate) fn apply_pending_active(&mut self) {
        self.active.world.apply_pending();
    }

    pub(crate) fn render_active(&mut self) {
        let runtime = &mut self.active;
        runtime.scene.render(&runtime.world);
    }

    pub(crate) fn active_world(&self) -> &SceneWorld {
        &self.active.world
    }

    #[cfg(test)]
    pub(crate) fn active_world_mut(&mut self) -> &mut SceneWorld {
        &mut self.active.world
    }

    pub(crate) fn background_color_active(&self) -> [u8; 3] {
        self.active.scene.background_color()
    }

    pub(crate) fn debug_title_active(&self) -> Option<String> {
        self.active.scene.debug_title(&self.active.world)
    }

    /// Replaces the active scene with a fresh instance of `next`. The
    /// current scene is left untouched when `next` is not registered.
    pub(crate) fn replace(&mut self, next: &SceneKey) -> Result<(), UnknownScene> {
        let mut incoming = SceneRuntime::instantiate(&self.registry, next)?;
        self.active.unload();
        incoming.load();
        self.active = incoming;
        Ok(())
    }

    pub(crate) fn restart(&mut self) -> Result<(), UnknownScene> {
        let key = self.active.key.clone();
        self.replace(&key)
    }

    /// Applies a command returned by the active scene. Returns whether the
    /// active scene instance changed.
    pub(crate) fn apply_command(&mut self, command: SceneCommand) -> Result<bool, UnknownScene> {
        match command {
            SceneCommand::None => Ok(false),
            SceneCommand::Replace(next) => {
                let previous = self.active.key.clone();
                self.replace(&next)?;
                info!(from = %previous, to = %next, "scene_replaced");
                Ok(true)
            }
            SceneCommand::Restart => {
                self.restart()?;
                info!(scene = %self.active.key, "scene_restarted");
                Ok(true)
            }
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.active.unload();
    }
}
