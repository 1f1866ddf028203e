use super::scene::SceneWorld;

/// Behaviour applied to whichever scene is active, once per fixed tick and
/// before the scene's own update.
pub trait System {
    fn name(&self) -> &'static str;
    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld);
}
