use engine::{RegistryError, SceneRegistry, System};

mod kinematic;
mod splash;
mod title;

use kinematic::{CollisionSystem, KinematicScene};
use splash::SplashScene;
use title::TitleScene;

pub(crate) const SPLASH_SCENE: &str = "splash";
pub(crate) const TITLE_SCENE: &str = "title";
pub(crate) const KINEMATIC_SCENE: &str = "kinematic";

pub(crate) fn build_scene_registry() -> Result<SceneRegistry, RegistryError> {
    SceneRegistry::builder()
        .register(SPLASH_SCENE, SplashScene::new)?
        .register(TITLE_SCENE, || TitleScene)?
        .register(KINEMATIC_SCENE, KinematicScene::new)?
        .entry(SPLASH_SCENE)
        .build()
}

pub(crate) fn build_systems() -> Vec<Box<dyn System>> {
    vec![Box::new(CollisionSystem)]
}
