use engine::{InputSnapshot, Scene, SceneCommand, SceneKey, SceneWorld};
use tracing::debug;

use super::TITLE_SCENE;

const SPLASH_BACKGROUND: [u8; 3] = [112, 31, 153];
const SPLASH_DURATION_SECONDS: f32 = 4.0;

/// Plain coloured screen that hands off to the title after a fixed delay of
/// simulated time.
pub(crate) struct SplashScene {
    remaining_seconds: f32,
}

impl SplashScene {
    pub(crate) fn new() -> Self {
        Self {
            remaining_seconds: SPLASH_DURATION_SECONDS,
        }
    }
}

impl Scene for SplashScene {
    fn load(&mut self, _world: &mut SceneWorld) {
        self.remaining_seconds = SPLASH_DURATION_SECONDS;
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        _input: &InputSnapshot,
        _world: &mut SceneWorld,
    ) -> SceneCommand {
        self.remaining_seconds -= fixed_dt_seconds;
        if self.remaining_seconds <= 0.0 {
            debug!(next = TITLE_SCENE, "splash_finished");
            return SceneCommand::Replace(SceneKey::from(TITLE_SCENE));
        }
        SceneCommand::None
    }

    fn render(&mut self, _world: &SceneWorld) {}

    fn unload(&mut self, _world: &mut SceneWorld) {}

    fn background_color(&self) -> [u8; 3] {
        SPLASH_BACKGROUND
    }
}
