use engine::{
    InputSnapshot, RenderableDesc, RenderableKind, Scene, SceneCommand, SceneWorld, Transform,
    Vec2,
};

const TITLE_BACKGROUND: [u8; 3] = [31, 175, 204];
const TITLE_SPRITE_KEY: &str = "title";
const TITLE_SPRITE_SIZE: f32 = 2.5;

pub(crate) struct TitleScene;

impl Scene for TitleScene {
    fn load(&mut self, world: &mut SceneWorld) {
        world.spawn(
            Transform::at(Vec2::ZERO),
            TITLE_SPRITE_SIZE,
            RenderableDesc {
                kind: RenderableKind::Sprite(TITLE_SPRITE_KEY.to_string()),
                debug_name: "title",
            },
        );
    }

    fn update(
        &mut self,
        _fixed_dt_seconds: f32,
        _input: &InputSnapshot,
        _world: &mut SceneWorld,
    ) -> SceneCommand {
        SceneCommand::None
    }

    fn render(&mut self, _world: &SceneWorld) {}

    fn unload(&mut self, _world: &mut SceneWorld) {}

    fn background_color(&self) -> [u8; 3] {
        TITLE_BACKGROUND
    }
}
