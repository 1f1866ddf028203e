use std::process::ExitCode;

use engine::{
    resolve_app_paths, run_app, AppError, LoopConfig, RegistryError, SceneKey, SceneRegistry,
    StartupError, System, UnknownScene,
};
use thiserror::Error;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::settings::{load_settings, SettingsError};

const EXIT_ENGINE_FAILURE: u8 = 1;
const EXIT_STARTUP_FAILURE: u8 = 2;

#[derive(Debug, Error)]
pub(crate) enum LaunchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    UnknownScene(#[from] UnknownScene),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    App(#[from] AppError),
}

impl LaunchError {
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            LaunchError::Registry(_)
            | LaunchError::UnknownScene(_)
            | LaunchError::Startup(_)
            | LaunchError::Settings(_) => EXIT_STARTUP_FAILURE,
            LaunchError::App(_) => EXIT_ENGINE_FAILURE,
        }
    }
}

/// Resolves the start scene and hands everything to `runner`. `runner` is
/// never called when `requested` names a scene the registry does not know.
pub(crate) fn launch<R>(
    wiring: AppWiring,
    requested: Option<&str>,
    runner: R,
) -> Result<(), LaunchError>
where
    R: FnOnce(LoopConfig, SceneRegistry, SceneKey, Vec<Box<dyn System>>) -> Result<(), LaunchError>,
{
    let start = wiring.registry.resolve_start(requested)?;
    info!(
        scene = %start,
        explicit = requested.is_some(),
        "start_scene_resolved"
    );
    runner(wiring.config, wiring.registry, start, wiring.systems)
}

pub(crate) fn run(wiring: AppWiring, requested: Option<&str>) -> ExitCode {
    match launch(wiring, requested, run_engine) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

/// Logs `err`, echoes it to stderr and returns its exit code.
pub(crate) fn report_failure(err: &LaunchError) -> ExitCode {
    error!(error = %err, exit_code = err.exit_code(), "launch_failed");
    eprintln!("butterfly_effect: {err}");
    ExitCode::from(err.exit_code())
}

fn run_engine(
    config: LoopConfig,
    registry: SceneRegistry,
    start: SceneKey,
    systems: Vec<Box<dyn System>>,
) -> Result<(), LaunchError> {
    let paths = resolve_app_paths()?;
    let config = load_settings(&paths.root)?.apply_to(config);
    run_app(config, paths, registry, start, systems)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use std::path::PathBuf;

    use engine::{InputSnapshot, Scene, SceneCommand, SceneWorld};

    use super::*;

    struct MarkerScene;

    impl Scene for MarkerScene {
        fn load(&mut self, _world: &mut SceneWorld) {}

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
    }

    fn intro_lab_wiring() -> AppWiring {
        let registry = SceneRegistry::builder()
            .register("intro", || MarkerScene)
            .and_then(|builder| builder.register("lab", || MarkerScene))
            .expect("register")
            .entry("intro")
            .build()
            .expect("registry");
        AppWiring {
            config: LoopConfig::default(),
            registry,
            systems: Vec::new(),
        }
    }

    fn launch_recording(requested: Option<&str>) -> (Result<(), LaunchError>, Option<SceneKey>) {
        let started = RefCell::new(None);
        let result = launch(intro_lab_wiring(), requested, |_, registry, start, _| {
            assert!(registry.contains(start.as_str()));
            *started.borrow_mut() = Some(start);
            Ok(())
        });
        (result, started.into_inner())
    }

    #[test]
    fn no_flag_starts_entry_scene() {
        let (result, started) = launch_recording(None);
        assert!(result.is_ok());
        assert_eq!(started, Some(SceneKey::from("intro")));
    }

    #[test]
    fn flag_starts_named_scene() {
        let (result, started) = launch_recording(Some("lab"));
        assert!(result.is_ok());
        assert_eq!(started, Some(SceneKey::from("lab")));
    }

    #[test]
    fn unknown_scene_never_reaches_runner() {
        let (result, started) = launch_recording(Some("missing"));

        assert_eq!(started, None);
        let err = result.expect_err("unknown scene");
        assert_eq!(err.exit_code(), EXIT_STARTUP_FAILURE);
        let message = err.to_string();
        assert!(message.contains("missing"));
        assert!(message.contains("intro, lab"));
    }

    #[test]
    fn runner_errors_pass_through() {
        let result = launch(intro_lab_wiring(), None, |_, _, _, _| {
            Err(LaunchError::Startup(StartupError::ExeHasNoParent(
                "/".into(),
            )))
        });

        assert!(matches!(result, Err(LaunchError::Startup(_))));
    }

    #[test]
    fn runtime_unknown_scene_is_an_engine_failure() {
        let unknown = UnknownScene {
            name: "credits".to_string(),
            known: vec!["intro".to_string()],
        };
        let err = LaunchError::App(AppError::UnknownScene(unknown));
        assert_eq!(err.exit_code(), EXIT_ENGINE_FAILURE);
    }

    #[test]
    fn invalid_registry_exits_as_startup_failure() {
        let duplicate = SceneRegistry::builder()
            .register("intro", || MarkerScene)
            .expect("first")
            .register("intro", || MarkerScene)
            .map(|_| ())
            .expect_err("duplicate");
        let err = LaunchError::from(duplicate);
        assert_eq!(err.exit_code(), EXIT_STARTUP_FAILURE);

        let missing_entry = SceneRegistry::builder()
            .register("intro", || MarkerScene)
            .expect("register")
            .build()
            .map(|_| ())
            .expect_err("missing entry");
        assert_eq!(
            LaunchError::from(missing_entry).exit_code(),
            EXIT_STARTUP_FAILURE
        );
    }

    #[test]
    fn invalid_settings_exit_as_startup_failure() {
        let err = LaunchError::Settings(SettingsError::Invalid {
            path: PathBuf::from("settings.json"),
            field: "target_tps",
            message: "must be greater than zero",
        });

        assert_eq!(err.exit_code(), EXIT_STARTUP_FAILURE);
        assert!(err.to_string().contains("target_tps"));
    }
}
