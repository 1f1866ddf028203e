use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
mod sprite_keys;

pub use app::{
    run_app, world_to_screen, world_to_screen_px, AppError, Body, Camera2D, Entity, EntityId,
    InputSnapshot, LoopConfig, RegistryError, RenderableDesc, RenderableKind,
    Renderer, Scene, SceneCommand, SceneKey, SceneRegistry, SceneRegistryBuilder, SceneWorld,
    Shape, System, Transform, UnknownScene, Vec2, Viewport, DEFAULT_BACKGROUND_COLOR,
    PIXELS_PER_WORLD, SLOW_FRAME_ENV_VAR,
};
pub use sprite_keys::SpriteKeyError;

pub const ROOT_ENV_VAR: &str = "BUTTERFLY_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub asset_dir: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: PathBuf) -> Self {
        let asset_dir = root.join("assets");
        Self { root, asset_dir }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("executable path has no parent directory: {}", .0.display())]
    ExeHasNoParent(PathBuf),
    #[error(
        "{var} points at {}, which is not a project root \
(expected Cargo.toml next to crates/ or assets/)",
        .path.display()
    )]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error(
        "no project root found above {}; set {var} to the directory holding Cargo.toml and assets/",
        .start_dir.display()
    )]
    RootNotFound {
        start_dir: PathBuf,
        var: &'static str,
    },
}

/// Locates the project root from `BUTTERFLY_ROOT`, or failing that by
/// walking up from the running executable.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    root_from_sources(env::var(ROOT_ENV_VAR), env::current_exe).map(AppPaths::from_root)
}

fn root_from_sources(
    env_root: Result<String, env::VarError>,
    current_exe: impl FnOnce() -> std::io::Result<PathBuf>,
) -> Result<PathBuf, StartupError> {
    match env_root {
        Ok(value) => {
            let path = normalize_path(Path::new(&value));
            if is_repo_marker(&path) {
                Ok(path)
            } else {
                Err(StartupError::InvalidEnvRoot {
                    var: ROOT_ENV_VAR,
                    path,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            find_root_upward(exe_dir).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(exe_dir),
                var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_upward(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .find(|candidate| is_repo_marker(candidate))
        .map(normalize_path)
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file()
        && (path.join("crates").is_dir() || path.join("assets").is_dir())
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_with(marker_dir: &str) -> TempDir {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write");
        fs::create_dir(temp.path().join(marker_dir)).expect("marker dir");
        temp
    }

    #[test]
    fn repo_marker_needs_cargo_toml_and_a_content_dir() {
        let temp = TempDir::new().expect("temp dir");
        assert!(!is_repo_marker(temp.path()));

        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write");
        assert!(!is_repo_marker(temp.path()));

        fs::create_dir(temp.path().join("assets")).expect("assets dir");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn env_root_wins_over_executable_location() {
        let project = project_with("assets");
        let root = root_from_sources(
            Ok(project.path().display().to_string()),
            || panic!("executable should not be consulted"),
        )
        .expect("root");

        assert_eq!(root, normalize_path(project.path()));
    }

    #[test]
    fn env_root_without_markers_is_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let error = root_from_sources(Ok(temp.path().display().to_string()), || {
            panic!("executable should not be consulted")
        })
        .expect_err("invalid root");

        assert!(matches!(error, StartupError::InvalidEnvRoot { .. }));
        assert!(error.to_string().contains(ROOT_ENV_VAR));
    }

    #[test]
    fn missing_env_walks_up_from_executable() {
        let project = project_with("crates");
        let bin_dir = project.path().join("target").join("debug");
        fs::create_dir_all(&bin_dir).expect("bin dir");
        let exe = bin_dir.join("butterfly_effect");

        let root = root_from_sources(Err(env::VarError::NotPresent), || Ok(exe)).expect("root");
        assert_eq!(root, normalize_path(project.path()));
    }

    #[test]
    fn unmarked_tree_reports_where_search_started() {
        let temp = TempDir::new().expect("temp dir");
        let exe = temp.path().join("bin").join("game");

        let error = root_from_sources(Err(env::VarError::NotPresent), || Ok(exe))
            .expect_err("no root");
        match error {
            StartupError::RootNotFound { start_dir, var } => {
                assert!(start_dir.ends_with("bin"));
                assert_eq!(var, ROOT_ENV_VAR);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn app_paths_place_assets_under_root() {
        let paths = AppPaths::from_root(PathBuf::from("/game"));
        assert_eq!(paths.asset_dir, PathBuf::from("/game/assets"));
    }
}
