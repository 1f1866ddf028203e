use std::io::{self, Write};

use clap::Parser;
use engine::{LoopConfig, RegistryError, SceneRegistry, System};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::gameplay;

#[derive(Parser, Debug)]
#[command(name = "butterfly_effect")]
#[command(about = "Butterfly Effect; pick the scene to start in with -s")]
pub(crate) struct Cli {
    /// Registered scene to start in instead of the entry scene
    #[arg(short = 's', long = "scene", value_name = "SCENE")]
    pub(crate) start_scene: Option<String>,

    /// Print the registered scene names and exit
    #[arg(long)]
    pub(crate) list_scenes: bool,
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) registry: SceneRegistry,
    pub(crate) systems: Vec<Box<dyn System>>,
}

pub(crate) fn build_app() -> Result<AppWiring, RegistryError> {
    info!("=== Butterfly Effect Startup ===");

    let registry = gameplay::build_scene_registry()?;
    info!(
        scene_count = registry.keys().count(),
        entry = %registry.entry_key(),
        "scene_registry_built"
    );

    Ok(AppWiring {
        config: LoopConfig::default(),
        registry,
        systems: gameplay::build_systems(),
    })
}

/// Writes the registered scene names, one per line, in sorted order.
pub(crate) fn write_scene_list(registry: &SceneRegistry, mut out: impl Write) -> io::Result<()> {
    for key in registry.keys() {
        writeln!(out, "{key}")?;
    }
    out.flush()
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
