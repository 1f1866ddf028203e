mod app;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use app::bootstrap::{self, Cli};
use app::launcher::{self, LaunchError};

fn main() -> ExitCode {
    let cli = Cli::parse();
    bootstrap::init_tracing();

    let wiring = match bootstrap::build_app() {
        Ok(wiring) => wiring,
        Err(err) => return launcher::report_failure(&LaunchError::from(err)),
    };

    if cli.list_scenes {
        return match bootstrap::write_scene_list(&wiring.registry, std::io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "scene_list_write_failed");
                ExitCode::FAILURE
            }
        };
    }

    launcher::run(wiring, cli.start_scene.as_deref())
}
