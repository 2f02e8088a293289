//! Controller entry point: loads a YAML configuration and runs the
//! PROFINET/Modbus core until the process is terminated.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use scada::{Controller, ScadaConfig};
use scada_core::config::Config;
use scada_registry::InMemoryRegistry;

fn main() {
    env_logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "scada.yaml".to_string());
    let config: ScadaConfig = match Config::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(InMemoryRegistry::new());
    let controller = match Controller::start(&config, registry) {
        Ok(controller) => controller,
        Err(e) => {
            error!("failed to start controller: {e}");
            std::process::exit(1);
        }
    };

    info!("controller running, {} AR(s) configured", controller.ar_states().len());

    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
