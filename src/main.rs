use log::{error, info};
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!("Starting relay hub [{}]...", config.bind_address());

    let app_state = AppState::new(config);

    if let Err(e) = web::init_server(app_state).await {
        error!("Relay hub server failed: {e}");
        std::process::exit(1);
    }
}
