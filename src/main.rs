use log::{error, info, LevelFilter};
use std::error::Error;

mod app;
mod config;
mod gfx;
mod mesh;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .filter_module("meshview::gfx", LevelFilter::Info)
        .filter_module("meshview::mesh", LevelFilter::Debug)
        .init();

    info!("Application starting...");

    if let Err(e) = app::run() {
        error!("Application exited with error: {}", e);
        return Err(e);
    }

    info!("Application exited gracefully.");
    Ok(())
}
