use std::path::PathBuf;

use progressive_tracer::{
    application::Application,
    config::TracerConfig,
    tracer::{ProgressiveTracer, TracerSettings},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = TracerConfig::load(config_path.as_deref())?;
    tracing::info!(?config, "loaded config");

    let settings = TracerSettings::load(config)?;
    pollster::block_on(Application::<ProgressiveTracer>::init(
        settings,
        "progressive-tracer",
    ))?;
    Ok(())
}
