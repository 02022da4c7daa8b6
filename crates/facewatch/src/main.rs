use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use facewatch_core::overlay;
use facewatch_core::{Config, OnnxAnalyzer, SharedAnalyzer};

mod app;
mod controller;
mod engine;

use app::App;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facewatch starting");

    let config = Config::load().context("failed to load configuration")?;
    let analyzer = OnnxAnalyzer::load(&config.model_dir)
        .with_context(|| format!("failed to load face models from {}", config.model_dir.display()))?;
    let analyzer: SharedAnalyzer = Arc::new(Mutex::new(analyzer));
    let font = overlay::resolve_font(config.label_font.as_deref());

    iced::application(
        move || App::new(config.clone(), analyzer.clone(), font.clone()),
        App::update,
        App::view,
    )
    .title("facewatch")
    .subscription(App::subscription)
    .window(iced::window::Settings {
        size: iced::Size::new(680.0, 620.0),
        exit_on_close_request: false,
        ..Default::default()
    })
    .run()?;

    tracing::info!("facewatch exiting");
    Ok(())
}
