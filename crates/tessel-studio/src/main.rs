//! Tessel studio: an interactive window driving the scene renderer over OpenGL.

mod app;
mod clock;
mod config;
mod demo;
mod gl_window;

use anyhow::{Context, Result};
use clap::Parser;
use tessel_engine::logging::{init_logging, LoggingConfig};
use winit::event_loop::EventLoop;

use crate::app::Studio;
use crate::config::{StudioArgs, StudioConfig};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = StudioConfig::from(StudioArgs::parse());
    log::info!("starting {} ({}x{})", config.title, config.width, config.height);

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(config);
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    studio.into_result()
}
