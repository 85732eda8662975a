// =============================================================================
// VULKAN BRING-UP - Hello Triangle
// =============================================================================
//
// Brings up everything needed to draw one triangle and keeps it alive until
// the window closes. No frames are submitted yet.
//
// BRING-UP ORDER:
// 1. Instance (+ debug messenger when validation is on)
// 2. Surface for the window
// 3. Physical device selection, logical device and queues
// 4. Swapchain and image views
// 5. Render pass, pipeline layout, graphics pipeline
//
// Teardown runs the same list backwards, also after a failed step.
//
// =============================================================================

mod backend;
mod config;
mod window;

use anyhow::{Context, Result};
use backend::{AshDriver, FileShaderSource, Lifecycle};
use config::Config;
use log::LevelFilter;
use std::fs::File;
use window::PlatformWindow;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, config_error) = Config::load();
    let level = config.log_level();

    init_logging(&config, *level.as_ref().unwrap_or(&LevelFilter::Info))?;
    if let Some(e) = config_error {
        log::warn!("Using default config: {:#}", e);
    }
    if let Err(e) = level {
        log::warn!("{:#}, defaulting to info", e);
    }
    log::info!("Starting Vulkan bring-up");
    log::info!(
        "Window: {}x{}, shaders: {:?}/{}",
        config.window.width,
        config.window.height,
        config.shaders.directory,
        config.shaders.name
    );

    let mut window = PlatformWindow::create(&config.window.title, config.window.width, config.window.height)
        .context("Failed to create window")?;

    let driver = AshDriver::load()?;
    let shaders = FileShaderSource::new(&config.shaders.directory);
    let mut lifecycle = Lifecycle::new(driver, config.context_config(), config.shaders.name.clone());

    lifecycle
        .bring_up(&mut window, &shaders)
        .context("Vulkan bring-up failed")?;
    log::info!("Bring-up complete, state: {}", lifecycle.state());
    if let (Some(gpu), Some(swapchain)) = (lifecycle.selected_device(), lifecycle.swapchain()) {
        log::info!(
            "Presenting on {} at {}x{}",
            gpu.name,
            swapchain.extent.width,
            swapchain.extent.height
        );
    }

    lifecycle
        .run(&mut window, &shaders, config.idle())
        .context("Frame loop failed")?;

    // Surface must go before the window it was created for
    lifecycle.teardown();
    window.destroy();

    log::info!("Clean shutdown");
    Ok(())
}

/// Initialize logging, optionally into a file instead of stderr
fn init_logging(config: &Config, level: LevelFilter) -> Result<()> {
    use env_logger::{Builder, Target};

    let mut builder = Builder::new();
    builder.filter_level(level);
    // RUST_LOG wins over the config file
    builder.parse_default_env();

    if config.debug.log_to_file {
        let file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file: {}", config.debug.log_file))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
