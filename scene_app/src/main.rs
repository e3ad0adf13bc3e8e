//! Scene demo
//!
//! Loads the engine config, opens a fixed-size window and draws a model at the
//! origin surrounded by a grid of triangles until the window closes or Escape
//! is pressed. Space swaps the lit material for a flat-colour one.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use thiserror::Error;
use vk_engine::config::{Config, ConfigError, EngineConfig};
use vk_engine::foundation::logging;
use vk_engine::render::backends::vulkan::VulkanDevice;
use vk_engine::render::scene::{ALTERNATE_MATERIAL, DEFAULT_MATERIAL, MODEL_MESH, TRIANGLE_MESH};
use vk_engine::render::shader::load_spirv;
use vk_engine::render::{init_scene, ImageData, Mesh, RenderEngine, VulkanError};
use vk_engine::window::{InputActions, Window, WindowError};

const DEFAULT_CONFIG: &str = "resources/config/engine.toml";

/// Anything that ends the application early
#[derive(Error, Debug)]
enum AppError {
    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Window: {0}")]
    Window(#[from] WindowError),

    #[error("Renderer: {0}")]
    Vulkan(#[from] VulkanError),
}

/// Resolve a relative resource path against the working directory, then the crate
fn resource_path(path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join(path)
}

fn load_config() -> Result<EngineConfig, AppError> {
    let path = std::env::args()
        .nth(1)
        .map_or_else(|| resource_path(DEFAULT_CONFIG), PathBuf::from);
    let config = EngineConfig::load_or_default(&path)?;
    config.validate()?;
    Ok(config)
}

fn run(config: &EngineConfig) -> Result<(), AppError> {
    let [width, height] = config.window_extent;
    let mut window = Window::new(&config.application_name, width, height)?;
    let device = VulkanDevice::new(&mut window, config)?;
    log::info!("Rendering on {}", device.gpu_name());

    let mut engine = RenderEngine::new(device, config)?;

    let vertex = load_spirv(resource_path(&config.shaders.mesh_vertex))?;
    let lit = load_spirv(resource_path(&config.shaders.default_fragment))?;
    let flat = load_spirv(resource_path(&config.shaders.alternate_fragment))?;
    let primary = engine.create_material(DEFAULT_MATERIAL, &vertex, &lit)?;
    let alternate = engine.create_material(ALTERNATE_MATERIAL, &vertex, &flat)?;
    engine.set_alternate_material(primary, alternate);

    engine.upload_mesh(TRIANGLE_MESH, &Mesh::triangle())?;
    let model = Mesh::load_from_obj(resource_path(&config.assets.model_path))?;
    engine.upload_mesh(MODEL_MESH, &model)?;

    if let Some(texture_path) = &config.assets.texture_path {
        let pixels = ImageData::from_file(resource_path(texture_path))?;
        engine.upload_texture("default", &pixels)?;
    }

    init_scene(&mut engine, config.grid_half_extent)?;

    loop {
        let actions = window.poll_input();
        if actions.contains(InputActions::QUIT) {
            log::info!("Quit requested");
            break;
        }
        if actions.contains(InputActions::TOGGLE_SHADER) {
            engine.toggle_shader();
        }
        engine.draw()?;
    }

    let stats = engine.stats();
    log::info!(
        "Drew {} frames; last frame: {} draws, {} pipeline binds, {} vertex binds",
        stats.frames_drawn,
        stats.draw_calls,
        stats.pipeline_binds,
        stats.vertex_buffer_binds
    );
    engine.shutdown()?;
    Ok(())
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(log::LevelFilter::Info);
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(logging::level_from_str(&config.log_level));

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
