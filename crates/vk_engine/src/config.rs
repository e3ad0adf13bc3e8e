//! Configuration system
//!
//! Configs are plain serde structs loaded from `.toml` or `.ron` through the
//! [`Config`] trait. Every field has a default so partial files work.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

/// Configuration trait
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Load configuration from file, dispatching on extension
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file, dispatching on extension
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values that parse but cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Compiled shader locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Vertex shader shared by both mesh materials
    pub mesh_vertex: String,
    /// Lit fragment shader of the default material
    pub default_fragment: String,
    /// Flat fragment shader of the alternate material
    pub alternate_fragment: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            mesh_vertex: "target/shaders/tri_mesh.spv".to_string(),
            default_fragment: "target/shaders/default_lit.spv".to_string(),
            alternate_fragment: "target/shaders/flat_color.spv".to_string(),
        }
    }
}

/// Asset locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// OBJ model placed at the scene origin
    pub model_path: String,
    /// Optional texture uploaded at startup
    pub texture_path: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model_path: "resources/models/octahedron.obj".to_string(),
            texture_path: None,
        }
    }
}

/// Scene camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera position in world space
    pub position: [f32; 3],
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, -6.0, -10.0],
            fov_degrees: 70.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application name for the window title and Vulkan instance
    pub application_name: String,
    /// Window width and height in pixels
    pub window_extent: [u32; 2],
    /// Enable Vulkan validation layers (debug builds only)
    pub enable_validation: bool,
    /// Bound on every fence wait and image acquisition, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Animate the clear colour from the frame counter
    pub clear_color_flash: bool,
    /// Grid spans `-n..=n` on both axes
    pub grid_half_extent: i32,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Shader paths
    pub shaders: ShaderConfig,
    /// Asset paths
    pub assets: AssetConfig,
    /// Camera placement
    pub camera: CameraConfig,
}

impl EngineConfig {
    /// One second, in nanoseconds
    pub const ONE_SECOND_NS: u64 = 1_000_000_000;

    /// Create a configuration with defaults and the given name
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            window_extent: [720, 460],
            enable_validation: cfg!(debug_assertions),
            fence_timeout_ns: Self::ONE_SECOND_NS,
            clear_color_flash: true,
            grid_half_extent: 20,
            log_level: "info".to_string(),
            shaders: ShaderConfig::default(),
            assets: AssetConfig::default(),
            camera: CameraConfig::default(),
        }
    }

    /// Set the window extent
    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.window_extent = [width, height];
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set the fence and acquire timeout
    pub fn with_fence_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }
        if self.window_extent.contains(&0) {
            return Err(ConfigError::Invalid(format!(
                "window extent {}x{} has a zero dimension",
                self.window_extent[0], self.window_extent[1]
            )));
        }
        if self.fence_timeout_ns == 0 {
            return Err(ConfigError::Invalid("fence timeout must be non-zero".to_string()));
        }
        if self.grid_half_extent < 0 {
            return Err(ConfigError::Invalid("grid half extent cannot be negative".to_string()));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(ConfigError::Invalid("camera clip planes must satisfy 0 < near < far".to_string()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("Vulkan Engine")
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.window_extent, [720, 460]);
        assert_eq!(config.fence_timeout_ns, 1_000_000_000);
        assert_eq!(config.grid_half_extent, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EngineConfig::new("").validate().is_err());
        assert!(EngineConfig::default().with_extent(0, 460).validate().is_err());
        assert!(EngineConfig::default().with_fence_timeout_ns(0).validate().is_err());

        let mut config = EngineConfig::default();
        config.camera.near = 300.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            application_name = "demo"
            window_extent = [1280, 720]

            [camera]
            fov_degrees = 60.0
            "#,
        )
        .unwrap();
        assert_eq!(config.application_name, "demo");
        assert_eq!(config.window_extent, [1280, 720]);
        assert_eq!(config.camera.fov_degrees, 60.0);
        assert_eq!(config.camera.far, 200.0);
        assert_eq!(config.fence_timeout_ns, EngineConfig::ONE_SECOND_NS);
    }

    #[test]
    fn test_file_round_trip_and_format_dispatch() {
        let dir = std::env::temp_dir().join(format!("vk_engine_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = EngineConfig::new("roundtrip").with_extent(800, 600);
        for name in ["engine.toml", "engine.ron"] {
            let path = dir.join(name);
            config.save_to_file(&path).unwrap();
            assert_eq!(EngineConfig::load_from_file(&path).unwrap(), config);
        }

        let bad = dir.join("engine.yaml");
        assert!(matches!(
            config.save_to_file(&bad),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert_eq!(
            EngineConfig::load_or_default(dir.join("missing.toml")).unwrap(),
            EngineConfig::default()
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
