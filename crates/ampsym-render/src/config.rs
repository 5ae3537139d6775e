use std::fs;

use ampsym_core::{utils::paths::expand_input_path, AmpsymResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The settings of an interactive session, usually read from a TOML file.
///
/// Every section and every field has a default, so an empty file is a valid configuration:
///
/// ```toml
/// [model]
/// max_order = 2
/// flip_indices = [0]
/// m_range = [-2, -1, 0, 1, 2]
/// kappa = 1.0
///
/// [grid]
/// n_phi = 400
/// n_costheta = 200
///
/// [canvas]
/// output = "ampsym.png"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The intensity model to assemble.
    pub model: ModelConfig,
    /// The evaluation mesh.
    pub grid: GridConfig,
    /// Slider bounds and starting values.
    pub controls: ControlsConfig,
    /// Where and how the heatmap is drawn.
    pub canvas: CanvasConfig,
}

impl SessionConfig {
    /// Read a configuration from a TOML file. The path may contain `~` and environment variables.
    pub fn from_file(path: &str) -> AmpsymResult<Self> {
        let path = expand_input_path(path)?;
        let contents = fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "loaded session config");
        Ok(config)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> AmpsymResult<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// The `[model]` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// The highest partial-wave order.
    pub max_order: usize,
    /// The flip indices `k`.
    pub flip_indices: Vec<i64>,
    /// The azimuthal indices `m`.
    pub m_range: Vec<i64>,
    /// The overall scale, bound into the formula before compilation.
    pub kappa: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_order: 2,
            flip_indices: vec![0],
            m_range: vec![-2, -1, 0, 1, 2],
            kappa: 1.0,
        }
    }
}

/// The `[grid]` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Bins along $`\phi`$.
    pub n_phi: usize,
    /// Bins along $`\cos\theta`$, at least two.
    pub n_costheta: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_phi: 400,
            n_costheta: 200,
        }
    }
}

/// The `[controls]` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// The upper bound of every magnitude slider.
    pub magnitude_max: f64,
    /// The starting magnitude of the `+` coefficients and of any other parameter.
    pub default_magnitude: f64,
    /// The starting magnitude of the `-` coefficients. When both branches start equal the
    /// intensity does not depend on `P` or `Phi`.
    pub negative_magnitude: f64,
    /// The number of steps across each slider's range.
    pub steps: usize,
    /// The starting polarization fraction.
    pub polarization: f64,
    /// The starting production-plane angle, in radians.
    pub big_phi: f64,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            magnitude_max: 2.0,
            default_magnitude: 1.0,
            negative_magnitude: 0.5,
            steps: 200,
            polarization: 0.5,
            big_phi: 0.0,
        }
    }
}

/// The `[canvas]` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// The image written on every draw.
    pub output: String,
    /// After the first draw, the color scale only follows a new maximum above this value.
    pub rescale_threshold: f64,
    /// Pixels per grid point along each axis.
    pub scale: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            output: "ampsym.png".to_string(),
            rescale_threshold: 1e-3,
            scale: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.model.m_range, vec![-2, -1, 0, 1, 2]);
        assert_eq!(config.grid.n_phi, 400);
    }

    #[test]
    fn test_partial_sections() {
        let config = SessionConfig::from_toml_str(
            r#"
            [model]
            max_order = 1
            m_range = [-1, 0, 1]

            [canvas]
            rescale_threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.model.max_order, 1);
        assert_eq!(config.model.flip_indices, vec![0]);
        assert_eq!(config.canvas.rescale_threshold, 0.5);
        assert_eq!(config.canvas.output, "ampsym.png");
        assert_eq!(config.controls, ControlsConfig::default());
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(SessionConfig::from_toml_str("[model]\nmax_order = \"two\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("ampsym-config-{}.toml", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[grid]\nn_phi = 8\nn_costheta = 4").unwrap();
        let config = SessionConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.grid.n_phi, 8);
        assert_eq!(config.grid.n_costheta, 4);
        fs::remove_file(path).unwrap();
    }
}
