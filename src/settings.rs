//! TOML settings for the filters and the tone-mapping operator.
//!
//! Every table is optional; missing tables and keys take their defaults.
//!
//! ```toml
//! [processing]
//! parallel = true
//! strategy = { kind = "blocks", width = 64, height = 64 }
//!
//! [raman]
//! k1 = 0.5
//!
//! [exposures]
//! gamma = 2.2
//!
//! [bilateral]
//! sigma_s = 8.0
//! sampling = "dense"
//! ```

use crate::core::error::{ConfigError, ToneStackError, ToneStackResult};
use crate::core::tiling::ProcessingConfig;
use crate::filters::builtin::{BilateralConfig, DownsampleConfig, FusionWeightsConfig, LuminanceConfig};
use crate::tone_mapping::{RamanConfig, StopBracketing};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of every built-in filter plus the tiling to run them with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tiling and parallelism.
    pub processing: ProcessingConfig,
    /// Tone-mapping operator.
    pub raman: RamanConfig,
    /// Exposure generation for single HDR inputs.
    pub exposures: StopBracketing,
    /// Standalone bilateral filter.
    pub bilateral: BilateralConfig,
    /// Downsample filter.
    pub downsample: DownsampleConfig,
    /// Fusion weights filter.
    pub fusion_weights: FusionWeightsConfig,
    /// Luminance filter, also used by the tone-mapping operator.
    pub luminance: LuminanceConfig,
}

impl Settings {
    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> ToneStackResult<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> ToneStackResult<Self> {
        let path = path.as_ref();
        debug!("Loading settings from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> ToneStackResult<String> {
        toml::to_string_pretty(self).map_err(|e| ToneStackError::Other(e.to_string()))
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.raman.validate()?;
        self.exposures.validate()?;
        self.bilateral.validate()?;
        self.downsample.validate()?;
        self.fusion_weights.validate()?;
        Ok(())
    }
}
