//! Noise type tags
//!
//! The set of base generators is closed. Each tag maps to exactly one
//! generator in [`crate::generators`]; parsing an unknown name is a
//! configuration error.

use std::fmt;
use std::str::FromStr;

use burn::tensor::ops::InterpolateMode;
use burn_sonar_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Base noise generator selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseType {
    #[default]
    Gaussian,
    Uniform,
    /// Brownian tree over the sigma range; needs sigma bounds at bind time
    Brownian,
    #[serde(rename = "studentt")]
    StudentT,
    Perlin,
    Pink,
    Laplacian,
    Power,
    Pyramid,
    PyramidBislerp,
    PyramidArea,
    PyramidOld,
    PyramidOldBislerp,
    PyramidOldArea,
    HighresPyramid,
    HighresPyramidBislerp,
    HighresPyramidArea,
    #[serde(alias = "green_test")]
    Green,
    RainbowMild,
    RainbowIntense,
}

impl NoiseType {
    pub const ALL: [NoiseType; 20] = [
        NoiseType::Gaussian,
        NoiseType::Uniform,
        NoiseType::Brownian,
        NoiseType::StudentT,
        NoiseType::Perlin,
        NoiseType::Pink,
        NoiseType::Laplacian,
        NoiseType::Power,
        NoiseType::Pyramid,
        NoiseType::PyramidBislerp,
        NoiseType::PyramidArea,
        NoiseType::PyramidOld,
        NoiseType::PyramidOldBislerp,
        NoiseType::PyramidOldArea,
        NoiseType::HighresPyramid,
        NoiseType::HighresPyramidBislerp,
        NoiseType::HighresPyramidArea,
        NoiseType::Green,
        NoiseType::RainbowMild,
        NoiseType::RainbowIntense,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NoiseType::Gaussian => "gaussian",
            NoiseType::Uniform => "uniform",
            NoiseType::Brownian => "brownian",
            NoiseType::StudentT => "studentt",
            NoiseType::Perlin => "perlin",
            NoiseType::Pink => "pink",
            NoiseType::Laplacian => "laplacian",
            NoiseType::Power => "power",
            NoiseType::Pyramid => "pyramid",
            NoiseType::PyramidBislerp => "pyramid_bislerp",
            NoiseType::PyramidArea => "pyramid_area",
            NoiseType::PyramidOld => "pyramid_old",
            NoiseType::PyramidOldBislerp => "pyramid_old_bislerp",
            NoiseType::PyramidOldArea => "pyramid_old_area",
            NoiseType::HighresPyramid => "highres_pyramid",
            NoiseType::HighresPyramidBislerp => "highres_pyramid_bislerp",
            NoiseType::HighresPyramidArea => "highres_pyramid_area",
            NoiseType::Green => "green",
            NoiseType::RainbowMild => "rainbow_mild",
            NoiseType::RainbowIntense => "rainbow_intense",
        }
    }

    /// Whether binding needs `sigma_min`/`sigma_max`
    pub fn requires_sigma_bounds(&self) -> bool {
        matches!(self, NoiseType::Brownian)
    }
}

impl fmt::Display for NoiseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NoiseType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "green_test" {
            return Ok(NoiseType::Green);
        }
        NoiseType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| ConfigError::UnknownNoiseType(s.to_string()))
    }
}

/// Resampling used when a pyramid level is brought back to full resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleMode {
    /// Bilinear
    Default,
    /// Smooth blend between neighbours, rendered with bicubic resampling
    Bislerp,
    /// Area upscaling by whole factors, i.e. block replication
    Area,
}

impl From<UpscaleMode> for InterpolateMode {
    fn from(mode: UpscaleMode) -> Self {
        match mode {
            UpscaleMode::Default => InterpolateMode::Bilinear,
            UpscaleMode::Bislerp => InterpolateMode::Bicubic,
            UpscaleMode::Area => InterpolateMode::Nearest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for noise_type in NoiseType::ALL {
            assert_eq!(noise_type.name().parse::<NoiseType>().unwrap(), noise_type);
            let json = serde_json::to_string(&noise_type).unwrap();
            assert_eq!(json, format!("\"{}\"", noise_type.name()));
        }
    }

    #[test]
    fn test_parse_case_insensitive_and_alias() {
        assert_eq!("GAUSSIAN".parse::<NoiseType>().unwrap(), NoiseType::Gaussian);
        assert_eq!("green_test".parse::<NoiseType>().unwrap(), NoiseType::Green);
        let parsed: NoiseType = serde_json::from_str("\"green_test\"").unwrap();
        assert_eq!(parsed, NoiseType::Green);
    }

    #[test]
    fn test_unknown_noise_type() {
        assert_eq!(
            "plaid".parse::<NoiseType>(),
            Err(ConfigError::UnknownNoiseType("plaid".to_string()))
        );
    }

    #[test]
    fn test_only_brownian_needs_bounds() {
        let needing: Vec<_> = NoiseType::ALL
            .iter()
            .filter(|t| t.requires_sigma_bounds())
            .collect();
        assert_eq!(needing, vec![&NoiseType::Brownian]);
    }
}
