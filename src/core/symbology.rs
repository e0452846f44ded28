//! Display conventions per climate parameter.
//!
//! Each parameter code maps to a `ParameterStyle`: the resampling used to align
//! the raster with a template, an ordered list of closed-open class breaks with
//! their colours, the sentinel values that mean "no measurement", and the symbol
//! drawn where no class applies. The table is configuration, loaded from the
//! `parameters` section of the pipeline YAML; the set of its keys is the
//! known-parameter catalog.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Resampling;

#[derive(Debug, Error)]
pub enum SymbologyError {
    #[error("invalid symbology YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("parameter {code} has no classes")]
    NoClasses { code: String },
    #[error("parameter {code}, class {index}: {reason}")]
    InvalidClass {
        code: String,
        index: usize,
        reason: String,
    },
}

/// One legend class, matched as `low <= value < high`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBreak {
    pub low: f64,
    pub high: f64,
    pub color: [u8; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ClassBreak {
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value < self.high
    }
}

fn default_nodata_values() -> Vec<f64> {
    vec![-999.0]
}

fn default_no_data_color() -> [u8; 4] {
    [0, 0, 0, 0]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterStyle {
    #[serde(default)]
    pub resampling: Resampling,
    pub classes: Vec<ClassBreak>,
    /// Raw values that are never classified.
    #[serde(default = "default_nodata_values")]
    pub nodata_values: Vec<f64>,
    /// RGBA drawn for no-data and unclassified pixels; alpha 0 keeps the background.
    #[serde(default = "default_no_data_color")]
    pub no_data_color: [u8; 4],
}

impl ParameterStyle {
    /// True for finite values that are not a configured sentinel.
    #[inline]
    pub fn is_valid(&self, value: f64) -> bool {
        value.is_finite() && !self.nodata_values.iter().any(|&s| s == value)
    }

    /// Index of the class containing `value`, or `None` for no-data/unmapped values.
    pub fn classify(&self, value: f64) -> Option<usize> {
        if !self.is_valid(value) {
            return None;
        }
        self.classes.iter().position(|c| c.contains(value))
    }

    /// RGBA colour for a pixel value.
    pub fn color_for(&self, value: f64) -> [u8; 4] {
        match self.classify(value) {
            Some(idx) => {
                let [r, g, b] = self.classes[idx].color;
                [r, g, b, 255]
            }
            None => self.no_data_color,
        }
    }

    fn validate(&self, code: &str) -> Result<(), SymbologyError> {
        if self.classes.is_empty() {
            return Err(SymbologyError::NoClasses {
                code: code.to_string(),
            });
        }
        let invalid = |index: usize, reason: String| SymbologyError::InvalidClass {
            code: code.to_string(),
            index,
            reason,
        };
        for (index, class) in self.classes.iter().enumerate() {
            if class.low.is_nan() || class.high.is_nan() || class.low >= class.high {
                return Err(invalid(
                    index,
                    format!("low ({}) must be below high ({})", class.low, class.high),
                ));
            }
            if index > 0 {
                let prev = &self.classes[index - 1];
                if class.low < prev.high {
                    return Err(invalid(
                        index,
                        format!(
                            "overlaps previous class [{}, {}); classes must be ascending",
                            prev.low, prev.high
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Known-parameter catalog with its display conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbology {
    parameters: BTreeMap<String, ParameterStyle>,
}

impl Symbology {
    pub fn new(parameters: BTreeMap<String, ParameterStyle>) -> Result<Self, SymbologyError> {
        let symbology = Self { parameters };
        symbology.validate()?;
        Ok(symbology)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SymbologyError> {
        let parameters: BTreeMap<String, ParameterStyle> = serde_yaml::from_str(yaml)?;
        Self::new(parameters)
    }

    pub fn validate(&self) -> Result<(), SymbologyError> {
        for (code, style) in &self.parameters {
            style.validate(code)?;
        }
        Ok(())
    }

    pub fn style(&self, code: &str) -> Option<&ParameterStyle> {
        self.parameters.get(code)
    }

    pub fn is_known(&self, code: &str) -> bool {
        self.parameters.contains_key(code)
    }

    pub fn catalog(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }
}
