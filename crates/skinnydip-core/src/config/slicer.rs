//! Slicer-reported geometry variables
//!
//! PrusaSlicer writes its configuration as comment lines at the end of the
//! file, e.g. `; cooling_tube_length = 10`. Only the single-extruder MMU
//! geometry is of interest here.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Distance the filament travels in the cooling tube during cooling moves
pub const COOLING_TUBE_LENGTH: &str = "cooling_tube_length";
/// Distance from the nozzle tip to the bottom of the cooling tube
pub const COOLING_TUBE_RETRACTION: &str = "cooling_tube_retraction";
/// Extra distance added (usually negative) when loading
pub const EXTRA_LOADING_MOVE: &str = "extra_loading_move";
/// Distance from the nozzle tip to the parking position
pub const PARKING_POS_RETRACTION: &str = "parking_pos_retraction";

/// Variables read from the document
pub const KNOWN_VARIABLES: [&str; 4] = [
    COOLING_TUBE_LENGTH,
    COOLING_TUBE_RETRACTION,
    EXTRA_LOADING_MOVE,
    PARKING_POS_RETRACTION,
];

/// Added to the computed auto distance to stop just short of the melt zone
pub const DEFAULT_TUNING_OFFSET: f64 = -1.5;

/// Key/value pairs of slicer geometry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlicerVariables {
    values: BTreeMap<String, f64>,
}

impl SlicerVariables {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Set a value
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Look up a value
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Number of variables present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was found
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read every known variable from `; name = value` comment lines
    ///
    /// The first occurrence of each variable wins. Missing variables are
    /// logged and simply left out.
    pub fn from_document(text: &str) -> Self {
        let mut vars = Self::new();
        for &(name, ref re) in variable_patterns() {
            let value = re
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok());
            match value {
                Some(value) => {
                    tracing::info!("from gcode: {} = {}", name, value);
                    vars.set(name, value);
                }
                None => tracing::warn!("{} not found in gcode file", name),
            }
        }
        vars
    }

    /// Names of known variables that are absent
    pub fn missing(&self) -> Vec<&'static str> {
        KNOWN_VARIABLES
            .iter()
            .copied()
            .filter(|name| !self.values.contains_key(*name))
            .collect()
    }

    /// `cooling_tube_retraction + 0.5 * cooling_tube_length + tuning_offset`
    ///
    /// `None` when either geometry variable is missing.
    pub fn auto_insertion_distance(&self, tuning_offset: f64) -> Option<f64> {
        let retraction = self.get(COOLING_TUBE_RETRACTION)?;
        let length = self.get(COOLING_TUBE_LENGTH)?;
        Some(retraction + 0.5 * length + tuning_offset)
    }
}

fn variable_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        KNOWN_VARIABLES
            .iter()
            .map(|&name| {
                let pattern = format!(
                    r"(?m)^;[ \t]*{}[ \t]*=[ \t]*(-?\d+(?:\.\d+)?)[ \t]*\r?$",
                    regex::escape(name)
                );
                (name, Regex::new(&pattern).expect("invalid regex pattern"))
            })
            .collect()
    })
}
