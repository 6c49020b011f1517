//! Configuration fields, their value types and safe ranges

use serde::{Deserialize, Serialize};

/// Inclusive `[low, high]` bound for a numeric setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeRange {
    /// Smallest accepted value
    pub low: f64,
    /// Largest accepted value
    pub high: f64,
}

/// Which boundary a clamped value was moved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Value was below `low`
    RaisedToLow,
    /// Value was above `high`
    LoweredToHigh,
}

/// Result of clamping a value into a [`SafeRange`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamped {
    /// Value after clamping
    pub value: f64,
    /// Boundary applied, `None` when the value was already in range
    pub correction: Option<Correction>,
}

impl SafeRange {
    /// Create a range
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// True when `value` is within the bounds
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// Move `value` onto the nearest boundary if it is outside
    pub fn clamp(&self, value: f64) -> Clamped {
        if value < self.low {
            Clamped {
                value: self.low,
                correction: Some(Correction::RaisedToLow),
            }
        } else if value > self.high {
            Clamped {
                value: self.high,
                correction: Some(Correction::LoweredToHigh),
            }
        } else {
            Clamped {
                value,
                correction: None,
            }
        }
    }
}

/// Range for insertion and extraction feed rates (mm/min)
pub const SPEED_RANGE: SafeRange = SafeRange::new(300.0, 10000.0);
/// Range for dwell times (ms)
pub const PAUSE_RANGE: SafeRange = SafeRange::new(0.0, 20000.0);
/// Range for the dip distance (mm)
pub const DISTANCE_RANGE: SafeRange = SafeRange::new(0.0, 60.0);
/// Range for print and toolchange temperatures (°C)
pub const TEMPERATURE_RANGE: SafeRange = SafeRange::new(150.0, 295.0);

/// How far the dip pushes filament back into the melt zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InsertionDistance {
    /// Derive from the slicer's cooling tube geometry
    Auto,
    /// Fixed distance in mm
    Fixed(f64),
}

impl InsertionDistance {
    /// Parse `auto` (any case) or a number
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            return Some(Self::Auto);
        }
        parse_number(value).map(Self::Fixed)
    }

    /// The distance in mm, `None` while still `Auto`
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Auto => None,
            Self::Fixed(v) => Some(v),
        }
    }
}

impl std::fmt::Display for InsertionDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Fixed(v) => write!(f, "{}", v),
        }
    }
}

/// Temperature used while the filament is unloaded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ToolchangeTemp {
    /// Keep the print temperature during toolchanges
    Off,
    /// Drop to this temperature (°C)
    Degrees(f64),
}

impl ToolchangeTemp {
    /// Parse `off`, `0`, `-1` or a temperature
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("off") || value == "0" || value == "-1" {
            return Some(Self::Off);
        }
        parse_number(value).map(Self::Degrees)
    }

    /// The temperature, `None` when off
    pub fn degrees(self) -> Option<f64> {
        match self {
            Self::Off => None,
            Self::Degrees(v) => Some(v),
        }
    }
}

impl std::fmt::Display for ToolchangeTemp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Degrees(v) => write!(f, "{}", v),
        }
    }
}

/// Every field a configuration block may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    MaterialType,
    MaterialName,
    InsertionDistance,
    InsertionSpeed,
    ExtractionSpeed,
    InsertionPause,
    RemovalPause,
    ToolchangeTemp,
    BeepOnDip,
    BeepOnTemp,
}

impl Field {
    /// Fields in the order they are reported
    pub const ALL: [Field; 10] = [
        Field::MaterialType,
        Field::MaterialName,
        Field::InsertionDistance,
        Field::InsertionSpeed,
        Field::ExtractionSpeed,
        Field::InsertionPause,
        Field::RemovalPause,
        Field::ToolchangeTemp,
        Field::BeepOnDip,
        Field::BeepOnTemp,
    ];

    /// Key as written in the configuration block
    pub fn key(self) -> &'static str {
        match self {
            Self::MaterialType => "material_type",
            Self::MaterialName => "material_name",
            Self::InsertionDistance => "insertion_distance",
            Self::InsertionSpeed => "insertion_speed",
            Self::ExtractionSpeed => "extraction_speed",
            Self::InsertionPause => "insertion_pause",
            Self::RemovalPause => "removal_pause",
            Self::ToolchangeTemp => "toolchange_temp",
            Self::BeepOnDip => "beep_on_dip",
            Self::BeepOnTemp => "beep_on_temp",
        }
    }

    /// Safe range for numeric fields
    pub fn range(self) -> Option<SafeRange> {
        match self {
            Self::InsertionDistance => Some(DISTANCE_RANGE),
            Self::InsertionSpeed | Self::ExtractionSpeed => Some(SPEED_RANGE),
            Self::InsertionPause | Self::RemovalPause => Some(PAUSE_RANGE),
            Self::ToolchangeTemp => Some(TEMPERATURE_RANGE),
            _ => None,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Parse a plain decimal number
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a beep flag: any positive number or `true`/`yes`/`on`
pub fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if let Some(number) = parse_number(value) {
        return Some(number > 0.0);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_boundaries() {
        assert_eq!(
            SPEED_RANGE.clamp(0.0),
            Clamped {
                value: 300.0,
                correction: Some(Correction::RaisedToLow)
            }
        );
        assert_eq!(
            SPEED_RANGE.clamp(12000.0),
            Clamped {
                value: 10000.0,
                correction: Some(Correction::LoweredToHigh)
            }
        );
        assert_eq!(SPEED_RANGE.clamp(2000.0).correction, None);
        assert_eq!(TEMPERATURE_RANGE.clamp(295.0).value, 295.0);
    }

    #[test]
    fn test_clamp_is_idempotent() {
        for value in [-5.0, 0.0, 31.0, 60.0, 75.5] {
            let once = DISTANCE_RANGE.clamp(value).value;
            let twice = DISTANCE_RANGE.clamp(once);
            assert_eq!(twice.value, once);
            assert_eq!(twice.correction, None);
        }
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(InsertionDistance::parse("AUTO"), Some(InsertionDistance::Auto));
        assert_eq!(InsertionDistance::parse(" 31 "), Some(InsertionDistance::Fixed(31.0)));
        assert_eq!(InsertionDistance::parse("far"), None);
        assert_eq!(ToolchangeTemp::parse("Off"), Some(ToolchangeTemp::Off));
        assert_eq!(ToolchangeTemp::parse("-1"), Some(ToolchangeTemp::Off));
        assert_eq!(ToolchangeTemp::parse("0"), Some(ToolchangeTemp::Off));
        assert_eq!(ToolchangeTemp::parse("185"), Some(ToolchangeTemp::Degrees(185.0)));
    }

    #[test]
    fn test_flags_and_display() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(InsertionDistance::Fixed(31.0).to_string(), "31");
        assert_eq!(InsertionDistance::Fixed(33.5).to_string(), "33.5");
        assert_eq!(ToolchangeTemp::Off.to_string(), "off");
        assert_eq!(Field::ExtractionSpeed.to_string(), "extraction_speed");
    }
}
