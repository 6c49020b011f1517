//! Per-tool configuration
//!
//! - [`fields`]: field names, value types and safe ranges
//! - [`slicer`]: slicer geometry variables and the auto distance
//! - [`resolver`]: configuration blocks embedded in the G-code

pub mod fields;
pub mod resolver;
pub mod slicer;

pub use fields::{
    parse_flag, parse_number, Clamped, Correction, Field, InsertionDistance, SafeRange,
    ToolchangeTemp, DISTANCE_RANGE, PAUSE_RANGE, SPEED_RANGE, TEMPERATURE_RANGE,
};
pub use resolver::{
    find_temperature_table, ConfigResolver, ToolConfiguration, ToolConfigurations,
    CONFIG_END_MARKER, CONFIG_START_MARKER, MAX_BLOCK_LINES,
};
pub use slicer::{
    SlicerVariables, COOLING_TUBE_LENGTH, COOLING_TUBE_RETRACTION, DEFAULT_TUNING_OFFSET,
    EXTRA_LOADING_MOVE, KNOWN_VARIABLES, PARKING_POS_RETRACTION,
};
