//! Error handling for the Skinnydip engine
//!
//! Only unrecoverable conditions are errors. Everything the engine can work
//! around (unconfigured tools, out-of-range settings, odd terminal markers)
//! is recorded as a [`Notice`](crate::report::Notice) on the report instead.

use thiserror::Error;

use crate::site::SiteKind;
use crate::tool::ToolId;

/// Fatal engine error
///
/// Any of these aborts the run; no partial output is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The document already starts with the engine's own header signature
    #[error("Document was previously processed (starts with '{signature}')")]
    AlreadyProcessed {
        /// The signature that was found.
        signature: String,
    },

    /// The document has no configuration block for any filament
    #[error(
        "No skinnydip configuration data in target file ('{marker}' not found); set it up in the start gcode of each filament"
    )]
    NoConfiguration {
        /// The block start marker that was searched for.
        marker: String,
    },

    /// No `; temperature = ...` table was found but tools are configured
    #[error(
        "No print temperature table ('; temperature = ...') found; configured tools {tools} need restore temperatures"
    )]
    MissingTemperatureTable {
        /// Comma separated list of configured tools.
        tools: String,
    },

    /// A restore site was accepted for a tool whose print temperature is unknown
    #[error("Cannot restore temperature for {tool} at line {line}: print temperature is {value}")]
    UndefinedRestoreTemperature {
        /// The tool owning the restore site.
        tool: ToolId,
        /// One-based line of the restore site.
        line: usize,
        /// What the print temperature resolved to.
        value: String,
    },

    /// Two insertion sites resolved to the same offset
    #[error(
        "Insertion collision at offset {offset} (line {line}): {existing} already registered, {incoming} rejected"
    )]
    SiteCollision {
        /// Byte offset both sites claim.
        offset: usize,
        /// Zero-based line of that offset.
        line: usize,
        /// Kind of the site already in the map.
        existing: SiteKind,
        /// Kind of the site that collided.
        incoming: SiteKind,
    },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::AlreadyProcessed {
            signature: "; SKINNYDIP".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Document was previously processed (starts with '; SKINNYDIP')"
        );

        let err = EngineError::UndefinedRestoreTemperature {
            tool: ToolId::new(2).unwrap(),
            line: 41,
            value: "undefined".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot restore temperature for T2 at line 41: print temperature is undefined"
        );
    }

    #[test]
    fn test_no_configuration_names_the_marker() {
        let err = EngineError::NoConfiguration {
            marker: "SKINNYDIP CONFIGURATION START".to_string(),
        };
        assert!(err
            .to_string()
            .starts_with("No skinnydip configuration data in target file ('SKINNYDIP CONFIGURATION START' not found)"));
    }

    #[test]
    fn test_collision_names_both_kinds() {
        let err = EngineError::SiteCollision {
            offset: 120,
            line: 7,
            existing: SiteKind::ThreadDip,
            incoming: SiteKind::TemperatureWait,
        };
        let text = err.to_string();
        assert!(text.contains("offset 120"));
        assert!(text.contains("thread dip"));
        assert!(text.contains("temperature wait"));
    }
}
