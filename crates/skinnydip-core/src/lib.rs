//! # Skinnydip Core
//!
//! Post-processing engine for MMU2 multi-material G-code.
//! Inserts thread-reduction dips and toolchange temperature changes
//! at positions found by scanning the slicer's unload sequences.
//!
//! The pipeline runs strictly forward: line index, tool-activation index,
//! configuration resolver, site scanner, compiler, merge/render. See
//! [`Engine::process`].

pub mod compiler;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod render;
pub mod report;
pub mod scanner;
pub mod site;
pub mod token;
pub mod tool;
pub mod toolchange;

pub use config::{
    ConfigResolver, InsertionDistance, SafeRange, SlicerVariables, ToolConfiguration,
    ToolConfigurations, ToolchangeTemp,
};
pub use document::{Document, Line, LineEnding, LineIndex};
pub use engine::{is_already_processed, Engine, EngineOptions, ProcessOutput, HEADER_SIGNATURE, VERSION};
pub use error::{EngineError, Result};
pub use report::{
    InsertionRecord, KindTallies, Notice, NoticeKind, ProcessReport, SuppressReason,
    SuppressionRecord, Tally,
};
pub use scanner::{SiteScanner, UnloadWindow};
pub use site::{InsertionSite, SiteKind, SiteMap};
pub use token::{tokenize, LineToken};
pub use tool::{Activation, ToolId, TOOL_COUNT};
pub use toolchange::{ToolChange, ToolChangeIndex};
