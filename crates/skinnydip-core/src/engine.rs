//! Processing pipeline
//!
//! Index the document, resolve the per-tool settings, scan for sites,
//! compile the blocks and render, in that order. Nothing is written until
//! every stage has succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compiler::compile_sites;
use crate::config::{
    ConfigResolver, SlicerVariables, CONFIG_START_MARKER, DEFAULT_TUNING_OFFSET,
};
use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::render::{build_header, render};
use crate::report::ProcessReport;
use crate::scanner::SiteScanner;
use crate::token::tokenize;
use crate::toolchange::ToolChangeIndex;

/// Engine version written into the output header
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Leading characters of every processed document
pub const HEADER_SIGNATURE: &str = "; SKINNYDIP";

/// True when `text` already carries the output header
pub fn is_already_processed(text: &str) -> bool {
    text.starts_with(HEADER_SIGNATURE)
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Added to the auto insertion distance (mm)
    pub tuning_offset: f64,
    /// Timestamp for the header; the current time when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tuning_offset: DEFAULT_TUNING_OFFSET,
            processed_at: None,
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// The transformed document
    pub text: String,
    /// What was inserted, suppressed and noticed
    pub report: ProcessReport,
}

/// Skinnydip post-processing engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    /// Create an engine with the given options
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Current options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Transform `input`, returning the new document and its report
    ///
    /// # Errors
    /// Any [`EngineError`]; no output is produced in that case.
    pub fn process(&self, input: &str, vars: &SlicerVariables) -> Result<ProcessOutput> {
        let mut report = ProcessReport::new();
        let text = self.process_into(input, vars, &mut report)?;
        Ok(ProcessOutput { text, report })
    }

    /// Like [`Engine::process`] but fills a caller-owned report
    ///
    /// Notices gathered before a fatal error stay in `report`, so the caller
    /// can still log them.
    pub fn process_into(
        &self,
        input: &str,
        vars: &SlicerVariables,
        report: &mut ProcessReport,
    ) -> Result<String> {
        if is_already_processed(input) {
            return Err(EngineError::AlreadyProcessed {
                signature: HEADER_SIGNATURE.to_string(),
            });
        }
        if !input.contains(CONFIG_START_MARKER) {
            return Err(EngineError::NoConfiguration {
                marker: CONFIG_START_MARKER.to_string(),
            });
        }

        let doc = Document::new(input);
        let tokens = tokenize(&doc);

        let toolchanges = ToolChangeIndex::build(&doc, &tokens, report);
        report.toolchanges = toolchanges.len();

        let configs =
            ConfigResolver::new(&doc, &toolchanges, self.options.tuning_offset).resolve(vars, report)?;

        let mut sites = SiteScanner::new(&doc, &tokens, &toolchanges, &configs).scan(report)?;
        compile_sites(&mut sites, &configs, doc.line_ending(), report)?;

        let processed_at = self.options.processed_at.unwrap_or_else(Utc::now);
        let header = build_header(VERSION, processed_at, &configs, report);
        report.header_lines = header.len();

        let output = render(&doc, &sites, &header);
        tracing::info!(
            "Inserted {} dips and {} temperature changes ({} notices)",
            report.tallies.thread_dip.inserted,
            report.tallies.temperature().inserted,
            report.notices.len()
        );
        Ok(output)
    }
}
