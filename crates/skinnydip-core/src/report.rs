//! Processing report
//!
//! The engine threads one [`ProcessReport`] through every stage instead of
//! appending to a shared log. The file job turns it into the log file and the
//! renderer prints the relevant parts into the output header.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::site::SiteKind;
use crate::tool::{format_tool_list, ToolId};

/// Category of a recoverable condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A configured value was outside its safe range and was clamped
    RangeCorrection,
    /// A field was missing or unreadable and took its default
    DefaultedField,
    /// A tool is used in the document but has no configuration block
    MissingConfiguration,
    /// A structural marker did not look as expected
    StructuralAnomaly,
    /// A slicer variable needed for auto distance was not found
    MissingSlicerVariable,
    /// The document already sets a temperature that differs from the print temperature
    EmbeddedTemperatureMismatch,
}

impl std::fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RangeCorrection => write!(f, "range correction"),
            Self::DefaultedField => write!(f, "defaulted field"),
            Self::MissingConfiguration => write!(f, "missing configuration"),
            Self::StructuralAnomaly => write!(f, "structural anomaly"),
            Self::MissingSlicerVariable => write!(f, "missing slicer variable"),
            Self::EmbeddedTemperatureMismatch => write!(f, "embedded temperature mismatch"),
        }
    }
}

/// A recoverable condition the user should be able to audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// Category
    pub kind: NoticeKind,
    /// Tool the notice concerns, if any
    pub tool: Option<ToolId>,
    /// Zero-based line the notice concerns, if any
    pub line: Option<usize>,
    /// Human readable description
    pub message: String,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(tool) = self.tool {
            write!(f, " {}", tool)?;
        }
        if let Some(line) = self.line {
            write!(f, " line {}", line + 1)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Why a site was not inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// No tool was active at the site
    NoActiveTool,
    /// The owning tool has no configuration block
    Unconfigured,
    /// The owning tool's toolchange temperature is off
    ToolchangeTempOff,
    /// Neither the insertion nor the extraction move would be emitted
    NoDipMotion,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveTool => write!(f, "no active tool"),
            Self::Unconfigured => write!(f, "tool not configured"),
            Self::ToolchangeTempOff => write!(f, "toolchange temperature off"),
            Self::NoDipMotion => write!(f, "no dip motion configured"),
        }
    }
}

/// Inserted / suppressed counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Blocks inserted
    pub inserted: usize,
    /// Sites suppressed
    pub suppressed: usize,
}

/// Counters for every site kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTallies {
    /// Thread dips
    pub thread_dip: Tally,
    /// Wait-for-temperature instructions
    pub temperature_wait: Tally,
    /// Restore-temperature instructions
    pub temperature_restore: Tally,
    /// Pre-drop temperature changes
    pub temperature_prestart: Tally,
}

impl KindTallies {
    /// Counter for `kind`
    pub fn get(&self, kind: SiteKind) -> Tally {
        match kind {
            SiteKind::ThreadDip => self.thread_dip,
            SiteKind::TemperatureWait => self.temperature_wait,
            SiteKind::TemperatureRestore => self.temperature_restore,
            SiteKind::TemperaturePreStart => self.temperature_prestart,
        }
    }

    fn get_mut(&mut self, kind: SiteKind) -> &mut Tally {
        match kind {
            SiteKind::ThreadDip => &mut self.thread_dip,
            SiteKind::TemperatureWait => &mut self.temperature_wait,
            SiteKind::TemperatureRestore => &mut self.temperature_restore,
            SiteKind::TemperaturePreStart => &mut self.temperature_prestart,
        }
    }

    /// Temperature insertions of all three kinds
    pub fn temperature(&self) -> Tally {
        let kinds = [
            self.temperature_wait,
            self.temperature_restore,
            self.temperature_prestart,
        ];
        Tally {
            inserted: kinds.iter().map(|t| t.inserted).sum(),
            suppressed: kinds.iter().map(|t| t.suppressed).sum(),
        }
    }
}

/// One inserted block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertionRecord {
    /// Site kind
    pub kind: SiteKind,
    /// Owning tool
    pub tool: ToolId,
    /// Zero-based input line the block precedes
    pub line: usize,
    /// Number of lines the block adds
    pub lines_added: usize,
}

/// One suppressed site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRecord {
    /// Site kind
    pub kind: SiteKind,
    /// Owning tool, if one was active
    pub tool: Option<ToolId>,
    /// Zero-based input line of the site
    pub line: usize,
    /// Reason
    pub reason: SuppressReason,
}

/// Structured outcome of one engine run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    /// Tools that carried a configuration block
    pub configured_tools: Vec<ToolId>,
    /// Toolchange events including the final unload
    pub toolchanges: usize,
    /// Auto insertion distance computed from slicer geometry
    pub auto_insertion_distance: Option<f64>,
    /// Totals per site kind
    pub tallies: KindTallies,
    /// Totals per owning tool
    pub per_tool: BTreeMap<ToolId, KindTallies>,
    /// Every inserted block
    pub insertions: Vec<InsertionRecord>,
    /// Every suppressed site
    pub suppressions: Vec<SuppressionRecord>,
    /// Recoverable conditions
    pub notices: Vec<Notice>,
    /// Lines in the output header
    pub header_lines: usize,
}

impl ProcessReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notice and log it
    pub fn notice(
        &mut self,
        kind: NoticeKind,
        tool: Option<ToolId>,
        line: Option<usize>,
        message: impl Into<String>,
    ) {
        let notice = Notice {
            kind,
            tool,
            line,
            message: message.into(),
        };
        tracing::warn!("{}", notice);
        self.notices.push(notice);
    }

    /// Record an inserted block
    pub fn record_insertion(&mut self, record: InsertionRecord) {
        self.tallies.get_mut(record.kind).inserted += 1;
        self.per_tool
            .entry(record.tool)
            .or_default()
            .get_mut(record.kind)
            .inserted += 1;
        self.insertions.push(record);
    }

    /// Record a suppressed site
    pub fn record_suppression(&mut self, record: SuppressionRecord) {
        tracing::debug!(
            "({}) Suppressed {} at line {}: {}",
            record
                .tool
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string()),
            record.kind,
            record.line + 1,
            record.reason
        );
        self.tallies.get_mut(record.kind).suppressed += 1;
        if let Some(tool) = record.tool {
            self.per_tool
                .entry(tool)
                .or_default()
                .get_mut(record.kind)
                .suppressed += 1;
        }
        self.suppressions.push(record);
    }

    /// Notices of one kind
    pub fn notices_of(&self, kind: NoticeKind) -> impl Iterator<Item = &Notice> {
        self.notices.iter().filter(move |n| n.kind == kind)
    }

    /// Total lines added by inserted blocks
    pub fn inserted_lines(&self) -> usize {
        self.insertions.iter().map(|r| r.lines_added).sum()
    }

    /// Human readable log, one fact per line
    pub fn log_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Configured extruders: {}",
            format_tool_list(&self.configured_tools)
        );
        let _ = writeln!(out, "Toolchanges: {}", self.toolchanges);
        match self.auto_insertion_distance {
            Some(distance) => {
                let _ = writeln!(out, "Auto insertion distance: {}", distance);
            }
            None => {
                let _ = writeln!(out, "Auto insertion distance: unavailable");
            }
        }
        for kind in SiteKind::ALL {
            let tally = self.tallies.get(kind);
            let _ = writeln!(
                out,
                "{}: {} inserted, {} suppressed",
                kind, tally.inserted, tally.suppressed
            );
        }
        for (tool, tallies) in &self.per_tool {
            let _ = writeln!(
                out,
                "  {}: dips {}/{}, temperature changes {}/{} (inserted/suppressed)",
                tool,
                tallies.thread_dip.inserted,
                tallies.thread_dip.suppressed,
                tallies.temperature().inserted,
                tallies.temperature().suppressed
            );
        }
        for record in &self.insertions {
            let _ = writeln!(
                out,
                "Inserted {} for {} before line {} (+{} lines)",
                record.kind,
                record.tool,
                record.line + 1,
                record.lines_added
            );
        }
        for record in &self.suppressions {
            let tool = record
                .tool
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string());
            let _ = writeln!(
                out,
                "Suppressed {} for {} at line {}: {}",
                record.kind,
                tool,
                record.line + 1,
                record.reason
            );
        }
        for notice in &self.notices {
            let _ = writeln!(out, "Notice {}", notice);
        }
        out
    }
}
