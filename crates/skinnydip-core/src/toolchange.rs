//! Tool-activation index
//!
//! Records every toolchange in document order together with the tool it
//! replaced, plus one synthetic event for the final unload. Answers "which
//! tool was loaded at offset X" with a floor lookup.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::report::{NoticeKind, ProcessReport};
use crate::token::LineToken;
use crate::tool::{Activation, ToolId};

/// Literal the fourth line of the final-unload marker is expected to start with
pub const FINAL_UNLOAD_SENTINEL: &str = "M220 R";

/// One toolchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolChange {
    /// Byte offset of the activation line
    pub offset: usize,
    /// Zero-based line number of the activation line
    pub line: usize,
    /// Tool switched to
    pub new_tool: Activation,
    /// Tool that was loaded before, `None` for the first event
    pub previous_tool: Option<ToolId>,
}

/// Ordered toolchange events with floor lookup
#[derive(Debug, Clone, Default)]
pub struct ToolChangeIndex {
    events: Vec<ToolChange>,
    offsets: Vec<usize>,
}

impl ToolChangeIndex {
    /// Scan `doc` for activations and the final unload
    pub fn build(doc: &Document<'_>, tokens: &[LineToken], report: &mut ProcessReport) -> Self {
        let mut events = Vec::new();
        let mut previous_tool = None;

        for line in doc.lines() {
            if let LineToken::ToolSelect(tool) = tokens[line.number] {
                events.push(ToolChange {
                    offset: line.offset,
                    line: line.number,
                    new_tool: Activation::Tool(tool),
                    previous_tool,
                });
                previous_tool = Some(tool);
            }
        }

        if events.is_empty() {
            tracing::warn!("No toolchanges found");
        }

        if let Some(terminal) = find_final_unload(doc, tokens, &events, report) {
            events.push(ToolChange {
                offset: terminal.0,
                line: terminal.1,
                new_tool: Activation::End,
                previous_tool,
            });
        }

        tracing::info!("Toolchange index has {} elements", events.len());
        for event in &events {
            tracing::debug!(
                "  line {}: {} -> {}",
                event.line + 1,
                event
                    .previous_tool
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                event.new_tool
            );
        }

        Self::from_events(events)
    }

    /// Build from already ordered events
    pub fn from_events(events: Vec<ToolChange>) -> Self {
        let offsets = events.iter().map(|e| e.offset).collect();
        Self { events, offsets }
    }

    /// All events in ascending offset order
    pub fn events(&self) -> &[ToolChange] {
        &self.events
    }

    /// Number of events, final unload included
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the document has no toolchanges
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tools in activation order, final unload excluded
    pub fn tool_sequence(&self) -> Vec<ToolId> {
        self.events.iter().filter_map(|e| e.new_tool.tool()).collect()
    }

    /// Distinct tools that are activated somewhere, ascending
    pub fn tools_used(&self) -> Vec<ToolId> {
        let mut tools = self.tool_sequence();
        tools.sort();
        tools.dedup();
        tools
    }

    /// Event whose activation line starts exactly at `offset`
    pub fn event_at(&self, offset: usize) -> Option<&ToolChange> {
        self.offsets
            .binary_search(&offset)
            .ok()
            .map(|i| &self.events[i])
    }

    /// Index of the event closest to `offset` by distance
    ///
    /// Ties resolve towards the earlier event.
    fn nearest(&self, offset: usize) -> Option<usize> {
        if self.offsets.is_empty() {
            return None;
        }
        let pos = self.offsets.partition_point(|&o| o < offset);
        if pos == 0 {
            return Some(0);
        }
        if pos == self.offsets.len() {
            return Some(pos - 1);
        }
        let before = self.offsets[pos - 1];
        let after = self.offsets[pos];
        if after - offset < offset - before {
            Some(pos)
        } else {
            Some(pos - 1)
        }
    }

    /// Last event at or before `offset`
    pub fn event_active_at(&self, offset: usize) -> Option<&ToolChange> {
        let mut index = self.nearest(offset)?;
        if self.offsets[index] > offset {
            // nearest lies ahead of the query point
            index = index.checked_sub(1)?;
        }
        Some(&self.events[index])
    }

    /// Tool loaded at `offset`
    ///
    /// `None` before the first activation and after the final unload.
    pub fn tool_active_at(&self, offset: usize) -> Option<ToolId> {
        self.event_active_at(offset)
            .and_then(|event| event.new_tool.tool())
    }
}

/// Locate the final-unload window: `G1 E..`, `G1..`, `G4 S0`, `M2..`
///
/// Returns `(offset, line)` of the window's first line.
fn find_final_unload(
    doc: &Document<'_>,
    tokens: &[LineToken],
    events: &[ToolChange],
    report: &mut ProcessReport,
) -> Option<(usize, usize)> {
    let last_activation_line = events.last().map(|e| e.line);
    let window_at = |i: usize| -> bool {
        tokens[i].is_extrusion()
            && tokens.get(i + 1).is_some_and(|t| t.is_g1())
            && tokens.get(i + 2) == Some(&LineToken::DwellZero)
            && doc
                .line(i + 3)
                .is_some_and(|l| l.content.starts_with("M2"))
    };

    let last = (0..tokens.len()).rev().find(|&i| window_at(i))?;
    let first_line = doc.line(last)?;
    let sentinel_line = doc.line(last + 3)?;

    if last_activation_line.is_some_and(|activation| last <= activation) {
        report.notice(
            NoticeKind::StructuralAnomaly,
            None,
            Some(last),
            "Final unload marker precedes the last toolchange; ignored",
        );
        return None;
    }

    if !sentinel_line.content.starts_with(FINAL_UNLOAD_SENTINEL) {
        report.notice(
            NoticeKind::StructuralAnomaly,
            None,
            Some(last + 3),
            format!(
                "Final unload marker ends with '{}', expected '{}'; using it anyway",
                sentinel_line.content.trim_end(),
                FINAL_UNLOAD_SENTINEL
            ),
        );
    }

    Some((first_line.offset, first_line.number))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(text: &str) -> (ToolChangeIndex, ProcessReport) {
        let doc = Document::new(text);
        let tokens: Vec<LineToken> = doc.lines().map(|l| LineToken::classify(l.content)).collect();
        let mut report = ProcessReport::new();
        let index = ToolChangeIndex::build(&doc, &tokens, &mut report);
        (index, report)
    }

    fn t(index: u8) -> ToolId {
        ToolId::new(index).unwrap()
    }

    const FINAL: &str = "G1 E-50 F2000\nG1 X10 F3000\nG4 S0\nM220 R\n";

    #[test]
    fn test_predecessor_chain() {
        let text = format!("T0\nG1 X1\nT2\nG1 X2\nT1\n{}", FINAL);
        let (index, report) = build(&text);
        let events = index.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].previous_tool, None);
        assert_eq!(events[1].previous_tool, Some(t(0)));
        assert_eq!(events[2].previous_tool, Some(t(2)));
        assert_eq!(events[3].new_tool, Activation::End);
        assert_eq!(events[3].previous_tool, Some(t(1)));
        assert_eq!(index.tool_sequence(), vec![t(0), t(2), t(1)]);
        assert_eq!(index.tools_used(), vec![t(0), t(1), t(2)]);
        assert!(report.notices.is_empty());
    }

    #[test]
    fn test_floor_lookup() {
        let text = "; start\nT0\nG1 X1\nG1 X2\nG1 X3\nT1\nG1 X4\n";
        let (index, _) = build(text);
        let t0_offset = index.events()[0].offset;
        let t1_offset = index.events()[1].offset;

        assert_eq!(index.tool_active_at(0), None);
        assert_eq!(index.tool_active_at(t0_offset), Some(t(0)));
        // closer to T1 than to T0 but still before it
        assert_eq!(index.tool_active_at(t1_offset - 1), Some(t(0)));
        assert_eq!(index.tool_active_at(t1_offset), Some(t(1)));
        assert_eq!(index.tool_active_at(text.len()), Some(t(1)));
    }

    #[test]
    fn test_no_tool_after_final_unload() {
        let text = format!("T0\nG1 X1\n{}G1 X9\n", FINAL);
        let (index, _) = build(&text);
        assert_eq!(index.len(), 2);
        assert_eq!(index.tool_active_at(3), Some(t(0)));
        assert_eq!(index.tool_active_at(text.len() - 1), None);
    }

    #[test]
    fn test_anomalous_sentinel_is_tolerated() {
        let text = "T0\nG1 X1\nG1 E-50 F2000\nG1 X10\nG4 S0\nM221 S100\n";
        let (index, report) = build(text);
        assert_eq!(index.len(), 2);
        assert_eq!(index.events()[1].new_tool, Activation::End);
        assert_eq!(report.notices_of(NoticeKind::StructuralAnomaly).count(), 1);
    }

    #[test]
    fn test_final_marker_before_last_toolchange_is_ignored() {
        let text = format!("T0\n{}T1\nG1 X1\n", FINAL);
        let (index, report) = build(&text);
        assert_eq!(index.len(), 2);
        assert!(index.events().iter().all(|e| e.new_tool != Activation::End));
        assert_eq!(report.notices_of(NoticeKind::StructuralAnomaly).count(), 1);
    }

    #[test]
    fn test_tool_like_lines_are_not_activations() {
        let (index, _) = build("T0\nT7\nT1 ; comment\nM104 S200\n");
        assert_eq!(index.len(), 1);
        assert_eq!(index.event_at(0).map(|e| e.new_tool), Some(Activation::Tool(t(0))));
        assert!(index.event_at(3).is_none());
    }
}
