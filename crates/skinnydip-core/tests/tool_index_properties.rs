//! Property-based tests for the tool-activation index and safe ranges.
//!
//! 1. `tool_active_at` agrees with a linear scan for every offset.
//! 2. Each event's previous tool is the tool of the event before it.
//! 3. Line offsets and line numbers agree.
//! 4. Clamping lands inside the range, is idempotent, and leaves in-range
//!    values alone.

use proptest::prelude::*;
use skinnydip_core::config::{DISTANCE_RANGE, PAUSE_RANGE, SPEED_RANGE, TEMPERATURE_RANGE};
use skinnydip_core::{tokenize, Document, ProcessReport, SafeRange, ToolChangeIndex, ToolId};

// ── Helpers ─────────────────────────────────────────────────────────────

/// A line is either a bare activation `T<n>` or a motion line
fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u8..5).prop_map(|n| format!("T{}", n)),
        (0u32..1000).prop_map(|x| format!("G1 X{} Y{}", x, x / 2)),
        Just("; comment".to_string()),
        Just(String::new()),
    ]
}

fn document_strategy() -> impl Strategy<Value = String> {
    (prop::collection::vec(line_strategy(), 0..60), any::<bool>()).prop_map(|(lines, trailing)| {
        let mut text = lines.join("\n");
        if trailing && !text.is_empty() {
            text.push('\n');
        }
        text
    })
}

fn range_strategy() -> impl Strategy<Value = SafeRange> {
    prop_oneof![
        Just(SPEED_RANGE),
        Just(PAUSE_RANGE),
        Just(DISTANCE_RANGE),
        Just(TEMPERATURE_RANGE),
    ]
}

fn build(text: &str) -> (Document<'_>, ToolChangeIndex) {
    let doc = Document::new(text);
    let tokens = tokenize(&doc);
    let index = ToolChangeIndex::build(&doc, &tokens, &mut ProcessReport::new());
    (doc, index)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Floor lookup matches a linear scan
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn floor_lookup_matches_linear_scan(text in document_strategy()) {
        let (doc, index) = build(&text);

        let mut active: Option<ToolId> = None;
        for line in doc.lines() {
            if let Some(tool) = ToolId::parse_token(line.content) {
                active = Some(tool);
            }
            for offset in line.offset..line.offset + line.raw.len() {
                prop_assert_eq!(
                    index.tool_active_at(offset),
                    active,
                    "offset {} in line {:?}",
                    offset,
                    line.content
                );
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Predecessor chain
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn previous_tool_is_prior_activation(text in document_strategy()) {
        let (_, index) = build(&text);
        let events = index.events();
        if let Some(first) = events.first() {
            prop_assert_eq!(first.previous_tool, None);
        }
        for pair in events.windows(2) {
            prop_assert!(pair[0].offset < pair[1].offset);
            prop_assert_eq!(pair[1].previous_tool, pair[0].new_tool.tool());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Offsets and line numbers agree
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn line_index_round_trips(text in document_strategy()) {
        let doc = Document::new(&text);
        let index = doc.line_index();
        for line in doc.lines() {
            prop_assert_eq!(index.line_at(line.offset), Some(line.number));
            prop_assert_eq!(index.line_start(line.number), Some(line.offset));
        }
        prop_assert_eq!(index.line_at(text.len()), Some(index.len()));
        prop_assert_eq!(index.len(), text.lines().count());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Clamping
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn clamp_is_bounded_and_idempotent(range in range_strategy(), value in -50_000.0f64..50_000.0) {
        let once = range.clamp(value);
        prop_assert!(range.contains(once.value));

        let twice = range.clamp(once.value);
        prop_assert_eq!(twice.value, once.value);
        prop_assert_eq!(twice.correction, None);

        if range.contains(value) {
            prop_assert_eq!(once.value, value);
            prop_assert_eq!(once.correction, None);
        } else {
            prop_assert!(once.correction.is_some());
        }
    }
}
