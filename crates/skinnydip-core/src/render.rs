//! Merge and render
//!
//! One forward pass over the original lines. A dense slot array indexed by
//! line number holds the compiled block for each line (slot `N` is the
//! end-of-document anchor), so the pass never searches the site map.

use chrono::{DateTime, Utc};

use crate::config::ToolConfigurations;
use crate::document::Document;
use crate::report::ProcessReport;
use crate::site::SiteMap;
use crate::tool::{format_tool_list, ToolId};

/// Project page printed in the header
pub const PROJECT_URL: &str = "https://github.com/domesticatedviking/skinnydip";

fn header_row(label: &str, value: impl std::fmt::Display) -> String {
    format!(";{:>29}: {}", label, value)
}

fn tool_list_or_none(tools: &[ToolId]) -> String {
    if tools.is_empty() {
        "None".to_string()
    } else {
        format_tool_list(tools)
    }
}

/// Summary block placed at the top of the output
///
/// The first line starts with the reprocessing signature.
pub fn build_header(
    version: &str,
    processed_at: DateTime<Utc>,
    configs: &ToolConfigurations,
    report: &ProcessReport,
) -> Vec<String> {
    let configured: Vec<_> = configs.configured().collect();
    let lengths: Vec<String> = configured.iter().map(|c| c.insertion_distance.to_string()).collect();
    let beep_dip: Vec<ToolId> = configured
        .iter()
        .filter(|c| c.beep_on_dip)
        .map(|c| c.tool)
        .collect();
    let beep_temp: Vec<ToolId> = configured
        .iter()
        .filter(|c| c.beep_on_temp)
        .map(|c| c.tool)
        .collect();
    let dips = report.tallies.thread_dip;
    let temps = report.tallies.temperature();

    let mut lines = vec![
        format!("; SKINNYDIP THREAD REDUCTION v{}", version),
        format!("; {}", PROJECT_URL),
        format!(
            "; Postprocessing completed on {}",
            processed_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        header_row("Configured extruders", format_tool_list(&configs.configured_tools())),
        header_row("Insertion lengths", format!("[{}]", lengths.join(", "))),
        header_row("Total # of toolchanges", report.toolchanges),
        header_row("Dips added", dips.inserted),
        header_row("Dips ignored", dips.suppressed),
        header_row("Temperature changes added", temps.inserted),
        header_row("Temperature changes ignored", temps.suppressed),
        header_row(
            "Auto insertion distance",
            report
                .auto_insertion_distance
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unavailable".to_string()),
        ),
        header_row("Tools beeping on skinnydip", tool_list_or_none(&beep_dip)),
        header_row("Tools beeping on temp change", tool_list_or_none(&beep_temp)),
    ];
    lines.extend(report.notices.iter().map(|n| format!("; NOTICE: {}", n)));
    lines
}

/// Interleave the compiled blocks with the original lines
///
/// Original lines are copied byte for byte, terminators included.
pub fn render(doc: &Document<'_>, sites: &SiteMap, header: &[String]) -> String {
    let count = doc.line_count();
    let ending = doc.line_ending().as_str();

    let mut slots: Vec<Option<&str>> = vec![None; count + 1];
    for site in sites.iter() {
        let Some(text) = site.text.as_deref() else {
            continue;
        };
        match doc.line_index().line_at(site.offset) {
            Some(line) => slots[line] = Some(text),
            None => tracing::error!(
                "Site at offset {} is not at a line start; block dropped",
                site.offset
            ),
        }
    }

    let extra: usize = slots.iter().flatten().map(|s| s.len()).sum();
    let header_len: usize = header.iter().map(|l| l.len() + ending.len()).sum();
    let mut out = String::with_capacity(doc.text().len() + extra + header_len);

    for line in header {
        out.push_str(line);
        out.push_str(ending);
    }
    for line in doc.lines() {
        if let Some(block) = slots[line.number] {
            out.push_str(block);
        }
        out.push_str(line.raw);
    }
    if let Some(block) = slots[count] {
        if !doc.text().is_empty() && !doc.text().ends_with('\n') {
            out.push_str(ending);
        }
        out.push_str(block);
    }

    tracing::info!(
        "Rendered {} input lines into {} bytes",
        count,
        out.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{InsertionSite, SiteKind};

    fn t0() -> ToolId {
        ToolId::new(0).unwrap()
    }

    fn site(kind: SiteKind, doc: &Document<'_>, line: usize, text: &str) -> InsertionSite {
        let offset = doc.line_index().line_start(line).unwrap();
        let mut site = InsertionSite::new(kind, offset, line, t0());
        site.text = Some(text.to_string());
        site
    }

    #[test]
    fn test_blocks_precede_their_lines() {
        let doc = Document::new("A\nB\nC\n");
        let mut sites = SiteMap::new();
        sites.insert(site(SiteKind::ThreadDip, &doc, 0, "x\n")).unwrap();
        sites
            .insert(site(SiteKind::TemperatureWait, &doc, 2, "y\nz\n"))
            .unwrap();
        let header = vec!["; H".to_string()];
        assert_eq!(render(&doc, &sites, &header), "; H\nx\nA\nB\ny\nz\nC\n");
    }

    #[test]
    fn test_end_anchor_without_trailing_newline() {
        let doc = Document::new("A\r\nB");
        let mut sites = SiteMap::new();
        sites
            .insert(site(SiteKind::TemperatureRestore, &doc, 2, "e\r\n"))
            .unwrap();
        assert_eq!(render(&doc, &sites, &[]), "A\r\nB\r\ne\r\n");
    }

    #[test]
    fn test_uncompiled_sites_are_skipped() {
        let doc = Document::new("A\nB\n");
        let mut sites = SiteMap::new();
        sites
            .insert(InsertionSite::new(SiteKind::ThreadDip, 2, 1, t0()))
            .unwrap();
        assert_eq!(render(&doc, &sites, &[]), "A\nB\n");
    }

    #[test]
    fn test_header_rows() {
        let processed_at = DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut report = ProcessReport::new();
        report.toolchanges = 3;
        report.auto_insertion_distance = Some(33.5);
        let header = build_header("0.8.0", processed_at, &ToolConfigurations::new(), &report);
        assert_eq!(header[0], "; SKINNYDIP THREAD REDUCTION v0.8.0");
        assert_eq!(header[2], "; Postprocessing completed on 2024-03-01 12:30:00 UTC");
        assert_eq!(header[3], ";         Configured extruders: []");
        assert_eq!(header[5], ";       Total # of toolchanges: 3");
        assert_eq!(header[10], ";      Auto insertion distance: 33.5");
        assert_eq!(header[12], "; Tools beeping on temp change: None");
        assert_eq!(header.len(), 13);
    }
}
