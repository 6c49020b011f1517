//! Insertion-site scanner
//!
//! Matches short structural windows over the token stream and decides, per
//! candidate, whether a block is warranted for the owning tool. The four
//! scans only read the document and the indices and each returns its own
//! list; they are merged into one [`SiteMap`] at the end.

use crate::config::{parse_number, ToolConfigurations, ToolchangeTemp};
use crate::document::Document;
use crate::error::Result;
use crate::report::{NoticeKind, ProcessReport, SuppressReason, SuppressionRecord};
use crate::site::{InsertionSite, SiteKind, SiteMap};
use crate::token::LineToken;
use crate::tool::ToolId;
use crate::toolchange::ToolChangeIndex;

/// Fewest retract/progress lines between the wait site and the restore site
pub const MIN_UNLOAD_RUN: usize = 2;
/// Most retract/progress lines between the wait site and the restore site
pub const MAX_UNLOAD_RUN: usize = 7;
/// Most lines between the restore site and the dip site
pub const MAX_DIP_GAP: usize = 20;
/// Most lines between the dip site and the tool line
pub const MAX_TOOL_GAP: usize = 5;

/// One matched unload sequence, as zero-based line numbers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnloadWindow {
    /// First retraction of the unload
    pub wait: usize,
    /// `M104 S..` line already present in the unload
    pub existing_temperature: Option<usize>,
    /// First non-retraction move after the unload
    pub restore: usize,
    /// Retraction the dip is placed before
    pub dip: usize,
    /// Line starting with `T<digit>` that follows the dip
    pub tool_line: usize,
}

/// Find every unload window, scanning forward without overlap
pub fn find_unload_windows(tokens: &[LineToken]) -> Vec<UnloadWindow> {
    let mut windows = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match unload_window_at(tokens, i) {
            Some(window) => {
                i = window.tool_line + 1;
                windows.push(window);
            }
            None => i += 1,
        }
    }
    windows
}

fn unload_window_at(tokens: &[LineToken], wait: usize) -> Option<UnloadWindow> {
    if tokens[wait] != LineToken::Retract {
        return None;
    }

    let run = tokens[wait + 1..]
        .iter()
        .take_while(|t| t.is_unload_filler())
        .count();
    if !(MIN_UNLOAD_RUN..=MAX_UNLOAD_RUN).contains(&run) {
        return None;
    }

    let mut next = wait + 1 + run;
    let existing_temperature = match tokens.get(next) {
        Some(LineToken::SetTemperature) => {
            next += 1;
            Some(next - 1)
        }
        _ => None,
    };
    if tokens.get(next) != Some(&LineToken::Move) {
        return None;
    }
    let restore = next;

    // furthest dip first, and for that dip the furthest tool line
    let last_dip = (restore + 1 + MAX_DIP_GAP).min(tokens.len().saturating_sub(1));
    (restore + 2..=last_dip)
        .rev()
        .filter(|&d| tokens[d] == LineToken::Retract)
        .find_map(|dip| {
            let last_tool = (dip + 1 + MAX_TOOL_GAP).min(tokens.len().saturating_sub(1));
            (dip + 2..=last_tool)
                .rev()
                .find(|&t| tokens[t].is_tool_like())
                .map(|tool_line| UnloadWindow {
                    wait,
                    existing_temperature,
                    restore,
                    dip,
                    tool_line,
                })
        })
}

/// Find the `; CP TOOLCHANGE UNLOAD` lines preceded by the speed override
///
/// Window: `M220 B..`, `M220 S<digit>..`, an optional `M..` line, then the
/// marker. Returns the marker line numbers.
pub fn find_prestart_markers(tokens: &[LineToken]) -> Vec<usize> {
    let mut markers = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        if tokens[i] != LineToken::SpeedBackup || tokens[i + 1] != LineToken::SpeedOverride {
            i += 1;
            continue;
        }
        let marker = if tokens[i + 2] == LineToken::UnloadMarker {
            Some(i + 2)
        } else if tokens[i + 2].is_m_command() && tokens.get(i + 3) == Some(&LineToken::UnloadMarker) {
            Some(i + 3)
        } else {
            None
        };
        match marker {
            Some(line) => {
                markers.push(line);
                i = line + 1;
            }
            None => i += 1,
        }
    }
    markers
}

/// Value of an `M104 S<value>` line
fn set_temperature_value(content: &str) -> Option<f64> {
    let value = content.strip_prefix("M104 S")?;
    let end = value
        .find(|c: char| c.is_whitespace() || c == ';')
        .unwrap_or(value.len());
    parse_number(&value[..end])
}

/// Decides which candidate sites become insertions
pub struct SiteScanner<'d, 'a> {
    doc: &'d Document<'a>,
    tokens: &'d [LineToken],
    toolchanges: &'d ToolChangeIndex,
    configs: &'d ToolConfigurations,
}

impl<'d, 'a> SiteScanner<'d, 'a> {
    /// Create a scanner over the indexed document
    pub fn new(
        doc: &'d Document<'a>,
        tokens: &'d [LineToken],
        toolchanges: &'d ToolChangeIndex,
        configs: &'d ToolConfigurations,
    ) -> Self {
        Self {
            doc,
            tokens,
            toolchanges,
            configs,
        }
    }

    /// Run all four scans and merge the accepted sites
    ///
    /// # Errors
    /// [`EngineError::SiteCollision`](crate::error::EngineError::SiteCollision)
    /// if two accepted sites share a line.
    pub fn scan(&self, report: &mut ProcessReport) -> Result<SiteMap> {
        let windows = find_unload_windows(self.tokens);
        tracing::info!("Found {} unload sequences", windows.len());

        let dips = self.thread_dips(&windows, report);
        let waits = self.temperature_waits(&windows, report);
        let restores = self.temperature_restores(&windows, report);
        let prestarts = self.temperature_prestarts(report);

        tracing::info!(
            "Accepted {} dips, {} waits, {} restores, {} pre-drops",
            dips.len(),
            waits.len(),
            restores.len(),
            prestarts.len()
        );
        SiteMap::merge([dips, waits, restores, prestarts])
    }

    /// Dips, owned by the tool being unloaded
    pub fn thread_dips(
        &self,
        windows: &[UnloadWindow],
        report: &mut ProcessReport,
    ) -> Vec<InsertionSite> {
        let mut sites = Vec::new();
        for window in windows {
            let Some(tool_offset) = self.offset_of(window.tool_line) else {
                continue;
            };
            let Some(event) = self.toolchanges.event_at(tool_offset) else {
                report.notice(
                    NoticeKind::StructuralAnomaly,
                    None,
                    Some(window.tool_line),
                    "Unload sequence ends in a line that is not a toolchange; dip dropped",
                );
                continue;
            };
            let owner = event.previous_tool;
            let verdict = owner
                .ok_or(SuppressReason::NoActiveTool)
                .and_then(|tool| self.require_configured(tool))
                .and_then(|tool| {
                    let config = self.configs.get(tool);
                    if config.has_insertion_move() || config.has_extraction_move() {
                        Ok(tool)
                    } else {
                        Err(SuppressReason::NoDipMotion)
                    }
                });
            if let Some(site) = self.accept(SiteKind::ThreadDip, window.dip, owner, verdict, report) {
                sites.push(site);
            }
        }
        sites
    }

    /// Waits for the toolchange temperature before the unload begins
    pub fn temperature_waits(
        &self,
        windows: &[UnloadWindow],
        report: &mut ProcessReport,
    ) -> Vec<InsertionSite> {
        windows
            .iter()
            .filter_map(|window| self.temperature_site(SiteKind::TemperatureWait, window.wait, report))
            .collect()
    }

    /// Restores of the print temperature after the unload
    ///
    /// Unloads that already set a temperature get no restore.
    pub fn temperature_restores(
        &self,
        windows: &[UnloadWindow],
        report: &mut ProcessReport,
    ) -> Vec<InsertionSite> {
        let mut sites = Vec::new();
        for window in windows {
            match window.existing_temperature {
                Some(line) => self.check_existing_temperature(line, report),
                None => {
                    if let Some(site) =
                        self.temperature_site(SiteKind::TemperatureRestore, window.restore, report)
                    {
                        sites.push(site);
                    }
                }
            }
        }
        sites
    }

    /// Early drops to the toolchange temperature
    pub fn temperature_prestarts(&self, report: &mut ProcessReport) -> Vec<InsertionSite> {
        find_prestart_markers(self.tokens)
            .into_iter()
            .filter_map(|line| self.temperature_site(SiteKind::TemperaturePreStart, line, report))
            .collect()
    }

    fn temperature_site(
        &self,
        kind: SiteKind,
        line: usize,
        report: &mut ProcessReport,
    ) -> Option<InsertionSite> {
        let offset = self.offset_of(line)?;
        let owner = self.toolchanges.tool_active_at(offset);
        let verdict = owner
            .ok_or(SuppressReason::NoActiveTool)
            .and_then(|tool| self.require_configured(tool))
            .and_then(|tool| match self.configs.get(tool).toolchange_temp {
                ToolchangeTemp::Off => Err(SuppressReason::ToolchangeTempOff),
                ToolchangeTemp::Degrees(_) => Ok(tool),
            });
        self.accept(kind, line, owner, verdict, report)
    }

    fn require_configured(&self, tool: ToolId) -> std::result::Result<ToolId, SuppressReason> {
        if self.configs.get(tool).is_configured() {
            Ok(tool)
        } else {
            Err(SuppressReason::Unconfigured)
        }
    }

    fn accept(
        &self,
        kind: SiteKind,
        line: usize,
        owner: Option<ToolId>,
        verdict: std::result::Result<ToolId, SuppressReason>,
        report: &mut ProcessReport,
    ) -> Option<InsertionSite> {
        let offset = self.offset_of(line)?;
        match verdict {
            Ok(tool) => {
                tracing::debug!("({}) {} accepted at line {}", tool, kind, line + 1);
                Some(InsertionSite::new(kind, offset, line, tool))
            }
            Err(reason) => {
                report.record_suppression(SuppressionRecord {
                    kind,
                    tool: owner,
                    line,
                    reason,
                });
                None
            }
        }
    }

    fn check_existing_temperature(&self, line: usize, report: &mut ProcessReport) {
        let Some(found) = self.doc.line(line) else {
            return;
        };
        let Some(tool) = self.toolchanges.tool_active_at(found.offset) else {
            return;
        };
        let config = self.configs.get(tool);
        if !config.is_configured() {
            return;
        }
        let existing = set_temperature_value(found.content);
        if existing.is_some() && existing != config.print_temp {
            report.notice(
                NoticeKind::EmbeddedTemperatureMismatch,
                Some(tool),
                Some(line),
                format!(
                    "Unload already sets '{}' but the print temperature is {}; left unchanged",
                    found.content.trim_end(),
                    config
                        .print_temp
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "undefined".to_string())
                ),
            );
        }
    }

    fn offset_of(&self, line: usize) -> Option<usize> {
        self.doc.line_index().line_start(line)
    }
}
