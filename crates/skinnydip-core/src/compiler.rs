//! Insertion compiler
//!
//! Turns each accepted site into the literal G-code block spliced in before
//! its line. Every block is a list of lines; the document's line ending is
//! applied when the text is materialised.

use crate::config::{ToolConfiguration, ToolConfigurations};
use crate::document::LineEnding;
use crate::error::{EngineError, Result};
use crate::report::{InsertionRecord, ProcessReport};
use crate::site::{SiteKind, SiteMap};

/// Descending chirp played before a dip
pub const DOWN_BEEP: [&str; 3] = [
    "M300 S5742 P195 ;downbeep",
    "M300 S3830 P95  ;downbeep",
    "M300 S1912 P95  ;downbeep",
];

/// Ascending chirp played before the extraction
pub const UP_BEEP: [&str; 3] = [
    "M300 S1912 P95  ;upbeep",
    "M300 S3830 P95  ;upbeep",
    "M300 S5742 P195 ;upbeep",
];

/// Beeps around temperature changes: `[before wait, after wait / before restore]`
pub const TEMP_BEEP: [&str; 2] = ["M300 S3038 P155 ;temp_beep", "M300 S2550 P75 ;temp_beep"];

const DIP_BANNER: &str = ";*****SKINNYDIP THREAD REDUCTION*****************";
const DIP_FOOTER: &str = ";************************************************";
const WAIT_RULE: &str = "; *****************************************";
const RESTORE_RULE: &str = "; +++++++++++++++++++++++++++++++++++++++++";

/// Retract/reinsert sequence melting off the stringy tip
pub fn dip_block(config: &ToolConfiguration) -> Vec<String> {
    let distance = config.distance();
    let mut lines = vec![
        DIP_BANNER.to_string(),
        format!(
            "; Tool({}), {}/{}",
            config.tool, config.material_type, config.material_name
        ),
    ];
    if config.beep_on_dip {
        lines.extend(DOWN_BEEP.iter().map(|l| l.to_string()));
    }
    if config.has_insertion_move() {
        lines.push(format!(
            "G1 E{} F{}  ;move stringy tip into melt zone",
            distance, config.insertion_speed
        ));
    }
    if config.insertion_pause > 0.0 {
        lines.push(format!(
            "G4 P{}        ;pause in melt zone",
            config.insertion_pause
        ));
    }
    if config.has_extraction_move() {
        if config.beep_on_dip {
            lines.extend(UP_BEEP.iter().map(|l| l.to_string()));
        }
        lines.push(format!(
            "G1 E-{} F{}  ;extract clean tip from melt zone",
            distance, config.extraction_speed
        ));
    }
    if config.removal_pause > 0.0 {
        lines.push(format!(
            "G4 P{}        ;pause in cool zone",
            config.removal_pause
        ));
    }
    lines.push(DIP_FOOTER.to_string());
    lines
}

/// Wait until the hotend reaches the toolchange temperature
pub fn wait_block(config: &ToolConfiguration, temperature: f64) -> Vec<String> {
    let mut lines = vec![WAIT_RULE.to_string()];
    if config.beep_on_temp {
        lines.push(TEMP_BEEP[0].to_string());
    }
    lines.push(format!(
        "M109 R{} ;***SKINNYDIP Waiting for {} toolchange temp: {}",
        temperature, config.tool, temperature
    ));
    if config.beep_on_temp {
        lines.push(TEMP_BEEP[1].to_string());
    }
    lines.push(WAIT_RULE.to_string());
    lines
}

/// Return to the print temperature once the filament is out
pub fn restore_block(config: &ToolConfiguration, temperature: f64) -> Vec<String> {
    let mut lines = vec![RESTORE_RULE.to_string()];
    if config.beep_on_temp {
        lines.push(TEMP_BEEP[1].to_string());
    }
    lines.push(format!(
        "M104 S{} ;***SKINNYDIP Restoring temperature for  {}: {}",
        temperature, config.tool, temperature
    ));
    lines.push(RESTORE_RULE.to_string());
    lines
}

/// Start cooling towards the toolchange temperature without waiting
pub fn prestart_block(config: &ToolConfiguration, temperature: f64) -> Vec<String> {
    let mut lines = Vec::new();
    if config.beep_on_temp {
        lines.push(TEMP_BEEP[0].to_string());
    }
    lines.push(format!(
        "M104 S{} ;***SKINNYDIP initiating {} toolchange temperature.  Target: {}***",
        temperature, config.tool, temperature
    ));
    lines
}

/// Lines for one site, `None` when the settings give nothing to emit
fn site_lines(
    kind: SiteKind,
    line: usize,
    config: &ToolConfiguration,
) -> Result<Option<Vec<String>>> {
    let lines = match kind {
        SiteKind::ThreadDip => Some(dip_block(config)),
        SiteKind::TemperatureWait => config
            .toolchange_temp
            .degrees()
            .map(|t| wait_block(config, t)),
        SiteKind::TemperaturePreStart => config
            .toolchange_temp
            .degrees()
            .map(|t| prestart_block(config, t)),
        SiteKind::TemperatureRestore => {
            let Some(print_temp) = config.print_temp else {
                return Err(EngineError::UndefinedRestoreTemperature {
                    tool: config.tool,
                    line: line + 1,
                    value: "undefined".to_string(),
                });
            };
            Some(restore_block(config, print_temp))
        }
    };
    Ok(lines)
}

/// Materialise the text of every site and record the insertions
///
/// # Errors
/// [`EngineError::UndefinedRestoreTemperature`] when a restore is needed for
/// a tool whose print temperature is unknown.
pub fn compile_sites(
    sites: &mut SiteMap,
    configs: &ToolConfigurations,
    ending: LineEnding,
    report: &mut ProcessReport,
) -> Result<()> {
    for site in sites.iter_mut() {
        let config = configs.get(site.tool);
        let Some(lines) = site_lines(site.kind, site.line, config)? else {
            tracing::debug!(
                "({}) nothing to emit for {} at line {}",
                site.tool,
                site.kind,
                site.line + 1
            );
            continue;
        };
        let mut text = String::new();
        for line in &lines {
            text.push_str(line);
            text.push_str(ending.as_str());
        }
        site.text = Some(text);
        report.record_insertion(InsertionRecord {
            kind: site.kind,
            tool: site.tool,
            line: site.line,
            lines_added: lines.len(),
        });
    }
    tracing::info!(
        "Compiled {} blocks adding {} lines",
        report.insertions.len(),
        report.inserted_lines()
    );
    Ok(())
}
