//! Per-tool configuration resolver
//!
//! Users configure Skinnydip in each filament's start G-code:
//!
//! ```text
//! ; SKINNYDIP CONFIGURATION START
//! ; material_type PLA
//! ; insertion_distance auto
//! ; insertion_speed 2000
//! ; toolchange_temp 185
//! ; SKINNYDIP CONFIGURATION END
//! ```
//!
//! The slicer copies that G-code after every load of the filament, so each
//! block belongs to the tool active where it appears.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::fields::{
    parse_flag, parse_number, Correction, Field, InsertionDistance, SafeRange, ToolchangeTemp,
    DISTANCE_RANGE, TEMPERATURE_RANGE,
};
use super::slicer::{SlicerVariables, COOLING_TUBE_LENGTH, COOLING_TUBE_RETRACTION};
use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::report::{NoticeKind, ProcessReport};
use crate::tool::{format_tool_list, ToolId, TOOL_COUNT};
use crate::toolchange::ToolChangeIndex;

/// Marker opening a configuration block
pub const CONFIG_START_MARKER: &str = "SKINNYDIP CONFIGURATION START";
/// Marker closing a configuration block
pub const CONFIG_END_MARKER: &str = "SKINNYDIP CONFIGURATION END";
/// Most parameter lines a block may hold
pub const MAX_BLOCK_LINES: usize = 11;

/// Resolved settings for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfiguration {
    /// Tool these settings belong to
    pub tool: ToolId,
    /// Zero-based line of the configuration block, `None` when unconfigured
    pub block_line: Option<usize>,
    pub material_type: String,
    pub material_name: String,
    pub insertion_distance: InsertionDistance,
    /// Feed rate pushing the tip into the melt zone (mm/min)
    pub insertion_speed: f64,
    /// Feed rate pulling the tip back out (mm/min)
    pub extraction_speed: f64,
    /// Dwell in the melt zone (ms)
    pub insertion_pause: f64,
    /// Dwell after extraction (ms)
    pub removal_pause: f64,
    pub toolchange_temp: ToolchangeTemp,
    /// Print temperature from the slicer table, `None` when unknown
    pub print_temp: Option<f64>,
    pub beep_on_dip: bool,
    pub beep_on_temp: bool,
}

impl ToolConfiguration {
    /// Null settings: every dip and temperature effect is a no-op
    pub fn unconfigured(tool: ToolId) -> Self {
        Self {
            tool,
            block_line: None,
            material_type: "N/A".to_string(),
            material_name: "not configured".to_string(),
            insertion_distance: InsertionDistance::Auto,
            insertion_speed: 0.0,
            extraction_speed: 0.0,
            insertion_pause: 0.0,
            removal_pause: 0.0,
            toolchange_temp: ToolchangeTemp::Off,
            print_temp: None,
            beep_on_dip: false,
            beep_on_temp: false,
        }
    }

    /// True when a configuration block was found for the tool
    pub fn is_configured(&self) -> bool {
        self.block_line.is_some()
    }

    /// Dip distance in mm; an unresolved `Auto` counts as zero
    pub fn distance(&self) -> f64 {
        self.insertion_distance.value().unwrap_or(0.0)
    }

    /// Whether the insertion move of a dip would be emitted
    pub fn has_insertion_move(&self) -> bool {
        self.distance() > 0.0 && self.insertion_speed > 0.0
    }

    /// Whether the extraction move of a dip would be emitted
    pub fn has_extraction_move(&self) -> bool {
        self.distance() > 0.0 && self.extraction_speed > 0.0
    }
}

/// Settings for every tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfigurations {
    tools: Vec<ToolConfiguration>,
    /// Auto distance computed from slicer geometry
    pub auto_insertion_distance: Option<f64>,
}

impl Default for ToolConfigurations {
    fn default() -> Self {
        Self {
            tools: ToolId::all().map(ToolConfiguration::unconfigured).collect(),
            auto_insertion_distance: None,
        }
    }
}

impl ToolConfigurations {
    /// All tools unconfigured
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for `tool`
    pub fn get(&self, tool: ToolId) -> &ToolConfiguration {
        &self.tools[tool.index()]
    }

    /// Replace the settings of one tool
    pub fn set(&mut self, config: ToolConfiguration) {
        let index = config.tool.index();
        self.tools[index] = config;
    }

    fn get_mut(&mut self, tool: ToolId) -> &mut ToolConfiguration {
        &mut self.tools[tool.index()]
    }

    /// Configured tools in ascending order
    pub fn configured(&self) -> impl Iterator<Item = &ToolConfiguration> {
        self.tools.iter().filter(|c| c.is_configured())
    }

    /// Ids of configured tools
    pub fn configured_tools(&self) -> Vec<ToolId> {
        self.configured().map(|c| c.tool).collect()
    }
}

/// A located configuration block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawBlock<'a> {
    line: usize,
    offset: usize,
    body: &'a str,
}

/// Resolves per-tool settings from the document
pub struct ConfigResolver<'d, 'a> {
    doc: &'d Document<'a>,
    toolchanges: &'d ToolChangeIndex,
    tuning_offset: f64,
}

impl<'d, 'a> ConfigResolver<'d, 'a> {
    /// Create a resolver over an indexed document
    pub fn new(doc: &'d Document<'a>, toolchanges: &'d ToolChangeIndex, tuning_offset: f64) -> Self {
        Self {
            doc,
            toolchanges,
            tuning_offset,
        }
    }

    /// Extract, validate and finalise every tool's settings
    ///
    /// # Errors
    /// [`EngineError::MissingTemperatureTable`] when tools are configured but
    /// the slicer temperature table is absent.
    pub fn resolve(
        &self,
        vars: &SlicerVariables,
        report: &mut ProcessReport,
    ) -> Result<ToolConfigurations> {
        let mut configs = ToolConfigurations::new();

        let blocks = self.find_blocks(report);
        if blocks.is_empty() {
            tracing::warn!(
                "No skinnydip configuration data in target file; configuration must be set up in the start gcode of each filament"
            );
        }

        for block in blocks {
            let Some(tool) = self.toolchanges.tool_active_at(block.offset) else {
                report.notice(
                    NoticeKind::StructuralAnomaly,
                    None,
                    Some(block.line),
                    "Configuration block is not preceded by a toolchange; ignored",
                );
                continue;
            };
            if configs.get(tool).is_configured() {
                tracing::debug!(
                    "Ignoring repeated configuration block for {} at line {}",
                    tool,
                    block.line + 1
                );
                continue;
            }
            tracing::info!("Found configuration for {} at line {}", tool, block.line + 1);
            configs.set(extract_block(tool, &block, report));
        }

        let configured = configs.configured_tools();
        tracing::info!("Configured extruders: {}", format_tool_list(&configured));

        for tool in self.toolchanges.tools_used() {
            if !configs.get(tool).is_configured() {
                report.notice(
                    NoticeKind::MissingConfiguration,
                    Some(tool),
                    None,
                    "No SKINNYDIP configuration block; dips and temperature changes for this tool are suppressed",
                );
            }
        }

        self.apply_print_temperatures(&mut configs, report)?;
        self.apply_auto_distance(&mut configs, vars, report);

        for config in configs.configured() {
            tracing::debug!("Resolved settings: {:?}", config);
        }
        report.configured_tools = configured;
        Ok(configs)
    }

    fn find_blocks(&self, report: &mut ProcessReport) -> Vec<RawBlock<'a>> {
        let mut blocks = Vec::new();
        let count = self.doc.line_count();
        let mut n = 0;

        while n < count {
            let Some(line) = self.doc.line(n) else { break };
            if !line.content.contains(CONFIG_START_MARKER) {
                n += 1;
                continue;
            }

            let mut end = None;
            for candidate in (n + 1)..count.min(n + MAX_BLOCK_LINES + 2) {
                let Some(param) = self.doc.line(candidate) else { break };
                if is_config_end(param.content) {
                    end = Some(candidate);
                    break;
                }
                if !param.content.starts_with(';') {
                    break;
                }
            }

            match end {
                Some(end) if end > n + 1 => {
                    let body_start = self.doc.line_index().line_start(n + 1).unwrap_or(line.offset);
                    let body_end = self.doc.line_index().line_start(end).unwrap_or(body_start);
                    blocks.push(RawBlock {
                        line: n,
                        offset: line.offset,
                        body: &self.doc.text()[body_start..body_end],
                    });
                    n = end + 1;
                }
                Some(end) => {
                    report.notice(
                        NoticeKind::StructuralAnomaly,
                        None,
                        Some(n),
                        "Configuration block has no parameter lines; ignored",
                    );
                    n = end + 1;
                }
                None => {
                    report.notice(
                        NoticeKind::StructuralAnomaly,
                        None,
                        Some(n),
                        format!(
                            "Configuration block is not closed by '{}' within {} lines; ignored",
                            CONFIG_END_MARKER, MAX_BLOCK_LINES
                        ),
                    );
                    n += 1;
                }
            }
        }

        tracing::info!("Found {} configuration blocks", blocks.len());
        blocks
    }

    fn apply_print_temperatures(
        &self,
        configs: &mut ToolConfigurations,
        report: &mut ProcessReport,
    ) -> Result<()> {
        let configured = configs.configured_tools();
        if configured.is_empty() {
            return Ok(());
        }

        let Some(table) = find_temperature_table(self.doc.text()) else {
            return Err(EngineError::MissingTemperatureTable {
                tools: format_tool_list(&configured),
            });
        };
        tracing::debug!("Print temps are: {:?}", table);

        for tool in configured {
            let print_temp = match table.get(tool.index()) {
                Some(Some(value)) => {
                    let clamped = TEMPERATURE_RANGE.clamp(*value);
                    if let Some(correction) = clamped.correction {
                        report.notice(
                            NoticeKind::RangeCorrection,
                            Some(tool),
                            None,
                            correction_message("print_temp", *value, clamped.value, correction),
                        );
                    }
                    Some(clamped.value)
                }
                Some(None) => {
                    report.notice(
                        NoticeKind::DefaultedField,
                        Some(tool),
                        None,
                        "print_temp in the temperature table is not a number; left undefined",
                    );
                    None
                }
                None => {
                    report.notice(
                        NoticeKind::DefaultedField,
                        Some(tool),
                        None,
                        "temperature table has no entry for this tool; print_temp left undefined",
                    );
                    None
                }
            };
            configs.get_mut(tool).print_temp = print_temp;
        }
        Ok(())
    }

    fn apply_auto_distance(
        &self,
        configs: &mut ToolConfigurations,
        vars: &SlicerVariables,
        report: &mut ProcessReport,
    ) {
        let auto = match vars.auto_insertion_distance(self.tuning_offset) {
            Some(raw) => {
                let clamped = DISTANCE_RANGE.clamp(raw);
                if let Some(correction) = clamped.correction {
                    report.notice(
                        NoticeKind::RangeCorrection,
                        None,
                        None,
                        correction_message("auto insertion_distance", raw, clamped.value, correction),
                    );
                }
                tracing::info!(
                    "Based on the data in this gcode file, the suggested insertion distance is {:.1}",
                    clamped.value
                );
                Some(clamped.value)
            }
            None => {
                for name in [COOLING_TUBE_RETRACTION, COOLING_TUBE_LENGTH] {
                    if vars.get(name).is_none() {
                        report.notice(
                            NoticeKind::MissingSlicerVariable,
                            None,
                            None,
                            format!("'{}' not found; auto insertion distance unavailable", name),
                        );
                    }
                }
                None
            }
        };
        configs.auto_insertion_distance = auto;
        report.auto_insertion_distance = auto;

        let auto_tools: Vec<ToolId> = configs
            .configured()
            .filter(|c| c.insertion_distance == InsertionDistance::Auto)
            .map(|c| c.tool)
            .collect();
        for tool in auto_tools {
            let resolved = match auto {
                Some(distance) => distance,
                None => {
                    report.notice(
                        NoticeKind::DefaultedField,
                        Some(tool),
                        None,
                        "insertion_distance is auto but slicer geometry is missing; dips disabled",
                    );
                    0.0
                }
            };
            configs.get_mut(tool).insertion_distance = InsertionDistance::Fixed(resolved);
        }
    }
}

fn is_config_end(content: &str) -> bool {
    let Some(rest) = content.strip_prefix(';') else {
        return false;
    };
    if rest.starts_with(CONFIG_END_MARKER) {
        return true;
    }
    let mut chars = rest.chars();
    chars.next().is_some() && chars.as_str().starts_with(CONFIG_END_MARKER)
}

fn field_patterns() -> &'static [(Field, Regex)] {
    static PATTERNS: OnceLock<Vec<(Field, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Field::ALL
            .iter()
            .map(|&field| {
                let pattern = format!(
                    r"(?m)^;.*?\b{}(?:[ \t]*[=:][ \t]*|[ \t]+)(\S[^\r\n]*?)[ \t]*\r?$",
                    field.key()
                );
                (field, Regex::new(&pattern).expect("invalid regex pattern"))
            })
            .collect()
    })
}

/// Pull every recognised field out of one block
fn extract_block(tool: ToolId, block: &RawBlock<'_>, report: &mut ProcessReport) -> ToolConfiguration {
    let mut config = ToolConfiguration::unconfigured(tool);
    config.block_line = Some(block.line);

    for (field, re) in field_patterns() {
        let value = re
            .captures(block.body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim());
        let Some(value) = value else {
            report.notice(
                NoticeKind::DefaultedField,
                Some(tool),
                Some(block.line),
                format!("{} not set; using default", field),
            );
            continue;
        };
        if !apply_field(&mut config, *field, value, block.line, report) {
            report.notice(
                NoticeKind::DefaultedField,
                Some(tool),
                Some(block.line),
                format!("{} value '{}' is not valid; using default", field, value),
            );
        }
    }
    config
}

/// Set one field, clamping numeric values; `false` when the value does not parse
fn apply_field(
    config: &mut ToolConfiguration,
    field: Field,
    value: &str,
    line: usize,
    report: &mut ProcessReport,
) -> bool {
    let tool = config.tool;
    let mut clamp = |raw: f64, range: SafeRange| -> f64 {
        let clamped = range.clamp(raw);
        if let Some(correction) = clamped.correction {
            report.notice(
                NoticeKind::RangeCorrection,
                Some(tool),
                Some(line),
                correction_message(field.key(), raw, clamped.value, correction),
            );
        }
        clamped.value
    };

    match field {
        Field::MaterialType => config.material_type = value.to_string(),
        Field::MaterialName => config.material_name = value.to_string(),
        Field::InsertionDistance => match InsertionDistance::parse(value) {
            Some(InsertionDistance::Fixed(raw)) => {
                config.insertion_distance = InsertionDistance::Fixed(clamp(raw, DISTANCE_RANGE));
            }
            Some(InsertionDistance::Auto) => config.insertion_distance = InsertionDistance::Auto,
            None => return false,
        },
        Field::ToolchangeTemp => match ToolchangeTemp::parse(value) {
            Some(ToolchangeTemp::Degrees(raw)) => {
                config.toolchange_temp = ToolchangeTemp::Degrees(clamp(raw, TEMPERATURE_RANGE));
            }
            Some(ToolchangeTemp::Off) => config.toolchange_temp = ToolchangeTemp::Off,
            None => return false,
        },
        Field::InsertionSpeed
        | Field::ExtractionSpeed
        | Field::InsertionPause
        | Field::RemovalPause => {
            let (Some(raw), Some(range)) = (parse_number(value), field.range()) else {
                return false;
            };
            let clamped = clamp(raw, range);
            match field {
                Field::InsertionSpeed => config.insertion_speed = clamped,
                Field::ExtractionSpeed => config.extraction_speed = clamped,
                Field::InsertionPause => config.insertion_pause = clamped,
                _ => config.removal_pause = clamped,
            }
        }
        Field::BeepOnDip | Field::BeepOnTemp => {
            let Some(flag) = parse_flag(value) else {
                return false;
            };
            if field == Field::BeepOnDip {
                config.beep_on_dip = flag;
            } else {
                config.beep_on_temp = flag;
            }
        }
    }
    true
}

fn correction_message(key: &str, raw: f64, applied: f64, correction: Correction) -> String {
    match correction {
        Correction::RaisedToLow => format!("{} {} below minimum; enforced {}", key, raw, applied),
        Correction::LoweredToHigh => format!("{} {} above maximum; enforced {}", key, raw, applied),
    }
}

/// Parse the slicer's `; temperature = a,b,c,d,e` line
///
/// Entries that are not numbers come back as `None`.
pub fn find_temperature_table(text: &str) -> Option<Vec<Option<f64>>> {
    static TABLE: OnceLock<Regex> = OnceLock::new();
    let re = TABLE.get_or_init(|| {
        Regex::new(r"(?m)^;[ \t]*temperature[ \t]*=[ \t]*([^\r\n]*)").expect("invalid regex pattern")
    });
    let values = re.captures(text)?.get(1)?.as_str();
    let table: Vec<Option<f64>> = values.split(',').map(parse_number).collect();
    if table.len() > TOOL_COUNT as usize {
        tracing::debug!("Temperature table lists {} extruders", table.len());
    }
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn t(index: u8) -> ToolId {
        ToolId::new(index).unwrap()
    }

    fn resolve(text: &str, vars: &SlicerVariables) -> (Result<ToolConfigurations>, ProcessReport) {
        let doc = Document::new(text);
        let tokens = tokenize(&doc);
        let mut report = ProcessReport::new();
        let index = ToolChangeIndex::build(&doc, &tokens, &mut report);
        let result = ConfigResolver::new(&doc, &index, -2.0).resolve(vars, &mut report);
        (result, report)
    }

    fn geometry() -> SlicerVariables {
        SlicerVariables::new()
            .with(COOLING_TUBE_RETRACTION, 30.0)
            .with(COOLING_TUBE_LENGTH, 10.0)
    }

    const TABLE: &str = "; temperature = 215,240,200,210,250\n";

    #[test]
    fn test_block_belongs_to_preceding_tool() {
        let text = format!(
            "T1\nM900 K0\n; SKINNYDIP CONFIGURATION START\n; material_type PETG\n; material_name Prusament Orange\n; insertion_distance 31\n; insertion_speed 2000\n; extraction_speed 4000\n; toolchange_temp 200\n; beep_on_dip 1\n; SKINNYDIP CONFIGURATION END\n{}",
            TABLE
        );
        let (configs, report) = resolve(&text, &geometry());
        let configs = configs.unwrap();
        let c = configs.get(t(1));
        assert!(c.is_configured());
        assert_eq!(c.material_type, "PETG");
        assert_eq!(c.material_name, "Prusament Orange");
        assert_eq!(c.insertion_distance, InsertionDistance::Fixed(31.0));
        assert_eq!(c.insertion_speed, 2000.0);
        assert_eq!(c.extraction_speed, 4000.0);
        assert_eq!(c.toolchange_temp, ToolchangeTemp::Degrees(200.0));
        assert_eq!(c.print_temp, Some(240.0));
        assert!(c.beep_on_dip);
        assert!(!c.beep_on_temp);
        assert!(!configs.get(t(0)).is_configured());
        assert_eq!(report.configured_tools, vec![t(1)]);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let text = format!(
            "T0\n; SKINNYDIP CONFIGURATION START\n; insertion_distance 75\n; insertion_speed 100\n; extraction_speed 20000\n; insertion_pause 500\n; toolchange_temp 320\n; SKINNYDIP CONFIGURATION END\n{}",
            TABLE
        );
        let (configs, report) = resolve(&text, &geometry());
        let configs = configs.unwrap();
        let c = configs.get(t(0));
        assert_eq!(c.insertion_distance, InsertionDistance::Fixed(60.0));
        assert_eq!(c.insertion_speed, 300.0);
        assert_eq!(c.extraction_speed, 10000.0);
        assert_eq!(c.insertion_pause, 500.0);
        assert_eq!(c.toolchange_temp, ToolchangeTemp::Degrees(295.0));
        assert_eq!(report.notices_of(NoticeKind::RangeCorrection).count(), 4);
    }

    #[test]
    fn test_defaults_and_auto_distance() {
        let text = format!(
            "T0\n; SKINNYDIP CONFIGURATION START\n; insertion_distance AUTO\n; toolchange_temp off\n; SKINNYDIP CONFIGURATION END\n{}",
            TABLE
        );
        let (configs, report) = resolve(&text, &geometry());
        let configs = configs.unwrap();
        let c = configs.get(t(0));
        assert_eq!(c.insertion_distance, InsertionDistance::Fixed(33.0));
        assert_eq!(c.toolchange_temp, ToolchangeTemp::Off);
        assert_eq!(c.insertion_speed, 0.0);
        assert_eq!(c.material_name, "not configured");
        assert_eq!(configs.auto_insertion_distance, Some(33.0));
        assert_eq!(report.auto_insertion_distance, Some(33.0));
        assert!(report.notices_of(NoticeKind::DefaultedField).count() >= 6);
    }

    #[test]
    fn test_auto_without_geometry_disables_dips() {
        let text = format!(
            "T0\n; SKINNYDIP CONFIGURATION START\n; insertion_distance auto\n; SKINNYDIP CONFIGURATION END\n{}",
            TABLE
        );
        let (configs, report) = resolve(&text, &SlicerVariables::new());
        let configs = configs.unwrap();
        assert_eq!(
            configs.get(t(0)).insertion_distance,
            InsertionDistance::Fixed(0.0)
        );
        assert!(!configs.get(t(0)).has_insertion_move());
        assert_eq!(report.notices_of(NoticeKind::MissingSlicerVariable).count(), 2);
    }

    #[test]
    fn test_missing_temperature_table_is_fatal() {
        let text = "T0\n; SKINNYDIP CONFIGURATION START\n; insertion_distance 31\n; SKINNYDIP CONFIGURATION END\n";
        let (result, _) = resolve(text, &geometry());
        assert_eq!(
            result.unwrap_err(),
            EngineError::MissingTemperatureTable {
                tools: "[T0]".to_string()
            }
        );
    }

    #[test]
    fn test_no_configuration_needs_no_table() {
        let (result, report) = resolve("T0\nG1 X1\nT1\n", &geometry());
        let configs = result.unwrap();
        assert!(configs.configured_tools().is_empty());
        assert_eq!(report.notices_of(NoticeKind::MissingConfiguration).count(), 2);
    }

    #[test]
    fn test_unterminated_block_is_ignored() {
        let text = format!(
            "T0\n; SKINNYDIP CONFIGURATION START\n; insertion_distance 31\nG1 X1\n{}",
            TABLE
        );
        let (configs, report) = resolve(&text, &geometry());
        assert!(configs.unwrap().configured_tools().is_empty());
        assert_eq!(report.notices_of(NoticeKind::StructuralAnomaly).count(), 1);
    }

    #[test]
    fn test_first_block_wins() {
        let text = format!(
            "T0\n; SKINNYDIP CONFIGURATION START\n; insertion_distance 20\n; SKINNYDIP CONFIGURATION END\nG1 X1\n; SKINNYDIP CONFIGURATION START\n; insertion_distance 40\n;SKINNYDIP CONFIGURATION END\n{}",
            TABLE
        );
        let (configs, _) = resolve(&text, &geometry());
        assert_eq!(
            configs.unwrap().get(t(0)).insertion_distance,
            InsertionDistance::Fixed(20.0)
        );
    }

    #[test]
    fn test_temperature_table_parsing() {
        assert_eq!(
            find_temperature_table("; first_layer_temperature = 1,2\n; temperature = 215,abc\n"),
            Some(vec![Some(215.0), None])
        );
        assert_eq!(find_temperature_table("; bed_temperature = 60\n"), None);
    }

    #[test]
    fn test_config_end_variants() {
        assert!(is_config_end("; SKINNYDIP CONFIGURATION END"));
        assert!(is_config_end(";SKINNYDIP CONFIGURATION END"));
        assert!(!is_config_end(";  SKINNYDIP CONFIGURATION END"));
        assert!(!is_config_end("; SKINNYDIP CONFIGURATION START"));
    }
}
