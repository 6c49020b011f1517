//! Line tokens
//!
//! The scanners never look at raw text. Each line is classified once into a
//! [`LineToken`] and the structural windows are matched over that stream.

use crate::document::Document;
use crate::tool::ToolId;

/// Marker the slicer writes where the wipe tower begins unloading
pub const TOOLCHANGE_UNLOAD_MARKER: &str = "; CP TOOLCHANGE UNLOAD";

/// Classification of one G-code line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineToken {
    /// `G1 E-...` filament retraction
    Retract,
    /// `G1 E...` with a non-negative extrusion
    Extrude,
    /// `G1 <x>...` where `<x>` is not `E`
    Move,
    /// Bare `G1` or any other `G1...` form
    OtherG1,
    /// `G4 S0` exactly
    DwellZero,
    /// `M73` progress report
    Progress,
    /// `M104 S...` set hotend temperature
    SetTemperature,
    /// `M220 B` speed factor backup
    SpeedBackup,
    /// `M220 S<digit>...` speed factor override
    SpeedOverride,
    /// `M220 R` speed factor restore
    SpeedRestore,
    /// Any other line starting with `M`
    OtherM,
    /// Line consisting solely of a recognised tool id
    ToolSelect(ToolId),
    /// Line starting with `T<digit>` that is not a bare activation
    ToolLike,
    /// `; CP TOOLCHANGE UNLOAD`
    UnloadMarker,
    /// Anything else
    Other,
}

impl LineToken {
    /// Classify a line (content without terminator)
    pub fn classify(content: &str) -> Self {
        let content = content.strip_suffix('\r').unwrap_or(content);

        if let Some(rest) = content.strip_prefix("G1") {
            return match rest.as_bytes() {
                [b' ', b'E', b'-', ..] => Self::Retract,
                [b' ', b'E', ..] => Self::Extrude,
                [b' ', c, ..] if *c != b'E' => Self::Move,
                _ => Self::OtherG1,
            };
        }
        if content == "G4 S0" {
            return Self::DwellZero;
        }
        if content.starts_with('M') {
            return Self::classify_m(content);
        }
        if content.starts_with('T') {
            if let Some(tool) = ToolId::parse_token(content) {
                return Self::ToolSelect(tool);
            }
            if content[1..].starts_with(|c: char| c.is_ascii_digit()) {
                return Self::ToolLike;
            }
            return Self::Other;
        }
        if content.starts_with(TOOLCHANGE_UNLOAD_MARKER) {
            return Self::UnloadMarker;
        }
        Self::Other
    }

    fn classify_m(content: &str) -> Self {
        if content.starts_with("M73") {
            Self::Progress
        } else if content.starts_with("M104 S") {
            Self::SetTemperature
        } else if content.starts_with("M220 B") {
            Self::SpeedBackup
        } else if content
            .strip_prefix("M220 S")
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        {
            Self::SpeedOverride
        } else if content.starts_with("M220 R") {
            Self::SpeedRestore
        } else {
            Self::OtherM
        }
    }

    /// Retraction or progress line, the filler of a ramming/unload run
    pub fn is_unload_filler(self) -> bool {
        matches!(self, Self::Retract | Self::Progress)
    }

    /// Any `G1 E...` line
    pub fn is_extrusion(self) -> bool {
        matches!(self, Self::Retract | Self::Extrude)
    }

    /// Any `G1...` line
    pub fn is_g1(self) -> bool {
        matches!(
            self,
            Self::Retract | Self::Extrude | Self::Move | Self::OtherG1
        )
    }

    /// Any `M...` line
    pub fn is_m_command(self) -> bool {
        matches!(
            self,
            Self::Progress
                | Self::SetTemperature
                | Self::SpeedBackup
                | Self::SpeedOverride
                | Self::SpeedRestore
                | Self::OtherM
        )
    }

    /// Line that starts with `T<digit>`
    pub fn is_tool_like(self) -> bool {
        matches!(self, Self::ToolSelect(_) | Self::ToolLike)
    }
}

/// Classify every line of `doc`, indexed by line number
pub fn tokenize(doc: &Document<'_>) -> Vec<LineToken> {
    doc.lines().map(|line| LineToken::classify(line.content)).collect()
}
