//! Tool identifiers
//!
//! The MMU2 feeds up to five filaments, addressed in G-code as `T0`..`T4`.

use serde::{Deserialize, Serialize};

/// Number of filament-feeding units the engine recognises
pub const TOOL_COUNT: u8 = 5;

/// One of the five filament-feeding units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ToolId(u8);

impl ToolId {
    /// Create a tool id, `None` when outside `0..TOOL_COUNT`
    pub fn new(index: u8) -> Option<Self> {
        (index < TOOL_COUNT).then_some(Self(index))
    }

    /// All recognised tools in ascending order
    pub fn all() -> impl Iterator<Item = ToolId> {
        (0..TOOL_COUNT).map(Self)
    }

    /// Zero-based index (also the column in the slicer temperature table)
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Parse a bare activation token such as `T3`
    ///
    /// The token must be exactly `T` followed by one valid digit.
    pub fn parse_token(token: &str) -> Option<Self> {
        let digits = token.strip_prefix('T')?;
        if digits.len() != 1 {
            return None;
        }
        let index = digits.parse::<u8>().ok()?;
        Self::new(index)
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// What a toolchange event switches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// A regular toolchange to the given tool
    Tool(ToolId),
    /// The final unload at the end of the print
    End,
}

impl Activation {
    /// The tool loaded by this event, `None` for the final unload
    pub fn tool(self) -> Option<ToolId> {
        match self {
            Self::Tool(tool) => Some(tool),
            Self::End => None,
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool(tool) => write!(f, "{}", tool),
            Self::End => write!(f, "end"),
        }
    }
}

/// Render a list of tools as `[T0, T2]`
pub fn format_tool_list(tools: &[ToolId]) -> String {
    let names: Vec<String> = tools.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}
