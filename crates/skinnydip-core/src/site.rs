//! Insertion sites and the merged position index

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::tool::ToolId;

/// Kind of generated block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    /// Retract/reinsert pair melting off a stringy tip
    ThreadDip,
    /// Wait for the toolchange temperature before unloading
    TemperatureWait,
    /// Restore the print temperature after unloading
    TemperatureRestore,
    /// Start dropping to the toolchange temperature early
    TemperaturePreStart,
}

impl SiteKind {
    /// Every kind, in header order
    pub const ALL: [SiteKind; 4] = [
        SiteKind::ThreadDip,
        SiteKind::TemperatureWait,
        SiteKind::TemperatureRestore,
        SiteKind::TemperaturePreStart,
    ];

    /// True for the three temperature kinds
    pub fn is_temperature(self) -> bool {
        !matches!(self, SiteKind::ThreadDip)
    }
}

impl std::fmt::Display for SiteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ThreadDip => write!(f, "thread dip"),
            Self::TemperatureWait => write!(f, "temperature wait"),
            Self::TemperatureRestore => write!(f, "temperature restore"),
            Self::TemperaturePreStart => write!(f, "temperature pre-drop"),
        }
    }
}

/// A location where a block will be spliced in
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionSite {
    /// Kind of block
    pub kind: SiteKind,
    /// Byte offset of the line the block precedes
    pub offset: usize,
    /// Zero-based line number of that line
    pub line: usize,
    /// Tool the block is generated for
    pub tool: ToolId,
    /// Generated text, `None` until compiled
    pub text: Option<String>,
}

impl InsertionSite {
    /// Uncompiled site
    pub fn new(kind: SiteKind, offset: usize, line: usize, tool: ToolId) -> Self {
        Self {
            kind,
            offset,
            line,
            tool,
            text: None,
        }
    }

    /// Lines the compiled block adds
    pub fn line_count(&self) -> usize {
        self.text.as_deref().map(|t| t.lines().count()).unwrap_or(0)
    }
}

/// Offset-keyed map of all accepted sites
///
/// Offsets are unique across every kind; a second site at an occupied
/// offset is a contract violation.
#[derive(Debug, Clone, Default)]
pub struct SiteMap {
    sites: BTreeMap<usize, InsertionSite>,
}

impl SiteMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a site, failing on an occupied offset
    pub fn insert(&mut self, site: InsertionSite) -> Result<()> {
        if let Some(existing) = self.sites.get(&site.offset) {
            return Err(EngineError::SiteCollision {
                offset: site.offset,
                line: site.line,
                existing: existing.kind,
                incoming: site.kind,
            });
        }
        self.sites.insert(site.offset, site);
        Ok(())
    }

    /// Merge several site lists
    pub fn merge<I>(lists: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<InsertionSite>>,
    {
        let mut map = Self::new();
        for list in lists {
            for site in list {
                map.insert(site)?;
            }
        }
        Ok(map)
    }

    /// Number of sites
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no site was accepted
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Site at `offset`
    pub fn get(&self, offset: usize) -> Option<&InsertionSite> {
        self.sites.get(&offset)
    }

    /// Sites in ascending offset order
    pub fn iter(&self) -> impl Iterator<Item = &InsertionSite> {
        self.sites.values()
    }

    /// Mutable sites in ascending offset order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InsertionSite> {
        self.sites.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> ToolId {
        ToolId::new(0).unwrap()
    }

    #[test]
    fn test_merge_orders_by_offset() {
        let dips = vec![InsertionSite::new(SiteKind::ThreadDip, 50, 5, t0())];
        let waits = vec![
            InsertionSite::new(SiteKind::TemperatureWait, 10, 1, t0()),
            InsertionSite::new(SiteKind::TemperatureWait, 90, 9, t0()),
        ];
        let map = SiteMap::merge([dips, waits]).unwrap();
        let offsets: Vec<usize> = map.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![10, 50, 90]);
    }

    #[test]
    fn test_collision_is_rejected() {
        let mut map = SiteMap::new();
        map.insert(InsertionSite::new(SiteKind::ThreadDip, 50, 5, t0()))
            .unwrap();
        let err = map
            .insert(InsertionSite::new(SiteKind::TemperatureRestore, 50, 5, t0()))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::SiteCollision {
                offset: 50,
                line: 5,
                existing: SiteKind::ThreadDip,
                incoming: SiteKind::TemperatureRestore,
            }
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_line_count_of_compiled_text() {
        let mut site = InsertionSite::new(SiteKind::TemperaturePreStart, 0, 0, t0());
        assert_eq!(site.line_count(), 0);
        site.text = Some("M104 S180\n".to_string());
        assert_eq!(site.line_count(), 1);
    }
}
