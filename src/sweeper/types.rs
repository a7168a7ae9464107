//! Kinds and summaries used by the sweeper.

use std::collections::BTreeMap;
use std::fmt;

/// Kind of object the sweeper deletes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceKind {
    /// Instance server.
    Server,
    /// Machine image.
    Image,
    /// Instance snapshot.
    Snapshot,
    /// Block Storage snapshot.
    BlockSnapshot,
    /// Instance volume.
    Volume,
    /// Block Storage volume.
    BlockVolume,
    /// Flexible IP.
    Ip,
    /// Security group.
    SecurityGroup,
    /// Placement group.
    PlacementGroup,
}

impl ResourceKind {
    /// Deletion order: consumers before what they consume.
    pub const ORDER: &'static [Self] = &[
        Self::Server,
        Self::Image,
        Self::Snapshot,
        Self::BlockSnapshot,
        Self::Volume,
        Self::BlockVolume,
        Self::Ip,
        Self::SecurityGroup,
        Self::PlacementGroup,
    ];

    /// Plural label used in logs and summaries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Server => "servers",
            Self::Image => "images",
            Self::Snapshot => "snapshots",
            Self::BlockSnapshot => "block_snapshots",
            Self::Volume => "volumes",
            Self::BlockVolume => "block_volumes",
            Self::Ip => "ips",
            Self::SecurityGroup => "security_groups",
            Self::PlacementGroup => "placement_groups",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Number of objects deleted per kind.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    deleted: BTreeMap<ResourceKind, usize>,
}

impl SweepSummary {
    pub(super) fn record(&mut self, kind: ResourceKind, count: usize) {
        if count > 0 {
            let entry = self.deleted.entry(kind).or_default();
            *entry = entry.saturating_add(count);
        }
    }

    /// Objects of `kind` deleted.
    #[must_use]
    pub fn deleted(&self, kind: ResourceKind) -> usize {
        self.deleted.get(&kind).copied().unwrap_or_default()
    }

    /// Objects deleted overall.
    #[must_use]
    pub fn total(&self) -> usize {
        self.deleted.values().sum()
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in ResourceKind::ORDER {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "deleted_{kind}={}", self.deleted(*kind))?;
        }
        Ok(())
    }
}
