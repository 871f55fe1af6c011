//! Screen topology domain entity.
//!
//! The topology is the static description of where screens sit relative to
//! each other.  Unlike a pixel-based virtual desktop it is purely relational:
//! each side of a screen is split into fractional intervals of `[0, 1]`, and
//! each interval links to an interval on a neighbor's facing side.
//!
//! ```text
//!        0.0 ┌──────────┐            ┌──────────┐ 0.0
//!            │          │ ─────────► │          │
//!            │  desk    │  right     │  laptop  │
//!            │          │ [0,1)→[0,1)│          │
//!        1.0 └──────────┘            └──────────┘ 1.0
//! ```
//!
//! A position along the edge is expressed as a fraction `t` (0 = top/left end,
//! 1 = bottom/right end) so that screens of different resolutions map onto each
//! other proportionally.
//!
//! A `Topology` is built once, validated while it is built, and then replaced
//! wholesale on reconfiguration.  It is never patched while in use.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::domain::options::{OptionId, OptionSet};
use crate::domain::screen::{Direction, ScreenName};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can occur while building a topology.
#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    /// The name is empty or contains characters outside `[A-Za-z0-9._-]`.
    #[error("invalid screen name: {0:?}")]
    InvalidName(String),

    /// The name (or alias) is already used by another screen.
    #[error("screen name already in use: {0}")]
    DuplicateName(ScreenName),

    /// The referenced screen does not exist in the topology.
    #[error("unknown screen: {0}")]
    UnknownScreen(ScreenName),

    /// An interval is not a non-empty sub-range of `[0, 1]`.
    #[error("invalid interval [{start}, {end}]")]
    InvalidInterval { start: f32, end: f32 },

    /// The new link's source interval overlaps an existing, non-identical one.
    #[error("link on {side} of {screen} overlaps an existing link")]
    Overlap { screen: ScreenName, side: Direction },
}

// ── Interval ──────────────────────────────────────────────────────────────────

/// A half-open fraction range `[start, end)` along one side of a screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f32,
    pub end: f32,
}

impl Interval {
    /// The whole edge.
    pub const FULL: Interval = Interval {
        start: 0.0,
        end: 1.0,
    };

    /// Creates an interval, checking `0 <= start < end <= 1`.
    pub fn new(start: f32, end: f32) -> Result<Self, TopologyError> {
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start >= end {
            return Err(TopologyError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, t: f32) -> bool {
        t >= self.start && t < self.end
    }

    /// Maps `t` from this interval onto `[0, 1]`.
    pub fn transform(&self, t: f32) -> f32 {
        (t - self.start) / (self.end - self.start)
    }

    /// Maps `t` from `[0, 1]` back into this interval.
    pub fn inverse(&self, t: f32) -> f32 {
        t * (self.end - self.start) + self.start
    }

    /// Returns `true` if the two intervals share any point.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── EdgeLink ──────────────────────────────────────────────────────────────────

/// One link from an interval of a screen's side to an interval of a neighbor.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeLink {
    /// Part of the source side covered by this link.
    pub source: Interval,
    /// Canonical name of the neighbor.
    pub target: ScreenName,
    /// Part of the neighbor's facing side the source interval maps onto.
    pub target_interval: Interval,
}

impl EdgeLink {
    /// Maps a fraction on the source side to the matching fraction on the target side.
    pub fn map(&self, t: f32) -> f32 {
        self.target_interval.inverse(self.source.transform(t))
    }
}

// ── Topology ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Cell {
    /// Links per side, sorted by source interval start.
    links: BTreeMap<Direction, Vec<EdgeLink>>,
    options: OptionSet,
}

/// The full screen layout: screens, aliases, edge links, and option sets.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Canonical name → cell.
    cells: BTreeMap<ScreenName, Cell>,
    /// Every known name (canonical or alias) → canonical name.
    names: HashMap<ScreenName, ScreenName>,
    global: OptionSet,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ─────────────────────────────────────────────────────────

    /// Adds a screen with `name` as its canonical name.
    pub fn add_screen(&mut self, name: impl Into<ScreenName>) -> Result<(), TopologyError> {
        let name = self.check_new_name(name.into())?;
        self.names.insert(name.clone(), name.clone());
        self.cells.insert(name, Cell::default());
        Ok(())
    }

    /// Adds `alias` as another name for the existing screen `screen`.
    pub fn add_alias(
        &mut self,
        screen: impl Into<ScreenName>,
        alias: impl Into<ScreenName>,
    ) -> Result<(), TopologyError> {
        let canonical = self.require_canonical(&screen.into())?;
        let alias = self.check_new_name(alias.into())?;
        self.names.insert(alias, canonical);
        Ok(())
    }

    /// Links `source` of the `side` of `screen` to `target_interval` of `target`.
    ///
    /// A link whose source interval is identical to an existing one on the same
    /// side replaces it.  Any other overlap is rejected.
    pub fn link(
        &mut self,
        screen: impl Into<ScreenName>,
        side: Direction,
        source: Interval,
        target: impl Into<ScreenName>,
        target_interval: Interval,
    ) -> Result<(), TopologyError> {
        let screen = self.require_canonical(&screen.into())?;
        let target = self.require_canonical(&target.into())?;
        let source = Interval::new(source.start, source.end)?;
        let target_interval = Interval::new(target_interval.start, target_interval.end)?;

        let cell = self
            .cells
            .get_mut(&screen)
            .ok_or_else(|| TopologyError::UnknownScreen(screen.clone()))?;
        let links = cell.links.entry(side).or_default();

        if let Some(existing) = links.iter_mut().find(|l| l.source == source) {
            existing.target = target;
            existing.target_interval = target_interval;
            return Ok(());
        }
        if links.iter().any(|l| l.source.overlaps(&source)) {
            return Err(TopologyError::Overlap { screen, side });
        }

        let at = links.partition_point(|l| l.source.start < source.start);
        links.insert(
            at,
            EdgeLink {
                source,
                target,
                target_interval,
            },
        );
        Ok(())
    }

    /// Sets a per-screen option.
    pub fn set_option(
        &mut self,
        screen: impl Into<ScreenName>,
        id: OptionId,
        value: i32,
    ) -> Result<(), TopologyError> {
        let screen = self.require_canonical(&screen.into())?;
        if let Some(cell) = self.cells.get_mut(&screen) {
            cell.options.set(id, value);
        }
        Ok(())
    }

    pub fn global_options_mut(&mut self) -> &mut OptionSet {
        &mut self.global
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Returns `true` if `name` is a canonical name or an alias.
    pub fn is_screen(&self, name: &ScreenName) -> bool {
        self.names.contains_key(name)
    }

    /// Returns `true` if `name` is the canonical name of a screen, spelled in
    /// any case.
    pub fn is_canonical_name(&self, name: &ScreenName) -> bool {
        self.cells.contains_key(name)
    }

    /// Resolves a canonical name or alias to the canonical name.
    ///
    /// The returned name keeps the spelling used when the screen was added.
    pub fn canonical_name(&self, name: &ScreenName) -> Option<&ScreenName> {
        self.names.get(name)
    }

    /// Canonical names in sorted order.
    pub fn screens(&self) -> impl Iterator<Item = &ScreenName> {
        self.cells.keys()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Options set for one screen, or `None` for an unknown screen.
    pub fn options(&self, screen: &ScreenName) -> Option<&OptionSet> {
        let canonical = self.canonical_name(screen)?;
        self.cells.get(canonical).map(|c| &c.options)
    }

    pub fn global_options(&self) -> &OptionSet {
        &self.global
    }

    /// Links on one side of a screen, in source order.
    pub fn links(&self, screen: &ScreenName, side: Direction) -> &[EdgeLink] {
        self.canonical_name(screen)
            .and_then(|c| self.cells.get(c))
            .and_then(|cell| cell.links.get(&side))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns `true` if any link leaves `side` of `screen`.
    pub fn has_neighbor(&self, screen: &ScreenName, side: Direction) -> bool {
        !self.links(screen, side).is_empty()
    }

    /// Returns the direct neighbor at fraction `t` of `side`, and the mapped
    /// fraction on that neighbor.  Connectivity is not considered.
    pub fn neighbor(&self, screen: &ScreenName, side: Direction, t: f32) -> Option<(&ScreenName, f32)> {
        let link = self.links(screen, side).iter().find(|l| l.source.contains(t))?;
        let target = self.canonical_name(&link.target)?;
        Some((target, link.map(t)))
    }

    /// Finds the first connected screen on `side` of `screen` at fraction `t`.
    ///
    /// Screens for which `is_connected` returns `false` are walked over in the
    /// same direction, carrying the mapped fraction along.  The walk gives up
    /// after as many hops as there are screens so that a cycle of offline
    /// screens cannot loop forever.
    pub fn resolve_neighbor<F>(
        &self,
        screen: &ScreenName,
        side: Direction,
        t: f32,
        is_connected: F,
    ) -> Option<(ScreenName, f32)>
    where
        F: Fn(&ScreenName) -> bool,
    {
        let mut source = self.canonical_name(screen)?.clone();
        let mut t = t;
        for _ in 0..self.cells.len().max(1) {
            let (target, mapped) = self.neighbor(&source, side, t)?;
            if is_connected(target) {
                return Some((target.clone(), mapped));
            }
            tracing::trace!(skipped = %target, %side, "neighbor not connected");
            source = target.clone();
            t = mapped;
        }
        None
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn check_new_name(&self, name: ScreenName) -> Result<ScreenName, TopologyError> {
        if !name.is_valid() {
            return Err(TopologyError::InvalidName(name.as_str().to_string()));
        }
        if self.names.contains_key(&name) {
            return Err(TopologyError::DuplicateName(name));
        }
        Ok(name)
    }

    fn require_canonical(&self, name: &ScreenName) -> Result<ScreenName, TopologyError> {
        self.canonical_name(name)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownScreen(name.clone()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
