//! Domain entities for edgeshare.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the codebase.  Domain code has no imports from OS
//! APIs, network libraries or async runtimes, so it can be compiled and tested
//! anywhere.  Here it describes screens, the links between their edges, and
//! the option values that tune how the cursor moves between them.

/// Screen identity, geometry, and the small bitmask types used by switching.
pub mod screen;

/// Option identifiers and option sets (global and per screen).
pub mod options;

/// The screen topology: names, aliases, edge links, and neighbor lookup.
///
/// See [`topology::Topology`] for the main type.
pub mod topology;
