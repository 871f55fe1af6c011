//! Neighbour lookup in pixel space.
//!
//! The topology speaks in *fractions* of an edge (0.0 = top/left end,
//! 1.0 = bottom/right end) so that screens of different sizes can be linked.
//! The server speaks in pixels.  [`Navigator`] converts between the two and
//! works out where the cursor lands when it crosses an edge.
//!
//! # Canonical space walk (for beginners)
//!
//! A fast flick can carry the cursor further than the width of the screen next
//! door.  The walk subtracts each screen's width from the overshoot until the
//! remainder fits, so a 100 px wide screen between two large ones is skipped
//! when the cursor jumps 150 px past the edge:
//!
//! ```text
//!   ┌──────────┐┌─┐┌──────────┐
//!   │   desk   ││B││  laptop  │   desk x=1920+150 → B (100 px) → laptop x=50
//!   └──────────┘└─┘└──────────┘
//! ```

use edgeshare_core::{Direction, ScreenName, ScreenShape, Topology};
use tracing::trace;

/// Converts a pixel on `dir`'s edge of `shape` into a fraction of that edge.
pub fn map_to_fraction(shape: ScreenShape, dir: Direction, x: i32, y: i32) -> f32 {
    if dir.is_horizontal() {
        ((y - shape.y) as f32 + 0.5) / shape.height as f32
    } else {
        ((x - shape.x) as f32 + 0.5) / shape.width as f32
    }
}

/// Converts a fraction of `dir`'s edge back to a pixel on `shape`.
///
/// Only the coordinate along the edge changes.
pub fn map_to_pixel(shape: ScreenShape, dir: Direction, t: f32, x: i32, y: i32) -> (i32, i32) {
    if dir.is_horizontal() {
        (x, (t * shape.height as f32) as i32 + shape.y)
    } else {
        ((t * shape.width as f32) as i32 + shape.x, y)
    }
}

/// Read-only view of the layout used to resolve edge crossings.
///
/// `shape_of` returns the shape of a *connected* screen and `None` for screens
/// that are offline, which is how connectivity is decided.
pub struct Navigator<'a, F>
where
    F: Fn(&ScreenName) -> Option<ScreenShape>,
{
    topology: &'a Topology,
    primary: &'a ScreenName,
    jump_zone: i32,
    shape_of: F,
}

impl<'a, F> Navigator<'a, F>
where
    F: Fn(&ScreenName) -> Option<ScreenShape>,
{
    pub fn new(topology: &'a Topology, primary: &'a ScreenName, jump_zone: i32, shape_of: F) -> Self {
        Self {
            topology,
            primary,
            jump_zone,
            shape_of,
        }
    }

    /// The first connected screen on `dir` of `src` at `(x, y)`, with the
    /// position mapped onto its facing edge.
    pub fn neighbor(
        &self,
        src: &ScreenName,
        dir: Direction,
        x: i32,
        y: i32,
    ) -> Option<(ScreenName, i32, i32)> {
        let src_shape = (self.shape_of)(src)?;
        let t = map_to_fraction(src_shape, dir, x, y);
        let (dst, t) = self
            .topology
            .resolve_neighbor(src, dir, t, |name| (self.shape_of)(name).is_some())?;
        let dst_shape = (self.shape_of)(&dst)?;
        let (x, y) = map_to_pixel(dst_shape, dir, t, x, y);
        trace!(%dir, from = %src, to = %dst, "neighbor");
        Some((dst, x, y))
    }

    /// Where the cursor at `(x, y)`, just past `dir`'s edge of `src`, lands.
    ///
    /// Walks over screens too narrow to contain the overshoot and keeps the
    /// landing point out of the primary's jump zone.
    pub fn map_to_neighbor(
        &self,
        src: &ScreenName,
        dir: Direction,
        x: i32,
        y: i32,
    ) -> Option<(ScreenName, i32, i32)> {
        let (first, mut x, mut y) = self.neighbor(src, dir, x, y)?;
        let mut shape = (self.shape_of)(src)?;
        let mut last = src.clone();
        let mut candidate = Some(first);

        // Positions are made relative to each screen's origin while walking.
        match dir {
            Direction::Left => {
                x -= shape.x;
                while let Some(dst) = candidate.take() {
                    shape = (self.shape_of)(&dst)?;
                    last = dst;
                    x += shape.width;
                    if x >= 0 {
                        break;
                    }
                    trace!(screen = %last, "skipping over screen");
                    candidate = self.step(&last, dir, &mut x, &mut y);
                }
                x += shape.x;
            }
            Direction::Right => {
                x -= shape.x;
                while let Some(dst) = candidate.take() {
                    x -= shape.width;
                    shape = (self.shape_of)(&dst)?;
                    last = dst;
                    if x < shape.width {
                        break;
                    }
                    trace!(screen = %last, "skipping over screen");
                    candidate = self.step(&last, dir, &mut x, &mut y);
                }
                x += shape.x;
            }
            Direction::Top => {
                y -= shape.y;
                while let Some(dst) = candidate.take() {
                    shape = (self.shape_of)(&dst)?;
                    last = dst;
                    y += shape.height;
                    if y >= 0 {
                        break;
                    }
                    trace!(screen = %last, "skipping over screen");
                    candidate = self.step(&last, dir, &mut x, &mut y);
                }
                y += shape.y;
            }
            Direction::Bottom => {
                y -= shape.y;
                while let Some(dst) = candidate.take() {
                    y -= shape.height;
                    shape = (self.shape_of)(&dst)?;
                    last = dst;
                    if y < shape.height {
                        break;
                    }
                    trace!(screen = %last, "skipping over screen");
                    candidate = self.step(&last, dir, &mut x, &mut y);
                }
                y += shape.y;
            }
        }

        let (x, y) = self.avoid_jump_zone(&last, dir, x, y);
        Some((last, x, y))
    }

    /// Moves a position entering the primary inward past its jump zone, so
    /// the cursor does not bounce straight back.  Sides without a neighbour
    /// cannot trigger a jump and are left alone.
    pub fn avoid_jump_zone(&self, dst: &ScreenName, dir: Direction, x: i32, y: i32) -> (i32, i32) {
        if dst != self.primary {
            return (x, y);
        }
        let Some(shape) = (self.shape_of)(dst) else {
            return (x, y);
        };
        let t = map_to_fraction(shape, dir, x, y);
        if self.topology.neighbor(dst, dir.opposite(), t).is_none() {
            return (x, y);
        }
        let z = self.jump_zone;
        match dir {
            Direction::Left => (x.min(shape.right() - 1 - z), y),
            Direction::Right => (x.max(shape.x + z), y),
            Direction::Top => (x, y.min(shape.bottom() - 1 - z)),
            Direction::Bottom => (x, y.max(shape.y + z)),
        }
    }

    fn step(&self, from: &ScreenName, dir: Direction, x: &mut i32, y: &mut i32) -> Option<ScreenName> {
        let (next, nx, ny) = self.neighbor(from, dir, *x, *y)?;
        *x = nx;
        *y = ny;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use edgeshare_core::Interval;

    use super::*;

    fn name(s: &str) -> ScreenName {
        ScreenName::from(s)
    }

    /// desk (1920x1080) ⇄ laptop (1280x800), full edges both ways.
    fn desk_and_laptop() -> Topology {
        let mut t = Topology::new();
        t.add_screen("desk").unwrap();
        t.add_screen("laptop").unwrap();
        t.link("desk", Direction::Right, Interval::FULL, "laptop", Interval::FULL)
            .unwrap();
        t.link("laptop", Direction::Left, Interval::FULL, "desk", Interval::FULL)
            .unwrap();
        t
    }

    fn shapes(entries: &[(&str, ScreenShape)]) -> HashMap<ScreenName, ScreenShape> {
        entries.iter().map(|(n, s)| (name(n), *s)).collect()
    }

    // ── Fraction mapping ─────────────────────────────────────────────────────

    #[test]
    fn test_fraction_uses_pixel_center() {
        let shape = ScreenShape::new(0, 0, 1920, 1080);

        let t = map_to_fraction(shape, Direction::Right, 1919, 0);

        assert!((t - 0.5 / 1080.0).abs() < 1e-6);
    }

    #[test]
    fn test_fraction_accounts_for_origin() {
        let shape = ScreenShape::new(-100, 200, 400, 100);

        assert!((map_to_fraction(shape, Direction::Top, 100, 200) - 200.5 / 400.0).abs() < 1e-6);
        assert!((map_to_fraction(shape, Direction::Left, -100, 250) - 50.5 / 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_changes_only_the_edge_coordinate() {
        let shape = ScreenShape::new(0, 100, 1280, 800);

        assert_eq!(map_to_pixel(shape, Direction::Right, 0.5, 1920, 0), (1920, 500));
        assert_eq!(map_to_pixel(shape, Direction::Bottom, 0.25, 7, 9), (320, 9));
    }

    // ── Neighbour walk ───────────────────────────────────────────────────────

    #[test]
    fn test_crossing_right_edge_lands_on_left_of_neighbor() {
        // Arrange
        let topology = desk_and_laptop();
        let desk = name("desk");
        let shapes = shapes(&[
            ("desk", ScreenShape::new(0, 0, 1920, 1080)),
            ("laptop", ScreenShape::new(0, 0, 1280, 800)),
        ]);
        let nav = Navigator::new(&topology, &desk, 1, |n| shapes.get(n).copied());

        // Act: cursor one pixel past the jump zone on the right edge
        let landed = nav.map_to_neighbor(&desk, Direction::Right, 1920, 540);

        // Assert
        assert_eq!(landed, Some((name("laptop"), 0, 400)));
    }

    #[test]
    fn test_offline_neighbor_yields_none() {
        let topology = desk_and_laptop();
        let desk = name("desk");
        let shapes = shapes(&[("desk", ScreenShape::new(0, 0, 1920, 1080))]);
        let nav = Navigator::new(&topology, &desk, 1, |n| shapes.get(n).copied());

        assert_eq!(nav.map_to_neighbor(&desk, Direction::Right, 1920, 540), None);
    }

    #[test]
    fn test_large_overshoot_skips_narrow_screen() {
        // Arrange: desk → strip (100 px) → laptop
        let mut topology = Topology::new();
        for n in ["desk", "strip", "laptop"] {
            topology.add_screen(n).unwrap();
        }
        topology
            .link("desk", Direction::Right, Interval::FULL, "strip", Interval::FULL)
            .unwrap();
        topology
            .link("strip", Direction::Right, Interval::FULL, "laptop", Interval::FULL)
            .unwrap();
        let desk = name("desk");
        let shapes = shapes(&[
            ("desk", ScreenShape::new(0, 0, 1920, 1080)),
            ("strip", ScreenShape::new(0, 0, 100, 1080)),
            ("laptop", ScreenShape::new(0, 0, 1280, 1080)),
        ]);
        let nav = Navigator::new(&topology, &desk, 1, |n| shapes.get(n).copied());

        // Act
        let landed = nav.map_to_neighbor(&desk, Direction::Right, 1920 + 150, 540);

        // Assert
        assert_eq!(landed, Some((name("laptop"), 50, 540)));
    }

    #[test]
    fn test_entering_primary_avoids_jump_zone_when_far_side_is_linked() {
        // Arrange: laptop's left edge leads back to desk, whose right edge is linked
        let topology = desk_and_laptop();
        let desk = name("desk");
        let shapes = shapes(&[
            ("desk", ScreenShape::new(0, 0, 1920, 1080)),
            ("laptop", ScreenShape::new(0, 0, 1280, 800)),
        ]);
        let nav = Navigator::new(&topology, &desk, 5, |n| shapes.get(n).copied());

        // Act
        let landed = nav.map_to_neighbor(&name("laptop"), Direction::Left, -1, 400);

        // Assert: 1919 would sit inside desk's 5 px right-hand jump zone
        let (dst, x, y) = landed.unwrap();
        assert_eq!(dst, desk);
        assert_eq!(x, 1920 - 1 - 5);
        assert_eq!(y, 540);
    }

    #[test]
    fn test_avoid_jump_zone_ignores_unlinked_far_side() {
        // desk has no left neighbour, so entering from its right is left alone
        let topology = desk_and_laptop();
        let desk = name("desk");
        let shapes = shapes(&[("desk", ScreenShape::new(0, 0, 1920, 1080))]);
        let nav = Navigator::new(&topology, &desk, 5, |n| shapes.get(n).copied());

        assert_eq!(nav.avoid_jump_zone(&desk, Direction::Right, 0, 10), (0, 10));
    }

    #[test]
    fn test_avoid_jump_zone_only_applies_to_primary() {
        let topology = desk_and_laptop();
        let desk = name("desk");
        let shapes = shapes(&[("laptop", ScreenShape::new(0, 0, 1280, 800))]);
        let nav = Navigator::new(&topology, &desk, 5, |n| shapes.get(n).copied());

        assert_eq!(nav.avoid_jump_zone(&name("laptop"), Direction::Left, 1279, 10), (1279, 10));
    }
}
