//! Placement allocator for the witness field.
//!
//! Assigns a coordinate in the normalized [0,100]×[0,100] field to a new
//! or contextually-linked witness, avoiding overlap with neighbors where
//! it can. The rules are deterministic; the output is not — position is
//! cosmetic and outside the consistency contract, so two clients placing
//! the same context-free witness independently may land it differently.
//! Only the originating client's position replicates.
//!
//! Priority order:
//! 1. Parent with a known position: probe eight compass offsets at a
//!    fixed radius, take the first that clears every neighbor by the
//!    configured separation, fall back to the first offset if none do.
//!    Overlap is tolerated; placement never blocks creation.
//! 2. Uncrowded field with neighbors: drift near a random neighbor at a
//!    randomized radius and angle.
//! 3. Otherwise: uniform random with a margin from the edges.

use rand::Rng;
use tracing::trace;
use vigil_core::{Position, VigilConfig};

/// Side length of the normalized field.
pub const FIELD_SIZE: f64 = 100.0;

/// Margin kept from the field edges by random placement.
pub const EDGE_MARGIN: f64 = 5.0;

/// Radius of the compass probe ring around a parent.
pub const CONTEXT_RADIUS: f64 = 8.0;

/// Neighbor count at which the field counts as crowded and near-neighbor
/// drift placement is skipped.
pub const CROWD_THRESHOLD: usize = 40;

/// The eight compass directions as unit vectors, probed clockwise from
/// north.
pub const COMPASS_DIRECTIONS: [(f64, f64); 8] = [
    (0.0, -1.0),                          // N
    (std::f64::consts::FRAC_1_SQRT_2, -std::f64::consts::FRAC_1_SQRT_2), // NE
    (1.0, 0.0),                           // E
    (std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2),  // SE
    (0.0, 1.0),                           // S
    (-std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2), // SW
    (-1.0, 0.0),                          // W
    (-std::f64::consts::FRAC_1_SQRT_2, -std::f64::consts::FRAC_1_SQRT_2), // NW
];

/// Clamp a coordinate into the field, keeping the edge margin.
fn clamp(value: f64) -> f64 {
    value.clamp(EDGE_MARGIN, FIELD_SIZE - EDGE_MARGIN)
}

/// Whether a candidate clears every neighbor by at least `separation`.
fn clears_neighbors(candidate: Position, neighbors: &[Position], separation: f64) -> bool {
    neighbors.iter().all(|n| candidate.distance(n) > separation)
}

/// Assign a position for a new witness.
///
/// `parent` is the position of the witness this one was created in
/// context of, if any; `neighbors` are the positions of everything
/// currently placed in the field.
pub fn assign_position<R: Rng + ?Sized>(
    parent: Option<Position>,
    neighbors: &[Position],
    config: &VigilConfig,
    rng: &mut R,
) -> Position {
    if let Some(parent) = parent {
        return place_near_parent(parent, neighbors, config.min_placement_distance);
    }

    if !neighbors.is_empty() && neighbors.len() < CROWD_THRESHOLD {
        return place_near_neighbor(neighbors, config.min_placement_distance, rng);
    }

    place_uniform(rng)
}

/// Rule 1: probe the compass ring around the parent.
fn place_near_parent(parent: Position, neighbors: &[Position], separation: f64) -> Position {
    let candidates = COMPASS_DIRECTIONS.map(|(dx, dy)| {
        Position::new(
            clamp(parent.x + dx * CONTEXT_RADIUS),
            clamp(parent.y + dy * CONTEXT_RADIUS),
        )
    });

    for candidate in candidates {
        if clears_neighbors(candidate, neighbors, separation) {
            trace!(x = candidate.x, y = candidate.y, "placed beside parent");
            return candidate;
        }
    }

    // Every direction is contested; overlap beats blocking creation.
    trace!("compass ring contested, overlapping first candidate");
    candidates[0]
}

/// Rule 2: drift near a randomly chosen neighbor.
fn place_near_neighbor<R: Rng + ?Sized>(
    neighbors: &[Position],
    separation: f64,
    rng: &mut R,
) -> Position {
    let anchor = neighbors[rng.gen_range(0..neighbors.len())];
    let radius = rng.gen_range(separation..separation + CONTEXT_RADIUS);
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
    Position::new(
        clamp(anchor.x + radius * angle.cos()),
        clamp(anchor.y + radius * angle.sin()),
    )
}

/// Rule 3: uniform random, away from the edges.
fn place_uniform<R: Rng + ?Sized>(rng: &mut R) -> Position {
    Position::new(
        rng.gen_range(EDGE_MARGIN..FIELD_SIZE - EDGE_MARGIN),
        rng.gen_range(EDGE_MARGIN..FIELD_SIZE - EDGE_MARGIN),
    )
}
