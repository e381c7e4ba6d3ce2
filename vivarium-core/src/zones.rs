//! Zones — named rectangles constraining motion and plan destinations.
//!
//! The world map is a fixed set of rectangles in percent units. Wander
//! targets are constrained to the roam bounds (with projection as the
//! last resort); plan texts are mapped to one of the primary zones by
//! keyword-category scoring.

use rand::Rng;

/// A named axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    /// Stable machine name ("park").
    pub name: &'static str,
    /// Human-readable label ("the park").
    pub label: &'static str,
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl Zone {
    /// Whether the point lies inside this zone (edges inclusive).
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }

    /// Center of the rectangle.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// A uniformly random point strictly inside the zone, one unit off
    /// every edge.
    pub fn random_interior_point<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let x = rng.gen_range(self.x1 + 1.0..self.x2 - 1.0);
        let y = rng.gen_range(self.y1 + 1.0..self.y2 - 1.0);
        (x, y)
    }
}

/// All named zones of the world map.
pub const WORLD_ZONES: &[Zone] = &[
    Zone { name: "park",   label: "the park",           x1: 34.0, y1: 44.0, x2: 43.0, y2: 58.0 },
    Zone { name: "road",   label: "the road",           x1: 43.0, y1: 44.0, x2: 54.0, y2: 58.0 },
    Zone { name: "square", label: "the square",         x1: 54.0, y1: 44.0, x2: 68.0, y2: 58.0 },
    Zone { name: "north",  label: "the north district", x1: 34.0, y1: 44.0, x2: 68.0, y2: 50.0 },
    Zone { name: "south",  label: "the south district", x1: 34.0, y1: 52.0, x2: 68.0, y2: 66.0 },
];

/// The zones plans can target (scorable zones).
pub const PRIMARY_ZONE_NAMES: &[&str] = &["park", "road", "square"];

/// Rectangles points are allowed to roam in.
pub const ROAM_BOUNDS: &[(f64, f64, f64, f64)] = &[(34.0, 44.0, 68.0, 66.0)];

/// The primary zone containing the point, if any.
#[must_use]
pub fn zone_at(x: f64, y: f64) -> Option<&'static Zone> {
    primary_zones().find(|z| z.contains(x, y))
}

/// Human-readable label for the point's location.
#[must_use]
pub fn zone_label(x: f64, y: f64) -> &'static str {
    zone_at(x, y).map_or("open ground", |z| z.label)
}

/// Look up a primary zone by machine name.
#[must_use]
pub fn zone_by_name(name: &str) -> Option<&'static Zone> {
    primary_zones().find(|z| z.name == name)
}

fn primary_zones() -> impl Iterator<Item = &'static Zone> {
    WORLD_ZONES
        .iter()
        .filter(|z| PRIMARY_ZONE_NAMES.contains(&z.name))
}

/// Project a point onto the nearest roam rectangle.
#[must_use]
pub fn project_to_roam(x: f64, y: f64) -> (f64, f64) {
    let mut best = (x, y);
    let mut best_dist = f64::INFINITY;
    for &(x1, y1, x2, y2) in ROAM_BOUNDS {
        let cx = x.clamp(x1, x2);
        let cy = y.clamp(y1, y2);
        let dist = (cx - x).powi(2) + (cy - y).powi(2);
        if dist < best_dist {
            best_dist = dist;
            best = (cx, cy);
        }
    }
    best
}

/// Whether the point lies inside any roam rectangle.
#[must_use]
pub fn in_roam_bounds(x: f64, y: f64) -> bool {
    ROAM_BOUNDS
        .iter()
        .any(|&(x1, y1, x2, y2)| x1 <= x && x <= x2 && y1 <= y && y <= y2)
}

/// Pick a wander target at `radius` around `(x, y)` inside the roam
/// bounds. Rejection-samples up to 16 angles, then projects a final
/// candidate onto the bounds.
pub fn random_target_around<R: Rng + ?Sized>(
    x: f64,
    y: f64,
    radius: f64,
    rng: &mut R,
) -> (f64, f64) {
    for _ in 0..16 {
        let angle = rng.gen_range(0.0..std::f64::consts::TAU);
        let tx = x + radius * angle.cos();
        let ty = y + radius * angle.sin();
        if in_roam_bounds(tx, ty) {
            return (tx, ty);
        }
    }
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
    project_to_roam(x + radius * angle.cos(), y + radius * angle.sin())
}

// ---------------------------------------------------------------------------
// Plan → zone mapping
// ---------------------------------------------------------------------------

const PARK_WORDS: &[&str] = &[
    "park", "tree", "walk", "nature", "rest", "bench", "garden", "quiet", "green",
];
const SQUARE_WORDS: &[&str] = &[
    "square", "market", "people", "crowd", "meet", "talk", "plaza", "gather", "trade",
];
const ROAD_WORDS: &[&str] = &[
    "road", "travel", "move", "patrol", "route", "path", "street", "shelter", "go",
];

fn score_category(text: &str, words: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    words.iter().filter(|w| lowered.contains(*w)).count()
}

/// Map a plan text to its destination zone.
///
/// Each primary zone has a keyword vocabulary; the highest-scoring zone
/// wins. A tie for the top score — or no hit at all — resolves to a
/// uniformly random primary zone.
pub fn zone_for_plan<R: Rng + ?Sized>(plan: &str, rng: &mut R) -> &'static Zone {
    let scores = [
        ("park", score_category(plan, PARK_WORDS)),
        ("square", score_category(plan, SQUARE_WORDS)),
        ("road", score_category(plan, ROAD_WORDS)),
    ];

    let top = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    let tied = scores.iter().filter(|(_, s)| *s == top).count();

    let name = if top == 0 || tied > 1 {
        PRIMARY_ZONE_NAMES[rng.gen_range(0..PRIMARY_ZONE_NAMES.len())]
    } else {
        scores
            .iter()
            .find(|(_, s)| *s == top)
            .map_or(PRIMARY_ZONE_NAMES[0], |&(n, _)| n)
    };

    // The scorable names are a subset of WORLD_ZONES by construction.
    zone_by_name(name).unwrap_or(&WORLD_ZONES[0])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
