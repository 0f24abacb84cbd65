//! Quad-tree tiling of the WGS84 world.
//!
//! Tiles are square in degrees: level `i` has a resolution of
//! `360 / (2^i * 256)` degrees per pixel, so a level-1 tile is 180x180 and the
//! world itself (360x180) is not a proper square tile. The world therefore
//! splits into west/east hemispheres and every tile below that splits into
//! four quadrants.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::envelope::WORLD_BOUNDS;
use crate::Envelope;

/// Number of precomputed zoom levels.
pub const LEVELS: usize = 100;

/// Tile size in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Deepest level used for alignment. Column and row indices stay exact in
/// f64 arithmetic down to here.
pub const MAX_ALIGNED_LEVEL: usize = 30;

/// Levels below the enclosing tile that are written inline. Deeper tiles are
/// left to network links.
pub const INLINE_LEVELS: usize = 4;

const EDGE_EPSILON: f64 = 1e-9;

static TILE_RESOLUTIONS: Lazy<[f64; LEVELS]> = Lazy::new(|| {
    let mut table = [0.0; LEVELS];
    for (i, r) in table.iter_mut().enumerate() {
        *r = WORLD_BOUNDS.width() / (2f64.powi(i as i32) * TILE_SIZE);
    }
    table
});

/// Degrees per pixel at a zoom level.
pub fn resolution(level: usize) -> f64 {
    TILE_RESOLUTIONS[level.min(LEVELS - 1)]
}

/// The deepest level whose resolution is still at least as fine as the one the
/// envelope needs at 256 pixels. Returns 0 when even level 1 is too fine.
pub fn find_zoom_level(extent: &Envelope) -> usize {
    let needed = (extent.width() / TILE_SIZE).max(extent.height() / TILE_SIZE);

    for i in 1..LEVELS {
        if needed > TILE_RESOLUTIONS[i] {
            return i - 1;
        }
    }
    LEVELS - 1
}

/// Expand an envelope to the smallest enclosing grid tile, or the world
/// bounds when no single tile encloses it.
pub fn expand_to_tile(extent: &Envelope) -> Envelope {
    if extent.is_null() {
        return WORLD_BOUNDS;
    }
    let mut i = find_zoom_level(extent).min(MAX_ALIGNED_LEVEL);

    while i > 0 {
        let tile_span = TILE_RESOLUTIONS[i] * TILE_SIZE;

        let lon0 = extent.min_x - WORLD_BOUNDS.min_x;
        let lon1 = extent.max_x - WORLD_BOUNDS.min_x;
        let col0 = (lon0 / tile_span).floor() as i64;
        let col1 = ((lon1 / tile_span) - EDGE_EPSILON).floor() as i64;

        let lat0 = extent.min_y - WORLD_BOUNDS.min_y;
        let lat1 = extent.max_y - WORLD_BOUNDS.min_y;
        let row0 = (lat0 / tile_span).floor() as i64;
        let row1 = ((lat1 / tile_span) - EDGE_EPSILON).floor() as i64;

        if col0 == col1 && row0 == row1 {
            let min_x = WORLD_BOUNDS.min_x + col0 as f64 * tile_span;
            let min_y = WORLD_BOUNDS.min_y + row0 as f64 * tile_span;
            return Envelope::new(min_x, min_y, min_x + tile_span, min_y + tile_span);
        }
        i -= 1;
    }

    WORLD_BOUNDS
}

/// Zoom level of an aligned tile envelope, derived from its width.
pub fn level_of(tile: &Envelope) -> usize {
    if tile.width() <= 0.0 || *tile == WORLD_BOUNDS {
        return 0;
    }
    let level = (WORLD_BOUNDS.width() / tile.width()).log2().round();
    (level.max(0.0) as usize).min(LEVELS - 1)
}

/// Level-of-detail thresholds for a KML Region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lod {
    pub min_lod_pixels: i32,
    /// -1 means unbounded.
    pub max_lod_pixels: i32,
}

impl Lod {
    pub const fn new(min_lod_pixels: i32, max_lod_pixels: i32) -> Self {
        Self {
            min_lod_pixels,
            max_lod_pixels,
        }
    }

    /// The hint given to every child tile.
    pub const fn child() -> Self {
        Self::new(128, -1)
    }
}

impl Default for Lod {
    fn default() -> Self {
        Self::child()
    }
}

/// An aligned tile with its depth in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub envelope: Envelope,
    /// Zoom level; doubles as the KML drawOrder.
    pub depth: usize,
    pub lod: Lod,
}

impl Tile {
    /// The tile enclosing an arbitrary envelope.
    pub fn enclosing(extent: &Envelope) -> Self {
        let envelope = expand_to_tile(extent);
        Self {
            envelope,
            depth: level_of(&envelope),
            lod: Lod::child(),
        }
    }

    pub fn world() -> Self {
        Self {
            envelope: WORLD_BOUNDS,
            depth: 0,
            lod: Lod::child(),
        }
    }

    pub fn is_world(&self) -> bool {
        self.envelope == WORLD_BOUNDS
    }

    pub fn draw_order(&self) -> i32 {
        self.depth as i32
    }

    /// Degrees per pixel when the tile is drawn at 256 pixels.
    pub fn resolution(&self) -> f64 {
        self.envelope.width().max(self.envelope.height()) / TILE_SIZE
    }

    /// Sub-tiles: west/east hemispheres for the world, NW/NE/SW/SE otherwise.
    pub fn children(&self) -> Vec<Tile> {
        let e = &self.envelope;
        let depth = self.depth + 1;
        let child = |min_x, min_y, max_x, max_y| Tile {
            envelope: Envelope::new(min_x, min_y, max_x, max_y),
            depth,
            lod: Lod::child(),
        };

        if self.is_world() {
            let mid_x = (e.min_x + e.max_x) / 2.0;
            return vec![
                child(e.min_x, e.min_y, mid_x, e.max_y),
                child(mid_x, e.min_y, e.max_x, e.max_y),
            ];
        }

        let mid_x = (e.min_x + e.max_x) / 2.0;
        let mid_y = (e.min_y + e.max_y) / 2.0;
        vec![
            child(e.min_x, mid_y, mid_x, e.max_y),
            child(mid_x, mid_y, e.max_x, e.max_y),
            child(e.min_x, e.min_y, mid_x, mid_y),
            child(mid_x, e.min_y, e.max_x, mid_y),
        ]
    }

    /// Whether the tile overlaps an extent by more than a shared edge. A
    /// degenerate extent touches the tiles it lies in.
    pub fn touches(&self, extent: &Envelope) -> bool {
        match self.envelope.intersection(extent) {
            Some(overlap) => {
                (overlap.width() > 0.0 || extent.width() <= 0.0)
                    && (overlap.height() > 0.0 || extent.height() <= 0.0)
            }
            None => false,
        }
    }

    /// Tiles from the world down to this one, inclusive.
    pub fn ancestry(&self) -> Vec<Tile> {
        let mut path = vec![*self];
        let mut current = *self;
        while !current.is_world() && current.depth > 0 {
            let parent = parent_of(&current);
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Whether a point belongs to this tile. The east and north edges are
    /// excluded except on the world boundary, so siblings never share a point.
    pub fn owns_point(&self, x: f64, y: f64) -> bool {
        let e = &self.envelope;
        let east_ok = x < e.max_x || (e.max_x >= WORLD_BOUNDS.max_x && x <= e.max_x);
        let north_ok = y < e.max_y || (e.max_y >= WORLD_BOUNDS.max_y && y <= e.max_y);
        x >= e.min_x && y >= e.min_y && east_ok && north_ok
    }
}

fn parent_of(tile: &Tile) -> Tile {
    if tile.depth <= 1 {
        return Tile::world();
    }
    let depth = tile.depth - 1;
    let span = resolution(depth) * TILE_SIZE;
    let col = ((tile.envelope.min_x - WORLD_BOUNDS.min_x) / span + EDGE_EPSILON).floor();
    let row = ((tile.envelope.min_y - WORLD_BOUNDS.min_y) / span + EDGE_EPSILON).floor();
    let min_x = WORLD_BOUNDS.min_x + col * span;
    let min_y = WORLD_BOUNDS.min_y + row * span;
    Tile {
        envelope: Envelope::new(min_x, min_y, min_x + span, min_y + span),
        depth,
        lod: Lod::child(),
    }
}

/// A tile and the sub-tree below it.
#[derive(Debug, Clone, PartialEq)]
pub struct TileNode {
    pub tile: Tile,
    pub children: Vec<TileNode>,
}

impl TileNode {
    pub fn leaf(tile: Tile) -> Self {
        Self {
            tile,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first, parent before children.
    pub fn tiles(&self) -> Vec<Tile> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<Tile>) {
        out.push(self.tile);
        for child in &self.children {
            child.collect(out);
        }
    }

    pub fn leaves(&self) -> Vec<Tile> {
        self.tiles_where(|n| n.is_leaf())
    }

    fn tiles_where<F: Fn(&TileNode) -> bool + Copy>(&self, pred: F) -> Vec<Tile> {
        let mut out = Vec::new();
        if pred(self) {
            out.push(self.tile);
        }
        for child in &self.children {
            out.extend(child.tiles_where(pred));
        }
        out
    }
}

/// Depth-bounded partitioning of envelopes into the tile hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    pub max_level: usize,
    /// Levels grown below the enclosing tile.
    pub inline_levels: usize,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new(20)
    }
}

impl TileGrid {
    pub fn new(max_level: usize) -> Self {
        Self {
            max_level: max_level.min(MAX_ALIGNED_LEVEL),
            inline_levels: INLINE_LEVELS,
        }
    }

    pub fn with_inline_levels(mut self, levels: usize) -> Self {
        self.inline_levels = levels;
        self
    }

    /// Build the tile tree under `expand_to_tile(envelope)`. Only tiles that
    /// touch the envelope are subdivided, until a tile's resolution reaches
    /// `target_resolution`, the inline depth or the maximum level. The other
    /// children of a subdivided tile are kept as leaves.
    pub fn partition(&self, envelope: &Envelope, target_resolution: f64) -> TileNode {
        let root = Tile::enclosing(envelope);
        let floor = root.depth + self.inline_levels;
        self.grow(root, envelope, target_resolution, floor)
    }

    fn grow(
        &self,
        tile: Tile,
        extent: &Envelope,
        target_resolution: f64,
        floor: usize,
    ) -> TileNode {
        let split = tile.depth < floor
            && tile.touches(extent)
            && self.should_split(&tile, target_resolution);
        if !split {
            return TileNode::leaf(tile);
        }
        let children = tile
            .children()
            .into_iter()
            .map(|c| self.grow(c, extent, target_resolution, floor))
            .collect();
        TileNode { tile, children }
    }

    fn should_split(&self, tile: &Tile, target_resolution: f64) -> bool {
        tile.depth < self.max_level
            && target_resolution.is_finite()
            && target_resolution > 0.0
            && tile.resolution() > target_resolution * (1.0 + EDGE_EPSILON)
    }

    pub fn is_leaf_level(&self, tile: &Tile) -> bool {
        tile.depth >= self.max_level
    }
}
