//! Regionating strategies.
//!
//! Regionation spreads a layer's features over the tile hierarchy so that
//! each tile carries at most a fixed number of them. Walking from the world
//! tile down, every level takes the highest-priority features whose centre
//! it owns and that no coarser tile has claimed yet.

use std::cmp::Ordering;
use std::collections::HashSet;

use kml_common::{Feature, Geometry, KmlError, KmlResult, MapLayer, Tile};
use tracing::debug;

use crate::source::{FeatureQuery, FeatureSource, SourceError};

pub const AUTO: &str = "auto";
pub const DEFAULT_STRATEGY: &str = "best_guess";

/// Orders features for regionation: higher priority lands in coarser tiles.
pub trait RegionatingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self, feature: &Feature) -> f64;
}

/// Biggest polygons first, then longest lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryStrategy;

impl RegionatingStrategy for GeometryStrategy {
    fn name(&self) -> &'static str {
        "geometry"
    }

    fn priority(&self, feature: &Feature) -> f64 {
        let area = feature.geometry.area();
        if area > 0.0 {
            area
        } else {
            feature.geometry.length()
        }
    }
}

/// A shuffled but repeatable order, keyed on the feature id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStrategy;

impl RegionatingStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn priority(&self, feature: &Feature) -> f64 {
        stable_hash(&feature.id) as f64 / u64::MAX as f64
    }
}

/// Geometry ordering for lines and polygons, random for points.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestGuessStrategy;

impl RegionatingStrategy for BestGuessStrategy {
    fn name(&self) -> &'static str {
        DEFAULT_STRATEGY
    }

    fn priority(&self, feature: &Feature) -> f64 {
        match feature.geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => RandomStrategy.priority(feature),
            _ => GeometryStrategy.priority(feature),
        }
    }
}

static GEOMETRY: GeometryStrategy = GeometryStrategy;
static RANDOM: RandomStrategy = RandomStrategy;
static BEST_GUESS: BestGuessStrategy = BestGuessStrategy;

pub fn strategy_by_name(name: &str) -> Option<&'static dyn RegionatingStrategy> {
    match name.trim().to_ascii_lowercase().as_str() {
        "geometry" => Some(&GEOMETRY),
        "random" => Some(&RANDOM),
        "best_guess" => Some(&BEST_GUESS),
        _ => None,
    }
}

/// Turn the requested strategy name into a strategy. `auto` picks the
/// layer's configured strategy, or best-guess when it has none.
pub fn resolve_strategy(
    requested: Option<&str>,
    layer: &MapLayer,
) -> KmlResult<Option<&'static dyn RegionatingStrategy>> {
    let Some(requested) = requested else {
        return Ok(None);
    };
    let name = if requested.eq_ignore_ascii_case(AUTO) {
        match layer.regionate_strategy.as_deref().filter(|s| !s.is_empty()) {
            Some(configured) => configured,
            None => {
                debug!(layer = %layer.id, "No regionating strategy configured, using best guess");
                DEFAULT_STRATEGY
            }
        }
    } else {
        requested
    };
    strategy_by_name(name)
        .map(Some)
        .ok_or_else(|| KmlError::UnknownRegionatingStrategy(name.to_string()))
}

/// Assigns features to tiles for one layer.
pub struct Regionator<'a> {
    pub strategy: &'a dyn RegionatingStrategy,
    /// Features per tile.
    pub limit: usize,
}

impl<'a> Regionator<'a> {
    pub fn new(strategy: &'a dyn RegionatingStrategy, limit: usize) -> Self {
        Self {
            strategy,
            limit: limit.max(1),
        }
    }

    /// Ids of the features that belong to `tile`.
    pub fn features_for_tile(
        &self,
        source: &dyn FeatureSource,
        query: &FeatureQuery,
        tile: &Tile,
    ) -> Result<HashSet<String>, SourceError> {
        let mut claimed: HashSet<String> = HashSet::new();
        for level in tile.ancestry() {
            let picked = self.pick(source, &query.with_bbox(level.envelope), &level, &claimed)?;
            if level.depth >= tile.depth {
                return Ok(picked.into_iter().collect());
            }
            claimed.extend(picked);
        }
        Ok(HashSet::new())
    }

    fn pick(
        &self,
        source: &dyn FeatureSource,
        query: &FeatureQuery,
        level: &Tile,
        claimed: &HashSet<String>,
    ) -> Result<Vec<String>, SourceError> {
        let mut candidates = Vec::new();
        for feature in source.features(query)? {
            let feature = feature?;
            if claimed.contains(&feature.id) {
                continue;
            }
            let Some((x, y)) = feature.geometry.envelope().centre() else {
                continue;
            };
            if level.owns_point(x, y) {
                candidates.push((self.strategy.priority(&feature), feature.id));
            }
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        candidates.truncate(self.limit);
        Ok(candidates.into_iter().map(|(_, id)| id).collect())
    }
}

/// 64-bit FNV-1a; stable across runs and platforms.
pub fn stable_hash(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    s.bytes()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
