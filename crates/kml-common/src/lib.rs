//! Common types and utilities shared by the KML encoder and the KML service.

pub mod crs;
pub mod envelope;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod layer;
pub mod style;
pub mod tile;
pub mod time;

pub use crs::{Crs, CrsCode};
pub use envelope::{Envelope, WORLD_BOUNDS};
pub use error::{KmlError, KmlResult};
pub use feature::Feature;
pub use geometry::{Coordinate, Geometry, Polygon};
pub use layer::{LayerId, LayerKind, MapLayer};
pub use style::{Color, FeatureTypeStyle, Filter, Rule, Style, Symbolizer};
pub use tile::{Lod, Tile, TileGrid, TileNode};
pub use time::DateFormats;
