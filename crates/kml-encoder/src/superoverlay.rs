//! Super-overlays: a tile hierarchy of regions whose content is loaded as
//! the viewer zooms in.
//!
//! The request box is aligned to the tile grid and the tiles touching it are
//! split inline, a few levels deep at most, towards the requested resolution.
//! Every inline tile becomes a Folder with a Region and its content (a ground
//! overlay, placemarks, or both). Everything else is a NetworkLink asking for
//! the same layer over that tile's box, so the viewer drives the deeper
//! levels. Children known to be empty are not linked.

use std::io::Write;

use kml_common::{Envelope, Filter, KmlResult, Lod, Tile, TileGrid, TileNode};
use tracing::{debug, warn};

use crate::context::{EncodeContext, EncodeSummary, LayerRequest};
use crate::icons::IconRegistry;
use crate::kmscore::use_vector_output;
use crate::options::SuperOverlayMode;
use crate::raster::{write_region, GroundOverlay};
use crate::regionate::{RegionatingStrategy, Regionator};
use crate::source::{FeatureQuery, SourceError};
use crate::urls::{GetMapUrl, KML_MIME, KMZ_MIME, PNG_MIME};
use crate::vector::{feature_source, VectorLayerEncoder};
use crate::writer::KmlWriter;

/// Size of each tile image.
pub const TILE_PIXELS: u32 = 256;

/// Lod of a tile image that gives way to its children once they load.
pub const REPLACED_LOD: Lod = Lod::new(128, 512);

/// How a layer is drawn once the requested mode has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayPlan {
    /// A ground overlay per tile.
    Raster,
    /// A ground overlay and the tile's regionated placemarks.
    Hybrid,
    /// Ground overlays until a tile is sparse enough for placemarks.
    Overview,
    /// A single link into the tile cache.
    Cached { href: String },
}

/// The request can be answered from the tile cache: the server default
/// switches, the layer's default style, no filter and no paging.
pub fn is_cache_compatible(ctx: &EncodeContext<'_>, layer: &LayerRequest<'_>) -> bool {
    ctx.options().uses_default_switches(ctx.settings)
        && layer.style == layer.default_style
        && layer.filter.is_none()
        && ctx.request.start_index == 0
        && ctx.request.max_features.is_none()
}

pub fn resolve_mode(ctx: &EncodeContext<'_>, layer: &LayerRequest<'_>) -> OverlayPlan {
    let vector = layer.layer.is_vector();
    let options = ctx.options();
    match options.superoverlay_mode {
        SuperOverlayMode::Raster if vector && options.kmplacemark => OverlayPlan::Hybrid,
        SuperOverlayMode::Raster => OverlayPlan::Raster,
        SuperOverlayMode::Hybrid | SuperOverlayMode::Overview if !vector => OverlayPlan::Raster,
        SuperOverlayMode::Hybrid => OverlayPlan::Hybrid,
        SuperOverlayMode::Overview => OverlayPlan::Overview,
        SuperOverlayMode::Auto => auto_mode(vector),
        SuperOverlayMode::Cached => match &ctx.settings.tile_cache_url {
            Some(url) if is_cache_compatible(ctx, layer) => OverlayPlan::Cached {
                href: format!("{}/{}.png.kml", url.trim_end_matches('/'), layer.layer.id),
            },
            _ => {
                debug!(layer = %layer.layer.id, "Request not cacheable, using auto mode");
                auto_mode(vector)
            }
        },
    }
}

fn auto_mode(vector: bool) -> OverlayPlan {
    if vector {
        OverlayPlan::Overview
    } else {
        OverlayPlan::Raster
    }
}

/// What to count when deciding whether a tile has content.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCountRequest {
    pub bbox: Envelope,
    pub filter: Filter,
}

impl TileCountRequest {
    pub fn new(query: &FeatureQuery, tile: &Tile) -> Self {
        Self {
            bbox: tile.envelope,
            filter: query.filter.clone(),
        }
    }

    pub fn query(&self) -> FeatureQuery {
        FeatureQuery::new(self.bbox, self.filter.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCount {
    Empty,
    Features(usize),
    /// Raster layer, or the count failed.
    Unknown,
}

/// A kept child tile, with the count that kept it.
enum Child {
    Inline(TileNode, TileCount),
    Link(Tile),
}

pub struct SuperOverlayEncoder<'a> {
    ctx: EncodeContext<'a>,
    layer: &'a LayerRequest<'a>,
    plan: OverlayPlan,
    strategy: Option<&'static dyn RegionatingStrategy>,
    /// Layer query over the request box.
    query: FeatureQuery,
    grid: TileGrid,
}

impl<'a> SuperOverlayEncoder<'a> {
    pub fn new(
        ctx: EncodeContext<'a>,
        layer: &'a LayerRequest<'a>,
        plan: OverlayPlan,
        strategy: Option<&'static dyn RegionatingStrategy>,
        query: FeatureQuery,
    ) -> Self {
        let grid = TileGrid::new(ctx.settings.max_zoom_level);
        Self {
            ctx,
            layer,
            plan,
            strategy,
            query,
            grid,
        }
    }

    /// Write the layer's tile tree, or its cache link.
    pub fn write<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        mut icons: Option<&mut IconRegistry>,
        summary: &mut EncodeSummary,
    ) -> KmlResult<()> {
        if let OverlayPlan::Cached { href } = &self.plan {
            w.start("NetworkLink")?;
            w.element("name", &self.layer.layer.title)?;
            w.element("open", "1")?;
            w.element("visibility", "1")?;
            w.start("Link")?;
            w.element("href", href)?;
            w.end("Link")?;
            w.end("NetworkLink")?;
            summary.links_emitted += 1;
            return Ok(());
        }

        let tree = self
            .grid
            .partition(&self.ctx.request.bbox, self.ctx.request.resolution());
        debug!(
            layer = %self.layer.layer.id,
            plan = ?self.plan,
            root = %tree.tile.envelope.to_wms_string(),
            tiles = tree.tiles().len(),
            "Writing super-overlay"
        );
        self.write_node(w, tree, None, &mut icons, summary)
    }

    /// `count` is the feature count already taken for this tile, if any.
    fn write_node<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        node: TileNode,
        count: Option<TileCount>,
        icons: &mut Option<&mut IconRegistry>,
        summary: &mut EncodeSummary,
    ) -> KmlResult<()> {
        let tile = node.tile;
        let kmscore = self.ctx.options().kmscore;

        let (draw_raster, draw_vector) = match self.plan {
            OverlayPlan::Overview => match count.unwrap_or_else(|| self.count_tile(&tile)) {
                TileCount::Empty => (false, false),
                TileCount::Features(n) if use_vector_output(kmscore, n) => (false, true),
                _ => (true, false),
            },
            _ => (true, false),
        };

        // Placemarks end the descent, and so does an empty overview tile.
        let children = if draw_raster {
            self.children(node, summary)
        } else {
            Vec::new()
        };
        let has_children = !children.is_empty();

        w.start("Folder")?;
        w.element("name", &tile_name(&tile))?;
        write_region(w, &tile.envelope, &tile.lod)?;

        if draw_raster {
            let href = GetMapUrl::new(
                &self.ctx.request.base_url,
                self.layer.layer.id.as_str(),
                &self.layer.style.name,
                PNG_MIME,
            )
            .with_bbox(tile.envelope)
            .with_size(TILE_PIXELS, TILE_PIXELS)
            .build();
            GroundOverlay {
                name: &self.layer.layer.title,
                draw_order: tile.draw_order(),
                href: &href,
                envelope: &tile.envelope,
                region: has_children.then_some(REPLACED_LOD),
            }
            .write(w)?;
            summary.ground_overlays += 1;
        }

        let vector = VectorLayerEncoder::new(self.ctx, self.layer);
        let tile_query = self.query.with_bbox(tile.envelope);
        if draw_vector {
            vector.write_placemarks(w, &tile_query, None, icons.as_deref_mut(), summary)?;
        } else if self.plan == OverlayPlan::Hybrid {
            if let Some(ids) = self.regionated(&tile) {
                let icons = icons.as_deref_mut();
                vector.write_placemarks(w, &tile_query, Some(&ids), icons, summary)?;
            }
        }

        for child in children {
            match child {
                Child::Inline(node, count) => {
                    self.write_node(w, node, Some(count), icons, summary)?;
                }
                Child::Link(tile) => {
                    self.write_link(w, &tile)?;
                    summary.links_emitted += 1;
                }
            }
        }

        w.end("Folder")
    }

    /// The sub-tiles of a tile. Tiles the inline tree grew, or that touch the
    /// request, are written inline; the rest are linked. Below the inline tree
    /// every child is linked. Tiles without features are dropped.
    fn children(&self, node: TileNode, summary: &mut EncodeSummary) -> Vec<Child> {
        let inline_tree = !node.is_leaf();
        let nodes = if inline_tree {
            node.children
        } else if self.grid.is_leaf_level(&node.tile) {
            Vec::new()
        } else {
            node.tile.children().into_iter().map(TileNode::leaf).collect()
        };

        let bbox = self.ctx.request.bbox;
        nodes
            .into_iter()
            .filter_map(|child| {
                let count = self.count_tile(&child.tile);
                if count == TileCount::Empty {
                    summary.links_skipped += 1;
                    return None;
                }
                let inline = inline_tree && (!child.is_leaf() || child.tile.touches(&bbox));
                Some(if inline {
                    Child::Inline(child, count)
                } else {
                    Child::Link(child.tile)
                })
            })
            .collect()
    }

    /// Count the layer's features in a tile. Only raster layers and failed
    /// counts are `Unknown`; a source reporting no data counts as empty.
    pub fn count_tile(&self, tile: &Tile) -> TileCount {
        if !self.layer.layer.is_vector() {
            return TileCount::Unknown;
        }
        let Ok(source) = feature_source(self.layer) else {
            return TileCount::Unknown;
        };

        let request = TileCountRequest::new(&self.query, tile);
        match source.count(&request.query()) {
            Ok(0) => TileCount::Empty,
            Ok(n) => TileCount::Features(n),
            Err(SourceError::NoData(message)) => {
                debug!(
                    layer = %self.layer.layer.id,
                    tile = %tile.envelope.to_wms_string(),
                    %message,
                    "Tile has no data"
                );
                TileCount::Empty
            }
            Err(e) => {
                warn!(
                    layer = %self.layer.layer.id,
                    tile = %tile.envelope.to_wms_string(),
                    error = %e,
                    "Tile count failed, drawing raster"
                );
                TileCount::Unknown
            }
        }
    }

    fn regionated(&self, tile: &Tile) -> Option<std::collections::HashSet<String>> {
        let strategy = self.strategy?;
        let source = feature_source(self.layer).ok()?;
        let regionator = Regionator::new(strategy, self.ctx.settings.regionate_feature_limit);
        match regionator.features_for_tile(source, &self.query, tile) {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!(
                    layer = %self.layer.layer.id,
                    tile = %tile.envelope.to_wms_string(),
                    error = %e,
                    "Regionating failed, tile drawn as raster only"
                );
                None
            }
        }
    }

    fn write_link<W: Write>(&self, w: &mut KmlWriter<W>, tile: &Tile) -> KmlResult<()> {
        let mut format_options = self.ctx.request.format_options.clone();
        format_options.insert("superoverlay", "true");
        let format = if self.ctx.request.kmz { KMZ_MIME } else { KML_MIME };
        let href = GetMapUrl::new(
            &self.ctx.request.base_url,
            self.layer.layer.id.as_str(),
            &self.layer.style.name,
            format,
        )
        .with_bbox(tile.envelope)
        .with_size(TILE_PIXELS, TILE_PIXELS)
        .with_format_options(format_options)
        .build();

        w.start("NetworkLink")?;
        w.element("name", &tile_name(tile))?;
        write_region(w, &tile.envelope, &tile.lod)?;
        w.start("Link")?;
        w.element("href", &href)?;
        w.element("viewRefreshMode", "onRegion")?;
        w.end("Link")?;
        w.end("NetworkLink")
    }
}

fn tile_name(tile: &Tile) -> String {
    format!("{}:{}", tile.depth, tile.envelope.to_wms_string())
}
