//! Whole documents.
//!
//! Encoding runs in two steps. [`DocumentAssembler::plan`] resolves every
//! layer (regionating strategy, super-overlay mode, the query and whether
//! it is drawn as placemarks or as an image) and fails before any output
//! exists. [`DocumentAssembler::write`] then streams the planned fragments.

use std::io::{Cursor, Seek, Write};

use kml_common::{Filter, KmlError, KmlResult, Tile};
use tracing::{debug, warn};

use crate::context::{EncodeContext, EncodeSummary, LayerRequest};
use crate::icons::IconRegistry;
use crate::kmscore::use_vector_output;
use crate::kmz::{image_entry, KmzWriter};
use crate::lookat::{self, LookAt};
use crate::raster::GroundOverlay;
use crate::regionate::{resolve_strategy, RegionatingStrategy, Regionator, AUTO};
use crate::render::{IconRenderer, TileRenderer};
use crate::source::FeatureQuery;
use crate::superoverlay::{resolve_mode, OverlayPlan, SuperOverlayEncoder};
use crate::urls::{legend_url, GetMapUrl, PNG_MIME};
use crate::vector::{feature_source, layer_query, VectorLayerEncoder};
use crate::writer::KmlWriter;

/// One planned piece of output.
pub enum Fragment<'r> {
    LookAt(LookAt),
    VectorLayer {
        index: usize,
        layer: &'r LayerRequest<'r>,
        query: FeatureQuery,
        strategy: Option<&'static dyn RegionatingStrategy>,
        /// Placemarks when true, a ground overlay otherwise.
        placemarks: bool,
    },
    RasterLayer {
        index: usize,
        layer: &'r LayerRequest<'r>,
    },
    SuperOverlay {
        layer: &'r LayerRequest<'r>,
        plan: OverlayPlan,
        strategy: Option<&'static dyn RegionatingStrategy>,
        query: FeatureQuery,
    },
    Legend {
        layer: &'r LayerRequest<'r>,
    },
}

impl Fragment<'_> {
    fn layer(&self) -> Option<&LayerRequest<'_>> {
        match self {
            Fragment::VectorLayer { layer, .. }
            | Fragment::RasterLayer { layer, .. }
            | Fragment::SuperOverlay { layer, .. } => Some(*layer),
            Fragment::LookAt(_) | Fragment::Legend { .. } => None,
        }
    }
}

pub struct DocumentPlan<'r> {
    pub title: String,
    /// A `<Document>` around per-layer folders instead of a single folder.
    pub wrap: bool,
    pub fragments: Vec<Fragment<'r>>,
}

pub struct DocumentAssembler<'a> {
    ctx: EncodeContext<'a>,
    layers: &'a [LayerRequest<'a>],
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(ctx: EncodeContext<'a>, layers: &'a [LayerRequest<'a>]) -> Self {
        Self { ctx, layers }
    }

    pub fn plan(&self) -> KmlResult<DocumentPlan<'a>> {
        if self.layers.is_empty() {
            return Err(KmlError::MissingParameter("layers".to_string()));
        }
        let request = self.ctx.request;
        if request.bbox.is_null() {
            return Err(KmlError::InvalidBbox("empty bounding box".to_string()));
        }
        let options = self.ctx.options();

        let mut fragments = Vec::with_capacity(self.layers.len() * 2 + 1);
        if let Some(look_at) = lookat::compute(&request.bbox, &options.lookat) {
            fragments.push(Fragment::LookAt(look_at));
        }

        for (index, layer) in self.layers.iter().enumerate() {
            let fragment = if options.superoverlay {
                self.plan_superoverlay(layer)?
            } else if layer.layer.is_vector() {
                self.plan_vector(index, layer)?
            } else {
                Fragment::RasterLayer { index, layer }
            };
            fragments.push(fragment);
        }

        if options.legend {
            fragments.extend(self.layers.iter().map(|layer| Fragment::Legend { layer }));
        }

        let title = match &options.kmltitle {
            Some(title) => title.clone(),
            None => self
                .layers
                .iter()
                .map(|l| l.layer.title.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        };

        Ok(DocumentPlan {
            title,
            wrap: self.layers.len() > 1 || options.legend,
            fragments,
        })
    }

    fn plan_vector(&self, index: usize, layer: &'a LayerRequest<'a>) -> KmlResult<Fragment<'a>> {
        let options = self.ctx.options();
        let strategy = resolve_strategy(options.regionate_by.as_deref(), layer.layer)?;
        let query = layer_query(&self.ctx, layer, self.ctx.request.bbox);

        let placemarks = if query.filter == Filter::Exclude {
            true
        } else {
            let count = feature_source(layer)?.count(&query)?;
            let vector = use_vector_output(options.kmscore, count);
            debug!(
                layer = %layer.layer.id,
                features = count,
                kmscore = options.kmscore,
                vector,
                "Chose vector or raster output"
            );
            vector
        };

        Ok(Fragment::VectorLayer {
            index,
            layer,
            query,
            strategy,
            placemarks,
        })
    }

    fn plan_superoverlay(&self, layer: &'a LayerRequest<'a>) -> KmlResult<Fragment<'a>> {
        let plan = resolve_mode(&self.ctx, layer);
        let (strategy, query) = if layer.layer.is_vector() {
            feature_source(layer)?;
            let requested = self.ctx.options().regionate_by.as_deref().unwrap_or(AUTO);
            (
                resolve_strategy(Some(requested), layer.layer)?,
                layer_query(&self.ctx, layer, self.ctx.request.bbox),
            )
        } else {
            (None, FeatureQuery::new(self.ctx.request.bbox, Filter::Include))
        };
        Ok(Fragment::SuperOverlay {
            layer,
            plan,
            strategy,
            query,
        })
    }

    /// Stream the document as KML. Icons are linked live.
    pub fn write<W: Write>(
        &self,
        plan: &DocumentPlan<'a>,
        sink: W,
    ) -> KmlResult<(W, EncodeSummary)> {
        let mut w = KmlWriter::new(sink);
        let summary = self.write_document(&mut w, plan, None)?;
        Ok((w.into_inner(), summary))
    }

    /// Build a KMZ archive: the document plus every image and inline icon it
    /// refers to.
    pub fn write_kmz<W: Write + Seek>(
        &self,
        plan: &DocumentPlan<'a>,
        sink: W,
        tiles: &dyn TileRenderer,
        icon_renderer: &dyn IconRenderer,
    ) -> KmlResult<(W, EncodeSummary)> {
        let mut registry = IconRegistry::new();
        let mut w = KmlWriter::new(Cursor::new(Vec::new()));
        let summary = self.write_document(&mut w, plan, Some(&mut registry))?;
        let document = w.into_inner().into_inner();

        let mut kmz = KmzWriter::new(sink);
        kmz.kml(&document)?;

        let request = self.ctx.request;
        for (index, envelope) in &summary.images {
            let Some(layer) = self.layers.get(*index) else {
                continue;
            };
            let png = tiles.render_tile(
                layer.layer,
                &layer.style.name,
                envelope,
                request.width,
                request.height,
            )?;
            kmz.image(*index, &png)?;
        }

        for (name, symbolizer) in registry.drain() {
            match icon_renderer.render_icon(&symbolizer) {
                Ok(png) => kmz.icon(&name, &png)?,
                Err(e) => warn!(icon = %name, error = %e, "Icon left out of KMZ"),
            }
        }

        debug!(entries = kmz.len(), "KMZ archive complete");
        Ok((kmz.finish()?, summary))
    }

    fn write_document<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        plan: &DocumentPlan<'a>,
        mut icons: Option<&mut IconRegistry>,
    ) -> KmlResult<EncodeSummary> {
        let mut summary = EncodeSummary::default();
        let root = if plan.wrap { "Document" } else { "Folder" };

        w.declaration()?;
        w.start_kml()?;
        w.start(root)?;
        w.element("name", &plan.title)?;

        for fragment in &plan.fragments {
            let layer_folder = plan.wrap && fragment.layer().is_some();
            if let (true, Some(layer)) = (layer_folder, fragment.layer()) {
                w.start("Folder")?;
                w.element("name", &layer.layer.title)?;
            }

            match fragment {
                Fragment::LookAt(look_at) => lookat::write_lookat(w, look_at)?,
                Fragment::VectorLayer {
                    index,
                    layer,
                    query,
                    strategy,
                    placemarks,
                } => {
                    if *placemarks {
                        let ids = match strategy {
                            Some(strategy) => Some(
                                Regionator::new(
                                    *strategy,
                                    self.ctx.settings.regionate_feature_limit,
                                )
                                .features_for_tile(
                                    feature_source(layer)?,
                                    query,
                                    &Tile::enclosing(&self.ctx.request.bbox),
                                )?,
                            ),
                            None => None,
                        };
                        VectorLayerEncoder::new(self.ctx, layer).write_placemarks(
                            w,
                            query,
                            ids.as_ref(),
                            icons.as_deref_mut(),
                            &mut summary,
                        )?;
                    } else {
                        self.write_raster(w, *index, layer, &mut summary)?;
                    }
                }
                Fragment::RasterLayer { index, layer } => {
                    self.write_raster(w, *index, layer, &mut summary)?
                }
                Fragment::SuperOverlay {
                    layer,
                    plan,
                    strategy,
                    query,
                } => {
                    SuperOverlayEncoder::new(
                        self.ctx,
                        layer,
                        plan.clone(),
                        *strategy,
                        query.clone(),
                    )
                    .write(w, icons.as_deref_mut(), &mut summary)?;
                }
                Fragment::Legend { layer } => self.write_legend(w, layer)?,
            }

            if layer_folder {
                w.end("Folder")?;
            }
        }

        w.end(root)?;
        w.end("kml")?;
        w.flush()?;
        Ok(summary)
    }

    fn write_raster<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        index: usize,
        layer: &LayerRequest<'_>,
        summary: &mut EncodeSummary,
    ) -> KmlResult<()> {
        let request = self.ctx.request;
        let href = if request.kmz {
            summary.images.push((index, request.bbox));
            image_entry(index)
        } else {
            GetMapUrl::new(&request.base_url, layer.layer.id.as_str(), &layer.style.name, PNG_MIME)
                .with_bbox(request.bbox)
                .with_size(request.width, request.height)
                .build()
        };
        GroundOverlay {
            name: &layer.layer.title,
            draw_order: index as i32,
            href: &href,
            envelope: &request.bbox,
            region: None,
        }
        .write(w)?;
        summary.ground_overlays += 1;
        Ok(())
    }

    fn write_legend<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        layer: &LayerRequest<'_>,
    ) -> KmlResult<()> {
        let href = legend_url(
            &self.ctx.request.base_url,
            layer.layer.id.as_str(),
            &layer.style.name,
        );
        w.start("ScreenOverlay")?;
        w.element("name", "Legend")?;
        w.start("Icon")?;
        w.element("href", &href)?;
        w.end("Icon")?;
        w.empty_with(
            "overlayXY",
            &[("x", "0"), ("y", "0"), ("xunits", "pixels"), ("yunits", "pixels")],
        )?;
        w.empty_with(
            "screenXY",
            &[("x", "10"), ("y", "20"), ("xunits", "pixels"), ("yunits", "pixels")],
        )?;
        w.end("ScreenOverlay")
    }
}
