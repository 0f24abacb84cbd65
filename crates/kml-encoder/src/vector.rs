//! Placemark output for one vector layer.

use std::collections::HashSet;
use std::io::Write;

use kml_common::{Envelope, Filter, Geometry, KmlError, KmlResult, Symbolizer};
use tracing::{debug, warn};

use crate::context::{EncodeContext, EncodeSummary, LayerRequest};
use crate::coordinates::CoordinateFormatter;
use crate::geometry::{geometry_centroid, GeometryEncoder};
use crate::icons::IconRegistry;
use crate::placemark::PlacemarkEncoder;
use crate::rules::{layer_rules, select_rules, summarize_rule_filters, symbolizers_of};
use crate::source::{FeatureQuery, FeatureSource};
use crate::style::StyleEncoder;
use crate::writer::KmlWriter;

/// The query that loads a layer over `bbox`: the box, the in-scale rule
/// filters OR-ed together, and the request's own filter.
pub fn layer_query(
    ctx: &EncodeContext<'_>,
    layer: &LayerRequest<'_>,
    bbox: Envelope,
) -> FeatureQuery {
    let rules = layer_rules(layer.style, layer.layer.feature_type_name());
    let summarized = summarize_rule_filters(&rules, ctx.scale_denominator);
    let filter = Filter::and(vec![summarized, layer.filter.clone().unwrap_or(Filter::Include)]);
    FeatureQuery {
        bbox,
        filter,
        start_index: ctx.request.start_index,
        max_features: ctx.request.max_features,
    }
}

pub fn feature_source<'a>(layer: &LayerRequest<'a>) -> KmlResult<&'a dyn FeatureSource> {
    layer
        .source
        .ok_or_else(|| {
            KmlError::Internal(format!("Layer {} has no feature source", layer.layer.id))
        })
}

/// Writes the placemarks of a layer.
pub struct VectorLayerEncoder<'a> {
    ctx: EncodeContext<'a>,
    layer: &'a LayerRequest<'a>,
}

impl<'a> VectorLayerEncoder<'a> {
    pub fn new(ctx: EncodeContext<'a>, layer: &'a LayerRequest<'a>) -> Self {
        Self { ctx, layer }
    }

    /// Write a placemark for every feature of `query` that some rule paints.
    /// With `only` set, features whose id is not in it are skipped.
    pub fn write_placemarks<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        query: &FeatureQuery,
        only: Option<&HashSet<String>>,
        mut icons: Option<&mut IconRegistry>,
        summary: &mut EncodeSummary,
    ) -> KmlResult<()> {
        if query.filter == Filter::Exclude {
            debug!(layer = %self.layer.layer.id, "No rule can match, layer skipped");
            return Ok(());
        }

        let options = self.ctx.options();
        let collaborators = self.ctx.collaborators;
        let encoder = PlacemarkEncoder {
            geometry: GeometryEncoder::new(
                CoordinateFormatter::new(self.ctx.settings.coordinate_decimals),
                options.extrude,
                options.altitude_mode,
            ),
            styles: StyleEncoder {
                base_url: &self.ctx.request.base_url,
                kmattr: options.kmattr,
                icons: collaborators.icons,
            },
            template: collaborators.template,
            dates: collaborators.dates,
            lookat: &options.lookat,
            kmattr: options.kmattr,
            self_link_base: options.self_links.then(|| {
                format!(
                    "{}/rest/{}",
                    self.ctx.request.base_url.trim_end_matches('/'),
                    self.layer.layer.id
                )
            }),
        };

        let type_name = self.layer.layer.feature_type_name();
        let source = feature_source(self.layer)?;
        for feature in source.features(query)? {
            let feature = feature?;
            if only.is_some_and(|ids| !ids.contains(&feature.id)) {
                continue;
            }

            let rules = select_rules(
                self.layer.style,
                type_name,
                &feature,
                self.ctx.scale_denominator,
            );
            if rules.is_empty() {
                continue;
            }
            let symbolizers = symbolizers_of(&rules);
            let mark = point_mark(&feature.geometry, &symbolizers);

            let diagnostics = encoder.encode(
                w,
                &feature,
                self.layer.style,
                &symbolizers,
                mark.as_ref(),
                icons.as_deref_mut(),
            )?;
            for d in &diagnostics {
                warn!(
                    feature_id = %d.feature_id,
                    step = %d.step,
                    reason = %d.reason,
                    "Placemark element omitted"
                );
            }
            summary.diagnostics.extend(diagnostics);
            summary.placemarks += 1;
        }
        Ok(())
    }
}

/// A feature painted only by point symbolizers is shown as an icon at its
/// centroid, whatever its geometry.
fn point_mark(geometry: &Geometry, symbolizers: &[&Symbolizer]) -> Option<Geometry> {
    let points_only =
        !symbolizers.is_empty() && symbolizers.iter().all(|s| matches!(s, Symbolizer::Point(_)));
    if !points_only || matches!(geometry, Geometry::Point(_)) {
        return None;
    }
    geometry_centroid(geometry).map(Geometry::Point)
}
