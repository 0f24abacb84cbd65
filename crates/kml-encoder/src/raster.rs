//! GroundOverlay and Region elements shared by plain raster output and the
//! super-overlay.

use std::io::Write;

use kml_common::{Envelope, KmlResult, Lod};

use crate::writer::KmlWriter;

/// How much of the view a ground overlay image is requested for.
pub const VIEW_BOUND_SCALE: &str = "0.75";

#[derive(Debug, Clone)]
pub struct GroundOverlay<'a> {
    pub name: &'a str,
    pub draw_order: i32,
    pub href: &'a str,
    pub envelope: &'a Envelope,
    /// Hides the image once its region is drawn larger than `max_lod_pixels`.
    pub region: Option<Lod>,
}

impl GroundOverlay<'_> {
    pub fn write<W: Write>(&self, w: &mut KmlWriter<W>) -> KmlResult<()> {
        w.start("GroundOverlay")?;
        w.element("name", self.name)?;
        if let Some(lod) = &self.region {
            write_region(w, self.envelope, lod)?;
        }
        w.element("drawOrder", &self.draw_order.to_string())?;
        w.start("Icon")?;
        w.element("href", self.href)?;
        w.element("viewRefreshMode", "never")?;
        w.element("viewBoundScale", VIEW_BOUND_SCALE)?;
        w.end("Icon")?;
        write_lat_lon_box(w, "LatLonBox", self.envelope)?;
        w.end("GroundOverlay")
    }
}

/// `north`, `south`, `east`, `west` in that order, under `tag`.
pub fn write_lat_lon_box<W: Write>(
    w: &mut KmlWriter<W>,
    tag: &str,
    envelope: &Envelope,
) -> KmlResult<()> {
    w.start(tag)?;
    w.element("north", &envelope.max_y.to_string())?;
    w.element("south", &envelope.min_y.to_string())?;
    w.element("east", &envelope.max_x.to_string())?;
    w.element("west", &envelope.min_x.to_string())?;
    w.end(tag)
}

pub fn write_region<W: Write>(
    w: &mut KmlWriter<W>,
    envelope: &Envelope,
    lod: &Lod,
) -> KmlResult<()> {
    w.start("Region")?;
    write_lat_lon_box(w, "LatLonAltBox", envelope)?;
    w.start("Lod")?;
    w.element("minLodPixels", &lod.min_lod_pixels.to_string())?;
    w.element("maxLodPixels", &lod.max_lod_pixels.to_string())?;
    w.end("Lod")?;
    w.end("Region")
}
