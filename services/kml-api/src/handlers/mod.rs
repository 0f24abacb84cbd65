//! HTTP request handlers.
//!
//! - `wms`: GetMap as KML, KMZ or PNG
//! - `kml`: the network-link reflector
//! - `icons`: point icons and legends referenced from documents
//! - `health`: health checks, Prometheus metrics and the layer listing
//! - `common`: exceptions, layer resolution and the streaming body

pub mod common;
pub mod health;
pub mod icons;
pub mod kml;
pub mod wms;

pub use common::{kml_exception, wms_exception};
pub use health::{
    api_metrics_handler, health_handler, layers_handler, metrics_handler, ready_handler,
};
pub use icons::{icon_handler, legend_handler};
pub use kml::kml_reflect_handler;
pub use wms::{get_map, wms_handler};
