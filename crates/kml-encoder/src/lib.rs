//! KML and KMZ encoding of styled map layers.
//!
//! Supports:
//! - Placemark output for vector layers, with SLD-style rules mapped to KML styles
//! - Ground overlays for raster layers and for layers too dense to send as vectors
//! - Super-overlays: region-driven tile pyramids with regionated placemarks
//! - KMZ packaging and the network-link reflector

pub mod context;
pub mod coordinates;
pub mod document;
pub mod geometry;
pub mod icons;
pub mod kmscore;
pub mod kmz;
pub mod lookat;
pub mod options;
pub mod placemark;
pub mod raster;
pub mod reflector;
pub mod regionate;
pub mod render;
pub mod request;
pub mod rules;
pub mod source;
pub mod style;
pub mod superoverlay;
pub mod template;
pub mod urls;
pub mod vector;
pub mod writer;

pub use context::{Collaborators, EncodeContext, EncodeSummary, LayerRequest, MapRequest};
pub use document::{DocumentAssembler, DocumentPlan, Fragment};
pub use icons::{IconPropertyExtractor, IconRegistry, SymbolizerIconExtractor};
pub use options::{FormatOptions, KmlOptions, KmlSettings};
pub use placemark::Diagnostic;
pub use reflector::{download_filename, ReflectLayer, Reflector, ReflectorMode};
pub use regionate::{resolve_strategy, RegionatingStrategy, Regionator};
pub use render::{IconRenderer, RenderError, TileRenderer};
pub use request::{service_exception, GetMapRequest, KvpParams, OutputFormat, ReflectRequest};
pub use source::{FeatureQuery, FeatureSource, MemoryFeatureSource};
pub use template::{AttributeTemplate, FeatureTemplate};
pub use writer::KmlWriter;
