//! Error types for the KML transformation engine.

use thiserror::Error;

/// Result type alias using KmlError.
pub type KmlResult<T> = Result<T, KmlError>;

/// Primary error type for KML operations.
#[derive(Debug, Error)]
pub enum KmlError {
    // === Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Style not found: {0}")]
    StyleNotFound(String),

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Unknown regionating strategy: {0}")]
    UnknownRegionatingStrategy(String),

    #[error("Requested format not supported: {0}")]
    UnsupportedFormat(String),

    // === Output Errors ===
    /// The XML sink failed to write, usually because the client went away.
    #[error("Output stream failed: {0}")]
    Stream(#[source] std::io::Error),

    // === Data Errors ===
    #[error("Feature source error: {0}")]
    Source(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl KmlError {
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        KmlError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Get the OGC service exception code for this error.
    pub fn service_exception_code(&self) -> &'static str {
        match self {
            KmlError::MissingParameter(_) => "MissingParameterValue",
            KmlError::InvalidParameter { .. } | KmlError::UnknownRegionatingStrategy(_) => {
                "InvalidParameterValue"
            }
            KmlError::LayerNotFound(_) => "LayerNotDefined",
            KmlError::StyleNotFound(_) => "StyleNotDefined",
            KmlError::InvalidCrs(_) => "InvalidCRS",
            KmlError::InvalidBbox(_) => "InvalidBBox",
            KmlError::UnsupportedFormat(_) => "InvalidFormat",
            _ => "NoApplicableCode",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            KmlError::MissingParameter(_)
            | KmlError::InvalidParameter { .. }
            | KmlError::InvalidCrs(_)
            | KmlError::InvalidBbox(_)
            | KmlError::UnknownRegionatingStrategy(_)
            | KmlError::UnsupportedFormat(_) => 400,

            KmlError::LayerNotFound(_) | KmlError::StyleNotFound(_) | KmlError::NoData(_) => 404,

            _ => 500,
        }
    }

    /// True when the error means the destination of the document is gone.
    pub fn is_client_disconnect(&self) -> bool {
        match self {
            KmlError::Stream(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

impl From<crate::envelope::BboxParseError> for KmlError {
    fn from(err: crate::envelope::BboxParseError) -> Self {
        KmlError::InvalidBbox(err.to_string())
    }
}

impl From<crate::crs::CrsParseError> for KmlError {
    fn from(err: crate::crs::CrsParseError) -> Self {
        KmlError::InvalidCrs(err.to_string())
    }
}

impl From<serde_json::Error> for KmlError {
    fn from(err: serde_json::Error) -> Self {
        KmlError::Internal(format!("JSON error: {}", err))
    }
}
