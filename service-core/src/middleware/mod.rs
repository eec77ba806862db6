pub mod error_envelope;
pub mod metrics;
pub mod tracing;

pub use error_envelope::error_envelope_middleware;
pub use metrics::metrics_middleware;
pub use tracing::{REQUEST_ID_HEADER, request_id_middleware};
