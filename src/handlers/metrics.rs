use prometheus::{Encoder, TextEncoder};
use crate::error::AppError;

pub async fn metrics_handler() -> Result<String, AppError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        tracing::error!(error = %e, "failed to encode metrics");
        AppError::Internal("failed to encode metrics".to_string())
    })?;
    String::from_utf8(buffer).map_err(|_| AppError::Internal("metrics are not valid UTF-8".to_string()))
}
