use actix_web::{
    Error,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use tracing::{debug, warn};

/**
 * Middleware timing requests. Server errors are additionally logged as warnings.
 */
pub async fn timing_middleware(request: ServiceRequest, next: Next<impl MessageBody>) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start_time = std::time::Instant::now();
    let path = request.path().to_owned();
    let method = request.method().to_owned();
    let trace_id = request.headers().get("X-Trace-ID").and_then(|value| value.to_str().ok()).map(str::to_string).unwrap_or_default();
    let response = next.call(request).await;
    let response_code = match &response {
        Ok(service_response) => service_response.status().as_u16(),
        Err(err) => err.as_response_error().status_code().as_u16(),
    };
    let duration = start_time.elapsed();
    debug!(target: "performance", "Request for {} {} [{}] with status {} processed in {}ms", method, path, trace_id, response_code, duration.as_millis());
    if response_code >= 500 {
        warn!("Request for {} {} [{}] failed with status {}", method, path, trace_id, response_code);
    }
    response
}
