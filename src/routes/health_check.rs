use actix_web::HttpResponse;

/// `GET /health_check`
///
/// Liveness only; does not touch the list provider. Viewing the response
/// requires `curl -v`, the body is empty.
pub async fn health_check() -> HttpResponse { HttpResponse::Ok().finish() }
