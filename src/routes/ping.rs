use actix_web::HttpResponse;

/// GET /api/v1/auth/ping
pub async fn ping() -> HttpResponse {
    tracing::debug!("Ping endpoint called");
    HttpResponse::Ok().json(serde_json::json!({ "msg": "pong" }))
}
