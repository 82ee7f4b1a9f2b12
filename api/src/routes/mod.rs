use actix_web::{HttpResponse, http::header::ContentType};

pub mod fetch;

/// Fallback for methods the fetch route does not serve.
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed()
        .insert_header(ContentType::plaintext())
        .body("Method Not Allowed")
}
