use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Course Checkout API",
        version = "1.0.0",
        description = r#"
Order capture, payment verification and enrollment for purchased courses.

## Authentication

Payment endpoints require a student token, either as a bearer token or in the `token` cookie:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share one body with a stable `kind`:

```json
{
  "success": false,
  "error": "Conflict",
  "kind": "conflict",
  "message": "Student is already enrolled in course ...",
  "request_id": "7f1c2a9e-...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

A verification that enrolls only part of a batch answers with the status of the
first failing course and a per-course `enrollment` report.
        "#
    ),
    servers(
        (url = "http://localhost:4000", description = "Local development")
    ),
    tags(
        (name = "Payments", description = "Order capture, verification and receipts")
    ),
    paths(
        crate::handlers::payments::capture_payment,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::send_payment_success_email,
    ),
    components(
        schemas(
            crate::handlers::payments::CapturePaymentRequest,
            crate::handlers::payments::VerifyPaymentRequest,
            crate::handlers::payments::SendPaymentSuccessEmailRequest,
            crate::handlers::payments::CapturePaymentResponse,
            crate::handlers::payments::OrderView,
            crate::handlers::payments::VerifyPaymentResponse,
            crate::handlers::payments::EnrollmentView,
            crate::handlers::payments::CourseResultView,
            crate::handlers::payments::MessageResponse,
            crate::models::BatchPolicy,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
