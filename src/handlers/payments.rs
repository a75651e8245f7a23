use crate::auth::Student;
use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::AppState;
use crate::models::{BatchPolicy, EnrollmentReport, EnrollmentStatus, PaymentOrder};
use crate::services::PaymentProof;
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "courses": ["7f1c2a9e-3b7d-4d55-9a43-2f8f6c1b9e01", "0b6e4c3a-5d1f-4b8e-8c2a-9e7d6f5a4b32"]
}))]
pub struct CapturePaymentRequest {
    /// Courses to buy, in the order they should be enrolled
    #[serde(default)]
    #[validate(length(min = 1, message = "Please provide Course ID"))]
    pub courses: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    #[schema(example = "order_EKwxwAgItmmXdp")]
    pub razorpay_order_id: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    #[schema(example = "pay_29QQoUBi66xm2f")]
    pub razorpay_payment_id: String,

    /// Lowercase hex HMAC-SHA256 of `order_id|payment_id`
    #[serde(default)]
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Please provide Course ID"))]
    pub courses: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendPaymentSuccessEmailRequest {
    #[serde(rename = "orderId", default)]
    #[validate(length(min = 1, message = "orderId is required"))]
    pub order_id: String,

    #[serde(rename = "paymentId", default)]
    #[validate(length(min = 1, message = "paymentId is required"))]
    pub payment_id: String,

    /// Paid amount in gateway minor units
    #[validate(
        required(message = "amount is required"),
        range(min = 1, message = "amount is required")
    )]
    #[schema(example = 200000)]
    pub amount: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: String,
    /// Gateway minor units
    pub amount: u64,
    pub currency: String,
    pub receipt: Option<String>,
}

impl From<PaymentOrder> for OrderView {
    fn from(order: PaymentOrder) -> Self {
        Self {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CapturePaymentResponse {
    pub success: bool,
    pub order: OrderView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CourseResultView {
    pub course_id: Uuid,
    /// enrolled, already_enrolled, failed or not_attempted
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentView {
    pub policy: BatchPolicy,
    pub complete: bool,
    pub courses: Vec<CourseResultView>,
}

impl From<&EnrollmentReport> for EnrollmentView {
    fn from(report: &EnrollmentReport) -> Self {
        Self {
            policy: report.policy,
            complete: report.is_complete(),
            courses: report
                .outcomes
                .iter()
                .map(|o| {
                    let (kind, message) = match &o.status {
                        EnrollmentStatus::Failed(err) => {
                            (Some(err.kind().to_string()), Some(err.response_message()))
                        }
                        _ => (None, None),
                    };
                    CourseResultView {
                        course_id: o.course_id,
                        status: o.status.label().to_string(),
                        kind,
                        message,
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
    pub enrollment: EnrollmentView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Open a gateway order for the selected courses
#[utoipa::path(
    post,
    path = "/api/v1/payment/capturePayment",
    request_body = CapturePaymentRequest,
    responses(
        (status = 200, description = "Order opened", body = CapturePaymentResponse),
        (status = 400, description = "Empty or malformed course list", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Caller is not a student", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 409, description = "Already enrolled", body = ErrorResponse),
        (status = 500, description = "Gateway error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn capture_payment(
    State(state): State<AppState>,
    Student(user): Student,
    payload: Result<Json<CapturePaymentRequest>, JsonRejection>,
) -> Result<Json<CapturePaymentResponse>, ServiceError> {
    let Json(request) = payload?;
    request.validate()?;

    let order = state
        .payments
        .capture(user.user_id, &request.courses)
        .await?;

    Ok(Json(CapturePaymentResponse {
        success: true,
        order: order.into(),
    }))
}

/// Verify a completed payment and enroll the buyer
#[utoipa::path(
    post,
    path = "/api/v1/payment/verifyPayment",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified, every course enrolled", body = VerifyPaymentResponse),
        (status = 400, description = "Missing fields or signature mismatch", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "A course or the user vanished; partial report in body", body = VerifyPaymentResponse),
        (status = 409, description = "Order does not match the request", body = ErrorResponse),
        (status = 500, description = "Storage failure; partial report in body", body = VerifyPaymentResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Student(user): Student,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) = payload?;
    request.validate()?;

    let report = state
        .payments
        .verify(PaymentProof {
            order_id: request.razorpay_order_id,
            payment_id: request.razorpay_payment_id,
            signature: request.razorpay_signature,
            user_id: user.user_id,
            courses: request.courses,
        })
        .await?;

    let enrollment = EnrollmentView::from(&report);
    let response = match report.first_failure() {
        None => (
            StatusCode::OK,
            Json(VerifyPaymentResponse {
                success: true,
                message: "Payment Verified".to_string(),
                enrollment,
            }),
        ),
        Some((_, err)) => (
            err.status_code(),
            Json(VerifyPaymentResponse {
                success: false,
                message: err.response_message(),
                enrollment,
            }),
        ),
    };
    Ok(response.into_response())
}

/// Send the payment receipt to the caller
#[utoipa::path(
    post,
    path = "/api/v1/payment/sendPaymentSuccessEmail",
    request_body = SendPaymentSuccessEmailRequest,
    responses(
        (status = 200, description = "Receipt dispatched", body = MessageResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Dispatch failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn send_payment_success_email(
    State(state): State<AppState>,
    Student(user): Student,
    payload: Result<Json<SendPaymentSuccessEmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let Json(request) = payload?;
    request.validate()?;
    let amount = request
        .amount
        .ok_or_else(|| ServiceError::ValidationError("amount is required".to_string()))?;

    state
        .payments
        .send_receipt(user.user_id, &request.order_id, &request.payment_id, amount)
        .await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Payment receipt sent".to_string(),
    }))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/capturePayment", post(capture_payment))
        .route("/verifyPayment", post(verify_payment))
        .route("/sendPaymentSuccessEmail", post(send_payment_success_email))
}
