#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use course_checkout::{
    auth::{Claims, JwtVerifier, STUDENT_ACCOUNT},
    config::{AppConfig, RazorpayConfig},
    gateway::{GatewayClientError, OrderRequest, PaymentGateway},
    metrics::CheckoutMetrics,
    models::{Course, PaymentOrder, User},
    notifications::{EnrollmentNotice, NotificationDispatcher, NotificationError, PaymentReceipt},
    repositories::{BoundedStore, CourseStore, InMemoryCourseStore},
    services::PaymentService,
    AppState,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const GATEWAY_SECRET: &str = "rzp_test_secret";

/// Gateway double that opens orders locally and counts calls.
#[derive(Default)]
pub struct StubGateway {
    pub calls: AtomicUsize,
    orders: Mutex<Vec<PaymentOrder>>,
}

impl StubGateway {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<PaymentOrder, GatewayClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let order = PaymentOrder {
            id: format!("order_test{n}"),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".to_string()),
            notes: serde_json::to_value(request.notes)
                .map_err(|e| GatewayClientError::Decode(e.to_string()))?,
        };
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<PaymentOrder, GatewayClientError> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or(GatewayClientError::Rejected {
                status: 400,
                description: "The id provided does not exist".to_string(),
            })
    }
}

/// Dispatcher double that keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub notices: Mutex<Vec<EnrollmentNotice>>,
    pub receipts: Mutex<Vec<PaymentReceipt>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn enrollment_confirmed(&self, notice: EnrollmentNotice) -> Result<(), NotificationError> {
        self.notices.lock().unwrap().push(notice);
        Ok(())
    }

    async fn payment_received(&self, receipt: PaymentReceipt) -> Result<(), NotificationError> {
        self.receipts.lock().unwrap().push(receipt);
        Ok(())
    }
}

/// Application router wired to in-memory doubles.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryCourseStore>,
    pub gateway: Arc<StubGateway>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub student: User,
    token: String,
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "memory",
        JWT_SECRET,
        RazorpayConfig::new("rzp_test_key", GATEWAY_SECRET),
    );
    cfg.environment = "test".to_string();
    cfg
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let store = Arc::new(InMemoryCourseStore::new());
        let gateway = Arc::new(StubGateway::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let metrics = CheckoutMetrics::new().expect("metrics registry");

        let bounded: Arc<dyn CourseStore> = Arc::new(BoundedStore::new(
            store.clone() as Arc<dyn CourseStore>,
            cfg.store_timeout(),
        ));
        let payments = PaymentService::from_config(
            &cfg,
            bounded.clone(),
            gateway.clone(),
            dispatcher.clone(),
            metrics.clone(),
        );

        let state = AppState {
            jwt: JwtVerifier::new(&cfg.jwt_secret),
            config: Arc::new(cfg),
            store: bounded,
            payments: Arc::new(payments),
            metrics,
        };

        let student = User::new("asha@example.com", "Asha", "Rao");
        store.insert_user(student.clone());
        let token = encode_token(student.id, &student.email, STUDENT_ACCOUNT);

        Self {
            router: course_checkout::build_router(state.clone()),
            state,
            store,
            gateway,
            dispatcher,
            student,
            token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn seed_course(&self, name: &str, price: u64) -> Course {
        let course = Course::new(name, price);
        self.store.insert_course(course.clone());
        course
    }

    /// Signature the gateway would hand the client for this order and payment.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        course_checkout::services::signature::expected_signature(
            order_id,
            payment_id,
            GATEWAY_SECRET,
        )
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn post_as_student(&self, uri: &str, body: Value) -> axum::response::Response {
        self.request(Method::POST, uri, Some(body), Some(self.token()))
            .await
    }

    /// Raw request for cases the helpers do not cover (cookies, odd headers).
    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub fn encode_token(user_id: Uuid, email: &str, account_type: &str) -> String {
    let claims = Claims {
        id: user_id,
        email: email.to_string(),
        account_type: account_type.to_string(),
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode access token")
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn response_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
