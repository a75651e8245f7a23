//! Checkout services: pricing, order creation, signature verification,
//! enrollment and receipts.

pub mod checkout;
pub mod enrollment;
pub mod payments;
pub mod pricing;
pub mod receipts;
pub mod signature;

pub use checkout::{OrderInitiator, OrderSettings};
pub use enrollment::EnrollmentOrchestrator;
pub use payments::PaymentService;
pub use pricing::{PriceAggregator, PriceQuote};
pub use receipts::ReceiptService;
pub use signature::{PaymentProof, SignatureVerifier, VerifiedPayment};
