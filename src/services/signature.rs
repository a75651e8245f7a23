//! Payment authenticity check.
//!
//! The gateway signs `orderId|paymentId` with the shared key secret. A proof
//! only becomes a [`VerifiedPayment`] by passing [`SignatureVerifier::verify`],
//! so nothing downstream can enroll on an unchecked claim.

use crate::errors::ServiceError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// The signature the gateway produces for an order/payment pair.
pub fn expected_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    let payload = format!("{order_id}|{payment_id}");
    hmac_sha256_hex(secret.as_bytes(), payload.as_bytes())
}

/// Compares two strings without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

pub fn verify_signature(
    order_id: &str,
    payment_id: &str,
    claimed: &str,
    secret: &str,
) -> Result<(), ServiceError> {
    let expected = expected_signature(order_id, payment_id, secret);
    if constant_time_eq(&expected, claimed) {
        Ok(())
    } else {
        Err(ServiceError::SignatureMismatch)
    }
}

/// Client-supplied claim that a payment went through.
#[derive(Debug, Clone)]
pub struct PaymentProof {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub user_id: Uuid,
    pub courses: Vec<Uuid>,
}

/// A payment whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    order_id: String,
    payment_id: String,
    user_id: Uuid,
    courses: Vec<Uuid>,
}

impl VerifiedPayment {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn courses(&self) -> &[Uuid] {
        &self.courses
    }
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, proof: PaymentProof) -> Result<VerifiedPayment, ServiceError> {
        verify_signature(
            &proof.order_id,
            &proof.payment_id,
            &proof.signature,
            &self.secret,
        )?;
        Ok(VerifiedPayment {
            order_id: proof.order_id,
            payment_id: proof.payment_id,
            user_id: proof.user_id,
            courses: proof.courses,
        })
    }

    /// Signs a pair the way the gateway does. Used by tests and local tooling.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        expected_signature(order_id, payment_id, &self.secret)
    }
}
