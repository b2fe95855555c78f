// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook signature verification.
//!
//! Deliveries carry `X-Shopify-Hmac-Sha256`: the base64 HMAC-SHA256 of the
//! raw request body keyed with the app's shared secret. With no secret
//! configured and `require_signature` set, every delivery is rejected
//! (fail-closed).

use axum::http::{HeaderMap, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";

type HmacSha256 = Hmac<Sha256>;

/// Signature settings for the receiver.
#[derive(Clone)]
pub struct AuthConfig {
    pub shared_secret: Option<String>,
    pub require_signature: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("require_signature", &self.require_signature)
            .finish()
    }
}

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a base64 signature.
pub fn verify_signature(secret: &str, body: &[u8], signature_b64: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Accept or reject a delivery based on its headers and raw body.
pub fn verify_request(auth: &AuthConfig, headers: &HeaderMap, body: &[u8]) -> Result<(), StatusCode> {
    let Some(secret) = auth.shared_secret.as_deref() else {
        if auth.require_signature {
            tracing::error!("webhook receiver has no shared secret configured -- rejecting delivery");
            return Err(StatusCode::UNAUTHORIZED);
        }
        return Ok(());
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    match signature {
        Some(sig) if verify_signature(secret, body, sig) => Ok(()),
        Some(_) => {
            tracing::warn!("webhook signature mismatch");
            Err(StatusCode::UNAUTHORIZED)
        }
        None if auth.require_signature => {
            tracing::warn!("unsigned webhook delivery rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => Ok(()),
    }
}
