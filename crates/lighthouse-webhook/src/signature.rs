//! GitHub-style HMAC delivery signatures.
//!
//! `X-Hub-Signature-256: sha256=<hex>` is checked when present; otherwise the
//! legacy `X-Hub-Signature: sha1=<hex>` header is accepted.

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::WebhookError;

pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

pub fn sign_sha256(secret: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).context("failed to initialize hmac signer")?;
    mac.update(payload);
    Ok(format!("sha256={}", encode_hex(&mac.finalize().into_bytes())))
}

pub fn sign_sha1(secret: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).context("failed to initialize hmac signer")?;
    mac.update(payload);
    Ok(format!("sha1={}", encode_hex(&mac.finalize().into_bytes())))
}

/// Checks the delivery signature against `secret`.
pub fn verify_signature(headers: &HeaderMap, payload: &[u8], secret: &[u8]) -> Result<(), WebhookError> {
    if let Some(value) = header_value(headers, SIGNATURE_256_HEADER) {
        let digest = value
            .strip_prefix("sha256=")
            .ok_or(WebhookError::InvalidSignature)?;
        let expected = decode_hex(digest).map_err(|_| WebhookError::InvalidSignature)?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret)
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(payload);
        return mac
            .verify_slice(&expected)
            .map_err(|_| WebhookError::InvalidSignature);
    }
    if let Some(value) = header_value(headers, SIGNATURE_HEADER) {
        let digest = value
            .strip_prefix("sha1=")
            .ok_or(WebhookError::InvalidSignature)?;
        let expected = decode_hex(digest).map_err(|_| WebhookError::InvalidSignature)?;
        let mut mac =
            Hmac::<Sha1>::new_from_slice(secret).map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(payload);
        return mac
            .verify_slice(&expected)
            .map_err(|_| WebhookError::InvalidSignature);
    }
    Err(WebhookError::MissingSignature)
}

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("signature digest cannot be empty");
    }
    if trimmed.len() % 2 != 0 || !trimmed.is_ascii() {
        bail!("signature digest must be an even number of hex characters");
    }
    (0..trimmed.len())
        .step_by(2)
        .map(|index| {
            let chunk = &trimmed[index..index + 2];
            u8::from_str_radix(chunk, 16)
                .with_context(|| format!("invalid hex byte '{chunk}' in signature digest"))
        })
        .collect()
}
