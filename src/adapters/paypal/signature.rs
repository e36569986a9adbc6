//! PayPal webhook transmission signatures.
//!
//! PayPal signs `transmission_id|transmission_time|webhook_id|crc32(body)`
//! with the private key of a certificate it publishes at `paypal-cert-url`,
//! using SHA256withRSA. Certificates are fetched ahead of time into a
//! [`CertificateCache`] so the check itself is synchronous.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::billing::{timestamp_within_window, WebhookHeaders};

pub const TRANSMISSION_ID: &str = "paypal-transmission-id";
pub const TRANSMISSION_TIME: &str = "paypal-transmission-time";
pub const TRANSMISSION_SIG: &str = "paypal-transmission-sig";
pub const CERT_URL: &str = "paypal-cert-url";
pub const AUTH_ALGO: &str = "paypal-auth-algo";

const SUPPORTED_ALGO: &str = "SHA256withRSA";

/// The five transmission headers, all required.
#[derive(Debug, Clone)]
pub struct TransmissionHeaders<'a> {
    pub transmission_id: &'a str,
    pub transmission_time: &'a str,
    pub transmission_sig: &'a str,
    pub cert_url: &'a str,
    pub auth_algo: &'a str,
}

impl<'a> TransmissionHeaders<'a> {
    pub fn from_headers(headers: &'a WebhookHeaders) -> Option<Self> {
        Some(Self {
            transmission_id: headers.get(TRANSMISSION_ID)?,
            transmission_time: headers.get(TRANSMISSION_TIME)?,
            transmission_sig: headers.get(TRANSMISSION_SIG)?,
            cert_url: headers.get(CERT_URL)?,
            auth_algo: headers.get(AUTH_ALGO)?,
        })
    }
}

/// CRC-32 (IEEE 802.3) of the raw body, as PayPal computes it.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// The exact string PayPal signs for one delivery.
pub fn signed_message(
    transmission_id: &str,
    transmission_time: &str,
    webhook_id: &str,
    payload: &[u8],
) -> String {
    format!(
        "{}|{}|{}|{}",
        transmission_id,
        transmission_time,
        webhook_id,
        crc32(payload)
    )
}

/// Certificates are only trusted from https URLs on paypal.com hosts.
pub fn is_trusted_cert_url(cert_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(cert_url) else {
        return false;
    };
    if url.scheme() != "https" {
        return false;
    }
    match url.host_str() {
        Some(host) => host == "paypal.com" || host.ends_with(".paypal.com"),
        None => false,
    }
}

/// Signing keys by certificate URL.
#[derive(Default)]
pub struct CertificateCache {
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl CertificateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, cert_url: &str) -> bool {
        self.keys
            .read()
            .map(|keys| keys.contains_key(cert_url))
            .unwrap_or(false)
    }

    /// Parses a PEM certificate (or public key) and caches its key.
    pub fn insert_pem(&self, cert_url: &str, pem: &[u8]) -> Result<(), jsonwebtoken::errors::Error> {
        let key = DecodingKey::from_rsa_pem(pem)?;
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(cert_url.to_string(), key);
        }
        Ok(())
    }

    /// Verifies a delivery. Every failure is `false`.
    pub fn verify(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
        webhook_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(transmission) = TransmissionHeaders::from_headers(headers) else {
            tracing::warn!("Missing PayPal transmission headers");
            return false;
        };
        if transmission.auth_algo != SUPPORTED_ALGO {
            tracing::warn!(auth_algo = transmission.auth_algo, "Unsupported PayPal auth algorithm");
            return false;
        }
        let Ok(sent_at) = DateTime::parse_from_rfc3339(transmission.transmission_time) else {
            tracing::warn!("Unparseable PayPal transmission time");
            return false;
        };
        if !timestamp_within_window(sent_at.timestamp(), now.timestamp()) {
            return false;
        }
        if !is_trusted_cert_url(transmission.cert_url) {
            tracing::warn!(cert_url = transmission.cert_url, "Untrusted PayPal certificate URL");
            return false;
        }
        let Ok(raw_signature) = STANDARD.decode(transmission.transmission_sig.trim()) else {
            return false;
        };

        let message = signed_message(
            transmission.transmission_id,
            transmission.transmission_time,
            webhook_id,
            payload,
        );

        let Ok(keys) = self.keys.read() else {
            return false;
        };
        let Some(key) = keys.get(transmission.cert_url) else {
            tracing::warn!(cert_url = transmission.cert_url, "PayPal certificate not loaded");
            return false;
        };

        let signature = URL_SAFE_NO_PAD.encode(raw_signature);
        jsonwebtoken::crypto::verify(&signature, message.as_bytes(), key, Algorithm::RS256)
            .unwrap_or(false)
    }
}
