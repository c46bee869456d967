//! SNS message signature verification.
//!
//! The provider signs an exact, field-ordered canonical string with the RSA
//! key behind `SigningCertURL` (SHA-1 digest, PKCS#1 v1.5). Verification
//! reconstructs that string byte-for-byte, checks the certificate URL against
//! the signing-authority host pattern, and verifies the base64-decoded
//! signature with the fetched (and cached) public key. Any mismatch rejects
//! the whole message.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::{Digest, Sha1};
use thiserror::Error;
use url::Url;

use crate::envelope::Envelope;
use crate::web::certs::{CertCache, CertFetcher};

/// Signature verification failures. All map to request rejection.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("missing field {0} required for verification")]
    MissingField(&'static str),

    #[error("signing certificate URL not trusted: {0}")]
    UntrustedCertUrl(String),

    #[error("certificate fetch failed: {0}")]
    CertFetch(String),

    #[error("certificate public key invalid: {0}")]
    KeyDecode(String),

    #[error("signature not valid base64: {0}")]
    SignatureDecode(String),

    #[error("signature does not match canonical string")]
    Mismatch,
}

/// Check that a signing certificate URL belongs to the signing authority:
/// https, host `sns.<region>.amazonaws.com`.
pub fn cert_url_allowed(cert_url: &str) -> bool {
    let Ok(url) = Url::parse(cert_url) else {
        return false;
    };
    if url.scheme() != "https" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let Some(region) = host
        .strip_prefix("sns.")
        .and_then(|rest| rest.strip_suffix(".amazonaws.com"))
    else {
        return false;
    };
    !region.is_empty()
        && region
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Build the canonical string the signature covers.
///
/// Field order is fixed per message kind; each field is emitted as
/// `Name\nvalue\n` and no other fields participate.
pub fn canonical_string(envelope: &Envelope) -> Result<String, SignatureError> {
    let mut canonical = String::new();

    if envelope.kind.is_confirmation() {
        let token = envelope
            .token
            .as_deref()
            .ok_or(SignatureError::MissingField("Token"))?;
        let subscribe_url = envelope
            .subscribe_url
            .as_deref()
            .ok_or(SignatureError::MissingField("SubscribeURL"))?;

        push_field(&mut canonical, "Message", &envelope.message);
        push_field(&mut canonical, "MessageId", &envelope.message_id);
        push_field(&mut canonical, "SubscribeURL", subscribe_url);
        push_field(&mut canonical, "Timestamp", &envelope.timestamp);
        push_field(&mut canonical, "Token", token);
        push_field(&mut canonical, "TopicArn", &envelope.topic_arn);
        push_field(&mut canonical, "Type", envelope.kind.as_str());
    } else {
        push_field(&mut canonical, "Message", &envelope.message);
        push_field(&mut canonical, "MessageId", &envelope.message_id);
        if let Some(subject) = envelope.subject.as_deref() {
            push_field(&mut canonical, "Subject", subject);
        }
        push_field(&mut canonical, "Timestamp", &envelope.timestamp);
        push_field(&mut canonical, "TopicArn", &envelope.topic_arn);
        push_field(&mut canonical, "Type", envelope.kind.as_str());
    }

    Ok(canonical)
}

fn push_field(canonical: &mut String, name: &str, value: &str) {
    canonical.push_str(name);
    canonical.push('\n');
    canonical.push_str(value);
    canonical.push('\n');
}

/// Verifies envelope signatures using cached signing certificates.
pub struct SignatureVerifier {
    fetcher: Arc<dyn CertFetcher>,
    cache: CertCache,
}

impl SignatureVerifier {
    pub fn new(fetcher: Arc<dyn CertFetcher>, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: CertCache::new(cache_ttl),
        }
    }

    /// Verify the envelope signature. Any failure rejects the message.
    pub async fn verify(&self, envelope: &Envelope) -> Result<(), SignatureError> {
        let cert_url = envelope
            .signing_cert_url
            .as_deref()
            .ok_or(SignatureError::MissingField("SigningCertURL"))?;

        if !cert_url_allowed(cert_url) {
            return Err(SignatureError::UntrustedCertUrl(cert_url.to_string()));
        }

        let signature_b64 = envelope
            .signature
            .as_deref()
            .ok_or(SignatureError::MissingField("Signature"))?;

        let spki = match self.cache.get(cert_url).await {
            Some(cached) => cached,
            None => {
                let fetched = self
                    .fetcher
                    .fetch_spki(cert_url)
                    .await
                    .map_err(|e| SignatureError::CertFetch(e.to_string()))?;
                self.cache.insert(cert_url, fetched.clone()).await;
                fetched
            }
        };

        let public_key = RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| SignatureError::KeyDecode(e.to_string()))?;

        let signature = BASE64
            .decode(signature_b64)
            .map_err(|e| SignatureError::SignatureDecode(e.to_string()))?;

        let canonical = canonical_string(envelope)?;
        let digest = Sha1::digest(canonical.as_bytes());

        public_key
            .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
            .map_err(|_| SignatureError::Mismatch)
    }
}
