//! Inbound pub/sub message envelope.
//!
//! Every webhook call carries one JSON envelope. The raw form is whatever the
//! provider posted; [`Envelope::from_raw`] is the gate that turns it into a
//! validated message or rejects it before any state is touched.

use serde::Deserialize;

use crate::error::WebhookError;

/// The three envelope kinds the service accepts.
///
/// Anything else is rejected as a client error rather than silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SubscriptionConfirmation,
    Notification,
    UnsubscribeConfirmation,
}

impl MessageKind {
    /// The wire name, as it appears in the `Type` field and in the
    /// canonical string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::SubscriptionConfirmation => "SubscriptionConfirmation",
            MessageKind::Notification => "Notification",
            MessageKind::UnsubscribeConfirmation => "UnsubscribeConfirmation",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, WebhookError> {
        match raw {
            "SubscriptionConfirmation" => Ok(MessageKind::SubscriptionConfirmation),
            "Notification" => Ok(MessageKind::Notification),
            "UnsubscribeConfirmation" => Ok(MessageKind::UnsubscribeConfirmation),
            other => Err(WebhookError::UnknownMessageType(other.to_string())),
        }
    }

    /// Subscription and unsubscribe confirmations share a canonical string
    /// layout that includes `SubscribeURL` and `Token`.
    pub fn is_confirmation(&self) -> bool {
        matches!(
            self,
            MessageKind::SubscriptionConfirmation | MessageKind::UnsubscribeConfirmation
        )
    }
}

/// Raw envelope exactly as posted. All fields optional so that presence
/// checks are ours, not serde's.
#[derive(Debug, Default, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "MessageId")]
    pub message_id: Option<String>,
    #[serde(rename = "TopicArn")]
    pub topic_arn: Option<String>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "SignatureVersion")]
    pub signature_version: Option<String>,
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
    #[serde(rename = "SigningCertURL")]
    pub signing_cert_url: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "Token")]
    pub token: Option<String>,
    #[serde(rename = "SubscribeURL")]
    pub subscribe_url: Option<String>,
    #[serde(rename = "UnsubscribeURL")]
    pub unsubscribe_url: Option<String>,
}

/// A validated inbound message. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: MessageKind,
    pub message_id: String,
    pub topic_arn: String,
    pub message: String,
    pub timestamp: String,
    pub signature: Option<String>,
    pub signing_cert_url: Option<String>,
    pub subject: Option<String>,
    pub token: Option<String>,
    pub subscribe_url: Option<String>,
}

impl Envelope {
    /// Validate a raw envelope.
    ///
    /// `Type`, `MessageId` and `TopicArn` are always required; confirmation
    /// kinds additionally require `Token` and `SubscribeURL` because both
    /// participate in the canonical string and the confirmation callback.
    pub fn from_raw(raw: RawEnvelope) -> Result<Self, WebhookError> {
        let kind_raw = require(raw.kind, "Type")?;
        let kind = MessageKind::parse(&kind_raw)?;
        let message_id = require(raw.message_id, "MessageId")?;
        let topic_arn = require(raw.topic_arn, "TopicArn")?;

        let (token, subscribe_url) = if kind.is_confirmation() {
            (
                Some(require(raw.token, "Token")?),
                Some(require(raw.subscribe_url, "SubscribeURL")?),
            )
        } else {
            (raw.token, raw.subscribe_url)
        };

        Ok(Envelope {
            kind,
            message_id,
            topic_arn,
            message: raw.message.unwrap_or_default(),
            timestamp: raw.timestamp.unwrap_or_default(),
            signature: raw.signature,
            signing_cert_url: raw.signing_cert_url,
            subject: raw.subject,
            token,
            subscribe_url,
        })
    }
}

fn require(field: Option<String>, name: &'static str) -> Result<String, WebhookError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(WebhookError::MalformedEnvelope(format!(
            "missing required field {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_notification() -> RawEnvelope {
        RawEnvelope {
            kind: Some("Notification".to_string()),
            message_id: Some("msg-1".to_string()),
            topic_arn: Some("arn:aws:sns:us-east-1:123:media-events".to_string()),
            message: Some("{}".to_string()),
            timestamp: Some("2024-01-01T00:00:00.000Z".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_notification_from_raw() {
        let envelope = Envelope::from_raw(raw_notification()).unwrap();
        assert_eq!(envelope.kind, MessageKind::Notification);
        assert_eq!(envelope.message_id, "msg-1");
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        for strip in ["Type", "MessageId", "TopicArn"] {
            let mut raw = raw_notification();
            match strip {
                "Type" => raw.kind = None,
                "MessageId" => raw.message_id = None,
                _ => raw.topic_arn = None,
            }
            let err = Envelope::from_raw(raw).unwrap_err();
            assert!(matches!(err, WebhookError::MalformedEnvelope(_)));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut raw = raw_notification();
        raw.kind = Some("SomethingElse".to_string());
        let err = Envelope::from_raw(raw).unwrap_err();
        assert!(matches!(err, WebhookError::UnknownMessageType(_)));
    }

    #[test]
    fn test_confirmation_requires_token_and_subscribe_url() {
        let mut raw = raw_notification();
        raw.kind = Some("SubscriptionConfirmation".to_string());
        let err = Envelope::from_raw(raw).unwrap_err();
        assert!(matches!(err, WebhookError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_confirmation_with_token_and_url() {
        let mut raw = raw_notification();
        raw.kind = Some("UnsubscribeConfirmation".to_string());
        raw.token = Some("tok".to_string());
        raw.subscribe_url = Some("https://sns.us-east-1.amazonaws.com/?Action=Confirm".to_string());
        let envelope = Envelope::from_raw(raw).unwrap();
        assert!(envelope.kind.is_confirmation());
        assert_eq!(envelope.token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_raw_envelope_deserialization() {
        let json = r#"{
            "Type": "Notification",
            "MessageId": "abc",
            "TopicArn": "arn:aws:sns:us-east-1:123:media-events",
            "Message": "{\"Records\":[]}",
            "Timestamp": "2024-01-01T00:00:00.000Z",
            "SignatureVersion": "1",
            "Signature": "c2ln",
            "SigningCertURL": "https://sns.us-east-1.amazonaws.com/cert.pem",
            "Subject": "Amazon S3 Notification"
        }"#;

        let raw: RawEnvelope = serde_json::from_str(json).unwrap();
        let envelope = Envelope::from_raw(raw).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("Amazon S3 Notification"));
        assert_eq!(envelope.signature.as_deref(), Some("c2ln"));
    }
}
