// Outbound webhook delivery: request body, headers and HMAC signing

use crate::errors::DeliveryError;
use crate::models::Reminder;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use serde_json::value::RawValue;
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_APP_ID: &str = "X-App-Id";
pub const HEADER_DELIVERY: &str = "X-URNS-Delivery";
pub const HEADER_REMINDER_ID: &str = "X-URNS-Reminder-Id";
pub const HEADER_SIGNATURE: &str = "X-URNS-Signature";

/// One delivery attempt for one firing cycle
#[derive(Debug, Clone)]
pub struct Delivery {
    pub reminder_id: Uuid,
    pub app_id: String,
    pub webhook_url: String,
    pub fired_at: DateTime<Utc>,
    pub payload: Box<RawValue>,
    /// 1-based attempt number within the cycle
    pub attempt: u32,
}

impl Delivery {
    pub fn new(reminder: &Reminder, fired_at: DateTime<Utc>, attempt: u32) -> Self {
        Self {
            reminder_id: reminder.id,
            app_id: reminder.app_id.clone(),
            webhook_url: reminder.webhook_url.clone(),
            fired_at,
            payload: reminder.payload.clone(),
            attempt,
        }
    }

    /// JSON body `{reminder_id, app_id, fired_at, payload}`
    pub fn body(&self) -> Result<Vec<u8>, DeliveryError> {
        let body = WebhookBody {
            reminder_id: self.reminder_id,
            app_id: &self.app_id,
            fired_at: self.fired_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            payload: &self.payload,
        };
        serde_json::to_vec(&body).map_err(|e| DeliveryError::Encoding(e.to_string()))
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    reminder_id: Uuid,
    app_id: &'a str,
    fired_at: String,
    payload: &'a RawValue,
}

/// Sign a delivery body with HMAC-SHA256, hex encoded
pub fn sign_body(body: &[u8], secret: &str) -> Result<String, DeliveryError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::Encoding(format!("Invalid signing key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature produced by [`sign_body`]
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Notifier performs exactly one delivery attempt
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, delivery: &Delivery) -> Result<(), DeliveryError>;
}

/// Notifier posting JSON to the reminder's webhook URL
pub struct WebhookNotifier {
    client: Client,
    signing_secret: Option<String>,
}

impl WebhookNotifier {
    /// Create a notifier whose requests time out after `request_timeout`
    pub fn new(
        request_timeout: Duration,
        signing_secret: Option<String>,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("urns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip(self, delivery), fields(reminder_id = %delivery.reminder_id, attempt = delivery.attempt))]
    async fn notify(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let body = delivery.body()?;

        let mut request = self
            .client
            .post(&delivery.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_APP_ID, &delivery.app_id)
            .header(HEADER_DELIVERY, delivery.attempt.to_string())
            .header(HEADER_REMINDER_ID, delivery.reminder_id.to_string());

        if let Some(secret) = &self.signing_secret {
            request = request.header(HEADER_SIGNATURE, sign_body(&body, secret)?);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Webhook responded");

        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReminderKind, ReminderStatus};
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reminder(url: String) -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            app_id: "weather".to_string(),
            kind: ReminderKind::Time,
            when: None,
            cron_expr: None,
            webhook_url: url,
            payload: RawValue::from_string(r#"{"city":"Oslo","n":1.50}"#.to_string()).unwrap(),
            idempotency_key: None,
            status: ReminderStatus::Scheduled,
            attempts: 0,
            last_error: None,
            next_run_time: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_body_preserves_payload_bytes() {
        let rem = reminder("http://localhost/hook".to_string());
        let fired_at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let delivery = Delivery::new(&rem, fired_at, 1);
        let body = String::from_utf8(delivery.body().unwrap()).unwrap();

        assert!(body.contains(r#""payload":{"city":"Oslo","n":1.50}"#));
        assert!(body.contains(r#""fired_at":"2026-05-01T12:00:00Z""#));
        assert!(body.contains(&rem.id.to_string()));
    }

    #[test]
    fn test_signature_roundtrip() {
        let sig = sign_body(b"payload", "secret").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(b"payload", &sig, "secret"));
        assert!(!verify_signature(b"payload2", &sig, "secret"));
        assert!(!verify_signature(b"payload", &sig, "other"));
        assert!(!verify_signature(b"payload", "not-hex", "secret"));
    }

    #[tokio::test]
    async fn test_notify_posts_json_with_headers() {
        let server = MockServer::start().await;
        let rem = reminder(format!("{}/hooks/reminder", server.uri()));
        let fired_at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        Mock::given(method("POST"))
            .and(path("/hooks/reminder"))
            .and(header(HEADER_APP_ID, "weather"))
            .and(header(HEADER_DELIVERY, "2"))
            .and(header(HEADER_REMINDER_ID, rem.id.to_string()))
            .and(header_exists(HEADER_SIGNATURE))
            .and(body_json(serde_json::json!({
                "reminder_id": rem.id,
                "app_id": "weather",
                "fired_at": "2026-05-01T12:00:00Z",
                "payload": {"city": "Oslo", "n": 1.5},
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(Duration::from_secs(5), Some("secret".to_string())).unwrap();
        let result = notifier.notify(&Delivery::new(&rem, fired_at, 2)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_notify_reports_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Duration::from_secs(5), None).unwrap();
        let rem = reminder(format!("{}/hook", server.uri()));
        let err = notifier
            .notify(&Delivery::new(&rem, Utc::now(), 1))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::Status { status: 503 });
    }

    #[tokio::test]
    async fn test_notify_reports_transport_error() {
        let notifier = WebhookNotifier::new(Duration::from_millis(500), None).unwrap();
        // Port 9 (discard) is not expected to accept connections
        let rem = reminder("http://127.0.0.1:9/hook".to_string());
        let err = notifier
            .notify(&Delivery::new(&rem, Utc::now(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
