use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use super::{EmailSender, OutgoingEmail};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

pub struct ResendEmailSender {
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl ResendEmailSender {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }

    fn payload(&self, email: &OutgoingEmail) -> serde_json::Value {
        let attachments: Vec<_> = email
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "filename": a.filename,
                    "content": base64::engine::general_purpose::STANDARD.encode(&a.content),
                    "content_type": a.content_type,
                })
            })
            .collect();

        let mut body = json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
            "text": email.text,
        });
        if !attachments.is_empty() {
            body["attachments"] = json!(attachments);
        }
        body
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send_email(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&self.payload(email))
            .send()
            .await
            .context("failed to call Resend API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Resend API error ({status}): {body}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::messaging::EmailAttachment;

    #[test]
    fn test_payload_encodes_attachments() {
        let sender = ResendEmailSender::new("key".to_string(), "Studio <hi@studio.test>".to_string());
        let email = OutgoingEmail {
            to: "dana@example.com".to_string(),
            subject: "Booked".to_string(),
            html: "<p>hi</p>".to_string(),
            text: "hi".to_string(),
            attachments: vec![EmailAttachment {
                filename: "invite.ics".to_string(),
                content_type: "text/calendar".to_string(),
                content: b"BEGIN:VCALENDAR".to_vec(),
            }],
        };

        let payload = sender.payload(&email);
        assert_eq!(payload["from"], "Studio <hi@studio.test>");
        assert_eq!(payload["to"][0], "dana@example.com");
        assert_eq!(payload["attachments"][0]["filename"], "invite.ics");
        assert_eq!(payload["attachments"][0]["content"], "QkVHSU46VkNBTEVOREFS");
    }

    #[test]
    fn test_payload_omits_empty_attachments() {
        let sender = ResendEmailSender::new("key".to_string(), "from@studio.test".to_string());
        let email = OutgoingEmail {
            to: "p@studio.test".to_string(),
            subject: "New call".to_string(),
            html: String::new(),
            text: String::new(),
            attachments: vec![],
        };
        assert!(sender.payload(&email).get("attachments").is_none());
    }
}
