//! Templated outbound mail over the SendGrid v3 API.

use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.sendgrid.com";
// A hung dispatch must not stall the rest of a scheduler batch.
const SEND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum SendEmailError {
    #[error("SENDGRID_API_KEY not set")]
    MissingApiKey,
    #[error("from address missing")]
    MissingFrom,
    #[error("no recipients")]
    NoRecipients,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sendgrid rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct SendTemplatedParams {
    pub to: Vec<String>,
    pub from: Option<String>,
    pub template_id: String,
    pub dynamic_template_data: Value,
}

#[derive(Debug, Clone)]
pub struct SendEmailResponse {
    pub status: u16,
    pub message_id: Option<String>,
}

/// Send one templated mail. The API key comes from `SENDGRID_API_KEY`; the
/// from address falls back to `MAIL_FROM` when the params carry none.
pub fn send_templated_email(
    params: &SendTemplatedParams,
) -> Result<SendEmailResponse, SendEmailError> {
    dotenvy::dotenv().ok();
    let api_key = std::env::var("SENDGRID_API_KEY")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(SendEmailError::MissingApiKey)?;
    let api_base =
        std::env::var("SENDGRID_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    send_templated_email_with(&api_base, &api_key, params)
}

pub(crate) fn send_templated_email_with(
    api_base: &str,
    api_key: &str,
    params: &SendTemplatedParams,
) -> Result<SendEmailResponse, SendEmailError> {
    if params.to.is_empty() {
        return Err(SendEmailError::NoRecipients);
    }
    let from = params
        .from
        .clone()
        .or_else(|| std::env::var("MAIL_FROM").ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(SendEmailError::MissingFrom)?;

    let recipients: Vec<Value> = params
        .to
        .iter()
        .map(|email| json!({ "email": email }))
        .collect();
    let payload = json!({
        "from": { "email": from },
        "template_id": params.template_id,
        "personalizations": [{
            "to": recipients,
            "dynamic_template_data": params.dynamic_template_data,
        }],
    });

    let client = reqwest::blocking::Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()?;
    let response = client
        .post(format!(
            "{}/v3/mail/send",
            api_base.trim_end_matches('/')
        ))
        .bearer_auth(api_key)
        .json(&payload)
        .send()?;

    let status = response.status();
    let message_id = response
        .headers()
        .get("X-Message-Id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SendEmailError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(SendEmailResponse {
        status: status.as_u16(),
        message_id,
    })
}
