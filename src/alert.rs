use crate::model::{AlertConfig, HealthStatus, Target};
use serde_json::json;

/// Fires every enabled webhook for a status transition. Delivery is
/// best-effort: each webhook is posted from its own task and failures are
/// only logged.
pub async fn send_alert(
    target: &Target,
    status: HealthStatus,
    config: &AlertConfig,
    detail: Option<&str>,
) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let status_text = match status {
        HealthStatus::Up => "UP",
        HealthStatus::Degraded => "DEGRADED",
        HealthStatus::Down => "DOWN",
        HealthStatus::Unknown => return Ok(()),
    };
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let detail = detail.unwrap_or("");

    let client = reqwest::Client::new();

    for webhook in &config.webhooks {
        if !webhook.enabled || webhook.url.is_empty() {
            continue;
        }

        let payload = if let Some(tmpl) = &webhook.template {
            let mut body = tmpl.clone();
            body = body.replace("{{TARGET}}", &target.name);
            body = body.replace("{{URL}}", &target.url);
            body = body.replace("{{STATUS}}", status_text);
            body = body.replace("{{TIME}}", &timestamp);
            body = body.replace("{{MESSAGE}}", detail);

            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(v) => v,
                Err(_) => json!({ "text": body }),
            }
        } else {
            json!({
                "target": target.name,
                "url": target.url,
                "status": status_text,
                "timestamp": timestamp,
                "message": detail
            })
        };

        let client = client.clone();
        let url = webhook.url.clone();

        tokio::spawn(async move {
            tracing::debug!("Sending webhook to {}", url);
            match client.post(&url).json(&payload).send().await {
                Ok(res) => {
                    if !res.status().is_success() {
                        tracing::error!("Webhook failed with status {}: {}", res.status(), url);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to send webhook to {}: {}", url, e);
                }
            }
        });
    }

    Ok(())
}
