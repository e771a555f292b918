use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use leadhub_types::events::{HOOK_TOKEN_HEADER, HookEvent};

const DELIVERY_ATTEMPTS: u32 = 3;

/// Forward session events to the hub's listener webhook.
///
/// Delivery is best-effort with bounded retry; a hub outage must never back
/// up into the session event pump, so events that keep failing are dropped
/// with a warning.
pub async fn run_hook_forwarder(mut rx: mpsc::Receiver<HookEvent>, hub_url: String, token: String) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!("hook forwarder could not build HTTP client: {}", e);
            return;
        }
    };

    let endpoint = format!("{}/api/listener/inbound", hub_url.trim_end_matches('/'));

    while let Some(event) = rx.recv().await {
        deliver(&client, &endpoint, &token, &event).await;
    }
}

async fn deliver(client: &reqwest::Client, endpoint: &str, token: &str, event: &HookEvent) {
    for attempt in 1..=DELIVERY_ATTEMPTS {
        let result = client
            .post(endpoint)
            .header(HOOK_TOKEN_HEADER, token)
            .json(event)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("hook event delivered to hub");
                return;
            }
            Ok(resp) => warn!(
                "hub webhook returned {} (attempt {}/{})",
                resp.status(),
                attempt,
                DELIVERY_ATTEMPTS
            ),
            Err(e) => warn!(
                "hub webhook delivery failed (attempt {}/{}): {}",
                attempt, DELIVERY_ATTEMPTS, e
            ),
        }

        tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
    }

    warn!("dropping hook event after {} attempts", DELIVERY_ATTEMPTS);
}
