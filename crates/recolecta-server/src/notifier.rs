//! Webhook delivery of assignment notices.

use recolecta_core::error::ErrorCode;
use recolecta_core::model::PickupRequest;
use recolecta_core::notify::{Notifier, NotifyError};
use std::time::Duration;

/// POSTs each assignment notice to a configured webhook endpoint.
///
/// Delivery happens on a detached thread so the claim response never waits
/// on the notification channel; a failed or timed-out POST is logged and
/// dropped. Whatever sits behind the webhook owns any retry policy.
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    #[must_use]
    pub const fn new(url: String, timeout: Duration) -> Self {
        Self { url, timeout }
    }
}

impl Notifier for WebhookNotifier {
    fn assignment(&self, request: &PickupRequest) -> Result<(), NotifyError> {
        let url = self.url.clone();
        let timeout = self.timeout;
        let payload = serde_json::json!({
            "event": "request.assigned",
            "request": request,
        });
        let request_id = request.id.clone();

        std::thread::spawn(move || {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            match agent.post(&url).send_json(payload) {
                Ok(response) => tracing::debug!(
                    request_id = %request_id,
                    status = response.status(),
                    "assignment webhook delivered"
                ),
                Err(err) => tracing::warn!(
                    request_id = %request_id,
                    code = %ErrorCode::NotifyFailed,
                    %err,
                    "assignment webhook delivery failed; assignment stands"
                ),
            }
        });

        Ok(())
    }
}
