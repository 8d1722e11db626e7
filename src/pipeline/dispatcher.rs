//! Relay dispatcher: renders a [`ParsedNotification`] as a chat card and
//! hands it to the messaging gateway.
//!
//! Delivery failures are reported as `false`, never raised: one failed
//! notification must not abort the rest of the batch.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::channels::channel::{Channel, NotificationPayload, PayloadField};
use crate::pipeline::types::ParsedNotification;

/// Default card title.
pub const DEFAULT_TITLE: &str = "inReach Message";

/// Fixed card footer.
pub const FOOTER: &str = "inReach Satellite Communicator";

/// Card accent colour (green).
pub const CARD_COLOR: u32 = 0x00FF00;

pub const TRACKING_LINK_FIELD: &str = "Tracking Link";
pub const LOCATION_FIELD: &str = "Location";
pub const MAPS_FIELD: &str = "Google Maps";

/// Map URL for a position.
pub fn maps_url(latitude: &str, longitude: &str) -> String {
    format!("https://www.google.com/maps?q={latitude},{longitude}")
}

/// Build the display payload for a notification.
///
/// The tracking-link field is omitted when the link is the "not found"
/// sentinel; location and map fields only appear when coordinates exist.
pub fn build_payload(title: &str, notification: &ParsedNotification) -> NotificationPayload {
    let mut fields = Vec::new();

    if let Some(url) = notification.tracking_link.url() {
        fields.push(PayloadField {
            name: TRACKING_LINK_FIELD.into(),
            value: format!("[View Location or Reply]({url})"),
            inline: false,
        });
    }

    if let Some(coords) = &notification.coordinates {
        fields.push(PayloadField {
            name: LOCATION_FIELD.into(),
            value: format!("Lat: {}, Lon: {}", coords.latitude, coords.longitude),
            inline: true,
        });
        fields.push(PayloadField {
            name: MAPS_FIELD.into(),
            value: format!(
                "[Open in Maps]({})",
                maps_url(&coords.latitude, &coords.longitude)
            ),
            inline: true,
        });
    }

    NotificationPayload {
        title: title.to_string(),
        description: notification.message_text.clone(),
        color: CARD_COLOR,
        fields,
        timestamp: Utc::now(),
        footer: FOOTER.to_string(),
    }
}

/// Sends notifications to a single gateway channel.
pub struct RelayDispatcher {
    channel: Arc<dyn Channel>,
    title: String,
}

impl RelayDispatcher {
    pub fn new(channel: Arc<dyn Channel>, title: impl Into<String>) -> Self {
        Self {
            channel,
            title: title.into(),
        }
    }

    /// Deliver one notification. Returns whether the gateway accepted it.
    pub async fn dispatch(&self, notification: &ParsedNotification) -> bool {
        let payload = build_payload(&self.title, notification);

        match self.channel.send_notification(&payload).await {
            Ok(()) => {
                info!(
                    channel = self.channel.name(),
                    fields = payload.fields.len(),
                    "Notification delivered"
                );
                true
            }
            Err(e) => {
                error!(channel = self.channel.name(), error = %e, "Failed to deliver notification");
                false
            }
        }
    }
}
