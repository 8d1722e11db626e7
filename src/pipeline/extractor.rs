//! Extraction engine: pulls the message, tracking link and position out of
//! an inReach notification email body.
//!
//! The provider's plain-text layout is not stable, so each sub-extraction
//! degrades to a placeholder instead of failing:
//! - message text: non-blank lines up to the "View the location" boundary
//! - tracking link: URL pattern → line after the reply prompt → raw substring
//! - coordinates: `Lat <float> Lon <float>`, omitted when absent
//!
//! Pure string parsing: no I/O, no state.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::pipeline::types::{Coordinates, NO_MESSAGE_CONTENT, ParsedNotification, TrackingLink};

/// Line prefix that ends the free-text section of the body.
const MESSAGE_BOUNDARY_PREFIX: &str = "View the location";

/// Prompt line that precedes the tracking link.
const REPLY_PROMPT: &str = "View the location or send a reply";

/// Substring located by the last-resort link scan.
const RAW_LINK_MARKER: &str = "eur.explore.garmin.com/textmessage/txtmsg";

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://\S+garmin\.com/textmessage/txtmsg\?\S+").expect("link pattern is valid")
});

static LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Lat\s+(-?\d+\.\d+)\s+Lon\s+(-?\d+\.\d+)").expect("location pattern is valid")
});

/// Which extraction tier produced the tracking link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// Full URL pattern match.
    Pattern,
    /// Line following the reply prompt.
    ReplyPromptLine,
    /// Raw substring scan.
    Substring,
    /// Nothing recognisable; sentinel used.
    NotFound,
}

/// Parse an email body into a [`ParsedNotification`]. Never fails.
pub fn extract(body: &str) -> ParsedNotification {
    debug!(len = body.len(), "Extracting notification from email body");

    let message_text = extract_message(body);
    let (tracking_link, source) = extract_link(body);
    let coordinates = extract_coordinates(body);

    debug!(
        link_source = ?source,
        has_coordinates = coordinates.is_some(),
        "Parsed notification"
    );

    ParsedNotification {
        message_text,
        tracking_link,
        coordinates,
    }
}

/// Collect the free-text lines that precede the reply prompt.
///
/// Lines are trimmed and blank lines dropped; if nothing is collected the
/// [`NO_MESSAGE_CONTENT`] fallback is returned.
pub fn extract_message(body: &str) -> String {
    let mut lines = Vec::new();

    for line in body.trim().lines() {
        let line = line.trim();
        if line.starts_with(MESSAGE_BOUNDARY_PREFIX) {
            break;
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }

    if lines.is_empty() {
        NO_MESSAGE_CONTENT.to_string()
    } else {
        lines.join("\n")
    }
}

/// Find the tracking link, trying each tier in order.
pub fn extract_link(body: &str) -> (TrackingLink, LinkSource) {
    if let Some(m) = LINK_PATTERN.find(body) {
        debug!(link = m.as_str(), "Found link using pattern");
        return (TrackingLink::Found(m.as_str().to_string()), LinkSource::Pattern);
    }

    if let Some(link) = link_after_reply_prompt(body) {
        debug!(link = %link, "Found link on line after reply prompt");
        return (TrackingLink::Found(link), LinkSource::ReplyPromptLine);
    }

    if let Some(link) = link_from_raw_marker(body) {
        debug!(link = %link, "Found link by substring scan");
        return (TrackingLink::Found(link), LinkSource::Substring);
    }

    warn!("No tracking link found in email body");
    (TrackingLink::NotFound, LinkSource::NotFound)
}

fn link_after_reply_prompt(body: &str) -> Option<String> {
    let lines: Vec<&str> = body.split('\n').collect();

    lines.windows(2).find_map(|pair| {
        (pair[0].contains(REPLY_PROMPT) && pair[1].contains("garmin.com"))
            .then(|| pair[1].trim().to_string())
    })
}

fn link_from_raw_marker(body: &str) -> Option<String> {
    let pos = body.find(RAW_LINK_MARKER)?;

    // Keep the scheme when it directly precedes the marker.
    let head = &body[..pos];
    let start = ["https://", "http://"]
        .iter()
        .find(|scheme| head.ends_with(*scheme))
        .map_or(pos, |scheme| pos - scheme.len());

    let rest = &body[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    let link = rest[..end].trim();

    (!link.is_empty()).then(|| link.to_string())
}

/// Extract `Lat X Lon Y`, preserving the decimal text as written.
pub fn extract_coordinates(body: &str) -> Option<Coordinates> {
    let Some(caps) = LOCATION_PATTERN.captures(body) else {
        debug!("No coordinates found in email body");
        return None;
    };

    let latitude = caps.get(1)?.as_str();
    let longitude = caps.get(2)?.as_str();
    debug!(latitude, longitude, "Found coordinates");
    Some(Coordinates::new(latitude, longitude))
}
