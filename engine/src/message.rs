//! Notification text rendering
//!
//! Gateways receive a ready-to-send [`Payload`]; formatting lives here so
//! every channel says the same thing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AttemptKind, Downtime, EventType};

/// Rendered message for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub subject: String,
    pub body: String,
}

/// Everything a message may mention
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    pub network_name: &'a str,
    pub downtime: &'a Downtime,
    pub level: u32,
    /// Name of whoever acknowledged, for `Response` messages
    pub responder: Option<&'a str>,
    /// When the message is being produced
    pub at: DateTime<Utc>,
}

/// Render the payload for an attempt of `kind` about `event_type`.
pub fn render(kind: AttemptKind, event_type: EventType, ctx: &MessageContext<'_>) -> Payload {
    let name = ctx.network_name;
    let dt = ctx.downtime;
    let since = dt.start.format("%Y-%m-%d %H:%M UTC");

    match (kind, event_type) {
        (AttemptKind::Alert, EventType::Intermittent) => Payload {
            subject: format!("[INTERMITTENT] {} (level {})", name, ctx.level),
            body: format!(
                "Link {} has been unstable since {} ({} so far). Escalation level {}. \
                 Reply to this message to acknowledge.",
                name,
                since,
                format_duration(ctx.at - dt.start),
                ctx.level
            ),
        },
        (AttemptKind::Alert, _) => Payload {
            subject: format!("[DOWN] {} (level {})", name, ctx.level),
            body: format!(
                "Link {} has been down since {} ({} so far). Escalation level {}. \
                 Reply to this message to acknowledge.",
                name,
                since,
                format_duration(ctx.at - dt.start),
                ctx.level
            ),
        },
        (AttemptKind::Update, EventType::Uptime) => {
            let end = dt.end.unwrap_or(ctx.at);
            Payload {
                subject: format!("[UP] {}", name),
                body: format!(
                    "Link {} recovered at {}. Outage lasted {}.",
                    name,
                    end.format("%Y-%m-%d %H:%M UTC"),
                    format_duration(end - dt.start)
                ),
            }
        }
        (AttemptKind::Update, EventType::Intermittent) => Payload {
            subject: format!("[UPDATE] {} intermittent", name),
            body: format!(
                "Link {} is responding intermittently; the outage opened at {} remains active.",
                name, since
            ),
        },
        (AttemptKind::Update, EventType::Downtime) => Payload {
            subject: format!("[UPDATE] {}", name),
            body: enrichment_summary(name, dt),
        },
        (AttemptKind::Response, _) => Payload {
            subject: format!("[ACK] {}", name),
            body: format!(
                "Acknowledged by {}. Escalation for {} has stopped.",
                ctx.responder.unwrap_or("a recipient"),
                name
            ),
        },
    }
}

fn enrichment_summary(name: &str, dt: &Downtime) -> String {
    let mut lines = vec![format!("Outage on {} updated.", name)];
    if let Some(category) = dt.category {
        match &dt.subcategory {
            Some(sub) => lines.push(format!("Cause: {} / {}", category, sub)),
            None => lines.push(format!("Cause: {}", category)),
        }
    }
    if let Some(ticket) = &dt.ticket_number {
        lines.push(format!("Ticket: {}", ticket));
    }
    if let Some(description) = &dt.description {
        lines.push(description.clone());
    }
    lines.join("\n")
}

/// `1h 05m`, `12m`, `45s`
pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DowntimeCategory, LinkStatus};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::minutes(12)), "12m");
        assert_eq!(format_duration(Duration::minutes(65)), "1h 05m");
        assert_eq!(format_duration(Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_alert_mentions_level() {
        let start = Utc::now();
        let dt = Downtime::open("net-1", LinkStatus::Down, start);
        let ctx = MessageContext {
            network_name: "Branch 7",
            downtime: &dt,
            level: 3,
            responder: None,
            at: start + Duration::minutes(30),
        };
        let payload = render(AttemptKind::Alert, EventType::Downtime, &ctx);
        assert_eq!(payload.subject, "[DOWN] Branch 7 (level 3)");
        assert!(payload.body.contains("30m so far"));
    }

    #[test]
    fn test_uptime_reports_duration() {
        let start = Utc::now();
        let mut dt = Downtime::open("net-1", LinkStatus::Down, start);
        dt.resolve(start + Duration::minutes(90));
        let ctx = MessageContext {
            network_name: "Branch 7",
            downtime: &dt,
            level: 1,
            responder: None,
            at: start + Duration::minutes(90),
        };
        let payload = render(AttemptKind::Update, EventType::Uptime, &ctx);
        assert_eq!(payload.subject, "[UP] Branch 7");
        assert!(payload.body.contains("1h 30m"));
    }

    #[test]
    fn test_enrichment_update_lists_fields() {
        let mut dt = Downtime::open("net-1", LinkStatus::Down, Utc::now());
        dt.category = Some(DowntimeCategory::IspOutage);
        dt.subcategory = Some("fiber_cut".to_string());
        dt.ticket_number = Some("INC-42".to_string());
        let ctx = MessageContext {
            network_name: "Branch 7",
            downtime: &dt,
            level: 1,
            responder: None,
            at: Utc::now(),
        };
        let payload = render(AttemptKind::Update, EventType::Downtime, &ctx);
        assert!(payload.body.contains("Cause: isp_outage / fiber_cut"));
        assert!(payload.body.contains("Ticket: INC-42"));
    }
}
