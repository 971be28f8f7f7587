//! Best-effort fan-out after a booking changes: team and producer chat
//! webhooks, the CRM webhook and transactional email. Nothing here can fail
//! a booking; errors are logged and dropped.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::models::{Booking, BookingContext, Producer};
use crate::services::booking::BookingOutcome;
use crate::services::calendar::generate_ics;
use crate::services::messaging::{EmailAttachment, OutgoingEmail};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    Created,
    Rescheduled,
    Cancelled,
}

impl BookingEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEvent::Created => "booking.created",
            BookingEvent::Rescheduled => "booking.rescheduled",
            BookingEvent::Cancelled => "booking.cancelled",
        }
    }

    fn headline(&self) -> &'static str {
        match self {
            BookingEvent::Created => "New consultation booked",
            BookingEvent::Rescheduled => "Consultation rescheduled",
            BookingEvent::Cancelled => "Consultation cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManageLinks {
    pub reschedule_url: String,
    pub cancel_url: String,
    pub calendar_url: String,
}

impl ManageLinks {
    pub fn for_booking(site_url: &str, booking: &Booking) -> Self {
        let site = site_url.trim_end_matches('/');
        Self {
            reschedule_url: format!("{site}/book?reschedule={}", booking.reschedule_token),
            cancel_url: format!("{site}/book/cancel?token={}", booking.cancel_token),
            calendar_url: format!("{site}/calendar/{}.ics", booking.reschedule_token),
        }
    }
}

pub async fn notify_booking_saved(
    state: &AppState,
    outcome: &BookingOutcome,
    context: &BookingContext,
) {
    let event = if outcome.is_reschedule() {
        BookingEvent::Rescheduled
    } else {
        BookingEvent::Created
    };
    let booking = &outcome.booking;
    let producer = &outcome.producer;
    let links = ManageLinks::for_booking(&state.config.site_url, booking);
    let tz = state.config.display_tz_offset;

    let chat = chat_message(event, booking, Some(producer), context, &links, tz);
    post_chat(state, producer.slack_webhook_url.as_deref(), &chat).await;

    if let Some(url) = state.config.crm_webhook_url.as_deref() {
        let payload = crm_payload(event, booking, Some(producer), context, &links);
        if let Err(e) = state.webhooks.post_json(url, &payload).await {
            tracing::warn!(error = %e, booking_id = %booking.id, "CRM webhook failed");
        }
    }

    if let Some(email) = state.email.as_deref() {
        let client = client_email(event, booking, producer, &links, tz);
        if let Err(e) = email.send_email(&client).await {
            tracing::warn!(error = %e, booking_id = %booking.id, "client email failed");
        }

        let internal = producer_email(event, booking, producer, context, &links, tz);
        if let Err(e) = email.send_email(&internal).await {
            tracing::warn!(error = %e, booking_id = %booking.id, "producer email failed");
        }
    }
}

pub async fn notify_booking_cancelled(state: &AppState, booking: &Booking, producer: Option<&Producer>) {
    let links = ManageLinks::for_booking(&state.config.site_url, booking);
    let context = BookingContext {
        plan_pid: booking.plan_pid.clone(),
        ..Default::default()
    };
    let chat = chat_message(
        BookingEvent::Cancelled,
        booking,
        producer,
        &context,
        &links,
        state.config.display_tz_offset,
    );
    post_chat(state, producer.and_then(|p| p.slack_webhook_url.as_deref()), &chat).await;

    if let Some(url) = state.config.crm_webhook_url.as_deref() {
        let payload = crm_payload(BookingEvent::Cancelled, booking, producer, &context, &links);
        if let Err(e) = state.webhooks.post_json(url, &payload).await {
            tracing::warn!(error = %e, booking_id = %booking.id, "CRM webhook failed");
        }
    }
}

async fn post_chat(state: &AppState, producer_webhook: Option<&str>, chat: &serde_json::Value) {
    let team = state.config.slack_webhook_url.as_deref();
    if team.is_none() && producer_webhook.is_none() {
        tracing::debug!("no chat webhook configured, skipping notification");
        return;
    }

    for url in team.into_iter().chain(producer_webhook.filter(|p| Some(*p) != team)) {
        if let Err(e) = state.webhooks.post_json(url, chat).await {
            tracing::warn!(error = %e, "chat notification failed");
        }
    }
}

/// Chat webhook payload: plain `text` fallback plus a block layout.
pub fn chat_message(
    event: BookingEvent,
    booking: &Booking,
    producer: Option<&Producer>,
    context: &BookingContext,
    links: &ManageLinks,
    tz_offset: i32,
) -> serde_json::Value {
    let when = format_local(booking.start_time, tz_offset);
    let producer_name = producer.map(|p| p.name.as_str()).unwrap_or("Unassigned");
    let text = format!(
        "{}: {} <{}> on {} with {}",
        event.headline(),
        booking.name,
        booking.email,
        when,
        producer_name
    );

    let mut fields = vec![
        json!({"type": "mrkdwn", "text": format!("*Client:*\n{}", booking.name)}),
        json!({"type": "mrkdwn", "text": format!("*Email:*\n{}", booking.email)}),
        json!({"type": "mrkdwn", "text": format!("*When:*\n{when} ({} min)", booking.duration_minutes())}),
        json!({"type": "mrkdwn", "text": format!("*Producer:*\n{producer_name}")}),
    ];
    if let Some(phone) = &booking.phone {
        fields.push(json!({"type": "mrkdwn", "text": format!("*Phone:*\n{phone}")}));
    }

    let mut blocks = vec![
        json!({"type": "header", "text": {"type": "plain_text", "text": event.headline()}}),
        json!({"type": "section", "fields": fields}),
    ];

    if let Some(notes) = &booking.notes {
        blocks.push(json!({"type": "section", "text": {"type": "mrkdwn", "text": format!("*Notes:*\n{notes}")}}));
    }

    let meta: Vec<String> = context
        .entries()
        .into_iter()
        .map(|(label, value)| format!("*{label}:* {value}"))
        .collect();
    if !meta.is_empty() {
        blocks.push(json!({
            "type": "context",
            "elements": [{"type": "mrkdwn", "text": meta.join("  •  ")}],
        }));
    }

    if event != BookingEvent::Cancelled {
        blocks.push(json!({
            "type": "actions",
            "elements": [
                {"type": "button", "text": {"type": "plain_text", "text": "Reschedule"}, "url": links.reschedule_url},
                {"type": "button", "text": {"type": "plain_text", "text": "Cancel"}, "url": links.cancel_url, "style": "danger"},
            ],
        }));
    }

    json!({ "text": text, "blocks": blocks })
}

pub fn crm_payload(
    event: BookingEvent,
    booking: &Booking,
    producer: Option<&Producer>,
    context: &BookingContext,
    links: &ManageLinks,
) -> serde_json::Value {
    json!({
        "event": event.as_str(),
        "booking": {
            "id": booking.id,
            "name": booking.name,
            "email": booking.email,
            "phone": booking.phone,
            "notes": booking.notes,
            "start": booking.start_time.to_rfc3339(),
            "end": booking.end_time.to_rfc3339(),
            "status": booking.status.as_str(),
            "createdAt": booking.created_at.to_rfc3339(),
        },
        "producer": producer.map(|p| json!({"id": p.id, "name": p.name, "email": p.email})),
        "context": context,
        "links": {
            "reschedule": links.reschedule_url,
            "cancel": links.cancel_url,
            "calendar": links.calendar_url,
        },
    })
}

pub fn client_email(
    event: BookingEvent,
    booking: &Booking,
    producer: &Producer,
    links: &ManageLinks,
    tz_offset: i32,
) -> OutgoingEmail {
    let when = format_local(booking.start_time, tz_offset);
    let subject = match event {
        BookingEvent::Rescheduled => format!("Your call has moved to {when}"),
        _ => format!("Your consultation is booked for {when}"),
    };

    let text = format!(
        "Hi {name},\n\nYou're booked for a {minutes}-minute call with {producer} on {when}.\n\n\
         Need a different time? {reschedule}\nCan't make it? {cancel}\n",
        name = booking.name,
        minutes = booking.duration_minutes(),
        producer = producer.name,
        reschedule = links.reschedule_url,
        cancel = links.cancel_url,
    );
    let html = format!(
        "<p>Hi {name},</p>\
         <p>You're booked for a {minutes}-minute call with {producer} on <strong>{when}</strong>.</p>\
         <p><a href=\"{reschedule}\">Reschedule</a> · <a href=\"{cancel}\">Cancel</a></p>",
        name = escape_html(&booking.name),
        minutes = booking.duration_minutes(),
        producer = escape_html(&producer.name),
        when = escape_html(&when),
        reschedule = escape_html(&links.reschedule_url),
        cancel = escape_html(&links.cancel_url),
    );

    OutgoingEmail {
        to: booking.email.clone(),
        subject,
        html,
        text,
        attachments: vec![EmailAttachment {
            filename: "consultation.ics".to_string(),
            content_type: "text/calendar; method=REQUEST".to_string(),
            content: generate_ics(booking, &producer.name, &links.reschedule_url).into_bytes(),
        }],
    }
}

pub fn producer_email(
    event: BookingEvent,
    booking: &Booking,
    producer: &Producer,
    context: &BookingContext,
    links: &ManageLinks,
    tz_offset: i32,
) -> OutgoingEmail {
    let when = format_local(booking.start_time, tz_offset);
    let subject = format!("{}: {} on {when}", event.headline(), booking.name);

    let mut lines = vec![
        format!("Client: {} <{}>", booking.name, booking.email),
        format!("When: {when} ({} min)", booking.duration_minutes()),
    ];
    if let Some(phone) = &booking.phone {
        lines.push(format!("Phone: {phone}"));
    }
    if let Some(notes) = &booking.notes {
        lines.push(format!("Notes: {notes}"));
    }
    lines.extend(
        context
            .entries()
            .into_iter()
            .map(|(label, value)| format!("{label}: {value}")),
    );
    lines.push(format!("Calendar: {}", links.calendar_url));

    let html = lines
        .iter()
        .map(|l| format!("<p>{}</p>", escape_html(l)))
        .collect::<String>();

    OutgoingEmail {
        to: producer.email.clone(),
        subject,
        html,
        text: lines.join("\n"),
        attachments: vec![],
    }
}

/// e.g. `Mon, Mar 4, 2024 10:00 AM (UTC-05:00)`.
pub fn format_local(instant: DateTime<Utc>, tz_offset: i32) -> String {
    let local = instant + Duration::minutes(tz_offset as i64);
    let sign = if tz_offset < 0 { '-' } else { '+' };
    let abs = tz_offset.abs();
    format!(
        "{} (UTC{sign}{:02}:{:02})",
        local.format("%a, %b %-d, %Y %-I:%M %p"),
        abs / 60,
        abs % 60
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
