use crate::models::Booking;

const ICS_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";
/// Content lines longer than this many octets are folded.
const MAX_LINE_OCTETS: usize = 75;

/// Renders a booking as a single-event iCalendar invite.
pub fn generate_ics(booking: &Booking, producer_name: &str, manage_url: &str) -> String {
    let summary = escape_text(&format!("Consultation call with {producer_name}"));
    let mut description = booking
        .notes
        .as_deref()
        .unwrap_or("No additional notes")
        .to_string();
    description.push_str(&format!("\n\nReschedule or cancel: {manage_url}"));

    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Slotbook//Consultation Booking//EN".to_string(),
        "METHOD:REQUEST".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@slotbook", booking.id),
        format!("DTSTAMP:{}", booking.updated_at.format(ICS_TIME_FORMAT)),
        format!("DTSTART:{}", booking.start_time.format(ICS_TIME_FORMAT)),
        format!("DTEND:{}", booking.end_time.format(ICS_TIME_FORMAT)),
        format!("SUMMARY:{summary}"),
        format!("DESCRIPTION:{}", escape_text(&description)),
        format!(
            "ATTENDEE;CN={}:mailto:{}",
            param_value(&booking.name),
            booking.email
        ),
        format!("URL:{manage_url}"),
        "STATUS:CONFIRMED".to_string(),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    lines.iter().map(|line| fold_line(line) + "\r\n").collect()
}

fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

/// Parameter values cannot hold DQUOTE or control characters, and must be
/// quoted when they contain `,`, `;` or `:`.
fn param_value(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect();
    if cleaned.contains([',', ';', ':']) {
        format!("\"{cleaned}\"")
    } else {
        cleaned
    }
}

/// Splits `line` into chunks of at most 75 octets, continuation lines
/// starting with a single space. Never splits a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut used = 0;
    for ch in line.chars() {
        let width = ch.len_utf8();
        if used + width > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            used = 1;
        }
        out.push(ch);
        used += width;
    }
    out
}
