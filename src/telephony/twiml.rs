//! Call-setup webhook.
//!
//! The provider calls this when a call comes in; the TwiML answer tells it
//! to open a media stream back to us, carrying the caller's number as a
//! stream parameter so the stream-start signal can identify the caller.

use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use std::collections::HashMap;
use tracing::info;

/// Escape text for use inside an XML attribute value.
fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// TwiML that connects the call to the media stream at `stream_url`.
pub fn connect_stream_twiml(stream_url: &str, caller: Option<&str>) -> String {
    let parameter = caller
        .map(str::trim)
        .filter(|number| !number.is_empty())
        .map(|number| {
            format!(
                "\n      <Parameter name=\"from\" value=\"{}\"/>",
                xml_escape(number)
            )
        })
        .unwrap_or_default();

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Connect>\n    <Stream url=\"{}\">{}\n    </Stream>\n  </Connect>\n</Response>",
        xml_escape(stream_url),
        parameter
    )
}

/// `ANY /twilio/inbound_call`
///
/// `From` is read from the form body (POST webhooks) or the query string
/// (GET webhooks).
pub async fn inbound_call(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
    form: Option<web::Form<HashMap<String, String>>>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let telephony = &state.config.telephony;

    let host = if telephony.public_host.is_empty() {
        req.connection_info().host().to_string()
    } else {
        telephony.public_host.clone()
    };
    let stream_url = format!("wss://{}{}", host, telephony.stream_path);

    let caller = form
        .as_ref()
        .and_then(|form| form.get("From").cloned())
        .or_else(|| query.get("From").cloned());

    info!(
        call_sid = form.as_ref().and_then(|f| f.get("CallSid")).map(String::as_str).unwrap_or("unknown"),
        caller = caller.as_deref().unwrap_or("unknown"),
        stream_url = %stream_url,
        "Incoming call, connecting media stream"
    );

    HttpResponse::Ok()
        .content_type("text/xml")
        .body(connect_stream_twiml(&stream_url, caller.as_deref()))
}
