//! # Media Stream Handler
//!
//! One actor per telephony media stream. The actor owns the call's
//! [`CallDriver`], so every input reaches the call state through this
//! actor's mailbox and is applied one at a time.
//!
//! ## Inputs:
//! 1. **Telephony frames**: JSON text messages on the WebSocket
//! 2. **AI events**: an unbounded channel added as a second actor stream
//! 3. **Setup results**: the background open future, mapped back into the actor
//! 4. **Timers**: idle heartbeat and signal-sequence deadlines

use crate::ai::AiEvent;
use crate::error::AppError;
use crate::state::{AppState, CallSlot};
use crate::telephony::call::{CallDriver, CallSink, SetupFuture};
use crate::telephony::protocol::{InboundEvent, OutboundMessage};

use actix::fut::wrap_future;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// How often the idle check runs
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

pub struct MediaStream {
    call: CallDriver,
    ai_events_rx: Option<mpsc::UnboundedReceiver<AiEvent>>,
    last_activity: Instant,
    idle_timeout: Duration,
    /// Released when the actor is dropped
    _slot: CallSlot,
}

impl MediaStream {
    pub fn new(state: &AppState, slot: CallSlot) -> Self {
        let (ai_events_tx, ai_events_rx) = mpsc::unbounded_channel();
        Self {
            call: CallDriver::new(state.services.clone(), ai_events_tx),
            ai_events_rx: Some(ai_events_rx),
            last_activity: Instant::now(),
            idle_timeout: Duration::from_secs(state.config.telephony.idle_timeout_secs),
            _slot: slot,
        }
    }
}

/// Routes driver effects to the WebSocket and the actor's timers.
struct ActorSink<'a> {
    ctx: &'a mut ws::WebsocketContext<MediaStream>,
}

impl<'a> ActorSink<'a> {
    fn new(ctx: &'a mut ws::WebsocketContext<MediaStream>) -> Self {
        Self { ctx }
    }
}

impl CallSink for ActorSink<'_> {
    fn send(&mut self, message: &OutboundMessage) {
        match serde_json::to_string(message) {
            Ok(json) => self.ctx.text(json),
            Err(err) => warn!(error = %err, "Failed to encode telephony message"),
        }
    }

    fn spawn_setup(&mut self, attempt: u32, setup: SetupFuture) {
        self.ctx.spawn(wrap_future::<_, MediaStream>(setup).map(
            move |result, act, ctx| {
                act.call.on_setup_result(attempt, result, &mut ActorSink::new(ctx));
            },
        ));
    }

    fn schedule_sequence_check(&mut self, sequence_id: u64, after: Duration) {
        self.ctx.run_later(after, move |act, ctx| {
            act.call.on_sequence_deadline(sequence_id, &mut ActorSink::new(ctx));
        });
    }

    fn close(&mut self) {
        self.ctx.close(Some(ws::CloseCode::Normal.into()));
        self.ctx.stop();
    }
}

impl Actor for MediaStream {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(connection = %self.call.connection_id(), "Media stream opened");

        if let Some(rx) = self.ai_events_rx.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if act.last_activity.elapsed() > act.idle_timeout {
                warn!(
                    connection = %act.call.connection_id(),
                    call_sid = ?act.call.bridge().call_sid(),
                    "Media stream idle, closing"
                );
                act.call.on_disconnected(&mut ActorSink::new(ctx));
                ctx.stop();
            }
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        // a socket that vanished without a stop signal still tears down
        self.call.on_disconnected(&mut ActorSink::new(ctx));
        debug!(connection = %self.call.connection_id(), "Media stream actor stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStream {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let connection = self.call.connection_id();
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_activity = Instant::now();
                match serde_json::from_str::<InboundEvent>(&text) {
                    Ok(event) => self.call.on_inbound(event, &mut ActorSink::new(ctx)),
                    Err(err) => warn!(connection = %connection, error = %err, "Malformed stream event"),
                }
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_activity = Instant::now();
                debug!(bytes = data.len(), "Ignoring binary frame");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_activity = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_activity = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection = %connection, ?reason, "Media stream closed by provider");
                self.call.on_disconnected(&mut ActorSink::new(ctx));
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(connection = %connection, error = %err, "Media stream protocol error");
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<AiEvent> for MediaStream {
    fn handle(&mut self, event: AiEvent, ctx: &mut Self::Context) {
        self.call.on_ai_event(event, &mut ActorSink::new(ctx));
    }

    /// The driver holds a sender, so the channel only ends with the actor.
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

/// `GET {stream_path}`: upgrade to the media stream WebSocket.
///
/// Refused with 503 when `max_concurrent_calls` streams are already open.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let slot = match state.acquire_call_slot() {
        Some(slot) => slot,
        None => {
            let max = state.config.performance.max_concurrent_calls;
            warn!(max_concurrent_calls = max, "Call capacity reached, refusing media stream");
            return Err(AppError::ServiceUnavailable(format!(
                "Call capacity reached ({} active)",
                max
            )));
        }
    };

    info!(peer = ?req.connection_info().peer_addr(), "Media stream upgrade requested");

    // a failed handshake drops the actor, and with it the slot
    ws::start(MediaStream::new(&state, slot), &req, stream)
        .map_err(|err| AppError::BadRequest(format!("WebSocket handshake failed: {}", err)))
}
