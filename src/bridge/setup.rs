//! Background AI-session setup and the collaborators every call shares.

use crate::ai::session::{AiConnector, AiSessionHandle};
use crate::ai::{AiError, AiEvent};
use crate::bridge::identity::CallerIdentity;
use crate::bridge::session::BridgeSettings;
use crate::memory::context::{ContextProvider, PersonalizationContext};
use crate::memory::persistence::TranscriptPersister;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Process-wide collaborators handed to each call.
///
/// None of these hold per-call state; each call owns only its own bridge
/// and AI session handle.
pub struct BridgeServices {
    pub context: ContextProvider,
    pub connector: Arc<dyn AiConnector>,
    pub persister: TranscriptPersister,
    pub settings: BridgeSettings,
}

/// Open the AI session for one call.
///
/// When `personalized` is set the caller's context is fetched first; the
/// fetch cannot fail, at worst it yields the generic context.
pub async fn open_ai_session(
    services: Arc<BridgeServices>,
    caller: CallerIdentity,
    personalized: bool,
    events: mpsc::UnboundedSender<AiEvent>,
) -> Result<AiSessionHandle, AiError> {
    let context = if personalized {
        services.context.fetch_context(&caller).await
    } else {
        PersonalizationContext::generic()
    };

    debug!(
        caller = %caller,
        recalled = context.recalled_memory_count,
        "Opening AI session"
    );
    services.connector.open(&context, events).await
}
