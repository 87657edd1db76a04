//! Collaborator-facing façade over the store, registry, and broadcaster.
//!
//! The gateway and any request/response front (HTTP handlers, tests,
//! tooling) all go through [`SessionService`], so a canvas replaced over
//! a socket and one replaced through an accessor take the same write-
//! then-broadcast path.
//!
//! The code-generation and deployment collaborators are opaque: their
//! faults are translated here into structured success/failure responses
//! and never cross the boundary as raw errors.

use std::error::Error;
use std::sync::Arc;

use atelier_core::{
    now_millis, CanvasState, ChatMessage, CodeGenRequest, CodeGenResponse, DeployOutcome,
    DeployRequest, DeployResponse,
};

use crate::broadcast::Broadcaster;
use crate::error::SyncError;
use crate::protocol::ServerEvent;
use crate::registry::SessionRegistry;
use crate::storage::SessionStore;

/// A collaborator fault, as seen at the boundary.
pub type CollaboratorFault = Box<dyn Error + Send + Sync>;

/// The stateless code-generation collaborator: canvas in, source text out.
pub trait CodeGenerator {
    fn generate(
        &self,
        request: &CodeGenRequest,
    ) -> impl std::future::Future<Output = Result<String, CollaboratorFault>> + Send;
}

/// The deployment collaborator: generated source in, plan or outputs out.
pub trait DeployExecutor {
    fn deploy(
        &self,
        request: &DeployRequest,
    ) -> impl std::future::Future<Output = Result<DeployOutcome, CollaboratorFault>> + Send;
}

/// Shared session operations.
pub struct SessionService {
    store: Arc<SessionStore>,
    broadcaster: Broadcaster,
}

impl SessionService {
    pub fn new(store: Arc<SessionStore>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            store,
            broadcaster: Broadcaster::new(registry),
        }
    }

    // ─── Canvas ───────────────────────────────────────────────────────

    /// Current canvas for a session; the empty default when none exists.
    pub fn canvas(&self, session: &str) -> Result<CanvasState, SyncError> {
        Ok(self.store.canvas(session)?)
    }

    /// Replace the session's canvas wholesale, then fan the accepted
    /// state out to every live handle — the sender included, so it
    /// reflects its own accepted write.
    ///
    /// If the write fails nothing is broadcast: participants never see
    /// state the store didn't accept.
    pub async fn replace_canvas(
        &self,
        session: &str,
        mut canvas: CanvasState,
    ) -> Result<CanvasState, SyncError> {
        canvas.last_updated = now_millis();
        self.store.put_canvas(session, &canvas)?;
        self.broadcaster
            .broadcast(
                session,
                &ServerEvent::CanvasUpdate {
                    data: canvas.clone(),
                },
                None,
            )
            .await?;
        Ok(canvas)
    }

    // ─── Chat ─────────────────────────────────────────────────────────

    /// Up to `count` most recent messages, oldest-first.
    pub fn chat_history(&self, session: &str, count: usize) -> Result<Vec<ChatMessage>, SyncError> {
        Ok(self.store.chat_history(session, count)?)
    }

    /// Append one message to the session's bounded log, then fan it out.
    pub async fn post_chat(&self, session: &str, message: ChatMessage) -> Result<(), SyncError> {
        self.store.append_chat(session, &message)?;
        self.broadcaster
            .broadcast(session, &ServerEvent::ChatMessage { data: message }, None)
            .await?;
        Ok(())
    }

    // ─── Presence ─────────────────────────────────────────────────────

    /// Live participant count for a session.
    pub async fn active_users(&self, session: &str) -> usize {
        self.broadcaster.registry().count(session).await
    }

    // ─── Collaborators ────────────────────────────────────────────────

    /// Run the code-generation collaborator, translating any fault into
    /// a structured failure response.
    pub async fn generate_code<G: CodeGenerator>(
        &self,
        generator: &G,
        request: CodeGenRequest,
    ) -> CodeGenResponse {
        match generator.generate(&request).await {
            Ok(code) => CodeGenResponse::ok(code),
            Err(e) => {
                log::error!("Code generation failed: {e}");
                CodeGenResponse::failure(format!("Code generation failed: {e}"))
            }
        }
    }

    /// Run the deployment collaborator, translating any fault into a
    /// structured failure response.
    pub async fn deploy<D: DeployExecutor>(
        &self,
        executor: &D,
        request: DeployRequest,
    ) -> DeployResponse {
        match executor.deploy(&request).await {
            Ok(outcome) => DeployResponse::ok(outcome),
            Err(e) => {
                log::error!("Deployment failed: {e}");
                DeployResponse::failure(format!("Deployment failed: {e}"))
            }
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.broadcaster.registry()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}
