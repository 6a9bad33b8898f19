//! Translates host requests and peer frames into store actions, document
//! edits and outbound notifications.

use std::sync::Arc;

use anyhow::{Context, Result};
use shared::{
    domain::{Block, CommandEntry, DocumentBlocks},
    error::DecodeError,
    protocol::{ConfigurePayload, HostEnvelope, HostEvent, HostRequest, PeerFrame},
};
use tracing::{debug, warn};

use crate::{
    connection::ConnectionManager,
    engine::{insert_after_cursor, DocumentEngine},
    host::HostPort,
    store::{Action, StateStore},
};

pub struct MessageBridge {
    store: StateStore,
    engine: Arc<dyn DocumentEngine>,
    connection: Arc<ConnectionManager>,
    host: HostPort,
}

impl MessageBridge {
    pub fn new(
        store: StateStore,
        engine: Arc<dyn DocumentEngine>,
        connection: Arc<ConnectionManager>,
        host: HostPort,
    ) -> Self {
        Self {
            store,
            engine,
            connection,
            host,
        }
    }

    /// Handles one host message. Every failure ends up as a host `ERROR`.
    pub async fn handle(&self, envelope: HostEnvelope) {
        let request = match HostRequest::decode(envelope) {
            Ok(request) => request,
            Err(DecodeError::MissingType) => {
                debug!("bridge: ignoring host message without a type");
                return;
            }
            Err(err @ DecodeError::UnknownType(_)) => {
                warn!(error = %err, "bridge: rejected host message");
                self.host.error(err.to_string());
                return;
            }
            Err(err) => {
                warn!(error = %err, "bridge: undecodable host payload");
                self.host.error(format!("Handler error: {err}"));
                return;
            }
        };

        let kind = request.kind();
        debug!(kind, "bridge: handling host request");
        if let Err(err) = self.dispatch(request).await {
            let message = format!("{err:#}");
            warn!(kind, error = %message, "bridge: handler failed");
            self.host.error(format!("Handler error: {message}"));
        }
    }

    /// Applies a frame received from the collaboration peer.
    pub async fn handle_peer(&self, frame: PeerFrame) {
        let kind = frame.kind();
        let result = match frame {
            PeerFrame::ContentUpdate { content } => self.apply_remote_content(content).await,
            PeerFrame::ContentSet { .. } | PeerFrame::BlockInserted { .. } => {
                debug!(kind, "bridge: ignoring peer frame");
                Ok(())
            }
        };
        if let Err(err) = result {
            let message = format!("{err:#}");
            warn!(kind, error = %message, "bridge: peer frame failed");
            self.host.error(format!("Handler error: {message}"));
        }
    }

    /// Connects using whatever the store currently holds.
    pub async fn connect_from_state(&self) -> Result<()> {
        let state = self.store.snapshot();
        self.connection
            .reconnect(&state.server_address, state.transport_protocol)
            .await?;
        Ok(())
    }

    async fn dispatch(&self, request: HostRequest) -> Result<()> {
        match request {
            HostRequest::Configure(payload) => self.configure(payload).await,
            HostRequest::GetContent => self.get_content().await,
            HostRequest::SetContent(blocks) => self.set_content(blocks).await,
            HostRequest::SetInitialContent(blocks) => self.set_initial_content(blocks).await,
            HostRequest::RegisterSlashItem(entry) => {
                self.register_slash_item(entry);
                Ok(())
            }
            HostRequest::InsertBlock(block) => self.insert_block(block).await,
        }
    }

    async fn configure(&self, payload: ConfigurePayload) -> Result<()> {
        let initial_content = payload.initial_content.clone();
        self.store.dispatch(Action::Configure(payload));
        if let Some(blocks) = initial_content {
            self.engine
                .replace_all_blocks(blocks)
                .await
                .context("failed to apply initial content")?;
        }
        self.connect_from_state().await
    }

    async fn get_content(&self) -> Result<()> {
        let document = self.engine.document().await?;
        self.host.post(HostEvent::ContentResponse(document.clone()));
        self.connection
            .send(&PeerFrame::ContentUpdate { content: document });
        Ok(())
    }

    async fn set_content(&self, blocks: DocumentBlocks) -> Result<()> {
        self.engine.replace_all_blocks(blocks.clone()).await?;
        self.connection.send(&PeerFrame::ContentSet { content: blocks });
        Ok(())
    }

    async fn set_initial_content(&self, blocks: DocumentBlocks) -> Result<()> {
        self.store.dispatch(Action::SetInitialContent(blocks.clone()));
        self.engine.replace_all_blocks(blocks).await?;
        self.host.post(HostEvent::InitialContentSet);
        Ok(())
    }

    fn register_slash_item(&self, entry: CommandEntry) {
        let title = entry.title.clone();
        self.store.dispatch(Action::Register(entry));
        self.host.post(HostEvent::SlashItemRegistered(title));
    }

    async fn insert_block(&self, block: Block) -> Result<()> {
        insert_after_cursor(self.engine.as_ref(), block).await?;
        let document = self.engine.document().await?;
        self.connection
            .send(&PeerFrame::BlockInserted { content: document });
        Ok(())
    }

    async fn apply_remote_content(&self, content: DocumentBlocks) -> Result<()> {
        let current = self.engine.document().await?;
        if current == content {
            debug!("bridge: peer content matches document, skipping echo");
            return Ok(());
        }
        self.engine.replace_all_blocks(content.clone()).await?;
        self.host.post(HostEvent::ContentUpdated(content));
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
