//! An explicitly owned home for the active session.
//!
//! An application usually runs at most one session at a time, either as
//! host or as client. [`NetworkContext`] holds that session together with
//! the component registry every new session is built from.

use multiplay_cache::{ComponentRegistry, ComponentSchema};
use multiplay_transport::Acceptor;
use tracing::info;

use crate::MultiplayError;
use crate::client::Client;
use crate::config::{ClientConfig, HostConfig};
use crate::factory::{ConnectTarget, ListenTarget};
use crate::host::Host;

/// Owns the registry and the one active session role. At most one of
/// `host` and `client` is set.
#[derive(Default)]
pub struct NetworkContext {
    registry: ComponentRegistry,
    host: Option<Box<Host>>,
    client: Option<Box<Client>>,
}

impl NetworkContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            host: None,
            client: None,
        }
    }

    /// Registers a component schema. Takes effect for the next session.
    pub fn register_component(&mut self, schema: ComponentSchema) -> Result<(), MultiplayError> {
        self.registry.register(schema)?;
        Ok(())
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Hosts a new session on `acceptor`, ending the current one first.
    pub fn host_session(
        &mut self,
        config: HostConfig,
        acceptor: Box<dyn Acceptor>,
    ) -> Result<&mut Host, MultiplayError> {
        self.end_session();
        let host = Host::new(config, self.registry.clone(), acceptor)?;
        Ok(&mut **self.host.insert(Box::new(host)))
    }

    /// Opens `target` and hosts a new session on it.
    pub async fn listen(
        &mut self,
        config: HostConfig,
        target: ListenTarget,
    ) -> Result<&mut Host, MultiplayError> {
        self.end_session();
        let host = Host::listen(config, self.registry.clone(), target).await?;
        Ok(&mut **self.host.insert(Box::new(host)))
    }

    /// Joins the session at `target`, ending the current one first.
    pub fn join_session(
        &mut self,
        config: ClientConfig,
        target: ConnectTarget,
    ) -> Result<&mut Client, MultiplayError> {
        self.end_session();
        let client = Client::connect(config, self.registry.clone(), target)?;
        Ok(&mut **self.client.insert(Box::new(client)))
    }

    pub fn host(&self) -> Option<&Host> {
        self.host.as_deref()
    }

    pub fn host_mut(&mut self) -> Option<&mut Host> {
        self.host.as_deref_mut()
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_deref()
    }

    pub fn client_mut(&mut self) -> Option<&mut Client> {
        self.client.as_deref_mut()
    }

    /// Whether a role is installed.
    pub fn is_active(&self) -> bool {
        self.host.is_some() || self.client.is_some()
    }

    /// Closes a hosted session or leaves a joined one.
    pub fn end_session(&mut self) {
        if let Some(mut host) = self.host.take() {
            host.close_session();
            info!("hosted session ended");
        }
        if let Some(mut client) = self.client.take() {
            client.leave();
            info!("joined session ended");
        }
    }
}

impl Drop for NetworkContext {
    fn drop(&mut self) {
        self.end_session();
    }
}
