//! # Multiplay
//!
//! Host and client roles for server-authoritative multiplayer sessions.
//!
//! One participant hosts: it owns the simulation, validates joins and
//! sends one frame per tick holding every entity, field and event change.
//! The others join as clients, buffer those frames by tick and apply them
//! a few ticks behind the newest one.
//!
//! Links are direct WebSocket connections, in-process loopbacks, or routed
//! through a relay server when players cannot reach the host directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multiplay::prelude::*;
//!
//! let listener = LoopbackListener::new();
//! let connector = listener.connector();
//!
//! let mut ctx = NetworkContext::new();
//! ctx.host_session(HostConfig::default(), Box::new(listener))?;
//! // Call `host.update(now, &mut sim)` from the game loop, or
//! // `host.run(&mut sim).await` to let the tick driver pace it.
//! # let _ = connector;
//! # Ok::<(), MultiplayError>(())
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod host;
pub mod simulation;

pub use client::Client;
pub use config::{ClientConfig, HostConfig, RelayAddress};
pub use context::NetworkContext;
pub use error::MultiplayError;
pub use factory::{ConnectTarget, ListenTarget};
pub use host::Host;
pub use simulation::{ClientSimulation, HostSimulation, SimulationEvent, TickOutbox};

pub use multiplay_cache as cache;
pub use multiplay_matchmaking as matchmaking;
pub use multiplay_protocol as protocol;
pub use multiplay_proxy as proxy;
pub use multiplay_session as session;
pub use multiplay_tick as tick;
pub use multiplay_transport as transport;

/// Installs a `tracing` subscriber that prints to stderr, filtered by
/// `RUST_LOG` (default `info`). Does nothing if one is already installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub mod prelude {
    pub use crate::{
        Client, ClientConfig, ClientSimulation, ConnectTarget, Host, HostConfig, HostSimulation,
        ListenTarget, MultiplayError, NetworkContext, RelayAddress, SimulationEvent, TickOutbox,
    };

    pub use multiplay_cache::{
        ComponentRegistry, ComponentSchema, ComponentState, FieldKind, FieldValue, MemoryWorld,
        WorldSink, WorldSource,
    };
    pub use multiplay_matchmaking::{MatchmakingClient, MatchmakingServer};
    pub use multiplay_protocol::messages::*;
    pub use multiplay_protocol::{
        Color, ComponentId, ContentChecksum, EntityId, GameMode, HostEntry, JoinResponse,
        LeaveReason, Message, OperationMessage, PlayerIndex, Tick, Transform, Vec3,
    };
    pub use multiplay_proxy::RelayServer;
    pub use multiplay_session::{
        PlayerInfo, SessionError, SessionEvent, SessionRole, SessionSettings, SessionState,
    };
    pub use multiplay_tick::{TickConfig, TickPolicy};
    pub use multiplay_transport::{LoopbackConnector, LoopbackListener};
}
