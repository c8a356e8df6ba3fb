// A hosting node: session server plus the beacon advertising it.
//
// The beacon advertises the port the server actually bound (which differs
// from the configured one when that is 0) and samples the server's live
// client count on every send.

use std::net::SocketAddr;

use tracing::info;

use crate::config::SessionConfig;
use crate::content::ContentCatalog;
use crate::discovery::Beacon;
use crate::error::Result;
use crate::server::SessionServer;

pub struct HostSession {
    server: SessionServer,
    beacon: Beacon,
}

impl HostSession {
    pub fn start(config: &SessionConfig, catalog: ContentCatalog) -> Result<Self> {
        let server = SessionServer::start(config, catalog)?;
        let port = server.local_addr().port();
        let beacon = Beacon::start(config, port, server.client_counter())?;
        info!(port, label = %config.label, "hosting");
        Ok(Self { server, beacon })
    }

    pub fn server(&self) -> &SessionServer {
        &self.server
    }

    pub fn client_count(&self) -> usize {
        self.server.client_count()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Stop advertising, then stop the server. Idempotent.
    pub fn stop(&mut self) {
        self.beacon.stop();
        self.server.stop();
    }
}
