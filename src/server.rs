use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::session::{Session, SessionEnd, SessionOptions};
use crate::startup::StartupValidator;
use crate::storage::{IdentifierStore, LocalStorage};

/// Serves one connection at a time. The identifier map lives here and is
/// lent to each session in turn.
pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher<LocalStorage>,
    ids: IdentifierStore,
    options: SessionOptions,
    stop_on_exit: bool,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .with_context(|| format!("binding {}", config.listen_address))?;
        info!("Server listening on {}", listener.local_addr()?);

        let storage = Arc::new(LocalStorage::new(config.data_directory.clone()));
        let ids = IdentifierStore::load(&config.id_map_path);
        match StartupValidator::new(storage.as_ref(), &ids).validate().await {
            Ok(report) if !report.is_consistent() => warn!(
                "{} identifiers point at missing files; lookups by id will answer 404",
                report.dangling.len()
            ),
            Ok(_) => {}
            Err(e) => warn!("Startup verification failed: {:#}", e),
        }

        Ok(Self {
            listener,
            dispatcher: Dispatcher::new(storage),
            ids,
            options: SessionOptions::from(config),
            stop_on_exit: config.stop_on_exit,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept, serve to completion, repeat. Returns only when a client's
    /// `exit` is configured to stop the server.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            info!("New connection from {}", peer);

            let session = Session::new(socket, &self.dispatcher, &mut self.ids, self.options.clone());
            match session.run().await {
                SessionEnd::Exit => {
                    info!("Session with {} ended by exit", peer);
                    if self.stop_on_exit {
                        info!("Shutting down on client exit");
                        return Ok(());
                    }
                }
                SessionEnd::PeerClosed => info!("Session with {} closed by peer", peer),
                SessionEnd::Dropped(reason) => warn!("Dropped {}: {}", peer, reason),
            }
        }
    }
}

pub async fn run_on(config: &ServerConfig) -> anyhow::Result<()> {
    Server::bind(config).await?.run().await
}
