use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::config::{PersistPolicy, ServerConfig};
use crate::dispatcher::Dispatcher;
use crate::protocol::{
    frame::{read_blob, read_line, write_blob, write_line},
    Command, ProtocolError, Response,
};
use crate::storage::{FileStorage, IdentifierStore};

/// Per-connection settings taken from the server config.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub id_map_path: PathBuf,
    pub max_file_size: usize,
    pub idle_timeout: Option<Duration>,
    pub persist_policy: PersistPolicy,
}

impl From<&ServerConfig> for SessionOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            id_map_path: config.id_map_path.clone(),
            max_file_size: config.max_file_size,
            idle_timeout: config.idle_timeout(),
            persist_policy: config.persist_policy,
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent `exit`.
    Exit,
    /// Peer closed the stream between or during exchanges.
    PeerClosed,
    /// Server gave up on the peer (malformed request, oversized frame, idle).
    Dropped(String),
}

/// One connection's lifetime: read a line, dispatch, answer, repeat.
pub struct Session<'a, S: FileStorage, T> {
    stream: T,
    dispatcher: &'a Dispatcher<S>,
    ids: &'a mut IdentifierStore,
    options: SessionOptions,
    persisted: bool,
}

impl<'a, S, T> Session<'a, S, T>
where
    S: FileStorage,
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: T,
        dispatcher: &'a Dispatcher<S>,
        ids: &'a mut IdentifierStore,
        options: SessionOptions,
    ) -> Self {
        Self {
            stream,
            dispatcher,
            ids,
            options,
            persisted: false,
        }
    }

    /// The identifier map is saved on every way out.
    pub async fn run(mut self) -> SessionEnd {
        let end = self.serve().await;
        if !self.persisted {
            self.persist();
        }
        end
    }

    async fn serve(&mut self) -> SessionEnd {
        loop {
            let line = match self.next_line().await {
                Ok(line) => line,
                Err(end) => return end,
            };

            let command = match Command::parse(&line) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("Malformed request {:?}: {}", line, e);
                    return SessionEnd::Dropped(format!("malformed request: {}", e));
                }
            };
            debug!("Processing request: {:?}", command);

            let response = match command {
                Command::Exit => {
                    info!("Client requested exit");
                    self.persist();
                    return SessionEnd::Exit;
                }
                Command::Get(addr) => self.dispatcher.get(&*self.ids, &addr).await,
                Command::Put(target) => {
                    let data = match read_blob(&mut self.stream, self.options.max_file_size).await {
                        Ok(data) => data,
                        Err(e) => return end_for(e),
                    };
                    let resp = self.dispatcher.put(&mut *self.ids, &target, &data).await;
                    if matches!(resp, Response::Stored(_)) {
                        self.after_mutation();
                    }
                    resp
                }
                Command::Delete(addr) => {
                    let resp = self.dispatcher.delete(&mut *self.ids, &addr).await;
                    if resp == Response::Ok {
                        self.after_mutation();
                    }
                    resp
                }
                Command::Unknown(verb) => self.dispatcher.unknown(&verb),
            };

            if let Err(e) = self.respond(&response).await {
                return end_for(e);
            }
        }
    }

    async fn next_line(&mut self) -> Result<String, SessionEnd> {
        let read = read_line(&mut self.stream);
        let result = match self.options.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("No request within {:?}, dropping connection", limit);
                    return Err(SessionEnd::Dropped("idle timeout".to_string()));
                }
            },
            None => read.await,
        };
        result.map_err(end_for)
    }

    async fn respond(&mut self, response: &Response) -> Result<(), ProtocolError> {
        write_line(&mut self.stream, &response.line()).await?;
        if let Some(payload) = response.payload() {
            write_blob(&mut self.stream, payload).await?;
        }
        Ok(())
    }

    fn after_mutation(&mut self) {
        if self.options.persist_policy == PersistPolicy::WriteThrough {
            self.persist();
            // Close still writes once more so nothing is skipped
            self.persisted = false;
        }
    }

    fn persist(&mut self) {
        match self.ids.save(&self.options.id_map_path) {
            Ok(()) => debug!("Identifier map persisted ({} entries)", self.ids.len()),
            Err(e) => error!(
                "Could not persist identifier map to {:?}: {}",
                self.options.id_map_path, e
            ),
        }
        self.persisted = true;
    }
}

fn end_for(e: ProtocolError) -> SessionEnd {
    if e.is_disconnect() {
        debug!("Peer disconnected");
        SessionEnd::PeerClosed
    } else {
        warn!("Dropping connection: {}", e);
        SessionEnd::Dropped(e.to_string())
    }
}
