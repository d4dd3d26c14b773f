use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{
    frame::{read_blob, read_line, write_blob, write_line},
    Address, Command, PutTarget, DEFAULT_MAX_BLOB, STATUS_FORBIDDEN, STATUS_NOT_FOUND, STATUS_OK,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored(String),
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Found(Vec<u8>),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Scripted client for the file protocol. One request in flight at a time.
pub struct Client<T> {
    stream: T,
    max_blob: usize,
}

impl Client<TcpStream> {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to {}", addr))?;
        debug!("Connected to {}", addr);
        Ok(Self::new(stream))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Client<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            max_blob: DEFAULT_MAX_BLOB,
        }
    }

    pub fn with_max_blob(mut self, max_blob: usize) -> Self {
        self.max_blob = max_blob;
        self
    }

    /// `None` lets the server pick the name.
    pub async fn put(&mut self, name: Option<&str>, data: &[u8]) -> Result<PutOutcome> {
        let target = match name {
            Some(n) => PutTarget::Named(n.to_string()),
            None => PutTarget::Wildcard,
        };
        write_line(&mut self.stream, &Command::Put(target).encode()).await?;
        write_blob(&mut self.stream, data).await?;

        let reply = read_line(&mut self.stream).await?;
        if reply == STATUS_FORBIDDEN {
            return Ok(PutOutcome::Exists);
        }
        match reply.split_once(' ') {
            Some((STATUS_OK, id)) if !id.is_empty() => Ok(PutOutcome::Stored(id.to_string())),
            _ => Err(unexpected(&reply)),
        }
    }

    pub async fn get(&mut self, addr: Address) -> Result<GetOutcome> {
        write_line(&mut self.stream, &Command::Get(addr).encode()).await?;
        let reply = read_line(&mut self.stream).await?;
        match reply.as_str() {
            STATUS_OK => {
                let data = read_blob(&mut self.stream, self.max_blob).await?;
                Ok(GetOutcome::Found(data))
            }
            STATUS_NOT_FOUND => Ok(GetOutcome::NotFound),
            _ => Err(unexpected(&reply)),
        }
    }

    pub async fn delete(&mut self, addr: Address) -> Result<DeleteOutcome> {
        write_line(&mut self.stream, &Command::Delete(addr).encode()).await?;
        let reply = read_line(&mut self.stream).await?;
        match reply.as_str() {
            STATUS_OK => Ok(DeleteOutcome::Deleted),
            STATUS_NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(unexpected(&reply)),
        }
    }

    /// Sends a line verbatim and returns the reply line. Not for PUT or GET,
    /// which carry blobs.
    pub async fn raw(&mut self, line: &str) -> Result<String> {
        let verb = line.split(' ').next().unwrap_or_default();
        if verb == crate::protocol::VERB_PUT || verb == crate::protocol::VERB_GET {
            bail!("{} carries a payload; use the typed call", verb);
        }
        write_line(&mut self.stream, line).await?;
        Ok(read_line(&mut self.stream).await?)
    }

    /// The server closes without answering.
    pub async fn exit(mut self) -> Result<()> {
        write_line(&mut self.stream, &Command::Exit.encode()).await?;
        Ok(())
    }
}

fn unexpected(reply: &str) -> anyhow::Error {
    anyhow!("unexpected reply from server: {:?}", reply)
}
