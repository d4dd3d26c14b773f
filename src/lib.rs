//! Remote file storage over a small length-prefixed TCP protocol.
//!
//! A client sends one command line per request (`GET`, `PUT`, `DELETE`,
//! `exit`), files move as binary blobs, and the server keeps a persistent
//! map from server-assigned identifiers to stored file names.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod session;
pub mod startup;
pub mod storage;
pub mod utils;
