use std::fmt;

use crate::protocol::constants::*;

/// How a GET or DELETE names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    ByName(String),
    ById(String),
}

impl Address {
    pub fn mode(&self) -> &'static str {
        match self {
            Address::ByName(_) => BY_NAME,
            Address::ById(_) => BY_ID,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Address::ByName(v) | Address::ById(v) => v,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode(), self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutTarget {
    Named(String),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(Address),
    Put(PutTarget),
    Delete(Address),
    Exit,
    /// Verb the server does not know; answered with free text.
    Unknown(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{verb} is missing {what}")]
    MissingToken { verb: String, what: &'static str },
    #[error("unknown addressing mode {0:?}")]
    UnknownMode(String),
}

impl Command {
    /// Split into at most three parts: verb, second token, rest of line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        if line.eq_ignore_ascii_case(VERB_EXIT) {
            return Ok(Command::Exit);
        }

        let mut parts = line.splitn(3, ' ');
        let verb = parts.next().unwrap_or_default();
        let second = parts.next().filter(|s| !s.is_empty());
        let rest = parts.next().filter(|s| !s.is_empty());

        match verb {
            VERB_GET => Ok(Command::Get(parse_address(verb, second, rest)?)),
            VERB_DELETE => Ok(Command::Delete(parse_address(verb, second, rest)?)),
            VERB_PUT => {
                let target = second.ok_or_else(|| CommandError::MissingToken {
                    verb: verb.to_string(),
                    what: "a file name",
                })?;
                if target == WILDCARD {
                    Ok(Command::Put(PutTarget::Wildcard))
                } else {
                    Ok(Command::Put(PutTarget::Named(target.to_string())))
                }
            }
            other => Ok(Command::Unknown(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Command::Get(addr) => format!("{} {}", VERB_GET, addr),
            Command::Delete(addr) => format!("{} {}", VERB_DELETE, addr),
            Command::Put(PutTarget::Named(name)) => format!("{} {}", VERB_PUT, name),
            Command::Put(PutTarget::Wildcard) => format!("{} {}", VERB_PUT, WILDCARD),
            Command::Exit => VERB_EXIT.to_string(),
            Command::Unknown(verb) => verb.clone(),
        }
    }
}

fn parse_address(
    verb: &str,
    mode: Option<&str>,
    value: Option<&str>,
) -> Result<Address, CommandError> {
    let mode = mode.ok_or_else(|| CommandError::MissingToken {
        verb: verb.to_string(),
        what: "an addressing mode",
    })?;
    let value = value.ok_or_else(|| CommandError::MissingToken {
        verb: verb.to_string(),
        what: "a target",
    })?;

    match mode {
        BY_NAME => Ok(Address::ByName(value.to_string())),
        BY_ID => Ok(Address::ById(value.to_string())),
        other => Err(CommandError::UnknownMode(other.to_string())),
    }
}

/// Outcome of one request, rendered as a response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// DELETE succeeded
    Ok,
    /// PUT succeeded with the assigned identifier
    Stored(String),
    /// GET succeeded; the payload follows the line as a blob
    Found(Vec<u8>),
    Forbidden,
    NotFound,
    Invalid(String),
}

impl Response {
    pub fn line(&self) -> String {
        match self {
            Response::Ok | Response::Found(_) => STATUS_OK.to_string(),
            Response::Stored(id) => format!("{} {}", STATUS_OK, id),
            Response::Forbidden => STATUS_FORBIDDEN.to_string(),
            Response::NotFound => STATUS_NOT_FOUND.to_string(),
            Response::Invalid(text) => text.clone(),
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Response::Found(data) => Some(data),
            _ => None,
        }
    }
}
