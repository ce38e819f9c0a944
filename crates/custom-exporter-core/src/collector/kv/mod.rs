//! Key-value backend speaking the Redis protocol.
//!
//! Each command is sent in order and must reply with a string holding a JSON
//! object. The last object is flattened into a [`Document`] and mapped to
//! exactly one sample.

mod document;
mod uri;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, validate_probe};
use crate::probe::ProbeSpec;

pub use document::{Document, flatten, map_document, parse_document};
pub use uri::{DEFAULT_PORT, Endpoint};

/// Per-scrape key-value failure.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("cannot connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("ping failed: {0}")]
    Ping(#[source] redis::RedisError),

    #[error("command #{index} `{command}` failed: {source}")]
    Command {
        index: usize,
        command: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("command #{index} `{command}` replied with {reply}, expected a string")]
    NotAString {
        index: usize,
        command: String,
        reply: &'static str,
    },

    #[error("command #{index} `{command}` did not reply with a JSON object: {source}")]
    Json {
        index: usize,
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value field '{0}' not found in reply")]
    MissingValue(String),
}

/// Sends a probe's commands to one store.
pub struct KvBackend {
    endpoint: Endpoint,
    timeout: Option<Duration>,
    reuse_connection: bool,
    conn: Option<redis::Connection>,
}

impl KvBackend {
    /// Validates the probe and parses its endpoint. Does not connect.
    pub fn new(spec: &ProbeSpec) -> Result<Self, ConfigError> {
        validate_probe(spec)?;
        let endpoint = Endpoint::parse(&spec.name, &spec.credential.uri, &spec.credential.dsn)?;
        Ok(Self {
            endpoint,
            timeout: spec.timeout,
            reuse_connection: spec.reuse_connection,
            conn: None,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn address(&self) -> String {
        format!("{}:{}", self.endpoint.host, self.endpoint.port)
    }

    fn open(&self) -> Result<redis::Connection, redis::RedisError> {
        let client = redis::Client::open(self.endpoint.connection_info())?;
        let conn = match self.timeout {
            Some(t) => {
                let conn = client.get_connection_with_timeout(t)?;
                conn.set_read_timeout(Some(t))?;
                conn.set_write_timeout(Some(t))?;
                conn
            }
            None => client.get_connection()?,
        };
        Ok(conn)
    }

    /// Opens the connection if needed, then pings it.
    pub fn connect(&mut self) -> Result<(), KvError> {
        let conn = self.checked_out()?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Takes the cached connection (or opens one) and pings it. A connection
    /// that fails the ping is dropped.
    fn checked_out(&mut self) -> Result<redis::Connection, KvError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                debug!(endpoint = %self.address(), db = self.endpoint.db, "opening connection");
                self.open().map_err(|source| KvError::Connect {
                    endpoint: self.address(),
                    source,
                })?
            }
        };

        redis::cmd("PING")
            .query::<String>(&mut conn)
            .map_err(|e| {
                warn!(endpoint = %self.address(), error = %e, "ping failed, dropping connection");
                KvError::Ping(e)
            })?;
        Ok(conn)
    }

    /// Sends every command and returns the flattened reply of the last one.
    pub fn execute(&mut self, spec: &ProbeSpec) -> Result<Document, KvError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.checked_out()?,
        };

        let mut last = Document::new();
        for (i, line) in spec.commands.iter().enumerate() {
            let index = i + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some((name, args)) = tokens.split_first() else {
                continue;
            };

            let mut cmd = redis::cmd(name);
            for arg in args {
                cmd.arg(*arg);
            }
            let reply: redis::Value = cmd.query(&mut conn).map_err(|source| KvError::Command {
                index,
                command: line.clone(),
                source,
            })?;

            let text = reply_text(reply).map_err(|reply| KvError::NotAString {
                index,
                command: line.clone(),
                reply,
            })?;
            last = parse_document(&text).map_err(|source| KvError::Json {
                index,
                command: line.clone(),
                source,
            })?;
        }

        debug!(probe = %spec.name, keys = last.len(), "reply parsed");
        self.conn = Some(conn);
        Ok(last)
    }

    /// Ends a run: closes the connection unless it is reused.
    pub fn finish(&mut self) {
        if !self.reuse_connection && self.conn.take().is_some() {
            debug!(endpoint = %self.address(), "connection closed");
        }
    }
}

/// Extracts the text of a string reply, or names the reply kind.
fn reply_text(reply: redis::Value) -> Result<String, &'static str> {
    use redis::Value;
    match reply {
        Value::BulkString(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(s) => Ok(s),
        Value::VerbatimString { text, .. } => Ok(text),
        Value::Nil => Err("nil"),
        Value::Int(_) => Err("an integer"),
        Value::Array(_) | Value::Set(_) => Err("an array"),
        Value::Map(_) => Err("a map"),
        Value::Okay => Err("OK"),
        _ => Err("an unsupported reply"),
    }
}
