//! SQL backend.
//!
//! The DSN is `<driver>://<rest>`; `postgres`/`postgresql` go through the
//! synchronous `postgres` client, `mysql` through the `mysql` crate. The
//! connection is opened lazily, pinged before every scrape and dropped on any
//! failure so the next scrape reconnects. With `reuse_connection: false` it is
//! also closed at the end of every run.
//!
//! Every query but the last runs for its side effects; only the last result
//! set is mapped.

mod columns;
mod driver;
mod dsn;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, validate_probe};
use crate::probe::ProbeSpec;

pub use columns::{ColumnBinding, ColumnRole, ResultSet, ScanError, scan_rows};
pub use dsn::{Driver, Dsn};

use driver::{Connection, Target};

/// Per-scrape SQL failure.
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("cannot connect to {driver}: {reason}")]
    Connect { driver: Driver, reason: String },

    #[error("ping failed: {0}")]
    Ping(String),

    #[error("query #{index} `{query}` failed: {reason}")]
    Query {
        index: usize,
        query: String,
        reason: String,
    },
}

/// Runs a probe's queries against one database.
pub struct SqlBackend {
    target: Target,
    timeout: Option<Duration>,
    reuse_connection: bool,
    conn: Option<Connection>,
}

impl SqlBackend {
    /// Validates the probe and parses its DSN. Does not connect.
    pub fn new(spec: &ProbeSpec) -> Result<Self, ConfigError> {
        validate_probe(spec)?;
        let dsn = Dsn::parse(&spec.name, &spec.credential.dsn)?;
        let target = Target::from_dsn(&dsn).map_err(|reason| {
            debug!(probe = %spec.name, %reason, "driver rejected dsn");
            ConfigError::InvalidDsn {
                probe: spec.name.clone(),
                dsn: spec.credential.dsn.clone(),
            }
        })?;

        Ok(Self {
            target,
            timeout: spec.timeout,
            reuse_connection: spec.reuse_connection,
            conn: None,
        })
    }

    pub fn driver(&self) -> Driver {
        self.target.driver()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Opens the connection if needed, then pings it.
    pub fn connect(&mut self) -> Result<(), SqlError> {
        let conn = self.checked_out()?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Takes the cached connection (or opens one) and pings it. A connection
    /// that fails the ping is dropped.
    fn checked_out(&mut self) -> Result<Connection, SqlError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                debug!(driver = %self.driver(), "opening connection");
                self.target
                    .open(self.timeout)
                    .map_err(|reason| SqlError::Connect {
                        driver: self.target.driver(),
                        reason,
                    })?
            }
        };

        conn.ping().map_err(|reason| {
            warn!(driver = %self.driver(), %reason, "ping failed, dropping connection");
            SqlError::Ping(reason)
        })?;
        Ok(conn)
    }

    /// Runs every query and returns the rows of the last one.
    pub fn execute(&mut self, spec: &ProbeSpec) -> Result<ResultSet, SqlError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.checked_out()?,
        };

        let queries: Vec<(usize, &str)> = spec
            .commands
            .iter()
            .map(|q| q.trim())
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .map(|(i, q)| (i + 1, q))
            .collect();
        let Some((&(last_index, last), earlier)) = queries.split_last() else {
            self.conn = Some(conn);
            return Ok(ResultSet::default());
        };

        let failed = |index: usize, query: &str, reason: String| SqlError::Query {
            index,
            query: query.to_string(),
            reason,
        };

        for &(index, query) in earlier {
            conn.execute(query)
                .map_err(|reason| failed(index, query, reason))?;
        }
        let set = conn
            .query(last)
            .map_err(|reason| failed(last_index, last, reason))?;

        debug!(probe = %spec.name, rows = set.rows.len(), columns = set.columns.len(), "query finished");
        self.conn = Some(conn);
        Ok(set)
    }

    /// Ends a run: closes the connection unless it is reused.
    pub fn finish(&mut self) {
        if !self.reuse_connection && self.conn.take().is_some() {
            debug!(driver = %self.driver(), "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{BackendKind, Credential};

    fn sql_spec(dsn: &str) -> ProbeSpec {
        let credential = Credential::new("mysql_connector", BackendKind::Sql).with_dsn(dsn);
        ProbeSpec::new("custom_metric_mysql", credential)
            .with_commands(["SELECT id, animal, weight FROM farm"])
            .with_label_fields(["id", "animal"])
    }

    #[test]
    fn construction_validates_dsn() {
        let backend = SqlBackend::new(&sql_spec("mysql://u:p@localhost:3306/db")).unwrap();
        assert_eq!(backend.driver(), Driver::MySql);
        assert!(!backend.is_connected());

        assert!(matches!(
            SqlBackend::new(&sql_spec("localhost:3306")).err(),
            Some(ConfigError::InvalidDsn { .. })
        ));
        assert!(matches!(
            SqlBackend::new(&sql_spec("sqlite://farm.db")).err(),
            Some(ConfigError::UnsupportedDriver { .. })
        ));
    }

    #[test]
    fn unreachable_server_fails_connect() {
        // Nothing listens on port 1.
        let spec = sql_spec("postgres://u:p@127.0.0.1:1/db").with_timeout(Duration::from_secs(2));
        let mut backend = SqlBackend::new(&spec).unwrap();
        let err = backend.execute(&spec).unwrap_err();
        assert!(matches!(err, SqlError::Connect { driver: Driver::Postgres, .. }));
        assert!(!backend.is_connected());
    }

    #[test]
    fn query_error_names_position() {
        let err = SqlError::Query {
            index: 2,
            query: "SELECT nope".into(),
            reason: "syntax error".into(),
        };
        assert_eq!(err.to_string(), "query #2 `SELECT nope` failed: syntax error");
    }
}
