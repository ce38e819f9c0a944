//! Test doubles for collector dependencies.

mod filesystem;
#[cfg(test)]
mod kv_server;

pub use filesystem::MockFs;
#[cfg(test)]
pub use kv_server::FakeKvServer;
