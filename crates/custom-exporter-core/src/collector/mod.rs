//! Probe execution and field mapping.
//!
//! ```text
//!  Exporter::gather()
//!       │  (one scoped thread per probe)
//!       ▼
//!  ScrapeSupervisor ── duration / scrapes / error gauges and counters
//!       │  Mutex: cycles of one probe never overlap
//!       ▼
//!  ProbeRunner   Idle → Connecting → Executing → Mapping → Emitting
//!       │
//!       ├── Backend::Shell     process chain     → RawOutput::Text
//!       ├── Backend::Sql       postgres / mysql  → RawOutput::Table
//!       └── Backend::KeyValue  redis protocol    → RawOutput::Document
//!       │
//!       ▼
//!  mapper (rows → label values + value) → SampleQueue (drop when full)
//! ```

pub mod backend;
pub mod kv;
pub mod mapper;
pub mod mock;
pub mod runner;
pub mod shell;
pub mod sql;
pub mod supervisor;
pub mod traits;

pub use backend::{Backend, BackendError, RawOutput};
pub use mapper::{MappedRow, map_row, map_text, parse_value, split_line};
pub use mock::MockFs;
pub use runner::{Phase, ProbeError, ProbeRunner, RunReport};
pub use supervisor::ScrapeSupervisor;
pub use traits::{FileSystem, RealFs};
