#![forbid(unsafe_code)]

//! # pairwise-prioritizer
//!
//! Forced-choice prioritization: narrow a fixed vocabulary down to a shortlist, cut the
//! shortlist to a small final set, then decide every unordered pair of the final set and
//! rank by pairwise wins.
//!
//! The engine (`engine`) is pure and synchronous. Persistence is injected through the
//! `SessionStateStore` trait; `SessionDriver` ties a session key, a store, and the
//! stage guard together and saves after every completed stage.

pub mod config;
pub mod driver;
pub mod engine;
pub mod state;
pub mod store;
pub mod trace;
pub mod universe;

pub use config::{load_config_from_path, PrioritizerConfig};
pub use driver::{DriverError, SessionDriver};
pub use engine::{
    Caps, ComparisonRecord, EngineError, Item, Progress, Ranking, Session, SetKind, Stage,
    StageEvent, ValueScore, Workflow,
};
pub use state::{SessionState, StateError};
pub use store::{
    InMemorySessionStore, SessionKey, SessionStateStore, SqliteSessionStore, StoreError,
    StoredSession,
};
pub use trace::{ActionTrace, JsonlTraceSink, TraceError, TraceSink, TraceWorker};
pub use universe::{CandidateUniverse, UniverseError};
