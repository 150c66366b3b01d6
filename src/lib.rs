pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod log;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
