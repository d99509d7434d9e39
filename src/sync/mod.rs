pub mod alert;
pub mod audit;
pub mod cache;
pub mod config;
pub mod linker;
pub mod lock;
pub mod mapping;
pub mod paths;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod state;
pub mod sweep;
pub mod upsert;
pub mod util;
