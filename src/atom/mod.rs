pub mod reader;
pub mod retry;
pub mod transport;
