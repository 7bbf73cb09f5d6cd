pub mod channel;
pub mod log;
