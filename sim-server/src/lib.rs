//! Simulator server internals, exposed as a library so the integration tests
//! can drive the transports against real sockets.

pub mod broadcast;
pub mod config;
pub mod control;
pub mod feed;
pub mod replay;
pub mod scheduler;
