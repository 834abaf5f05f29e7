pub mod error;
pub mod events;
pub mod policy;
pub mod ports;
pub mod service;
pub mod session;
pub mod subscription;
