pub mod app;
pub mod cidr;
pub mod config;
pub mod constants;
pub mod error;
pub mod fs;
pub mod iproute;
pub mod logger;
pub mod network;
pub mod status;
pub mod supervisor;
