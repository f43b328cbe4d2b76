pub mod cache_policy;
pub mod chat;
pub mod classify;
pub mod config_cmd;
pub mod explain;
