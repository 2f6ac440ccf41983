pub mod backend;
pub mod event_sink;
pub mod permission;
