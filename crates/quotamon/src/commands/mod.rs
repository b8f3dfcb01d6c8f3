pub mod config_cmd;
pub mod discover;
pub mod status;
pub mod watch;
