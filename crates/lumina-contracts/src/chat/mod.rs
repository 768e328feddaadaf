mod commands;

pub use commands::{parse_walk_command, WalkCommand, WalkCommandSpec, WALK_COMMANDS};
