pub mod conversation;
pub mod message;
pub mod ruleset;
pub mod tool;
