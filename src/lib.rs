pub mod broker;
pub mod game;
pub mod messages;
pub mod wire;
