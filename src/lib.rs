pub mod cli;
pub mod config;
pub mod game;
pub mod server;
pub mod world;
