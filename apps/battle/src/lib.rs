pub mod board;
pub mod config;
pub mod game;
pub mod puzzle;
pub mod service;
pub mod session;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod terminal;
pub mod wallet;
