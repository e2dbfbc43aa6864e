pub mod api;
pub mod bus;
pub mod config;
pub mod detector;
pub mod error;
pub mod sensor;
pub mod session;
pub mod state;
