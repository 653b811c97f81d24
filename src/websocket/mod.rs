pub mod connection;
pub mod server;
pub mod types;

pub use server::{
    ClientHub,
    WebSocketServer,
};
