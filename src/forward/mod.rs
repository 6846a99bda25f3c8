//! Client for the Fluentd Forward protocol over TCP, TLS or a unix socket.

mod client;
mod codec;
mod connection;

pub use client::ForwardClient;
