pub mod config;
pub mod controller;
pub mod message;
pub mod stream_client;
