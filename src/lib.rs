pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod providers;
pub mod relay;
pub mod request;
pub mod transcode;
pub mod update;
pub mod upstream;
