pub mod api;

pub mod app_config;
pub mod client;
pub mod gateway;
pub mod poller;
pub mod route_guard;
pub mod services;
pub mod session;
pub mod telemetry;
pub mod views;
