pub mod advisory;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod model;
pub mod notification;
pub mod providers;
pub mod service;
pub mod storage;
pub mod weather_code;
