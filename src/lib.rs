pub mod config;
pub mod error;
pub mod notifier;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod signature;
pub mod template;
pub mod web;
