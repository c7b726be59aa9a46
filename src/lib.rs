pub mod chatbot;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod fertilizer;
pub mod model;
pub mod routes;
pub mod utils;
