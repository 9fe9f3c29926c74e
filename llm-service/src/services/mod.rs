//! Concrete provider services.

pub mod ollama_service;
pub mod open_ai_service;
