//! Request, response and generation types for the relay.

pub mod chat;
pub mod generation;

pub use chat::{ChatRequest, ChatResponse, DirectResponse};
pub use generation::{
    GenerationParameters, GenerationSettings, HarmBlockThreshold, HarmCategory, SafetySetting,
};
