//! Request / response bodies for the HTTP API.

pub mod chat;

pub use chat::{ChatReply, ChatRequest, ErrorBody};
