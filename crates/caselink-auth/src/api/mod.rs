//! Auth controller HTTP API.

pub mod client;
pub mod dto;

pub use client::{AuthApi, HttpAuthApi};
pub use dto::{LoginRequest, TokenResponse, VerifyResponse};
