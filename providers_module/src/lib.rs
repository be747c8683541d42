//! Blocking REST clients for the external services the triage pipelines
//! talk to: OpenPhone (SMS), Gmail (mail + drafts), Perplexity (LLM chat
//! completions), and OneSignal (push notifications).
//!
//! Every client resolves its API base URL from an environment override so
//! integration tests can point it at a local mock server.

pub mod gmail;
pub mod google_auth;
pub mod onesignal;
pub mod openphone;
pub mod perplexity;
