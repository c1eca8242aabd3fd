#![cfg_attr(not(test), forbid(unsafe_code))]

//! Models and configuration shared by the CarePortal messaging client and CLI.

pub mod config;
pub mod models;
