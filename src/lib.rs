pub mod backup;
pub mod config;
pub mod environment;
pub mod errors;
pub mod material;
pub mod normalization;
pub mod notify;
pub mod remote;
pub mod synchronizer;
pub mod tier;
pub mod urls;

pub use synchronizer::Synchronizer;
