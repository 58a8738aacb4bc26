pub mod audit;
pub mod cli;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod envelope;
pub mod errors;
pub mod kms;
pub mod masking;
pub mod store;
pub mod vault;
