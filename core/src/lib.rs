pub mod audit;
pub mod clawback;
pub mod clock;
pub mod command;
pub mod config;
pub mod customer;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod score;
pub mod settlement;
pub mod status;
pub mod store;
pub mod types;
