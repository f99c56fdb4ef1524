pub mod admin;
pub mod cli;
pub mod config;
pub mod engagement;
pub mod error;
pub mod feedback;
pub mod news;
pub mod session;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use error::{Error, Result};
