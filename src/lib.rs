pub mod assembly;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod gazetteer;
pub mod init;
pub mod models;
pub mod pipeline;
pub mod ranking;
pub mod resolver;
pub mod retrieval;
pub mod utils;

pub use error::LorekeepError;
pub use pipeline::{Pipeline, PipelineParts, RoutingMetadata};
