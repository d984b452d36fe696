//! CLI command construction and resource naming.

pub mod cli;
pub mod resource;

pub use cli::DockerCli;
pub use resource::{JobResourceName, ResourceNamer};
