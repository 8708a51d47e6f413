pub mod analysis;
pub mod camera;
pub mod cli;
pub mod config;
pub mod controller;
pub mod crop;
pub mod detect;
pub mod device;
pub mod dialogue;
pub mod error;
pub mod events;
pub mod frame;
pub mod history;
pub mod persona;
pub mod pipeline;
pub mod preprocess;
pub mod prompts;
pub mod retry;
pub mod voice;

pub use cli::{execute, run_cli, Cli, Commands};
pub use error::{Error, Result};
