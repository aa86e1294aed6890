//! Client, settings and value types.

mod builder;
mod client;
mod parse;
mod settings;
mod value;

pub use builder::KvClientBuilder;
pub use client::KvClient;
pub use settings::{ClientSettings, DEFAULT_ENV_PREFIX};
pub use value::{KvValue, ValueMapper};
