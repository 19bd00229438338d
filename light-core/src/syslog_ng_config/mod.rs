//! Configuration statement model
//!
//! Tests compose a [`ConfigDocument`] out of statements and log paths, then
//! render it once per daemon run:
//!
//! ```text
//!   ConfigDocument
//!   ├── @version / @include / options {} / preamble / templates
//!   ├── statement blocks   source | destination | parser | rewrite | filter
//!   │     └── Statement     driver(positional... name(value)...)
//!   └── log paths          source → parser → rewrite → filter → destination
//! ```
//!
//! Sources and destinations come with their harness-side I/O already paired
//! ([`SourceDriver`], [`DestinationDriver`]), so a test writes input and reads
//! output without knowing the transport.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use light_core::config::HarnessConfig;
//! use light_core::registry::ResourceRegistry;
//! use light_core::syslog_ng_config::{ConfigDocument, FileDestinationOptions, FileSourceOptions};
//!
//! # fn main() -> light_core::Result<()> {
//! let config = HarnessConfig::from_env();
//! let registry = Arc::new(ResourceRegistry::new(&config.working_dir)?);
//! let mut doc = ConfigDocument::new(registry, &config);
//!
//! let source = doc.file_source(FileSourceOptions::new())?;
//! let destination = doc.file_destination(FileDestinationOptions::new().template("$MSG\n"))?;
//! doc.create_logpath([source.id(), destination.id()])?;
//!
//! println!("{}", doc.render()?);
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod drivers;
mod factories;
pub mod logpath;
pub mod option;
mod render;
pub mod statement;

pub use document::{ConfigDocument, Template, TemplateForm};
pub use drivers::{
    DestinationDriver, DriverKind, DriverProperties, Endpoint, FileDestinationOptions, FileSourceOptions,
    IoContext, MqttOptions, NetworkOptions, SourceDriver, UnixSocketOptions,
};
pub use logpath::{LogPath, LogPathFlag};
pub use option::{OptionValue, Options};
pub use statement::{Statement, StatementId, StatementKind};
