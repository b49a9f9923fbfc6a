//! Notepad configuration tooling
//!
//! - `discovery`: search a device inventory for notepad-linked signals and
//!   produce the service's JSON configuration
//! - `export`: turn that configuration into archiver and recorder settings
//! - `template`: render the notepad server's own configuration from a
//!   Jinja template

pub mod discovery;
pub mod export;
pub mod output;
pub mod template;
