//! Notepad configuration tool
//!
//! `find` builds the service configuration from a device inventory;
//! `archive` and `recorder` turn a configuration into text settings;
//! `pvnotepad` renders a configuration through a template.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use notepad_tools::discovery::{
    ClassPredicate, JsonInventory, NOTEPAD_SIGNAL_CLASS, NullTransport, find_signals, load_existing, merge_update,
    parse_criteria,
};
use notepad_tools::export::{ArchiveMethod, archive_lines, recorder_lines};
use notepad_tools::output::{load_config, to_config_json, write_output};
use notepad_tools::template::{load_macros, render_template};

#[derive(Parser, Debug)]
#[command(name = "notepad-config")]
#[command(about = "Build and export PV Notepad configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the inventory for notepad-linked signals
    Find {
        /// Search criteria: `key=value`, or a bare device name pattern
        criteria: Vec<String>,

        /// Device inventory (JSON)
        #[arg(long, env = "NOTEPAD_INVENTORY")]
        inventory: PathBuf,

        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Merge into the existing output file instead of replacing it
        #[arg(long)]
        update: bool,

        /// Class of signals to export
        #[arg(long, default_value = NOTEPAD_SIGNAL_CLASS)]
        signal_class: String,
    },

    /// Archiver appliance settings
    Archive {
        /// Notepad configuration
        config: PathBuf,

        /// Archive period in seconds
        #[arg(long, default_value = "1")]
        period: u32,

        #[arg(long, value_enum, default_value_t = ArchiveMethod::Scan)]
        method: ArchiveMethod,

        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
    },

    /// Recorder settings
    Recorder {
        /// Notepad configuration
        config: PathBuf,

        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
    },

    /// Notepad server configuration from a template
    Pvnotepad {
        /// Notepad configuration
        config: PathBuf,

        /// Template file; siblings may be included
        #[arg(long, default_value = "pvnotepad_template.cfg")]
        template: PathBuf,

        /// Macro in the form `key=value`; repeatable
        #[arg(short, long = "macro", value_name = "KEY=VALUE")]
        macros: Vec<String>,

        /// Macros from a JSON object file
        #[arg(long)]
        macro_file: Option<PathBuf>,

        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
    },
}

fn main() -> Result<()> {
    // stdout carries the output documents
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Find {
            criteria,
            inventory,
            output,
            update,
            signal_class,
        } => {
            let criteria = parse_criteria(&criteria);
            let inventory = JsonInventory::new(inventory);
            let predicate = ClassPredicate::new(signal_class);

            let found = find_signals(&inventory, &criteria, &predicate, &NullTransport)?;
            info!("Found {} notepad signals", found.len());

            let definitions = if update && output != "-" {
                merge_update(load_existing(Path::new(&output))?, found)
            } else {
                found
            };
            write_output(&output, &to_config_json(&definitions)?)
        }
        Command::Archive {
            config,
            period,
            method,
            output,
        } => {
            let definitions = load_config(&config)?;
            write_output(&output, &archive_lines(&definitions, period, method).join("\n"))
        }
        Command::Recorder { config, output } => {
            let definitions = load_config(&config)?;
            write_output(&output, &recorder_lines(&definitions).join("\n"))
        }
        Command::Pvnotepad {
            config,
            template,
            macros,
            macro_file,
            output,
        } => {
            let definitions = load_config(&config)?;
            let macros = load_macros(macro_file.as_deref(), &macros)?;
            write_output(&output, &render_template(&template, &definitions, &macros)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvnotepad_repeated_macros() {
        let cli = Cli::try_parse_from([
            "notepad-config",
            "pvnotepad",
            "config.json",
            "--macro",
            "IOC=ioc-notepad",
            "-m",
            "HOST=ctl-01",
        ])
        .unwrap();

        match cli.command {
            Command::Pvnotepad {
                template, macros, macro_file, ..
            } => {
                assert_eq!(template, PathBuf::from("pvnotepad_template.cfg"));
                assert_eq!(macros, vec!["IOC=ioc-notepad", "HOST=ctl-01"]);
                assert!(macro_file.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
