//! Commands that read or change the database directly.

use clap::{Subcommand, ValueEnum};
use serde_json::Value as Json;

use detti_kv::DettiDb;

use super::{format_bytes, open_db, output, parse_input, print_success, print_warning};
use crate::Cli;

/// How `set` stores its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ValueType {
    /// Pick the type from the value's JSON form
    #[default]
    Auto,
    String,
    Int,
    Float,
    List,
}

#[derive(Subcommand)]
pub enum DataCommand {
    /// Print the value stored under a key
    Get {
        key: String,
    },
    /// Store a value
    ///
    /// The value is read as JSON when it parses, otherwise as plain text:
    /// `12` is an integer, `1.5` a float, `'["a", 1]'` a list and
    /// `hello` a string.
    Set {
        key: String,
        value: String,
        /// Store as this type instead of guessing
        #[arg(long = "type", short = 't', value_enum, default_value_t)]
        value_type: ValueType,
    },
    /// Append an element to a list
    Append {
        key: String,
        value: String,
    },
    /// Remove a key
    Delete {
        key: String,
    },
    /// Check whether a key exists
    Exists {
        key: String,
    },
    /// Print every entry
    All,
    /// List every key
    Keys,
    /// Print entries whose key starts with a prefix
    #[command(name = "search-key")]
    SearchKey {
        prefix: String,
    },
    /// Print entries whose value starts with a prefix
    #[command(name = "search-val")]
    SearchVal {
        prefix: String,
    },
    /// Show entry count and file size
    Stats,
    /// Remove every entry
    Clear {
        /// Confirm removing everything
        #[arg(long)]
        yes: bool,
    },
}

impl DataCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let (_cfg, db) = open_db(cli)?;
        let result = self.exec(cli, &db);
        db.shutdown();
        result
    }

    fn exec(&self, cli: &Cli, db: &DettiDb) -> anyhow::Result<()> {
        match self {
            DataCommand::Get { key } => match db.get(key) {
                Some(value) => output(cli).write(&value),
                None => anyhow::bail!("key {:?} not found", key),
            },

            DataCommand::Set {
                key,
                value,
                value_type,
            } => {
                match value_type {
                    ValueType::Auto => db.set(key, parse_input(value))?,
                    ValueType::String => db.set_string(key, Json::String(value.clone()))?,
                    ValueType::Int => db.set_int(key, parse_input(value))?,
                    ValueType::Float => db.set_float(key, parse_input(value))?,
                    ValueType::List => db.set_list(key, parse_input(value))?,
                }
                print_success(&format!("Stored {:?}", key.trim()));
                Ok(())
            }

            DataCommand::Append { key, value } => {
                db.append(key, parse_input(value))?;
                print_success(&format!("Appended to {:?}", key));
                Ok(())
            }

            DataCommand::Delete { key } => {
                db.delete(key)?;
                print_success(&format!("Deleted {:?}", key));
                Ok(())
            }

            DataCommand::Exists { key } => output(cli).write(&db.exists(key)),

            DataCommand::All => output(cli).write(&db.get_all()),

            DataCommand::Keys => output(cli).write(&db.keys()),

            DataCommand::SearchKey { prefix } => {
                output(cli).write(&db.search_by_key_prefix(prefix))
            }

            DataCommand::SearchVal { prefix } => {
                output(cli).write(&db.search_by_value_prefix(prefix))
            }

            DataCommand::Stats => {
                let stats = db.stats()?;
                if cli.json {
                    return output(cli).write(&stats);
                }
                println!("File:    {}", db.path().display());
                println!("Entries: {}", stats.entries);
                println!("Size:    {}", format_bytes(stats.size_on_disk));
                Ok(())
            }

            DataCommand::Clear { yes } => {
                if !yes {
                    print_warning("This removes every entry; pass --yes to confirm");
                    anyhow::bail!("clear not confirmed");
                }
                let removed = db.len();
                db.clear()?;
                print_success(&format!("Removed {} entries", removed));
                Ok(())
            }
        }
    }
}
