use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observer::COMPONENT_INDEX;

#[derive(Debug, Clone, Parser)]
#[command(name = "classpath-index")]
#[command(about = "Index component declarations in nested application archives and filter them by feature flags")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Node data directory; caches live under <DIR>/cache
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Properties file, applied in order (repeatable)
    #[arg(long, value_name = "FILE", global = true)]
    pub properties: Vec<PathBuf>,

    /// Property override, key=value (repeatable)
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", global = true)]
    pub define: Vec<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Build missing index caches from the application archive
    Index {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,

        /// Only walk nested archives whose file name starts with PREFIX
        #[arg(long, value_name = "PREFIX")]
        include: Vec<String>,
    },
    /// Report the state of every index cache
    Status,
    /// Decide whether classes may be loaded
    Check {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,

        #[arg(long, value_name = "PREFIX")]
        include: Vec<String>,

        #[arg(required = true)]
        classes: Vec<String>,
    },
    /// List the loadable components of one index
    Components {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,

        #[arg(long, value_name = "PREFIX")]
        include: Vec<String>,

        #[arg(long, value_name = "NAME", default_value = COMPONENT_INDEX)]
        index: String,
    },
    /// Generate the flag declaration manifest from Java sources
    Declare {
        source_dir: PathBuf,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Delete every index cache
    Clear,
}
