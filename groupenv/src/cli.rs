use clap::{Parser, Subcommand};

/// groupenv - isolated per-group library environments
#[derive(Parser, Debug)]
#[command(name = "groupenv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Storage root (overrides GROUPENV_HOME)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the group's environment and print its state and libraries
    Env {
        #[arg(value_name = "GROUP")]
        group: String,
    },

    /// Store a dependency manifest (optional) and re-sync the group
    Sync {
        #[arg(value_name = "GROUP")]
        group: String,

        /// Manifest to store before syncing. Use "-" to read from stdin
        #[arg(long, value_name = "FILE")]
        manifest: Option<String>,
    },

    /// Store a component wiring descriptor and rewire the group
    Wire {
        #[arg(value_name = "GROUP")]
        group: String,

        /// Descriptor file. Use "-" to read from stdin
        #[arg(value_name = "FILE")]
        descriptor: String,
    },

    /// List the archives the group's loading context was built from
    Libs {
        #[arg(value_name = "GROUP")]
        group: String,
    },

    /// Delete a user-managed archive and invalidate the group
    RemoveLib {
        #[arg(value_name = "GROUP")]
        group: String,

        #[arg(value_name = "PATH")]
        path: String,
    },

    /// List archives on the host application's own library path
    HostLibs,

    /// List archives directly in the group's library directory
    ExportLibs {
        #[arg(value_name = "GROUP")]
        group: String,
    },
}
