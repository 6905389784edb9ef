use clap::Parser;

/// Materializes the git repositories listed in a manifest.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Project root directory; other paths are relative to it.
    #[clap(long, env = "REPOFETCH_ROOT")]
    pub root: Option<String>,
    /// Name of the manifest file
    #[clap(short, long, default_value = "repofetch.toml")]
    pub manifest_location: String,
    /// Directory repositories are fetched into.
    /// Defaults to $HOME/.repofetch/repositories
    #[clap(short, long)]
    pub output_directory: Option<String>,
    /// Extra attempts after a transient failure
    #[clap(long)]
    pub retries: Option<u32>,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Fetches the repositories defined in the manifest
    Fetch {
        /// Repositories to fetch, all of them if empty
        names: Vec<String>,
        /// Fetch again even when an up to date checkout exists
        #[clap(short, long)]
        force: bool,
        /// Leave partially written destinations behind on failure
        #[clap(long)]
        keep_partial: bool,
    },
    /// Removes fetched repositories
    Clean {
        /// Repositories to remove, all of them if empty
        names: Vec<String>,
    },
}
