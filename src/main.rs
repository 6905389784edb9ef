use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use repofetch::{
    cli::args::{CliArgs, Command},
    engine::Transience,
    model::manifest::RepositoryName,
    Repofetch,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let cli_args: CliArgs = CliArgs::parse();

    let mut builder = Repofetch::builder().manifest_file_name(&cli_args.manifest_location);
    if let Some(root) = &cli_args.root {
        builder = builder.root(root);
    }
    if let Some(output_directory) = &cli_args.output_directory {
        builder = builder.output_directory(output_directory);
    }
    if let Some(retries) = cli_args.retries {
        builder = builder.retries(retries);
    }

    match cli_args.cmd {
        Command::Fetch {
            names,
            force,
            keep_partial,
        } => {
            if keep_partial {
                builder = builder.cleanup_on_failure(false);
            }
            let repofetch = builder.try_build()?;
            let report = repofetch.fetch(&repository_names(names), force).await?;

            for (name, result) in &report.fetched {
                println!("{} -> {}", name, result.path().display());
            }
            for (name, failure) in &report.failed {
                match failure.transience() {
                    Transience::Persistent => {
                        error!("{}: configuration error: {}", name, failure)
                    }
                    Transience::Transient => {
                        error!("{}: {}", name, failure)
                    }
                }
            }
            let misconfigured = report.configuration_errors().count();
            if misconfigured > 0 {
                warn!(
                    "{} repositories need their manifest entry fixed before fetching again",
                    misconfigured
                );
            }
            Ok(report.is_success())
        }
        Command::Clean { names } => {
            builder.try_build()?.clean(&repository_names(names))?;
            Ok(true)
        }
    }
}

fn repository_names(names: Vec<String>) -> Vec<RepositoryName> {
    names.into_iter().map(RepositoryName::new).collect()
}
