mod cli;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use cli::{Cli, Commands};
use groupenv::{EnvironmentRegistry, EnvironmentService};
use groupenv_core::config::EnvConfig;
use groupenv_core::observability;

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let mut config = EnvConfig::from_env();
    if let Some(home) = cli.home {
        config.paths.home = PathBuf::from(home);
    }
    let service = EnvironmentService::new(Arc::new(EnvironmentRegistry::new(config)));

    match cli.command {
        Commands::Env { group } => {
            let env = service.get_or_create(&group)?;
            let out = json!({
                "group": env.group(),
                "state": format!("{:?}", env.state()),
                "context": env.context().id(),
                "libraries": paths(&env.resolved_libraries()),
                "components": env.components().names(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Sync { group, manifest } => {
            match manifest {
                Some(source) => {
                    let content = read_input(&source)?;
                    service.save_dependency_manifest(&group, &content)?;
                }
                None => service.get_or_create(&group)?.refresh()?,
            }
            print_paths(&service.list_resolved_libraries(&group)?)?;
        }
        Commands::Wire { group, descriptor } => {
            let content = String::from_utf8(read_input(&descriptor)?)
                .context("Wiring descriptor is not valid UTF-8")?;
            service.save_wiring_descriptor(&group, &content)?;
            let env = service.get_or_create(&group)?;
            println!("{}", serde_json::to_string_pretty(&env.components().names())?);
        }
        Commands::Libs { group } => {
            print_paths(&service.list_resolved_libraries(&group)?)?;
        }
        Commands::RemoveLib { group, path } => {
            let outcome = service.remove_library_detailed(&group, Path::new(&path))?;
            let out = json!({
                "removed": outcome.accepted(),
                "outcome": format!("{:?}", outcome),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::HostLibs => {
            print_paths(&service.list_host_libraries())?;
        }
        Commands::ExportLibs { group } => {
            print_paths(&service.exportable_libraries(&group)?)?;
        }
    }

    Ok(())
}

fn read_input(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read {}", source))
    }
}

fn paths(list: &[PathBuf]) -> Vec<String> {
    list.iter().map(|p| p.to_string_lossy().to_string()).collect()
}

fn print_paths(list: &[PathBuf]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&paths(list))?);
    Ok(())
}
