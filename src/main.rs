use anyhow::{Context, Result};
use clap::Parser;
use classpath_index::bootstrap::bootstrap;
use classpath_index::cli::{Cli, Commands};
use classpath_index::config::{
    archive_filter, clear_cache, resolve_cache_root, resolve_properties,
};
use classpath_index::declare::{render_manifest, scan_sources};
use classpath_index::filter::ArchiveFilter;
use classpath_index::index::{CacheStatus, IndexCache};
use classpath_index::observer::default_observers;
use classpath_index::resolver::FlagConflict;
use classpath_index::walker::ClasspathWalker;
use serde::Serialize;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command.clone() {
        Commands::Index { archive, include } => {
            let cache_root = resolve_cache_root(&cli)?;
            let mut walker =
                ClasspathWalker::new(default_observers(), Box::new(archive_filter(&include)));
            let summary = walker
                .walk(&archive, &cache_root)
                .with_context(|| format!("Failed to index {}", archive.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Status => {
            let cache_root = resolve_cache_root(&cli)?;
            let report = cache_report(&cache_root)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Check {
            archive,
            include,
            classes,
        } => {
            let cache_root = resolve_cache_root(&cli)?;
            let properties = resolve_properties(&cli)?;
            let index = bootstrap(
                &archive,
                &cache_root,
                boxed_filter(&include),
                &properties,
            )
            .with_context(|| format!("Failed to bootstrap from {}", archive.display()))?;

            let results = classes
                .iter()
                .map(|class| ClassDecision {
                    class: class.clone(),
                    allowed: index.allowed(class),
                })
                .collect();
            let output = CheckResult {
                results,
                conflicts: index.filter().conflicts().to_vec(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Components {
            archive,
            include,
            index: cache_name,
        } => {
            let cache_root = resolve_cache_root(&cli)?;
            let properties = resolve_properties(&cli)?;
            let index = bootstrap(
                &archive,
                &cache_root,
                boxed_filter(&include),
                &properties,
            )
            .with_context(|| format!("Failed to bootstrap from {}", archive.display()))?;

            let output = ComponentsResult {
                index: cache_name.clone(),
                components: index.components(&cache_name)?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Declare { source_dir, output } => {
            let declarations = scan_sources(&source_dir)?;
            let manifest = render_manifest(&declarations);
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent()
                        && !parent.as_os_str().is_empty()
                    {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, manifest)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
                None => print!("{manifest}"),
            }
        }
        Commands::Clear => {
            let cache_root = resolve_cache_root(&cli)?;
            let removed = clear_cache(&cache_root)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&ClearResult {
                    cache_root: cache_root.to_string_lossy().to_string(),
                    removed,
                })?
            );
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn boxed_filter(include: &[String]) -> Box<dyn ArchiveFilter> {
    Box::new(archive_filter(include))
}

#[derive(Debug, Serialize)]
struct CacheReport {
    name: String,
    path: String,
    status: CacheStatus,
    lines: usize,
    sha256: Option<String>,
}

fn cache_report(cache_root: &Path) -> Result<Vec<CacheReport>> {
    let mut report = Vec::new();
    for observer in default_observers() {
        let cache = IndexCache::new(cache_root, observer.cache_name());
        let status = cache.status();
        let lines = match status {
            CacheStatus::Valid => cache.read_lines()?.map(|l| l.len()).unwrap_or(0),
            _ => 0,
        };
        report.push(CacheReport {
            name: cache.name().to_string(),
            path: cache.path().to_string_lossy().to_string(),
            status,
            lines,
            sha256: cache.digest()?,
        });
    }
    Ok(report)
}

#[derive(Debug, Serialize)]
struct ClassDecision {
    class: String,
    allowed: bool,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    results: Vec<ClassDecision>,
    conflicts: Vec<FlagConflict>,
}

#[derive(Debug, Serialize)]
struct ComponentsResult {
    index: String,
    components: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ClearResult {
    cache_root: String,
    removed: bool,
}
