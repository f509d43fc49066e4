//! Scenegraph command line tool
//!
//! Loads the plugin registry and reports on node types and scene files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::warn;

use scenegraph::{NodeGraph, PluginConfig, PluginManager};

#[derive(Parser, Debug)]
#[command(name = "scenegraph")]
#[command(about = "Inspect scenegraph plugins and scene files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Plugin root directory (defaults to SCENEGRAPH_ROOT or the data directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Extra external plugin directory, may be repeated
    #[arg(short, long = "plugins", global = true)]
    plugin_paths: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered node types
    #[command(alias = "ls")]
    Plugins {
        /// Include disabled and incomplete types
        #[arg(long)]
        all: bool,
    },

    /// Show the merged metadata of a node type
    Describe {
        /// Node type name
        node_type: String,
    },

    /// Load a scene file and list its nodes and edges
    Inspect {
        /// Scene file path
        scene: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.root {
        Some(root) => PluginConfig::with_root(root),
        None => PluginConfig::from_env(),
    };
    config.external_paths.extend(cli.plugin_paths.iter().cloned());

    let mut plugins = PluginManager::new(config);
    for error in plugins.load_plugins() {
        warn!("{}", error);
    }

    match cli.command {
        Commands::Plugins { all } => list_plugins(&plugins, all),
        Commands::Describe { node_type } => describe(&plugins, &node_type)?,
        Commands::Inspect { scene } => inspect(&plugins, &scene)?,
    }
    Ok(())
}

fn list_plugins(plugins: &PluginManager, all: bool) {
    for type_name in plugins.node_types(&[], all) {
        let Some(entry) = plugins.entry(type_name) else {
            continue;
        };
        let state = if entry.is_valid() {
            ""
        } else if !entry.enabled {
            " (disabled)"
        } else {
            " (incomplete)"
        };
        println!(
            "{:<16} {:<9} {}{}",
            type_name,
            entry.origin,
            entry.category.as_deref().unwrap_or("-"),
            state
        );
    }
}

fn describe(plugins: &PluginManager, node_type: &str) -> Result<()> {
    let entry = plugins
        .entry(node_type)
        .with_context(|| format!("unknown node type \"{}\"", node_type))?;
    let lineage: Vec<&str> = entry.lineage.iter().map(|e| e.type_name.as_str()).collect();
    println!("{} ({}, module {})", node_type, entry.origin, entry.module);
    println!("  lineage: {}", lineage.join(" -> "));
    if let Some(path) = &entry.metadata_path {
        println!("  metadata: {}", path.display());
    }
    let (specs, errors) = entry.metadata.attribute_specs();
    for section in entry.metadata.sections() {
        println!("  [{}]", section);
        for spec in specs.iter().filter(|spec| spec.section == section) {
            let ty = spec.attr_type().map_or_else(|| "-".to_string(), |ty| ty.to_string());
            let role = spec.role().map_or_else(String::new, |role| format!(" {}", role));
            println!("    {:<16} {:<8} {}{}", spec.name, ty, spec.default, role);
        }
    }
    for error in errors {
        println!("  invalid: {}", error);
    }
    Ok(())
}

fn inspect(plugins: &PluginManager, scene: &Path) -> Result<()> {
    let mut graph = NodeGraph::new();
    graph
        .read(plugins, scene)
        .with_context(|| format!("failed to read {}", scene.display()))?;

    println!("{} nodes, {} edges", graph.len(), graph.edges().len());
    for node in graph.nodes() {
        println!("  {} [{}]", node, node.attribute_names().join(", "));
    }
    for edge in graph.edges() {
        let name = |id| graph.node(id).map(|node| node.name()).unwrap_or("?");
        println!(
            "  {}.{} -> {}.{}",
            name(edge.source.node),
            edge.source.attribute,
            name(edge.target.node),
            edge.target.attribute
        );
    }
    Ok(())
}
