//! CLI Tooling
//!
//! Command-line interface over a workspace: the configured base layers, the
//! writable layer on top of them, and the merged-tree cache.

use crate::cache::{self, CacheOutcome};
use crate::config::{ConfigLoader, LayerFsConfig, ResolvedPaths, WORKSPACE_CONFIG_FILE};
use crate::error::ApiError;
use crate::layer::{merge_layers, MergedTree};
use crate::logging::LoggingConfig;
use crate::resource::ResolverRegistry;
use crate::session::{self, Handle, OpenOptions, SessionRegistry};
use crate::store;
use crate::tree::{AttrValue, Content, Node, VirtualTree};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// layerfs CLI - layered XML configuration filesystem
#[derive(Parser)]
#[command(name = "layerfs")]
#[command(about = "Merge, inspect and edit layered XML configuration filesystems")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply logging flags on top of the configured logging section
    pub fn logging_config(&self, mut config: LoggingConfig) -> LoggingConfig {
        if self.verbose {
            config.level = "debug".to_string();
            config.output = "stderr".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the merged tree as layer XML
    Merge {
        /// Leave out the writable layer
        #[arg(long)]
        base_only: bool,
        /// Merge from the layer files even if the cache is valid
        #[arg(long)]
        no_cache: bool,
    },
    /// List the children of a folder in the merged tree
    Ls {
        #[arg(default_value = "")]
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the content of a file in the merged tree
    Cat { path: String },
    /// Read or change attributes
    Attr {
        #[command(subcommand)]
        command: AttrCommands,
    },
    /// Create a folder in the writable layer
    Mkdir {
        path: String,
        /// Create missing parent folders too
        #[arg(short, long)]
        parents: bool,
    },
    /// Create a file in the writable layer, or set its content
    Touch {
        path: String,
        /// Inline text content
        #[arg(long, conflicts_with = "url")]
        content: Option<String>,
        /// Content URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Delete a node created in the writable layer
    Rm { path: String },
    /// Rename a node created in the writable layer, within its folder
    Mv { from: String, to: String },
    /// Merged-tree cache commands
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Write a default layerfs.toml into the workspace
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum AttrCommands {
    /// Print one attribute, or all attributes of a node
    Get {
        path: String,
        name: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Set an attribute in the writable layer
    Set {
        path: String,
        name: String,
        value: String,
        /// Value type: bool, byte, short, int, long, float, double, char,
        /// string, url, method, new, bundle, serial
        #[arg(long = "type", default_value = "string")]
        value_type: String,
    },
    /// Remove an attribute from the writable layer
    Unset { path: String, name: String },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Merge the base layers and store the cache
    Build,
    /// Show whether the cache matches the current layers
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// CLI context for one workspace
pub struct CliContext {
    workspace_root: PathBuf,
    config: LayerFsConfig,
    paths: ResolvedPaths,
    sessions: Arc<SessionRegistry>,
    resolvers: ResolverRegistry,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(&workspace_root, config_path.as_deref())?;
        let paths = config.resolve_paths(&workspace_root)?;

        Ok(Self {
            workspace_root,
            config,
            paths,
            sessions: SessionRegistry::new(),
            resolvers: ResolverRegistry::with_defaults(),
        })
    }

    pub fn config(&self) -> &LayerFsConfig {
        &self.config
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.execute_inner(command);
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Merge {
                base_only,
                no_cache,
            } => {
                let tree = if *base_only {
                    self.base(!no_cache)?.0.into_tree()
                } else {
                    self.open_handle(!no_cache)?.get()?
                };
                Ok(render_tree(&tree))
            }
            Commands::Ls { path, format } => {
                let tree = self.open_handle(true)?.get()?;
                let children = tree.get_children(path)?;
                format_children(&children, format)
            }
            Commands::Cat { path } => self.handle_cat(path),
            Commands::Attr { command } => self.handle_attr_command(command),
            Commands::Mkdir { path, parents } => self.edit(|handle| {
                if *parents {
                    let mut current = String::new();
                    for part in crate::tree::path::components(path)? {
                        current = crate::tree::path::join(&current, part);
                        if handle.get()?.is_folder(&current) {
                            continue;
                        }
                        handle.create_folder(&current)?;
                    }
                } else {
                    handle.create_folder(path)?;
                }
                Ok(format!("Created folder {}", path))
            }),
            Commands::Touch { path, content, url } => self.edit(|handle| {
                let exists = handle.get()?.exists(path);
                if !exists {
                    handle.create_file(path)?;
                }
                let content = match (content, url) {
                    (Some(text), _) => Some(Content::inline(text.as_str())),
                    (None, Some(url)) => Some(Content::url(url.as_str())),
                    (None, None) => None,
                };
                if let Some(content) = content {
                    handle.set_content(path, Some(content))?;
                    return Ok(format!("Set content of {}", path));
                }
                Ok(if exists {
                    format!("{} already exists", path)
                } else {
                    format!("Created file {}", path)
                })
            }),
            Commands::Rm { path } => self.edit(|handle| {
                handle.delete(path)?;
                Ok(format!("Deleted {}", path))
            }),
            Commands::Mv { from, to } => self.edit(|handle| {
                handle.rename(from, to)?;
                Ok(format!("Renamed {} to {}", from, to))
            }),
            Commands::Cache { command } => self.handle_cache_command(command),
            Commands::Init { force } => self.handle_init(*force),
        }
    }

    /// Base tree from the cache when enabled and valid, otherwise merged
    fn base(&self, use_cache: bool) -> Result<(MergedTree, Option<CacheOutcome>), ApiError> {
        let layers = self.paths.layers.sources();
        match (&self.paths.cache, use_cache) {
            (Some(cache_path), true) => {
                let (merged, outcome) = cache::load_or_merge(layers, cache_path)?;
                Ok((merged, Some(outcome)))
            }
            _ => Ok((merge_layers(layers)?, None)),
        }
    }

    fn working_cache_path(&self) -> Option<PathBuf> {
        self.paths
            .cache
            .as_ref()
            .map(|path| path.with_extension("working.bin"))
    }

    fn open_handle(&self, use_cache: bool) -> Result<Handle, ApiError> {
        let (base, _) = self.base(use_cache)?;
        let mut options = OpenOptions::new(&self.paths.writable_layer, base)
            .autosave(self.config.session.autosave);
        if let Some(path) = self.working_cache_path() {
            options = options.cache_path(path);
        }
        session::open(&self.sessions, options)
    }

    /// Run an edit against the writable layer and save it
    fn edit<F>(&self, op: F) -> Result<String, ApiError>
    where
        F: FnOnce(&Handle) -> Result<String, ApiError>,
    {
        let handle = self.open_handle(true)?;
        let message = op(&handle)?;
        if handle.is_modified() {
            handle.save()?;
        }
        Ok(message)
    }

    fn handle_cat(&self, path: &str) -> Result<String, ApiError> {
        let handle = self.open_handle(true)?;
        let tree = handle.get()?;
        let Some(content) = tree.content(path)? else {
            return Ok(String::new());
        };
        let base_dir = self.content_base_dir(&handle, path);
        let bytes = self.resolvers.read_content(content, base_dir.as_deref())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Directory of the layer that supplied a node, for relative content URLs
    fn content_base_dir(&self, handle: &Handle, path: &str) -> Option<PathBuf> {
        let supplied_by_overlay = handle
            .layer()
            .find(path)
            .map_or(false, |node| node.content().is_some());
        let layer_file = if supplied_by_overlay {
            handle.path().to_path_buf()
        } else {
            PathBuf::from(handle.base().origin(path))
        };
        layer_file
            .parent()
            .map(Path::to_path_buf)
            .filter(|dir| dir.is_dir())
            .or_else(|| Some(self.workspace_root.clone()))
    }

    fn handle_attr_command(&self, command: &AttrCommands) -> Result<String, ApiError> {
        match command {
            AttrCommands::Get { path, name, format } => {
                let tree = self.open_handle(true)?.get()?;
                let node = tree
                    .find(path)
                    .ok_or_else(|| ApiError::NotFound(path.clone()))?;
                let attributes: Vec<(&str, &AttrValue)> = match name {
                    Some(name) => match node.attribute(name) {
                        Some(value) => vec![(name.as_str(), value)],
                        None => {
                            return Err(ApiError::InvalidAttribute {
                                path: path.clone(),
                                name: name.clone(),
                                reason: "attribute is not set".to_string(),
                            })
                        }
                    },
                    None => node.attributes().collect(),
                };
                format_attributes(path, &attributes, format)
            }
            AttrCommands::Set {
                path,
                name,
                value,
                value_type,
            } => {
                let parsed = AttrValue::parse_typed(value_type, value).map_err(|reason| {
                    ApiError::InvalidAttribute {
                        path: path.clone(),
                        name: name.clone(),
                        reason,
                    }
                })?;
                self.edit(|handle| {
                    handle.set_attribute(path, name, Some(parsed))?;
                    Ok(format!("Set {} on {}", name, path))
                })
            }
            AttrCommands::Unset { path, name } => self.edit(|handle| {
                match handle.set_attribute(path, name, None)? {
                    Some(_) => Ok(format!("Removed {} from {}", name, path)),
                    None => Ok(format!("{} has no attribute {}", path, name)),
                }
            }),
        }
    }

    fn handle_cache_command(&self, command: &CacheCommands) -> Result<String, ApiError> {
        let cache_path = self.paths.cache.as_ref().ok_or_else(|| {
            ApiError::ConfigError("Cache is disabled in configuration".to_string())
        })?;
        match command {
            CacheCommands::Build => {
                let (merged, outcome) =
                    cache::load_or_merge(self.paths.layers.sources(), cache_path)?;
                Ok(format!(
                    "Cache {} at {}: {} layers, {} nodes, fingerprint {}",
                    outcome,
                    cache_path.display(),
                    merged.sources().len(),
                    merged.tree().node_count(),
                    hex::encode(merged.fingerprint())
                ))
            }
            CacheCommands::Status { format } => {
                let current = self.paths.layers.fingerprint()?;
                let status = match cache::inspect(cache_path) {
                    Ok(record) => CacheStatus {
                        present: true,
                        valid: *record.fingerprint() == current,
                        layers: record.sources().len(),
                        nodes: record.merged.tree().node_count(),
                        created_at: Some(record.created_at.to_rfc3339()),
                        reason: None,
                    },
                    Err(ApiError::Storage(crate::error::StorageError::CacheMiss {
                        reason, ..
                    })) => CacheStatus {
                        present: false,
                        valid: false,
                        layers: 0,
                        nodes: 0,
                        created_at: None,
                        reason: Some(reason),
                    },
                    Err(e) => return Err(e),
                };
                format_cache_status(cache_path, &current, &status, format)
            }
        }
    }

    fn handle_init(&self, force: bool) -> Result<String, ApiError> {
        let path = self.workspace_root.join(WORKSPACE_CONFIG_FILE);
        if path.exists() && !force {
            return Ok(format!(
                "{} already exists. Use --force to overwrite.",
                path.display()
            ));
        }
        let text = LayerFsConfig::default().to_toml()?;
        store::atomic_write(&path, text.as_bytes())?;
        Ok(format!("Wrote {}", path.display()))
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Merge { .. } => "merge",
        Commands::Ls { .. } => "ls",
        Commands::Cat { .. } => "cat",
        Commands::Attr { .. } => "attr",
        Commands::Mkdir { .. } => "mkdir",
        Commands::Touch { .. } => "touch",
        Commands::Rm { .. } => "rm",
        Commands::Mv { .. } => "mv",
        Commands::Cache { .. } => "cache",
        Commands::Init { .. } => "init",
    }
}

struct CacheStatus {
    present: bool,
    valid: bool,
    layers: usize,
    nodes: usize,
    created_at: Option<String>,
    reason: Option<String>,
}

fn to_json(value: &serde_json::Value) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| crate::error::StorageError::Serialization(e.to_string()).into())
}

fn describe_content(node: &Node) -> String {
    match node.content() {
        Some(Content::Inline(bytes)) => format!("inline ({} bytes)", bytes.len()),
        Some(Content::Url(url)) => url.clone(),
        None => "-".to_string(),
    }
}

fn format_children(children: &[&Node], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        let arr: Vec<serde_json::Value> = children
            .iter()
            .map(|node| {
                let attributes: serde_json::Map<String, serde_json::Value> = node
                    .attributes()
                    .map(|(k, v)| (k.to_string(), json!(v.to_string())))
                    .collect();
                json!({
                    "name": node.name(),
                    "kind": node.kind().as_str(),
                    "attributes": attributes,
                    "children": node.child_count(),
                    "content": node.content().map(|_| describe_content(node)),
                })
            })
            .collect();
        return to_json(&serde_json::Value::Array(arr));
    }
    if children.is_empty() {
        return Ok("(empty)".to_string());
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Name", "Kind", "Attributes", "Children", "Content"]);
    for node in children {
        table.add_row(vec![
            node.name().to_string(),
            node.kind().as_str().to_string(),
            node.attributes().count().to_string(),
            node.child_count().to_string(),
            describe_content(node),
        ]);
    }
    Ok(table.to_string())
}

fn format_attributes(
    path: &str,
    attributes: &[(&str, &AttrValue)],
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        let arr: Vec<serde_json::Value> = attributes
            .iter()
            .map(|(name, value)| {
                json!({
                    "path": path,
                    "name": name,
                    "type": value.xml_kind(),
                    "value": value.encode(),
                })
            })
            .collect();
        return to_json(&serde_json::Value::Array(arr));
    }
    if let [(_, value)] = attributes {
        return Ok(value.to_string());
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Name", "Type", "Value"]);
    for (name, value) in attributes {
        table.add_row(vec![name.to_string(), value.xml_kind().to_string(), value.to_string()]);
    }
    Ok(table.to_string())
}

fn format_cache_status(
    cache_path: &Path,
    current: &crate::types::Fingerprint,
    status: &CacheStatus,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&json!({
            "path": cache_path.display().to_string(),
            "present": status.present,
            "valid": status.valid,
            "layers": status.layers,
            "nodes": status.nodes,
            "created_at": status.created_at,
            "reason": status.reason,
            "current_fingerprint": hex::encode(current),
        }));
    }
    let mut output = format!("Cache: {}\n", cache_path.display());
    if !status.present {
        output.push_str(&format!(
            "Status: missing ({})\n",
            status.reason.as_deref().unwrap_or("unknown")
        ));
        return Ok(output.trim_end().to_string());
    }
    output.push_str(&format!(
        "Status: {}\n",
        if status.valid { "valid" } else { "stale" }
    ));
    output.push_str(&format!("Layers: {}\n", status.layers));
    output.push_str(&format!("Nodes: {}\n", status.nodes));
    if let Some(created_at) = &status.created_at {
        output.push_str(&format!("Created: {}\n", created_at));
    }
    output.push_str(&format!("Current fingerprint: {}", hex::encode(current)));
    Ok(output)
}

/// Render a tree the way `merge` prints it
pub fn render_tree(tree: &VirtualTree) -> String {
    tree.to_xml().trim_end().to_string()
}
