//! Plugin system for node type discovery and registration
//!
//! Plugin modules are either compiled in ([`StaticModule`]) or shared
//! libraries found on the search paths. Both register through the same
//! entry point. Discovery order is core, built-in, then external paths; a
//! later module may bind a widget to an existing type but never replaces
//! an existing node class.

pub mod builtin;
pub mod registrar;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use log::{debug, error, info, warn};

use crate::config::PluginConfig;
use crate::constants::{self, paths};
use crate::error::PluginError;
use crate::nodes::attribute::AttrValue;
use crate::nodes::hooks::NodeBehavior;
use crate::nodes::metadata::{Metadata, MetadataParser};
use crate::nodes::node::{LineageEntry, Node, NodeOptions};

pub use registrar::{
    NodeClass, PluginOrigin, PluginRegistrar, RegisterFn, RegisterSymbol, StaticModule, WidgetClass,
};

/// Registry record of one node type
#[derive(Debug, Clone)]
pub struct PluginEntry {
    pub node: Option<NodeClass>,
    pub widget: Option<WidgetClass>,
    /// Description file, when one was found
    pub metadata_path: Option<PathBuf>,
    /// Module that registered the node class
    pub module: String,
    /// Shared library the module was loaded from
    pub source: Option<PathBuf>,
    pub category: Option<String>,
    pub origin: PluginOrigin,
    pub enabled: bool,
    /// This type first, base type last
    pub lineage: Vec<LineageEntry>,
    /// Metadata merged along `lineage`
    pub metadata: Metadata,
}

impl PluginEntry {
    fn new(module: &ModuleInfo) -> Self {
        Self {
            node: None,
            widget: None,
            metadata_path: None,
            module: module.name.clone(),
            source: module.source.clone(),
            category: None,
            origin: module.origin,
            enabled: true,
            lineage: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Usable only with a node class, a widget class and the enabled flag
    pub fn is_valid(&self) -> bool {
        self.enabled && self.node.is_some() && self.widget.is_some()
    }
}

/// Where a batch of registrations came from
#[derive(Debug, Clone)]
struct ModuleInfo {
    name: String,
    dir: PathBuf,
    source: Option<PathBuf>,
    origin: PluginOrigin,
}

/// Keeps a plugin library loaded for as long as a behavior from it lives
struct LibraryBehavior {
    inner: Arc<dyn NodeBehavior>,
    _library: Arc<Library>,
}

impl NodeBehavior for LibraryBehavior {
    fn evaluate(&self, node: &Node) -> bool {
        self.inner.evaluate(node)
    }

    fn execute(&self, node: &Node) -> Result<Vec<AttrValue>, String> {
        self.inner.execute(node)
    }
}

/// Plugin manager for discovering and instantiating node types
pub struct PluginManager {
    config: PluginConfig,
    static_modules: Vec<StaticModule>,
    entries: BTreeMap<String, PluginEntry>,
    libraries: Vec<Arc<Library>>,
}

impl PluginManager {
    /// Create a manager with the compiled-in modules. Nothing is loaded
    /// until [`load_plugins`](Self::load_plugins).
    pub fn new(config: PluginConfig) -> Self {
        Self::with_modules(config, builtin::static_modules())
    }

    pub fn with_modules(config: PluginConfig, static_modules: Vec<StaticModule>) -> Self {
        Self {
            config,
            static_modules,
            entries: BTreeMap::new(),
            libraries: Vec::new(),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Discovers every module and rebuilds the registry.
    ///
    /// Libraries that fail to load are logged and returned; they never abort
    /// discovery.
    pub fn load_plugins(&mut self) -> Vec<PluginError> {
        self.entries.clear();
        let mut errors = Vec::new();

        // libraries still referenced by node behaviors stay loaded
        self.libraries.clear();
        let core_path = self.config.core_path.clone();
        let builtin_path = self.config.builtin_path.clone();

        self.register_static(PluginOrigin::Core);
        errors.extend(self.load_directory(&core_path, PluginOrigin::Core));
        self.register_static(PluginOrigin::Builtin);
        errors.extend(self.load_directory(&builtin_path, PluginOrigin::Builtin));
        self.register_static(PluginOrigin::External);
        for path in self.config.external_paths.clone() {
            errors.extend(self.load_directory(&path, PluginOrigin::External));
        }

        self.resolve_lineages();
        info!(
            "loaded {} node types ({} valid)",
            self.node_types(&[], true).len(),
            self.valid_plugins().len()
        );
        errors
    }

    /// Runs discovery again, keeping the enabled state of known types
    pub fn reload(&mut self) -> Vec<PluginError> {
        let disabled: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        let errors = self.load_plugins();
        for name in disabled {
            if let Some(entry) = self.entries.get_mut(&name) {
                entry.enabled = false;
            }
        }
        errors
    }

    fn register_static(&mut self, origin: PluginOrigin) {
        let dir = self.static_dir(origin);
        let modules: Vec<StaticModule> = self
            .static_modules
            .iter()
            .filter(|module| module.origin == origin)
            .copied()
            .collect();
        for module in modules {
            self.register_one(module, &dir);
        }
    }

    fn register_one(&mut self, module: StaticModule, dir: &Path) {
        let mut registrar = PluginRegistrar::new();
        (module.register)(&mut registrar);
        let info = ModuleInfo {
            name: module.name.to_string(),
            dir: dir.to_path_buf(),
            source: None,
            origin: module.origin,
        };
        self.register(&info, registrar);
    }

    /// Directory holding the description files of compiled-in modules.
    /// External ones use the first external path.
    fn static_dir(&self, origin: PluginOrigin) -> PathBuf {
        match origin {
            PluginOrigin::Core => self.config.core_path.clone(),
            PluginOrigin::Builtin => self.config.builtin_path.clone(),
            PluginOrigin::External => self
                .config
                .external_paths
                .first()
                .cloned()
                .unwrap_or_else(|| self.config.builtin_path.clone()),
        }
    }

    /// Scan a directory for plugin libraries and load them
    fn load_directory(&mut self, dir: &Path, origin: PluginOrigin) -> Vec<PluginError> {
        if !dir.is_dir() {
            debug!("plugin directory not found: {}", dir.display());
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && Self::is_plugin_file(path))
                .collect(),
            Err(e) => {
                warn!("cannot read plugin directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };
        files.sort();

        let mut errors = Vec::new();
        for path in files {
            info!("loading plugin library {}", path.display());
            if let Err(e) = self.open_library(&path, origin) {
                error!("failed to load plugin {}: {}", path.display(), e);
                errors.push(e);
            }
        }
        errors
    }

    /// Loads one plugin library outside of discovery and resolves the
    /// lineages of the types it registers
    pub fn load_library(&mut self, path: &Path, origin: PluginOrigin) -> Result<(), PluginError> {
        self.open_library(path, origin)?;
        self.resolve_lineages();
        Ok(())
    }

    /// Registers a compiled-in module outside of discovery. Its description
    /// file is looked up where discovery would look for `module.origin`.
    pub fn register_module(&mut self, module: StaticModule) {
        let dir = self.static_dir(module.origin);
        self.register_one(module, &dir);
        self.resolve_lineages();
    }

    /// Runs a library's registration entry point. Lineages are left for the
    /// caller to resolve.
    fn open_library(&mut self, path: &Path, origin: PluginOrigin) -> Result<(), PluginError> {
        let library = unsafe { Library::new(path)? };
        let mut registrar = PluginRegistrar::new();
        {
            let register: Symbol<RegisterSymbol> = unsafe { library.get(constants::REGISTER_SYMBOL) }
                .map_err(|_| PluginError::MissingEntryPoint(path.to_path_buf()))?;
            unsafe { register(&mut registrar) };
        }

        let library = Arc::new(library);
        let (nodes, widgets) = registrar.into_parts();
        let mut wrapped = PluginRegistrar::new();
        for mut class in nodes {
            class.behavior = Arc::new(LibraryBehavior {
                inner: class.behavior,
                _library: library.clone(),
            });
            wrapped.register_node_type(class);
        }
        for widget in widgets {
            wrapped.register_widget_type(widget);
        }

        let info = ModuleInfo {
            name: library_stem(path),
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            source: Some(path.to_path_buf()),
            origin,
        };
        self.register(&info, wrapped);
        self.libraries.push(library);
        Ok(())
    }

    fn register(&mut self, module: &ModuleInfo, registrar: PluginRegistrar) {
        let (nodes, widgets) = registrar.into_parts();

        for class in nodes {
            let metadata_path = self.metadata_file(&class.type_name, module);
            let entry = self
                .entries
                .entry(class.type_name.clone())
                .or_insert_with(|| PluginEntry::new(module));

            if let Some(existing) = &entry.node {
                warn!(
                    "node type \"{}\" from \"{}\" is already defined by \"{}\", skipping",
                    class.type_name, module.name, entry.module
                );
                debug!("kept definition: {:?}", existing);
                continue;
            }

            if metadata_path.is_file() {
                entry.metadata_path = Some(metadata_path);
            } else {
                warn!(
                    "plugin \"{}\" has no metadata file {}, registered as incomplete",
                    class.type_name,
                    metadata_path.display()
                );
                entry.metadata_path = None;
            }
            debug!("registered node type \"{}\" ({})", class.type_name, module.origin);
            entry.module = module.name.clone();
            entry.source = module.source.clone();
            entry.origin = module.origin;
            entry.category = class.category.clone();
            entry.node = Some(class);
        }

        for widget in widgets {
            let entry = self
                .entries
                .entry(widget.widget_type.clone())
                .or_insert_with(|| PluginEntry::new(module));
            if let Some(existing) = &entry.widget {
                warn!(
                    "replacing widget \"{}\" of \"{}\" with \"{}\"",
                    existing.class_name, widget.widget_type, widget.class_name
                );
            }
            debug!("registered widget \"{}\" for \"{}\"", widget.class_name, widget.widget_type);
            entry.widget = Some(widget);
        }
    }

    /// Core types read `<metadata dir>/<type>.mtd`; everything else reads
    /// `<module dir>/<module name>.mtd`
    fn metadata_file(&self, type_name: &str, module: &ModuleInfo) -> PathBuf {
        match module.origin {
            PluginOrigin::Core => self
                .config
                .metadata_path
                .join(format!("{}.{}", type_name, paths::METADATA_EXTENSION)),
            PluginOrigin::Builtin | PluginOrigin::External => module
                .dir
                .join(format!("{}.{}", module.name, paths::METADATA_EXTENSION)),
        }
    }

    /// Follows parent links, then merges and caches each type's metadata.
    /// Unknown parents and cycles truncate the lineage.
    fn resolve_lineages(&mut self) {
        let mut parsed: HashMap<PathBuf, Option<Metadata>> = HashMap::new();
        let mut resolved = Vec::new();

        for (type_name, entry) in &self.entries {
            let Some(class) = &entry.node else { continue };
            let mut lineage = vec![LineageEntry {
                type_name: type_name.clone(),
                metadata: entry.metadata_path.clone(),
            }];
            let mut seen = HashSet::from([type_name.as_str()]);
            let mut parent = class.parent.as_deref();

            while let Some(parent_name) = parent {
                if !seen.insert(parent_name) {
                    warn!("node type \"{}\" has a cyclic parent \"{}\"", type_name, parent_name);
                    break;
                }
                let Some((parent_entry, parent_class)) = self
                    .entries
                    .get(parent_name)
                    .and_then(|e| e.node.as_ref().map(|class| (e, class)))
                else {
                    warn!("node type \"{}\" has unknown parent \"{}\"", type_name, parent_name);
                    break;
                };
                lineage.push(LineageEntry {
                    type_name: parent_name.to_string(),
                    metadata: parent_entry.metadata_path.clone(),
                });
                parent = parent_class.parent.as_deref();
            }

            let mut metadata = Metadata::new();
            for path in lineage.iter().rev().filter_map(|step| step.metadata.as_ref()) {
                let file = parsed.entry(path.clone()).or_insert_with(|| {
                    MetadataParser::parse(path)
                        .map_err(|e| warn!("skipping metadata {}: {}", path.display(), e))
                        .ok()
                });
                if let Some(file) = file {
                    metadata.merge(file);
                }
            }
            resolved.push((type_name.clone(), lineage, metadata));
        }

        for (type_name, lineage, metadata) in resolved {
            if let Some(entry) = self.entries.get_mut(&type_name) {
                entry.lineage = lineage;
                entry.metadata = metadata;
            }
        }
    }

    // -- registry queries ----------------------------------------------------

    pub fn entry(&self, type_name: &str) -> Option<&PluginEntry> {
        self.entries.get(type_name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &PluginEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn get_node_class(&self, type_name: &str) -> Result<&NodeClass, PluginError> {
        self.entries
            .get(type_name)
            .and_then(|entry| entry.node.as_ref())
            .ok_or_else(|| PluginError::UnknownPlugin(type_name.to_string()))
    }

    /// Merged metadata of a type
    pub fn metadata(&self, type_name: &str) -> Result<&Metadata, PluginError> {
        self.entries
            .get(type_name)
            .filter(|entry| entry.node.is_some())
            .map(|entry| &entry.metadata)
            .ok_or_else(|| PluginError::UnknownPlugin(type_name.to_string()))
    }

    /// Builds a node of a registered, enabled type using the cached metadata
    pub fn instantiate(&self, type_name: &str, options: NodeOptions) -> Result<Node, PluginError> {
        let entry = self.enabled_entry(type_name)?;
        let class = entry
            .node
            .as_ref()
            .ok_or_else(|| PluginError::UnknownPlugin(type_name.to_string()))?;
        let node = Node::with_metadata(class, entry.lineage.clone(), entry.metadata.clone(), options)?;
        Ok(node)
    }

    fn enabled_entry(&self, type_name: &str) -> Result<&PluginEntry, PluginError> {
        match self.entries.get(type_name) {
            Some(entry) if entry.node.is_some() && entry.enabled => Ok(entry),
            Some(entry) if entry.node.is_some() => {
                debug!("plugin \"{}\" is disabled", type_name);
                Err(PluginError::UnknownPlugin(type_name.to_string()))
            }
            _ => {
                error!("plugin type \"{}\" is not loaded", type_name);
                Err(PluginError::UnknownPlugin(type_name.to_string()))
            }
        }
    }

    /// Widget bound to the node's type. Logs and returns `None` when unbound.
    pub fn get_widget_class(&self, node: &Node) -> Option<&WidgetClass> {
        let Some(entry) = self.entries.get(node.node_type()) else {
            error!("plugin \"{}\" is not loaded", node.node_type());
            return None;
        };
        if entry.widget.is_none() {
            error!("plugin \"{}\" widget not loaded", node.node_type());
        }
        entry.widget.as_ref()
    }

    pub fn enable(&mut self, type_name: &str, enabled: bool) -> Result<(), PluginError> {
        let entry = self.entries.get_mut(type_name).ok_or_else(|| {
            error!("plugin \"{}\" not recognized", type_name);
            PluginError::UnknownPlugin(type_name.to_string())
        })?;
        if entry.enabled != enabled {
            info!("setting plugin \"{}\" enabled: {}", type_name, enabled);
            entry.enabled = enabled;
        }
        Ok(())
    }

    pub fn is_enabled(&self, type_name: &str) -> bool {
        self.entries.get(type_name).map_or(false, |entry| entry.enabled)
    }

    /// Types that are enabled and have both a node and a widget class
    pub fn valid_plugins(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_valid())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Registered node types, sorted. An empty `filter` matches everything.
    pub fn node_types(&self, filter: &[&str], include_disabled: bool) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(name, entry)| {
                entry.node.is_some()
                    && (filter.is_empty() || filter.contains(&name.as_str()))
                    && (entry.enabled || include_disabled)
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Distinct origins of registered node types
    pub fn plugin_types(&self) -> Vec<PluginOrigin> {
        self.node_entries()
            .map(|entry| entry.origin)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn node_categories(&self) -> Vec<&str> {
        self.node_entries()
            .filter_map(|entry| entry.category.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn node_classes(&self) -> Vec<&str> {
        self.node_entries()
            .filter_map(|entry| entry.node.as_ref().map(|class| class.class_name.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn core_modules(&self) -> Vec<&str> {
        self.modules(PluginOrigin::Core)
    }

    pub fn builtin_modules(&self) -> Vec<&str> {
        self.modules(PluginOrigin::Builtin)
    }

    pub fn external_modules(&self) -> Vec<&str> {
        self.modules(PluginOrigin::External)
    }

    fn modules(&self, origin: PluginOrigin) -> Vec<&str> {
        self.node_entries()
            .filter(|entry| entry.origin == origin)
            .map(|entry| entry.module.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn node_entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.values().filter(|entry| entry.node.is_some())
    }

    pub fn plugin_paths(&self) -> Vec<&Path> {
        self.config.plugin_paths()
    }

    pub fn external_plugin_paths(&self) -> &[PathBuf] {
        &self.config.external_paths
    }

    pub fn default_name(&self, type_name: &str) -> Result<&str, PluginError> {
        self.get_node_class(type_name)
            .map(|class| class.default_name.as_str())
    }

    pub fn origin(&self, type_name: &str) -> Option<PluginOrigin> {
        self.entries.get(type_name).map(|entry| entry.origin)
    }

    /// Check if a file is a plugin library
    pub fn is_plugin_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("dll") | Some("so") | Some("dylib")
        )
    }
}

/// Module name of a library: the file stem without the platform `lib` prefix
fn library_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    if cfg!(windows) {
        stem.to_string()
    } else {
        stem.strip_prefix("lib").unwrap_or(stem).to_string()
    }
}
