//! Schema Registry
//!
//! Owns schema sources and URL type mappings, and publishes the
//! [`DescriptorSet`] compiled from the sources.
//!
//! Every source mutation recompiles everything. The source change is kept
//! even if that compile fails, while the previously published set stays live.
//! Mappings are metadata only and never trigger a compile.
//!
//! Readers load the published set through an [`ArcSwap`] and never block.
//! Writers of sources serialize on a single lock covering mutate, compile and
//! swap, so publication order is mutation order.

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::compiler;
use crate::descriptor::{DescriptorSet, MessageDescriptor};
use crate::error::{CompileError, Error, Result};
use crate::pattern::UrlPattern;
use crate::schema::{Direction, SchemaSource, TypeMapping};
use crate::store::RegistrySnapshot;

struct MappingEntry {
    mapping: TypeMapping,
    pattern: UrlPattern,
}

impl MappingEntry {
    fn new(mapping: TypeMapping) -> Result<Self> {
        let pattern = UrlPattern::new(&mapping.url_pattern)?;
        Ok(Self { mapping, pattern })
    }
}

/// Outcome of [`SchemaRegistry::restore`]
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub sources: usize,
    pub mappings: usize,
    /// Mapping ids dropped because their pattern or id was unusable
    pub skipped_mappings: Vec<String>,
    /// Set when the restored sources did not compile
    pub compile_error: Option<CompileError>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_mappings.is_empty() && self.compile_error.is_none()
    }
}

/// The main schema registry
pub struct SchemaRegistry {
    sources: RwLock<Vec<SchemaSource>>,
    mappings: RwLock<Vec<MappingEntry>>,
    published: ArcSwap<DescriptorSet>,
    /// Held across mutate + compile + publish for sources
    compile_lock: Mutex<u64>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// An empty registry publishing an empty descriptor set (generation 0)
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            mappings: RwLock::new(Vec::new()),
            published: ArcSwap::from_pointee(DescriptorSet::empty()),
            compile_lock: Mutex::new(0),
        }
    }

    /// Build a registry from a snapshot; compile failures are only reported
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> (Self, RestoreReport) {
        let registry = Self::new();
        let report = registry.restore(snapshot);
        (registry, report)
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// Add a source and recompile
    pub fn add_source(&self, source: SchemaSource) -> Result<()> {
        let mut generation = self.compile_lock.lock();
        {
            let mut sources = self.sources.write();
            if sources.iter().any(|s| s.id == source.id) {
                return Err(Error::AlreadyExists {
                    kind: "source",
                    id: source.id,
                });
            }
            debug!(id = %source.id, name = %source.name, "adding source");
            sources.push(source);
        }
        self.recompile_locked(&mut generation)
    }

    /// Replace a source's content and recompile
    pub fn update_source(&self, id: &str, content: impl Into<String>) -> Result<()> {
        let mut generation = self.compile_lock.lock();
        {
            let mut sources = self.sources.write();
            let source = sources
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| Error::not_found("source", id))?;
            source.content = content.into();
            source.loaded_at = chrono::Utc::now();
        }
        self.recompile_locked(&mut generation)
    }

    /// Remove a source and recompile
    pub fn remove_source(&self, id: &str) -> Result<()> {
        let mut generation = self.compile_lock.lock();
        {
            let mut sources = self.sources.write();
            let index = sources
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| Error::not_found("source", id))?;
            sources.remove(index);
        }
        self.recompile_locked(&mut generation)
    }

    pub fn get_source(&self, id: &str) -> Result<SchemaSource> {
        self.sources
            .read()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("source", id))
    }

    /// Sources in insertion order
    pub fn list_sources(&self) -> Vec<SchemaSource> {
        self.sources.read().clone()
    }

    /// Recompile the current sources without changing them
    pub fn recompile(&self) -> Result<()> {
        let mut generation = self.compile_lock.lock();
        self.recompile_locked(&mut generation)
    }

    fn recompile_locked(&self, generation: &mut u64) -> Result<()> {
        let inputs = compiler_inputs(&self.sources.read());
        let set = compiler::compile(&inputs)?;

        *generation += 1;
        let set = set.with_generation(*generation);
        info!(
            generation = *generation,
            messages = set.message_count(),
            fingerprint = %set.fingerprint().short(),
            "published descriptor set"
        );
        self.published.store(Arc::new(set));
        Ok(())
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    /// The currently published set
    pub fn descriptors(&self) -> Arc<DescriptorSet> {
        self.published.load_full()
    }

    /// Generation of the published set; bumps on every successful compile
    pub fn generation(&self) -> u64 {
        self.published.load().generation()
    }

    pub fn get_message_descriptor(&self, full_name: &str) -> Result<Arc<MessageDescriptor>> {
        self.published
            .load()
            .message(full_name)
            .cloned()
            .ok_or_else(|| Error::not_found("message type", full_name))
    }

    /// Every compiled message name, sorted
    pub fn message_names(&self) -> Vec<String> {
        self.published.load().message_names()
    }

    // =========================================================================
    // Mappings
    // =========================================================================

    /// Append a mapping; its pattern is compiled here
    pub fn add_mapping(&self, mapping: TypeMapping) -> Result<()> {
        let entry = MappingEntry::new(mapping)?;
        let mut mappings = self.mappings.write();
        if mappings.iter().any(|m| m.mapping.id == entry.mapping.id) {
            return Err(Error::AlreadyExists {
                kind: "mapping",
                id: entry.mapping.id,
            });
        }
        mappings.push(entry);
        Ok(())
    }

    /// Replace the mapping with the same id, keeping its position
    pub fn update_mapping(&self, mapping: TypeMapping) -> Result<()> {
        let entry = MappingEntry::new(mapping)?;
        let mut mappings = self.mappings.write();
        let slot = mappings
            .iter_mut()
            .find(|m| m.mapping.id == entry.mapping.id)
            .ok_or_else(|| Error::not_found("mapping", entry.mapping.id.clone()))?;
        *slot = entry;
        Ok(())
    }

    pub fn remove_mapping(&self, id: &str) -> Result<()> {
        let mut mappings = self.mappings.write();
        let index = mappings
            .iter()
            .position(|m| m.mapping.id == id)
            .ok_or_else(|| Error::not_found("mapping", id))?;
        mappings.remove(index);
        Ok(())
    }

    /// Mappings in insertion order
    pub fn list_mappings(&self) -> Vec<TypeMapping> {
        self.mappings.read().iter().map(|m| m.mapping.clone()).collect()
    }

    /// First mapping, in insertion order, whose direction applies and whose
    /// pattern matches the whole URL
    pub fn find_message_for_url(&self, url: &str, direction: Direction) -> Option<String> {
        self.mappings
            .read()
            .iter()
            .filter(|m| m.mapping.direction.applies_to(direction))
            .find(|m| m.pattern.matches(url))
            .map(|m| m.mapping.message_type.clone())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            sources: self.list_sources(),
            mappings: self.list_mappings(),
        }
    }

    /// Replace all state with `snapshot` and compile once.
    ///
    /// Never fails: a broken source set leaves the registry usable with
    /// whatever was published before, and unusable mappings are skipped.
    pub fn restore(&self, snapshot: RegistrySnapshot) -> RestoreReport {
        let mut report = RestoreReport {
            sources: snapshot.sources.len(),
            ..Default::default()
        };

        {
            let mut mappings = self.mappings.write();
            mappings.clear();
            for mapping in snapshot.mappings {
                let id = mapping.id.clone();
                if mappings.iter().any(|m| m.mapping.id == id) {
                    warn!(id = %id, "skipping duplicate mapping id");
                    report.skipped_mappings.push(id);
                    continue;
                }
                match MappingEntry::new(mapping) {
                    Ok(entry) => mappings.push(entry),
                    Err(err) => {
                        warn!(id = %id, error = %err, "skipping mapping");
                        report.skipped_mappings.push(id);
                    }
                }
            }
            report.mappings = mappings.len();
        }

        let mut generation = self.compile_lock.lock();
        *self.sources.write() = snapshot.sources;
        match self.recompile_locked(&mut generation) {
            Ok(()) => {}
            Err(Error::Compile(err)) => {
                warn!(error = %err, "restored sources failed to compile");
                report.compile_error = Some(err);
            }
            Err(err) => warn!(error = %err, "restore recompile failed"),
        }
        report
    }
}

/// Compiler inputs keyed by source name; a repeated name gets the id appended
fn compiler_inputs(sources: &[SchemaSource]) -> BTreeMap<String, String> {
    let mut ordered: Vec<&SchemaSource> = sources.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let mut inputs = BTreeMap::new();
    for source in ordered {
        let key = if inputs.contains_key(&source.name) {
            format!("{}#{}", source.name, source.id)
        } else {
            source.name.clone()
        };
        inputs.insert(key, source.content.clone());
    }
    inputs
}
