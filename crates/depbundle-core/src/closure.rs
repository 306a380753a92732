//! Transitive closure over the implicit dependency graph.
//!
//! The graph is never materialised. A frontier of pending declarations is
//! drained; each declaration is resolved, classified, and, if it names a
//! bundleable file not yet claimed, introspected for further declarations.
//! Result identity is the [`NodeKey`], so versioned files inside one
//! framework report as a single node, but each of those files is still
//! introspected once. The visited set is the only shared mutable state and
//! exposes a single atomic claim operation, so the same engine serves both
//! the sequential and the parallel drain.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::classify::{Classification, Classifier, NodeKey};
use crate::config::{BundleConfig, Traversal};
use crate::error::{ClosureError, Result};
use crate::format::BinaryFormat;
use crate::introspect::{Introspector, introspector_for};
use crate::resolve::resolve;

/// Sorted, de-duplicated set of nodes to ship with a root binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    nodes: BTreeSet<NodeKey>,
}

impl Closure {
    /// Nodes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing needs bundling.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `path` is one of the nodes.
    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains(&NodeKey::normalize(path))
    }

    /// Node paths in sorted order.
    pub fn paths(&self) -> Vec<&Path> {
        self.nodes.iter().map(NodeKey::as_path).collect()
    }
}

impl IntoIterator for Closure {
    type Item = NodeKey;
    type IntoIter = std::collections::btree_set::IntoIter<NodeKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a Closure {
    type Item = &'a NodeKey;
    type IntoIter = std::collections::btree_set::Iter<'a, NodeKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Compute the closure of `root`, choosing the introspector from its format.
///
/// # Errors
///
/// Returns [`ClosureError::NotALoadableBinary`] before any traversal if
/// `root` is a static archive or unknown format; otherwise any error of
/// [`compute_closure_with`].
pub fn compute_closure(root: &Path, config: &BundleConfig) -> Result<Closure> {
    let format = BinaryFormat::detect(root)?;
    debug!(root = %root.display(), ?format, "detected binary format");
    let introspector = introspector_for(format, config.introspect_timeout);
    compute_closure_with(root, config, &introspector)
}

/// Compute the closure of `root` with an explicit introspector.
///
/// # Errors
///
/// Every failure aborts the whole computation: a missing dependency,
/// a loader-relative declaration, or an introspection failure on any node.
/// No partial closure is ever returned.
pub fn compute_closure_with<I>(root: &Path, config: &BundleConfig, introspector: &I) -> Result<Closure>
where
    I: Introspector + ?Sized,
{
    let root = std::path::absolute(root).map_err(|e| ClosureError::io(root, e))?;
    let engine = Engine {
        config,
        classifier: Classifier::from_config(config),
        introspector,
        root: NodeKey::normalize(&root),
        visited: Visited::default(),
    };

    let declared_by: Arc<Path> = Arc::from(root.as_path());
    let initial = pending(introspector.list_declared_dependencies(&root)?, &declared_by);

    let nodes = match config.traversal {
        Traversal::DepthFirst | Traversal::BreadthFirst => {
            engine.drain_sequential(initial, config.traversal)?
        }
        Traversal::Parallel => engine.drain_parallel(initial)?,
    };

    info!(root = %root.display(), count = nodes.len(), "closure complete");
    Ok(Closure { nodes })
}

/// A declaration waiting to be resolved, with the binary that declared it.
#[derive(Debug, Clone)]
struct Pending {
    declaration: String,
    declared_by: Arc<Path>,
}

fn pending(declarations: Vec<String>, declared_by: &Arc<Path>) -> Vec<Pending> {
    let mut seen = HashSet::new();
    declarations
        .into_iter()
        .filter(|d| seen.insert(d.clone()))
        .map(|declaration| Pending {
            declaration,
            declared_by: Arc::clone(declared_by),
        })
        .collect()
}

/// Resolved files already claimed for introspection.
#[derive(Debug, Default)]
struct Visited(Mutex<HashSet<PathBuf>>);

impl Visited {
    /// Check-and-insert under one lock. Only the caller that gets `true`
    /// may introspect the file.
    fn claim(&self, path: PathBuf) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path)
    }
}

struct Engine<'a, I: ?Sized> {
    config: &'a BundleConfig,
    classifier: Classifier<'a>,
    introspector: &'a I,
    root: NodeKey,
    visited: Visited,
}

impl<I: Introspector + ?Sized> Engine<'_, I> {
    /// Process one declaration. Returns the node and the declarations of
    /// the newly claimed file, or `None` if the declaration is dropped.
    fn step(&self, item: &Pending) -> Result<Option<(NodeKey, Vec<Pending>)>> {
        let Pending {
            declaration,
            declared_by,
        } = item;

        if self.classifier.is_blacklisted(declaration) {
            debug!(%declaration, "blacklisted");
            return Ok(None);
        }

        if self.classifier.is_system_declaration(declaration) {
            debug!(%declaration, "system library");
            return Ok(None);
        }

        let resolved = resolve(declaration, declared_by, self.config.search_paths())?;
        debug!(%declaration, resolved = %resolved.display(), "resolved");

        if self.classifier.classify(&resolved) == Classification::System {
            debug!(path = %resolved.display(), "system library");
            return Ok(None);
        }

        // The root never enters the result, even through a cycle.
        let key = NodeKey::normalize(&resolved);
        if key == self.root || !self.visited.claim(resolved.clone()) {
            return Ok(None);
        }

        // Identity uses the bundle root; introspection needs the real file.
        let declarations = self.introspector.list_declared_dependencies(&resolved)?;
        info!(node = %key, declared_by = %declared_by.display(), "bundling");

        let resolved: Arc<Path> = Arc::from(resolved.as_path());
        Ok(Some((key, pending(declarations, &resolved))))
    }

    fn drain_sequential(
        &self,
        initial: Vec<Pending>,
        traversal: Traversal,
    ) -> Result<BTreeSet<NodeKey>> {
        let mut frontier = VecDeque::from(initial);
        let mut nodes = BTreeSet::new();

        loop {
            let item = match traversal {
                Traversal::BreadthFirst => frontier.pop_front(),
                _ => frontier.pop_back(),
            };
            let Some(item) = item else { break };

            if let Some((key, children)) = self.step(&item)? {
                nodes.insert(key);
                frontier.extend(children);
            }
        }

        Ok(nodes)
    }

    /// Level-synchronous drain: each level is split across scoped worker
    /// threads; the next level is the union of their discoveries.
    fn drain_parallel(&self, initial: Vec<Pending>) -> Result<BTreeSet<NodeKey>> {
        let mut level = initial;
        let mut nodes = BTreeSet::new();

        while !level.is_empty() {
            let workers = num_cpus::get().clamp(1, level.len());
            let chunk_size = level.len().div_ceil(workers);

            let outcomes: Vec<Result<Vec<(NodeKey, Vec<Pending>)>>> = std::thread::scope(|s| {
                let handles: Vec<_> = level
                    .chunks(chunk_size)
                    .map(|chunk| {
                        s.spawn(move || {
                            chunk
                                .iter()
                                .filter_map(|item| self.step(item).transpose())
                                .collect::<Result<Vec<_>>>()
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                    .collect()
            });

            let mut next = Vec::new();
            for outcome in outcomes {
                for (key, children) in outcome? {
                    nodes.insert(key);
                    next.extend(children);
                }
            }
            level = next;
        }

        Ok(nodes)
    }
}
