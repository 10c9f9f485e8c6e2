//! Reverse reference index over the source tree.
//!
//! Edges point from the referencing unit to the referenced one; the graph
//! stores them inverted so "who depends on this file" is a single lookup.
//! Three edge kinds share one index:
//!
//! - [`EdgeKind::Link`]: a component section loads another file by `src`.
//! - [`EdgeKind::Import`]: a script `import`/`require` of a project file.
//! - [`EdgeKind::StyleImport`]: a style sheet `@import`.
//!
//! Upward walks recurse through components and shared modules and stop at
//! pages and the entry unit, which are the only rebuild roots.

mod scan;

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::error::BuildResult;
use crate::params::BuildParams;
use crate::resolver::PathResolver;
use crate::toolchain::{ComponentParser, ComponentSections, SectionSource};
use crate::unit::{SourceUnit, UnitKind};

pub use scan::{import_references, locate_style, style_imports};

/// Position of a unit in the application structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitRole {
    /// `app<ext>` in the source root.
    Entry,
    /// A component outside the components directory.
    Page,
    /// A reusable component under the components directory.
    Component,
    /// A plain script.
    Module,
    Style,
    Other,
}

impl UnitRole {
    pub fn classify(params: &BuildParams, path: &Path) -> Self {
        let config = &params.config;
        match UnitKind::from_path(path, &config.component_ext) {
            UnitKind::Component if params.is_entry(path) => Self::Entry,
            UnitKind::Component => {
                let in_components = path
                    .strip_prefix(params.src_dir())
                    .unwrap_or(path)
                    .components()
                    .any(|c| c.as_os_str() == config.components_dir.as_str());
                if in_components { Self::Component } else { Self::Page }
            }
            UnitKind::Script => Self::Module,
            UnitKind::Style => Self::Style,
            _ => Self::Other,
        }
    }

    /// Pages and the entry unit terminate upward walks.
    pub fn is_root(self) -> bool {
        matches!(self, Self::Entry | Self::Page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Link,
    Import,
    StyleImport,
}

/// A reverse edge: `from` references the indexed unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Referrer {
    pub from: PathBuf,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    roles: FxHashMap<PathBuf, UnitRole>,
    reverse: FxHashMap<PathBuf, FxHashSet<Referrer>>,
    edge_count: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `files` for references, links and imports.
    ///
    /// Unreadable files are skipped; a vanished file has nothing to index.
    pub fn scan(
        params: &BuildParams,
        files: &[PathBuf],
        resolver: &PathResolver,
        parser: &dyn ComponentParser,
    ) -> BuildResult<Self> {
        let component_ext = params.config.component_ext.as_str();
        let mut graph = Self::new();
        for file in files {
            graph.add_unit(file, UnitRole::classify(params, file));
        }

        for file in files {
            let unit = SourceUnit::new(file, component_ext);
            let result = match unit.kind() {
                UnitKind::Component => parser
                    .parse(&unit)
                    .map(|sections| graph.index_component(file, &sections, resolver)),
                UnitKind::Script => unit
                    .content()
                    .map(|code| graph.index_script(file, &code, resolver)),
                UnitKind::Style => unit.content().map(|code| graph.index_style(file, &code)),
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!(unit = %file.display(), error = %e, "skipping unreadable file in graph scan");
            }
        }

        debug!(units = graph.roles.len(), edges = graph.edge_count, "dependency graph built");
        Ok(graph)
    }

    fn index_component(
        &mut self,
        file: &Path,
        sections: &ComponentSections,
        resolver: &PathResolver,
    ) {
        for link in sections.links() {
            self.add_edge(file, link, EdgeKind::Link);
        }
        if let Some(script) = &sections.script
            && let SectionSource::Inline(code) = &script.source
        {
            self.index_script(file, code, resolver);
        }
        for style in &sections.styles {
            if let SectionSource::Inline(code) = &style.source {
                let ext = style.lang_or("css");
                for reference in style_imports(code) {
                    let from = file.with_extension(ext);
                    if let Some(target) = locate_style(reference, &from) {
                        self.add_edge(file, &target, EdgeKind::StyleImport);
                    }
                }
            }
        }
    }

    fn index_script(&mut self, file: &Path, code: &str, resolver: &PathResolver) {
        for reference in import_references(code) {
            if let Some(target) = resolver.locate_local(reference, file) {
                self.add_edge(file, &target, EdgeKind::Import);
            }
        }
    }

    fn index_style(&mut self, file: &Path, code: &str) {
        for reference in style_imports(code) {
            if let Some(target) = locate_style(reference, file) {
                self.add_edge(file, &target, EdgeKind::StyleImport);
            }
        }
    }

    pub fn add_unit(&mut self, path: impl Into<PathBuf>, role: UnitRole) {
        self.roles.insert(path.into(), role);
    }

    /// Record that `from` references `to`.
    pub fn add_edge(&mut self, from: &Path, to: &Path, kind: EdgeKind) {
        if from == to {
            return;
        }
        let inserted = self.reverse.entry(to.to_path_buf()).or_default().insert(Referrer {
            from: from.to_path_buf(),
            kind,
        });
        if inserted {
            self.edge_count += 1;
        }
    }

    pub fn role(&self, path: &Path) -> UnitRole {
        self.roles.get(path).copied().unwrap_or(UnitRole::Other)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.roles.contains_key(path)
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn referrers(&self, path: &Path, kind: EdgeKind) -> BTreeSet<PathBuf> {
        self.reverse
            .get(path)
            .into_iter()
            .flatten()
            .filter(|r| r.kind == kind)
            .map(|r| r.from.clone())
            .collect()
    }

    /// Components that load `path` through a section `src`.
    pub fn references_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.referrers(path, EdgeKind::Link)
    }

    /// Units that `import` or `require` `path`.
    pub fn importers_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.referrers(path, EdgeKind::Import)
    }

    /// Units whose style sheets `@import` `path`.
    pub fn style_importers_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.referrers(path, EdgeKind::StyleImport)
    }

    /// Whether `path` compiles on its own rather than through a referrer.
    pub fn is_standalone(&self, path: &Path) -> bool {
        self.reverse
            .get(path)
            .is_none_or(|referrers| referrers.iter().all(|r| r.kind == EdgeKind::Import))
    }

    /// Pages and the entry unit that transitively import `path`.
    pub fn parents_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.walk_up(path, |kind| kind == EdgeKind::Import)
    }

    /// Pages and the entry unit that must rebuild when `path` changes.
    ///
    /// Follows every edge kind.
    pub fn rebuild_roots(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.walk_up(path, |_| true)
    }

    fn walk_up(&self, start: &Path, follow: impl Fn(EdgeKind) -> bool) -> BTreeSet<PathBuf> {
        let mut roots = BTreeSet::new();
        let mut seen: FxHashSet<&Path> = FxHashSet::default();
        let mut queue: VecDeque<&Path> = VecDeque::from([start]);
        seen.insert(start);

        while let Some(current) = queue.pop_front() {
            let Some(referrers) = self.reverse.get(current) else {
                continue;
            };
            for referrer in referrers.iter().filter(|r| follow(r.kind)) {
                let from = referrer.from.as_path();
                if !seen.insert(from) {
                    continue;
                }
                if self.role(from).is_root() {
                    roots.insert(from.to_path_buf());
                } else {
                    queue.push_back(from);
                }
            }
        }
        roots
    }

    /// Units to compile after `path` changed, entry unit first.
    ///
    /// The rebuild roots, plus `path` itself when it is standalone, plus
    /// every standalone style unit that `@import`s it directly or
    /// transitively.
    pub fn plan_rebuild(&self, path: &Path) -> Vec<PathBuf> {
        let mut plan = self.rebuild_roots(path);
        if self.is_standalone(path) {
            plan.insert(path.to_path_buf());
        }

        let mut queue = vec![path.to_path_buf()];
        let mut seen = FxHashSet::default();
        while let Some(current) = queue.pop() {
            for importer in self.style_importers_of(&current) {
                if !seen.insert(importer.clone()) {
                    continue;
                }
                if self.is_standalone(&importer) {
                    plan.insert(importer.clone());
                }
                queue.push(importer);
            }
        }

        let mut plan: Vec<PathBuf> = plan.into_iter().collect();
        plan.sort_by_key(|p| self.role(p) != UnitRole::Entry);
        plan
    }
}
