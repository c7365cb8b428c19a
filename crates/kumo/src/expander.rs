//! Tree walker for `$include` and `$if` directives.
//!
//! The walker visits nodes depth-first in source order. Components are
//! copied with their child sequences expanded and their string fields
//! substituted; `$if` splices its template in place when the condition
//! holds; `$include` splices the expanded target document. The output never
//! contains directive nodes.

use crate::condition;
use crate::config::ExpanderConfig;
use crate::context::ParameterContext;
use crate::cycle::CycleDetector;
use crate::error::{Result, TemplateError};
use crate::substitute::Substitutor;
use crate::template_cache::TemplateCache;
use crate::template_loader::{base_dir, IncludePathResolver};
use kumo_ast::{Component, ComponentNode, IfDirective, IncludeDirective};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Cooperative cancellation flag, checked between node visits.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Expands documents against a shared [`TemplateCache`].
#[derive(Debug)]
pub struct Expander {
    cache: Arc<TemplateCache>,
    resolver: IncludePathResolver,
    substitutor: Substitutor,
    max_depth: usize,
}

impl Expander {
    pub fn new(cache: Arc<TemplateCache>, config: &ExpanderConfig) -> Result<Self> {
        Ok(Self {
            cache,
            resolver: IncludePathResolver::new(config.include_root.as_deref())?,
            substitutor: Substitutor::new(config.strict_parameters),
            max_depth: config.max_include_depth,
        })
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Parse `text` and expand it as the document located at `base_path`.
    pub fn expand(
        &self,
        text: &str,
        base_path: &Path,
        params: &ParameterContext,
    ) -> Result<Vec<ComponentNode>> {
        let nodes = parse_root(text)?;
        self.expand_tree(&nodes, base_path, params, None)
    }

    pub fn expand_with_cancel(
        &self,
        text: &str,
        base_path: &Path,
        params: &ParameterContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ComponentNode>> {
        let nodes = parse_root(text)?;
        self.expand_tree(&nodes, base_path, params, Some(cancel))
    }

    /// Expand an already parsed root document.
    #[tracing::instrument(level = "debug", skip_all, fields(base_path = %base_path.display()))]
    pub fn expand_tree(
        &self,
        nodes: &[ComponentNode],
        base_path: &Path,
        params: &ParameterContext,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<ComponentNode>> {
        let walker = Walker {
            expander: self,
            cancel,
        };
        let scope = Scope {
            params,
            dir: base_dir(base_path),
            file: base_path.to_path_buf(),
            depth: 0,
        };

        let mut frame = CycleDetector::new();
        let expanded = match root_file(base_path) {
            Some(root) => {
                let mut guard = frame.enter(&root)?;
                walker.expand_nodes(nodes, &scope, &mut guard)?
            }
            None => walker.expand_nodes(nodes, &scope, &mut frame)?,
        };
        debug!(nodes = expanded.len(), "expansion finished");
        Ok(expanded)
    }

    /// Report the first include cycle reachable from `text`, or an empty
    /// chain when there is none.
    ///
    /// Every `$if` branch is followed regardless of its condition. Fragments
    /// that cannot be resolved or parsed are skipped.
    pub fn detect_circular_references(&self, text: &str, base_path: &Path) -> Vec<PathBuf> {
        let nodes = match parse_root(text) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "cycle scan skipped unparsable root document");
                return Vec::new();
            }
        };

        let mut frame = CycleDetector::new();
        let dir = base_dir(base_path);
        let found = match root_file(base_path) {
            Some(root) => match frame.enter(&root) {
                Ok(mut guard) => self.scan(&nodes, &dir, base_path, 0, &mut guard),
                Err(_) => None,
            },
            None => self.scan(&nodes, &dir, base_path, 0, &mut frame),
        };
        found.unwrap_or_default()
    }

    fn scan(
        &self,
        nodes: &[ComponentNode],
        dir: &Path,
        file: &Path,
        depth: usize,
        frame: &mut CycleDetector,
    ) -> Option<Vec<PathBuf>> {
        nodes.iter().find_map(|node| match node {
            ComponentNode::Component(component) => component
                .child_lists()
                .into_iter()
                .find_map(|children| self.scan(children, dir, file, depth, frame)),
            ComponentNode::If(directive) => {
                self.scan(&directive.template, dir, file, depth, frame)
            }
            ComponentNode::Include(directive) => {
                self.scan_include(directive, dir, file, depth + 1, frame)
            }
            ComponentNode::Malformed(_) => None,
        })
    }

    fn scan_include(
        &self,
        directive: &IncludeDirective,
        dir: &Path,
        file: &Path,
        depth: usize,
        frame: &mut CycleDetector,
    ) -> Option<Vec<PathBuf>> {
        let resolved = match self.resolver.resolve(&directive.template_path, dir, file) {
            Ok(path) => path,
            Err(e) => {
                warn!(template = %directive.template_path, error = %e, "cycle scan skipped include");
                return None;
            }
        };

        let mut guard = match frame.enter(&resolved) {
            Ok(guard) => guard,
            Err(TemplateError::CircularReference { chain }) => return Some(chain),
            Err(_) => return None,
        };
        // Checked after `enter`, as expansion does.
        if depth > self.max_depth {
            warn!(template = %resolved.display(), depth, "cycle scan stopped at the include depth limit");
            return None;
        }

        let tree = match self.cache.get_or_load(&resolved) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(template = %resolved.display(), error = %e, "cycle scan skipped fragment");
                return None;
            }
        };
        self.scan(&tree, &base_dir(&resolved), &resolved, depth, &mut guard)
    }
}

fn parse_root(text: &str) -> Result<Vec<ComponentNode>> {
    kumo_ast::parse(text).map_err(|source| TemplateError::Parse { path: None, source })
}

/// Canonical path of the root document when it exists on disk as a file.
fn root_file(base_path: &Path) -> Option<PathBuf> {
    if base_path.is_file() {
        base_path.canonicalize().ok()
    } else {
        None
    }
}

/// Where the walker currently is: the document being expanded and the
/// parameters visible in it.
struct Scope<'p> {
    params: &'p ParameterContext,
    dir: PathBuf,
    file: PathBuf,
    depth: usize,
}

struct Walker<'a> {
    expander: &'a Expander,
    cancel: Option<&'a CancellationToken>,
}

impl Walker<'_> {
    fn expand_nodes(
        &self,
        nodes: &[ComponentNode],
        scope: &Scope<'_>,
        frame: &mut CycleDetector,
    ) -> Result<Vec<ComponentNode>> {
        let mut output = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.expand_node(node, scope, frame, &mut output)?;
        }
        Ok(output)
    }

    fn expand_node(
        &self,
        node: &ComponentNode,
        scope: &Scope<'_>,
        frame: &mut CycleDetector,
        output: &mut Vec<ComponentNode>,
    ) -> Result<()> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(TemplateError::Cancelled);
        }

        match node {
            ComponentNode::Component(component) => {
                trace!(kind = component.kind(), "expanding component");
                let expanded = self.expand_component(component, scope, frame)?;
                output.push(ComponentNode::Component(expanded));
                Ok(())
            }
            ComponentNode::If(directive) => self.expand_if(directive, scope, frame, output),
            ComponentNode::Include(directive) => {
                self.expand_include(directive, scope, frame, output)
            }
            ComponentNode::Malformed(malformed) => Err(TemplateError::InvalidDirective {
                directive: malformed.directive,
                message: malformed.reason.clone(),
            }),
        }
    }

    fn expand_component(
        &self,
        component: &Component,
        scope: &Scope<'_>,
        frame: &mut CycleDetector,
    ) -> Result<Component> {
        let mut component = component.clone();
        for children in component.child_lists_mut() {
            let raw = std::mem::take(children);
            *children = self.expand_nodes(&raw, scope, frame)?;
        }

        let substitutor = self.expander.substitutor;
        component.try_for_each_text_mut(|text| {
            *text = substitutor.substitute(text, scope.params)?;
            Ok::<(), TemplateError>(())
        })?;
        Ok(component)
    }

    fn expand_if(
        &self,
        directive: &IfDirective,
        scope: &Scope<'_>,
        frame: &mut CycleDetector,
        output: &mut Vec<ComponentNode>,
    ) -> Result<()> {
        let holds = condition::evaluate(&directive.condition, scope.params)?;
        debug!(condition = %directive.condition, holds, "evaluated $if");
        if !holds {
            return Ok(());
        }
        for node in &directive.template {
            self.expand_node(node, scope, frame, output)?;
        }
        Ok(())
    }

    fn expand_include(
        &self,
        directive: &IncludeDirective,
        scope: &Scope<'_>,
        frame: &mut CycleDetector,
        output: &mut Vec<ComponentNode>,
    ) -> Result<()> {
        let expander = self.expander;
        let resolved =
            expander
                .resolver
                .resolve(&directive.template_path, &scope.dir, &scope.file)?;

        let mut guard = frame.enter(&resolved)?;
        let depth = scope.depth + 1;
        if depth > expander.max_depth {
            return Err(TemplateError::DepthLimitExceeded {
                depth,
                limit: expander.max_depth,
            });
        }

        let tree = expander.cache.get_or_load(&resolved)?;
        let params = expander.substitutor.bind(&directive.params, scope.params)?;
        debug!(template = %resolved.display(), depth, params = params.len(), "expanding $include");

        let child = Scope {
            params: &params,
            dir: base_dir(&resolved),
            file: resolved,
            depth,
        };
        for node in tree.iter() {
            self.expand_node(node, &child, &mut guard, output)?;
        }
        Ok(())
    }
}
