//! Handler selection and ordering
//!
//! Given the changed keys of a [`Diff`], the engine finds the smallest
//! combination of registered handlers whose owned keys cover every change
//! (ties broken by registration order) and orders it so that each handler
//! runs after the handlers it depends on.

use crate::diff::{Diff, ReferenceResolver, compute_diff};
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerRegistry};
use crate::types::{AttrMap, Definition};
use std::collections::BTreeSet;

/// Ordered handlers to run for one resource
pub struct Plan<'r, R> {
    handlers: Vec<&'r Handler<R>>,
}

impl<'r, R> Plan<'r, R> {
    /// A plan that runs nothing
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'r Handler<R>> + '_ {
        self.handlers.iter().copied()
    }

    /// Handler ids in execution order
    pub fn ids(&self) -> Vec<&'r str> {
        self.handlers.iter().map(|&h| h.id()).collect()
    }
}

impl<R> std::fmt::Debug for Plan<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Plan").field(&self.ids()).finish()
    }
}

/// Diffs definitions against state and plans handlers for one resource type
pub struct DiffEngine<'r, R> {
    resource_type: &'r str,
    registry: &'r HandlerRegistry<R>,
    reserved: &'r BTreeSet<String>,
}

impl<'r, R> DiffEngine<'r, R> {
    pub fn new(
        resource_type: &'r str,
        registry: &'r HandlerRegistry<R>,
        reserved: &'r BTreeSet<String>,
    ) -> Self {
        Self {
            resource_type,
            registry,
            reserved,
        }
    }

    /// Diff `defn` against the recorded attributes, skipping reserved keys
    pub fn diff(
        &self,
        defn: &Definition,
        current: &AttrMap,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Diff> {
        compute_diff(defn, current, self.reserved, resolver)
    }

    /// Select and order the handlers that realize `diff`
    ///
    /// With `show` set each change and the chosen order are logged at info
    /// level; nothing is executed either way.
    pub fn plan(&self, diff: &Diff, show: bool) -> Result<Plan<'r, R>> {
        if diff.is_empty() {
            return Ok(Plan::empty());
        }

        let changed = diff.changed_keys();
        let covered = self.registry.covered_keys();
        let uncovered: Vec<String> = changed
            .difference(&covered)
            .map(|k| (*k).to_string())
            .collect();
        if !uncovered.is_empty() {
            return Err(Error::Coverage {
                resource_type: self.resource_type.to_string(),
                keys: uncovered,
            });
        }

        let selected = self.select(&changed).ok_or_else(|| Error::Coverage {
            resource_type: self.resource_type.to_string(),
            keys: changed.iter().map(|k| (*k).to_string()).collect(),
        })?;
        let handlers: Vec<_> = self
            .order(&selected)
            .into_iter()
            .map(|i| self.registry.at(i))
            .collect();

        if show {
            for change in diff.iter() {
                log::info!("  {change}");
            }
            let ids: Vec<_> = handlers.iter().map(|h| h.id()).collect();
            log::info!("  handlers: {}", ids.join(", "));
        }

        Ok(Plan { handlers })
    }

    /// First combination, by size then registration order, covering `changed`
    fn select(&self, changed: &BTreeSet<&str>) -> Option<Vec<usize>> {
        let n = self.registry.len();
        (1..=n).find_map(|size| {
            Combinations::new(n, size).find(|combo| {
                let owned: BTreeSet<&str> = combo
                    .iter()
                    .flat_map(|&i| self.registry.at(i).owned_keys().iter().map(String::as_str))
                    .collect();
                changed.is_subset(&owned)
            })
        })
    }

    /// Dependency-first DFS seeded in registration order, restricted to `selected`
    fn order(&self, selected: &[usize]) -> Vec<usize> {
        let mut chosen = vec![false; self.registry.len()];
        for &i in selected {
            chosen[i] = true;
        }
        let mut visited = vec![false; self.registry.len()];
        let mut out = Vec::with_capacity(selected.len());

        for &i in selected {
            self.visit(i, &chosen, &mut visited, &mut out);
        }
        out
    }

    fn visit(&self, node: usize, chosen: &[bool], visited: &mut [bool], out: &mut Vec<usize>) {
        if visited[node] {
            return;
        }
        visited[node] = true;
        for dep in self.registry.at(node).dependencies() {
            if let Some(j) = self.registry.position(dep) {
                self.visit(j, chosen, visited, out);
            }
        }
        if chosen[node] {
            out.push(node);
        }
    }
}

/// k-subsets of `0..n` in lexicographic order
struct Combinations {
    n: usize,
    current: Option<Vec<usize>>,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            current: (k <= n).then(|| (0..k).collect()),
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let out = self.current.take()?;
        let k = out.len();

        let mut next = out.clone();
        // Rightmost position that can still move right
        if let Some(i) = (0..k).rev().find(|&i| next[i] < self.n - k + i) {
            next[i] += 1;
            for j in i + 1..k {
                next[j] = next[j - 1] + 1;
            }
            self.current = Some(next);
        }
        Some(out)
    }
}
