//! Handlers and the ordered handler registry
//!
//! A handler owns a set of configuration keys and knows how to bring them in
//! line with a [`Definition`]. Resource types build one registry in their
//! constructor; registration order is significant because it breaks ties
//! both when selecting handlers and when ordering them.

use crate::error::{Error, Result};
use crate::types::{Definition, HandleOptions};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Operation run by a handler against resource `R`
pub type HandlerFn<R> = Box<dyn Fn(&R, &Definition, HandleOptions) -> Result<()> + Send + Sync>;

/// A named unit of reconciliation logic
pub struct Handler<R> {
    id: String,
    keys: BTreeSet<String>,
    after: Vec<String>,
    op: HandlerFn<R>,
}

impl<R> Handler<R> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configuration keys this handler is responsible for
    pub fn owned_keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Handlers that must run before this one when both are selected
    pub fn dependencies(&self) -> &[String] {
        &self.after
    }

    /// Run the handler; it must be idempotent
    pub fn handle(&self, resource: &R, defn: &Definition, options: HandleOptions) -> Result<()> {
        (self.op)(resource, defn, options)
    }
}

impl<R> fmt::Debug for Handler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// Handlers of one resource type, in registration order
pub struct HandlerRegistry<R> {
    handlers: Vec<Handler<R>>,
}

impl<R> HandlerRegistry<R> {
    pub fn builder() -> HandlerRegistryBuilder<R> {
        HandlerRegistryBuilder {
            handlers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handler<R>> {
        self.handlers.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Handler<R>> {
        self.handlers.iter().find(|h| h.id == id)
    }

    /// Handler at registration position `index`
    pub fn at(&self, index: usize) -> &Handler<R> {
        &self.handlers[index]
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.handlers.iter().position(|h| h.id == id)
    }

    /// Union of every handler's owned keys
    pub fn covered_keys(&self) -> BTreeSet<&str> {
        self.handlers
            .iter()
            .flat_map(|h| h.keys.iter().map(String::as_str))
            .collect()
    }
}

impl<R> fmt::Debug for HandlerRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.handlers).finish()
    }
}

/// Builder for [`HandlerRegistry`]
pub struct HandlerRegistryBuilder<R> {
    handlers: Vec<Handler<R>>,
}

impl<R> HandlerRegistryBuilder<R> {
    /// Register a handler
    ///
    /// # Arguments
    /// * `id` - Unique name within the registry
    /// * `keys` - Configuration keys the handler owns
    /// * `after` - Handlers that must run first when both are selected
    /// * `op` - The idempotent operation
    #[must_use]
    pub fn handler<F>(mut self, id: &str, keys: &[&str], after: &[&str], op: F) -> Self
    where
        F: Fn(&R, &Definition, HandleOptions) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.push(Handler {
            id: id.to_string(),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            after: after.iter().map(|a| (*a).to_string()).collect(),
            op: Box::new(op),
        });
        self
    }

    /// Validate and freeze the registry
    ///
    /// Fails on duplicate ids, on dependencies naming unregistered handlers
    /// and on cyclic dependencies.
    pub fn build(self) -> Result<HandlerRegistry<R>> {
        let mut index = HashMap::new();
        for (i, handler) in self.handlers.iter().enumerate() {
            if index.insert(handler.id.as_str(), i).is_some() {
                return Err(Error::DuplicateHandler(handler.id.clone()));
            }
        }

        let mut edges = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let mut deps = Vec::with_capacity(handler.after.len());
            for dep in &handler.after {
                let Some(&j) = index.get(dep.as_str()) else {
                    return Err(Error::UnknownHandler {
                        handler: handler.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                deps.push(j);
            }
            edges.push(deps);
        }

        if let Some(cycle) = find_cycle(&edges) {
            return Err(Error::HandlerCycle {
                path: cycle
                    .into_iter()
                    .map(|i| self.handlers[i].id.clone())
                    .collect(),
            });
        }

        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// First cycle found by DFS in registration order, as a closed path
fn find_cycle(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::Active;
        stack.push(node);
        for &next in &edges[node] {
            match marks[next] {
                Mark::Active => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut path = stack[start..].to_vec();
                    path.push(next);
                    return Some(path);
                }
                Mark::New => {
                    if let Some(path) = visit(next, edges, marks, stack) {
                        return Some(path);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; edges.len()];
    let mut stack = Vec::new();
    (0..edges.len()).find_map(|node| {
        if marks[node] == Mark::New {
            visit(node, edges, &mut marks, &mut stack)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn noop(_: &(), _: &Definition, _: HandleOptions) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_build_keeps_registration_order() {
        let registry = HandlerRegistry::<()>::builder()
            .handler("create", &["region"], &[], noop)
            .handler("resize", &["size"], &["create"], noop)
            .build()
            .unwrap();

        let ids: Vec<_> = registry.iter().map(Handler::id).collect();
        assert_eq!(ids, ["create", "resize"]);
        assert_eq!(registry.get("resize").unwrap().dependencies(), ["create"]);
        assert_eq!(
            registry.covered_keys().into_iter().collect::<Vec<_>>(),
            ["region", "size"]
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = HandlerRegistry::<()>::builder()
            .handler("tags", &["tags"], &[], noop)
            .handler("tags", &["labels"], &[], noop)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler(id) if id == "tags"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = HandlerRegistry::<()>::builder()
            .handler("resize", &["size"], &["create"], noop)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownHandler { ref handler, ref dependency }
                if handler == "resize" && dependency == "create"
        ));
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let err = HandlerRegistry::<()>::builder()
            .handler("a", &["x"], &["c"], noop)
            .handler("b", &["y"], &["a"], noop)
            .handler("c", &["z"], &["b"], noop)
            .build()
            .unwrap_err();
        match err {
            Error::HandlerCycle { path } => assert_eq!(path, ["a", "c", "b", "a"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let err = HandlerRegistry::<()>::builder()
            .handler("a", &["x"], &["a"], noop)
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "handler dependency cycle: a -> a");
    }

    #[test]
    fn test_handle_invokes_operation() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        let registry = HandlerRegistry::<()>::builder()
            .handler("create", &["name"], &[], move |_, defn, options| {
                sink.lock()
                    .unwrap()
                    .push((defn.name.clone(), options.allow_recreate));
                Ok(())
            })
            .build()
            .unwrap();

        let defn = Definition::new("web", "vm");
        let options = HandleOptions {
            allow_recreate: true,
            allow_reboot: false,
        };
        registry.at(0).handle(&(), &defn, options).unwrap();
        assert_eq!(*seen.lock().unwrap(), [("web".to_string(), true)]);
    }
}
