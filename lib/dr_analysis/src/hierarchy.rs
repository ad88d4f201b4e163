//! Classes hierarchy graph representation and virtual dispatch resolution.
//!
//! Nodes are classes, either defined in the analyzed bundle (`Known`) or
//! only referenced as a superclass, an interface or an inner class
//! (`External`). Edges always go from a class to its superclass, to the
//! interfaces it implements, or (for inner classes) to its outer class, so
//! that subclass, implementer and inner-class queries are answered by the
//! very same edges followed backward.

use dr_bytecode::{ClassDef, MethodDef, MethodDescr, Type};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{self, Incoming, Outgoing};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";
pub const JAVA_LANG_THREAD: &str = "java/lang/Thread";
pub const JAVA_LANG_RUNNABLE: &str = "java/lang/Runnable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Extends,
    Implements,
    InnerOf,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Extends => write!(f, "<extends>"),
            Self::Implements => write!(f, "<implements>"),
            Self::InnerOf => write!(f, "<inner-of>"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClassNode {
    Known(ClassDef),
    External(String),
}

impl ClassNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Known(def) => &def.name,
            Self::External(name) => name,
        }
    }

    #[must_use]
    pub fn definition(&self) -> Option<&ClassDef> {
        match self {
            Self::Known(def) => Some(def),
            Self::External(_) => None,
        }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Virtual dispatch resolution policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchPolicy {
    /// Only resolve to methods defined by application (non system) classes.
    pub app_only: bool,
}

#[derive(Debug, Default)]
pub struct Hierarchy {
    inner: DiGraph<ClassNode, Link>,
    node_ids: BTreeMap<String, NodeIndex>,
}

impl Hierarchy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a class definition, creating placeholders for its unknown
    /// superclass, interfaces and inner classes.
    ///
    /// A class already defined is left untouched, a placeholder is upgraded
    /// to the given definition.
    pub fn add(&mut self, class: ClassDef) {
        let id = match self.node_ids.get(&class.name) {
            Some(id) if self.inner[*id].is_known() => {
                log::warn!("class '{}' has already been added to hierarchy", class.name);
                return;
            }
            Some(id) => *id,
            None => self.add_external(&class.name),
        };

        if let Some(superclass) = &class.superclass {
            let sid = self.add_external(superclass);
            self.inner.update_edge(id, sid, Link::Extends);
        }
        for interface in &class.interfaces {
            let iid = self.add_external(interface);
            self.inner.update_edge(id, iid, Link::Implements);
        }
        for inner_class in &class.inner_classes {
            let cid = self.add_external(inner_class);
            self.inner.update_edge(cid, id, Link::InnerOf);
        }
        log::trace!("class '{}' added to hierarchy", class.name);
        self.inner[id] = ClassNode::Known(class);
    }

    /// Returns the node of the class, creating a placeholder when missing.
    pub fn add_external(&mut self, name: &str) -> NodeIndex {
        if let Some(id) = self.node_ids.get(name) {
            return *id;
        }
        let id = self.inner.add_node(ClassNode::External(name.to_string()));
        self.node_ids.insert(name.to_string(), id);
        id
    }

    /// Finalizes the hierarchy: defined classes without superclass inherit
    /// from `java.lang.Object`, and `Outer$Inner` classes are attached to
    /// their outer class when it is known by name only.
    pub fn close(&mut self) {
        let object = self.add_external(JAVA_LANG_OBJECT);

        let orphans: Vec<NodeIndex> = self
            .inner
            .node_indices()
            .filter(|id| *id != object && self.inner[*id].is_known())
            .filter(|id| self.linked(*id, Outgoing, Link::Extends).next().is_none())
            .collect();
        for id in orphans {
            log::debug!(
                "add missing java.lang.Object inheritance to {}",
                self.inner[id].name()
            );
            self.inner.update_edge(id, object, Link::Extends);
        }

        let nested: Vec<(NodeIndex, NodeIndex)> = self
            .node_ids
            .iter()
            .filter_map(|(name, id)| {
                let (outer, _) = name.rsplit_once('$')?;
                let oid = self.node_ids.get(outer)?;
                Some((*id, *oid))
            })
            .filter(|(id, _)| self.linked(*id, Outgoing, Link::InnerOf).next().is_none())
            .collect();
        for (id, oid) in nested {
            self.inner.update_edge(id, oid, Link::InnerOf);
        }
    }

    fn linked(&self, id: NodeIndex, dir: Direction, link: Link) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner
            .edges_directed(id, dir)
            .filter(move |e| *e.weight() == link)
            .map(move |e| match dir {
                Outgoing => e.target(),
                Incoming => e.source(),
            })
    }

    fn linked_names(&self, name: &str, dir: Direction, link: Link) -> BTreeSet<String> {
        self.node_ids
            .get(name)
            .map(|id| {
                self.linked(*id, dir, link)
                    .map(|l| self.inner[l].name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.node_ids.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassNode> {
        self.node_ids.get(name).map(|id| &self.inner[*id])
    }

    /// Returns the definition of a known class.
    #[must_use]
    pub fn get_class(&self, name: &str) -> Option<&ClassDef> {
        self.get(name).and_then(ClassNode::definition)
    }

    /// Iterates over defined classes.
    pub fn iter_classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.inner.node_weights().filter_map(ClassNode::definition)
    }

    /// Iterates over defined application (non system) classes.
    pub fn iter_app_classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.iter_classes().filter(|c| !c.system)
    }

    pub fn iter_missing_classes(&self) -> impl Iterator<Item = &str> {
        self.inner
            .node_weights()
            .filter(|c| !c.is_known())
            .map(ClassNode::name)
    }

    #[must_use]
    pub fn nb_classes(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn is_app_class(&self, name: &str) -> bool {
        self.get_class(name).is_some_and(|c| !c.system)
    }

    #[must_use]
    pub fn superclass(&self, name: &str) -> Option<&str> {
        let id = self.node_ids.get(name)?;
        self.linked(*id, Outgoing, Link::Extends)
            .next()
            .map(|s| self.inner[s].name())
    }

    /// Ordered superclasses chain, closest first. The walk stops at a class
    /// without superclass link (placeholder) or after `java.lang.Object`.
    #[must_use]
    pub fn superclasses(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = name;
        while current != JAVA_LANG_OBJECT {
            let Some(parent) = self.superclass(current) else {
                break;
            };
            if parent == name || chain.iter().any(|c| c == parent) {
                log::warn!("inheritance cycle detected on class {name}");
                break;
            }
            chain.push(parent.to_string());
            current = parent;
        }
        chain
    }

    /// Direct subclasses.
    #[must_use]
    pub fn subclasses(&self, name: &str) -> BTreeSet<String> {
        self.linked_names(name, Incoming, Link::Extends)
    }

    /// Classes directly declaring to implement the interface.
    #[must_use]
    pub fn implementers(&self, name: &str) -> BTreeSet<String> {
        self.linked_names(name, Incoming, Link::Implements)
    }

    /// Directly implemented interfaces.
    #[must_use]
    pub fn interfaces(&self, name: &str) -> BTreeSet<String> {
        self.linked_names(name, Outgoing, Link::Implements)
    }

    /// Direct inner classes.
    #[must_use]
    pub fn inner_classes(&self, name: &str) -> BTreeSet<String> {
        self.linked_names(name, Incoming, Link::InnerOf)
    }

    #[must_use]
    pub fn outer_class(&self, name: &str) -> Option<&str> {
        let id = self.node_ids.get(name)?;
        self.linked(*id, Outgoing, Link::InnerOf)
            .next()
            .map(|o| self.inner[o].name())
    }

    fn transitive(&self, name: &str, dir: Direction) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let Some(start) = self.node_ids.get(name) else {
            return seen;
        };
        let mut todo = vec![*start];
        while let Some(id) = todo.pop() {
            for e in self.inner.edges_directed(id, dir) {
                if matches!(e.weight(), Link::InnerOf) {
                    continue;
                }
                let next = if dir == Outgoing { e.target() } else { e.source() };
                if seen.insert(self.inner[next].name().to_string()) {
                    todo.push(next);
                }
            }
        }
        seen.remove(name);
        seen
    }

    /// All (transitive) superclasses and implemented interfaces.
    #[must_use]
    pub fn all_supertypes(&self, name: &str) -> BTreeSet<String> {
        self.transitive(name, Outgoing)
    }

    /// All (transitive) subclasses and implementers.
    #[must_use]
    pub fn all_subtypes(&self, name: &str) -> BTreeSet<String> {
        self.transitive(name, Incoming)
    }

    /// Checks whether `name` is, extends or implements `ancestor`.
    #[must_use]
    pub fn is_subtype_of(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor || self.all_supertypes(name).contains(ancestor)
    }

    /// Checks whether `name` implements `interface`, directly, through one of
    /// its superclasses or through a super-interface.
    #[must_use]
    pub fn implements(&self, name: &str, interface: &str) -> bool {
        self.all_supertypes(name).contains(interface) && !self.is_subclass_of(name, interface)
    }

    #[must_use]
    pub fn is_subclass_of(&self, name: &str, ancestor: &str) -> bool {
        self.superclasses(name).iter().any(|c| c == ancestor)
    }

    #[must_use]
    pub fn declares(&self, class: &str, name: &str, params: &[Type]) -> bool {
        self.declared_method(class, name, params).is_some()
    }

    /// Checks whether one of the classes of the superclass chain of `name`
    /// (itself included) is in the given set.
    #[must_use]
    pub fn extends_any(&self, name: &str, bases: &[&str]) -> Option<String> {
        std::iter::once(name.to_string())
            .chain(self.superclasses(name))
            .find(|c| bases.contains(&c.as_str()))
    }

    /// Returns the method directly declared by a known class.
    #[must_use]
    pub fn declared_method(&self, class: &str, name: &str, params: &[Type]) -> Option<&MethodDef> {
        self.get_class(class)?.get_method(name, params)
    }

    /// Looks up a method along the superclass chain, the class itself first,
    /// and returns the descriptor of the first declaration found.
    #[must_use]
    pub fn resolve_method(&self, class: &str, name: &str, params: &[Type]) -> Option<MethodDescr> {
        std::iter::once(class.to_string())
            .chain(self.superclasses(class))
            .find_map(|c| {
                self.declared_method(&c, name, params)
                    .map(|m| m.descriptor.clone())
            })
    }

    /// Over-approximates the set of methods an invocation of `method` from
    /// `calling_class` may reach at runtime. The result is never empty.
    #[must_use]
    pub fn overridden_methods(
        &self,
        calling_class: &str,
        method: &MethodDescr,
        policy: DispatchPolicy,
    ) -> BTreeSet<MethodDescr> {
        let mut res = if method.is_constructor() {
            BTreeSet::from([method.clone()])
        } else {
            match self.get(method.definer()) {
                Some(ClassNode::Known(def))
                    if def
                        .get_method(method.name(), method.parameters_types())
                        .is_some() =>
                {
                    self.overriding_methods(method)
                }
                Some(ClassNode::Known(_)) => self.inherited_method(method, policy),
                _ => BTreeSet::new(),
            }
        };

        if res.is_empty() {
            res = self.thread_run_candidates(calling_class, method);
        }
        if res.is_empty() {
            log::debug!("no class information to resolve {method}, keeping it as is");
            res.insert(method.clone());
        }
        res
    }

    // Descends into subtypes redefining the method.
    fn overriding_methods(&self, method: &MethodDescr) -> BTreeSet<MethodDescr> {
        let mut res = BTreeSet::from([method.clone()]);
        for sub in self.all_subtypes(method.definer()) {
            if let Some(m) = self.declared_method(&sub, method.name(), method.parameters_types()) {
                res.insert(m.descriptor.clone());
            }
        }
        res
    }

    // Ascends superclasses up to the first declaration.
    fn inherited_method(&self, method: &MethodDescr, policy: DispatchPolicy) -> BTreeSet<MethodDescr> {
        for parent in self.superclasses(method.definer()) {
            if let Some(m) = self.declared_method(&parent, method.name(), method.parameters_types()) {
                if policy.app_only && !self.is_app_class(&parent) {
                    log::trace!("{method} resolves outside of application ({parent}), kept as is");
                    return BTreeSet::from([method.clone()]);
                }
                return BTreeSet::from([m.descriptor.clone()]);
            }
        }
        BTreeSet::new()
    }

    // Thread.start()/Runnable.run() invoked on an object the hierarchy knows
    // nothing about: candidates are the run() methods of the calling class
    // and of its inner classes, when they are threads or runnables.
    fn thread_run_candidates(&self, calling_class: &str, method: &MethodDescr) -> BTreeSet<MethodDescr> {
        let mut res = BTreeSet::new();
        if !matches!(method.name(), "run" | "start")
            || !method.parameters_types().is_empty()
            || method.return_type() != &Type::Void
        {
            return res;
        }
        let candidates = std::iter::once(calling_class.to_string())
            .chain(self.inner_classes(calling_class));
        for class in candidates {
            if !self.is_subtype_of(&class, JAVA_LANG_THREAD)
                && !self.is_subtype_of(&class, JAVA_LANG_RUNNABLE)
            {
                continue;
            }
            if let Some(m) = self.declared_method(&class, "run", &[]) {
                res.insert(m.descriptor.clone());
            }
        }
        res
    }
}
