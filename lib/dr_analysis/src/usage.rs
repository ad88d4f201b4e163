//! Class usage relation between application classes.
//!
//! A class *uses* another one when it references it in a field type, a method
//! prototype or an instruction operand (instantiation, invocation definer,
//! class constant, cast, field access). Inner classes always use their outer
//! class. Crossed with the components, the relation reveals activities
//! hosting fragments that no register-based heuristic could find.

use crate::components::{ComponentType, Components};
use crate::hierarchy::Hierarchy;
use dashmap::DashMap;
use dr_bytecode::{ClassDef, MethodDescr};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// A place where a class is referenced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usage {
    pub class: String,
    /// Referencing method, absent for field types and inner class links.
    pub method: Option<MethodDescr>,
    /// Referencing instruction, absent for prototypes.
    pub instr: Option<usize>,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.method, self.instr) {
            (Some(m), Some(i)) => write!(f, "{m}@{i}"),
            (Some(m), None) => write!(f, "{m}"),
            _ => write!(f, "{}", self.class),
        }
    }
}

/// Memoized results of [`UsageIndex::search`], shared between resolvers
/// running in parallel.
#[derive(Debug, Default)]
pub struct UsageCache {
    inner: DashMap<(String, usize), Arc<BTreeSet<Usage>>>,
}

impl UsageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[derive(Debug, Default)]
pub struct UsageIndex {
    uses: BTreeMap<String, BTreeSet<String>>,
    used_by: BTreeMap<String, BTreeSet<Usage>>,
}

impl UsageIndex {
    /// Scans every application class of the hierarchy.
    #[must_use]
    pub fn build(hierarchy: &Hierarchy) -> Self {
        let mut index = Self::default();
        for class in hierarchy.iter_app_classes() {
            index.scan_class(hierarchy, class);
        }
        log::debug!(
            "usage index: {} classes using {} classes",
            index.uses.len(),
            index.used_by.len()
        );
        index
    }

    fn scan_class(&mut self, hierarchy: &Hierarchy, class: &ClassDef) {
        if let Some(outer) = hierarchy.outer_class(&class.name) {
            let outer = outer.to_string();
            self.record(hierarchy, &class.name, &outer, None, None);
        }
        for field in &class.fields {
            if let Some(target) = field.type_.class_name() {
                self.record(hierarchy, &class.name, target, None, None);
            }
        }
        for method in class.iter_methods() {
            let descr = &method.descriptor;
            for target in descr
                .parameters_types()
                .iter()
                .chain(std::iter::once(descr.return_type()))
                .filter_map(|t| t.class_name())
            {
                self.record(hierarchy, &class.name, target, Some(descr), None);
            }
            let Some(code) = method.code() else {
                continue;
            };
            for (i, instr) in code.iter() {
                if let Some(target) = instr.referenced_class() {
                    self.record(hierarchy, &class.name, target, Some(descr), Some(i));
                }
            }
        }
    }

    fn record(
        &mut self,
        hierarchy: &Hierarchy,
        user: &str,
        used: &str,
        method: Option<&MethodDescr>,
        instr: Option<usize>,
    ) {
        if user == used || !hierarchy.is_app_class(used) {
            return;
        }
        self.uses
            .entry(user.to_string())
            .or_default()
            .insert(used.to_string());
        self.used_by.entry(used.to_string()).or_default().insert(Usage {
            class: user.to_string(),
            method: method.cloned(),
            instr,
        });
    }

    /// Application classes directly used by a class.
    pub fn uses(&self, class: &str) -> impl Iterator<Item = &str> {
        self.uses.get(class).into_iter().flatten().map(String::as_str)
    }

    /// Direct references to a class.
    pub fn users(&self, class: &str) -> impl Iterator<Item = &Usage> {
        self.used_by.get(class).into_iter().flatten()
    }

    /// References to a class, followed transitively through the referencing
    /// classes up to `depth` levels (1 is direct references only).
    pub fn search(&self, class: &str, depth: usize, cache: &UsageCache) -> Arc<BTreeSet<Usage>> {
        let key = (class.to_string(), depth);
        if let Some(res) = cache.inner.get(&key) {
            return Arc::clone(res.value());
        }

        let mut res = BTreeSet::new();
        let mut seen = BTreeSet::from([class.to_string()]);
        let mut todo = VecDeque::from([(class.to_string(), 0)]);
        while let Some((current, level)) = todo.pop_front() {
            if level >= depth {
                continue;
            }
            for usage in self.users(&current) {
                res.insert(usage.clone());
                if seen.insert(usage.class.clone()) {
                    todo.push_back((usage.class.clone(), level + 1));
                }
            }
        }

        let res = Arc::new(res);
        cache.inner.insert(key, Arc::clone(&res));
        res
    }

    /// Classes referencing a class, transitively up to `depth` levels.
    #[must_use]
    pub fn users_classes(&self, class: &str, depth: usize, cache: &UsageCache) -> BTreeSet<String> {
        self.search(class, depth, cache)
            .iter()
            .map(|u| u.class.clone())
            .collect()
    }
}

/// A relation between two components revealed by the usage relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relation {
    Hosts { activity: String, fragment: String },
    /// Relation whose meaning cannot be decided (fragment using an activity
    /// or another fragment).
    Unsupported {
        from: String,
        from_type: ComponentType,
        to: String,
        to_type: ComponentType,
    },
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Hosts { activity, fragment } => write!(f, "{activity} hosts {fragment}"),
            Self::Unsupported {
                from,
                from_type,
                to,
                to_type,
            } => write!(f, "unsupported: {from_type} {from} uses {to_type} {to}"),
        }
    }
}

/// Intersects the usage relation with the components.
#[must_use]
pub fn relations(hierarchy: &Hierarchy, index: &UsageIndex, components: &Components) -> Vec<Relation> {
    let mut res = BTreeSet::new();
    for id in components.ids() {
        let Some(from) = components.read(id).map(|c| (c.name().to_string(), c.type_())) else {
            continue;
        };
        let (name, type_) = from;
        match type_ {
            ComponentType::Activity => {
                let users = std::iter::once(name.clone()).chain(hierarchy.inner_classes(&name));
                for user in users {
                    for used in index.uses(&user) {
                        if components.is_a(used, ComponentType::Fragment) {
                            res.insert(Relation::Hosts {
                                activity: name.clone(),
                                fragment: used.to_string(),
                            });
                        }
                    }
                }
            }
            ComponentType::Fragment => {
                for used in index.uses(&name) {
                    if let Some(to_type @ (ComponentType::Activity | ComponentType::Fragment)) =
                        components.type_of(used)
                    {
                        res.insert(Relation::Unsupported {
                            from: name.clone(),
                            from_type: type_,
                            to: used.to_string(),
                            to_type,
                        });
                    }
                }
            }
            _ => (),
        }
    }
    res.into_iter().collect()
}

/// Records the hosting relations into the components. Unsupported relations
/// are only logged.
pub fn apply_relations(relations: &[Relation], components: &Components) -> usize {
    let mut applied = 0;
    for relation in relations {
        match relation {
            Relation::Hosts { activity, fragment } => {
                let (Some(a), Some(f)) = (components.get_id(activity), components.get_id(fragment))
                else {
                    continue;
                };
                if components.host_fragment(a, f) {
                    applied += 1;
                }
            }
            Relation::Unsupported { .. } => log::info!("{relation}, ignored"),
        }
    }
    applied
}
