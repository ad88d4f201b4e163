//! Heuristic resolvers turning framework API invocations into call edges.
//!
//! Each resolver recognizes a family of framework methods from the literal
//! invoked descriptor only, then uses the backward register resolution to
//! find the objects involved (listener, runnable, intent target, fragment...)
//! and returns the methods the framework will eventually call on them.
//! Resolvers may also update the components they discover a relation for.

pub mod dispatch;
pub mod fragments;
pub mod intents;
pub mod jobs;
pub mod listeners;
pub mod receivers;
pub mod reflection;
pub mod threads;
pub mod timers;

use crate::app::Layouts;
use crate::backward::{Backward, Matcher, Value};
use crate::components::Components;
use crate::hierarchy::{DispatchPolicy, Hierarchy};
use crate::usage::{UsageCache, UsageIndex};
use dr_bytecode::{ClassDef, Instr, InstrGraph, InvokeKind, MethodDef, MethodDescr, Reg, RegList};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Default matchers used to find the class of an object register.
pub const OBJECT_MATCHERS: &[Matcher] = &[
    Matcher::NewInstance,
    Matcher::MoveAlias,
    Matcher::FieldType,
    Matcher::ResultType,
    Matcher::ConstClass,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "origin")]
pub enum EdgeKind {
    /// Literal target of an invocation.
    Static,
    /// Override of the literal target that may be dispatched to at runtime.
    VirtualOverride,
    /// Edge added by a heuristic resolver, named by its origin.
    Synthetic(&'static str),
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::VirtualOverride => write!(f, "override"),
            Self::Synthetic(origin) => write!(f, "synthetic:{origin}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CallEdge {
    pub source: MethodDescr,
    pub target: MethodDescr,
    pub kind: EdgeKind,
}

impl fmt::Display for CallEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.kind, self.target)
    }
}

/// Analysis parameters shared by all the resolvers.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub policy: DispatchPolicy,
    /// Maximum depth of the usage search used to find the activities
    /// hosting a fragment.
    pub usage_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            policy: DispatchPolicy::default(),
            usage_depth: 2,
        }
    }
}

/// Read access to the whole application model.
pub struct Context<'a> {
    pub hierarchy: &'a Hierarchy,
    pub components: &'a Components,
    pub layouts: &'a Layouts,
    pub usage: &'a UsageIndex,
    pub cache: &'a UsageCache,
    pub config: ResolverConfig,
}

/// An invocation instruction inside an application method.
pub struct CallSite<'a> {
    pub class: &'a ClassDef,
    pub method: &'a MethodDef,
    pub graph: &'a InstrGraph,
    pub index: usize,
    instr: &'a Instr,
    pub kind: InvokeKind,
    pub args: &'a RegList,
    /// Literal invoked method.
    pub target: &'a MethodDescr,
}

impl<'a> CallSite<'a> {
    /// Builds a call site, if the instruction at `index` is an invocation.
    #[must_use]
    pub fn new(class: &'a ClassDef, method: &'a MethodDef, index: usize) -> Option<Self> {
        let graph = method.code()?;
        let instr = graph.instr(index)?;
        let (kind, args, target) = instr.as_invoke()?;
        Some(Self {
            class,
            method,
            graph,
            index,
            instr,
            kind,
            args,
            target,
        })
    }

    #[inline]
    pub fn instr(&self) -> &'a Instr {
        self.instr
    }

    /// Calling method.
    #[inline]
    pub fn caller(&self) -> &'a MethodDescr {
        &self.method.descriptor
    }

    #[inline]
    pub fn calling_class(&self) -> &'a str {
        &self.class.name
    }

    #[must_use]
    pub fn backward(&self) -> Backward<'a> {
        Backward::new(self.graph).with_method(&self.class.name, self.method)
    }

    /// All the values a register used by the invocation may hold.
    #[must_use]
    pub fn resolve(&self, reg: Reg, matchers: &[Matcher]) -> BTreeSet<Value> {
        let values = self.backward().resolve_all(self.index, reg, matchers);
        if values.is_empty() {
            log::debug!(
                "{}@{}: cannot resolve {reg} used by {}",
                self.caller(),
                self.index,
                self.instr
            );
        }
        values
    }
}

pub trait Resolver: Send + Sync {
    /// Origin name given to the produced edges.
    fn name(&self) -> &'static str;

    /// Pure lookup on the literal invoked descriptor.
    fn recognizes(&self, target: &MethodDescr) -> bool;

    /// Methods reached from the call site through the recognized API. An
    /// unresolved site yields an empty set.
    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr>;

    fn edge_kind(&self) -> EdgeKind {
        EdgeKind::Synthetic(self.name())
    }
}

/// Every available resolver.
#[must_use]
pub fn all() -> Vec<Box<dyn Resolver>> {
    vec![
        Box::new(dispatch::VirtualDispatch),
        Box::new(intents::ComponentStart),
        Box::new(listeners::ListenerRegistration),
        Box::new(threads::ThreadStart),
        Box::new(timers::DelayedTask),
        Box::new(jobs::JobScheduling),
        Box::new(reflection::Reflection),
        Box::new(receivers::DynamicReceiver),
        Box::new(receivers::Broadcast),
        Box::new(fragments::FragmentHosting),
    ]
}

/// Concatenated parameters descriptors of a method (`Landroid/content/Intent;I`).
#[must_use]
pub fn parameters_string(method: &MethodDescr) -> String {
    method
        .parameters_types()
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Object on which a callback API registers its callbacks.
#[derive(Debug, Clone, Copy)]
pub enum Tracked {
    Receiver,
    /// First argument of the given class type.
    Argument(&'static str),
}

/// A framework method registering an object whose callbacks are later called
/// by the framework.
#[derive(Debug, Clone, Copy)]
pub struct CallbackApi {
    pub name: &'static str,
    /// Prefix of the concatenated parameters descriptors.
    pub params: &'static str,
    pub object: Tracked,
    /// Types the registered object must be a subtype of (one of them).
    pub bases: &'static [&'static str],
    pub callbacks: &'static [&'static str],
    pub matchers: &'static [Matcher],
}

impl CallbackApi {
    #[must_use]
    pub fn matches(&self, target: &MethodDescr) -> bool {
        target.name() == self.name && parameters_string(target).starts_with(self.params)
    }

    /// Callbacks of the objects registered at the call site.
    #[must_use]
    pub fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let reg = match self.object {
            Tracked::Receiver => site.instr().receiver(),
            Tracked::Argument(class) => site.instr().argument_of_type(class),
        };
        let Some(reg) = reg else {
            log::debug!("{}: no object to resolve for {}", site.caller(), self.name);
            return BTreeSet::new();
        };

        let mut res = BTreeSet::new();
        for value in site.resolve(reg, self.matchers) {
            let Some(class) = value.class_name() else {
                log::debug!("{}: {value} does not name a class", site.caller());
                continue;
            };
            for candidate in self.candidates(site, ctx.hierarchy, class) {
                res.append(&mut callbacks_of(ctx.hierarchy, &candidate, self.callbacks));
            }
        }
        res
    }

    // Classes whose callbacks can be called. An object only known by its
    // declared type (one of the base types or a framework class) falls back
    // to the calling class and its inner classes.
    fn candidates(&self, site: &CallSite, hierarchy: &Hierarchy, class: &str) -> BTreeSet<String> {
        let is_base = |c: &str| self.bases.iter().any(|b| hierarchy.is_subtype_of(c, b));
        if !self.bases.contains(&class) && hierarchy.is_app_class(class) {
            if is_base(class) {
                return BTreeSet::from([class.to_string()]);
            }
            log::debug!("{}: {class} is not a {}", site.caller(), self.bases.join(" or "));
            return BTreeSet::new();
        }
        let calling = site.calling_class();
        std::iter::once(calling.to_string())
            .chain(hierarchy.inner_classes(calling))
            .filter(|c| is_base(c))
            .collect()
    }
}

/// Methods with the given names, declared by the class or inherited from one
/// of its application superclasses.
#[must_use]
pub fn callbacks_of(hierarchy: &Hierarchy, class: &str, names: &[&str]) -> BTreeSet<MethodDescr> {
    let mut res = BTreeSet::new();
    let chain: Vec<String> = std::iter::once(class.to_string())
        .chain(hierarchy.superclasses(class))
        .take_while(|c| hierarchy.is_app_class(c))
        .collect();
    for name in names {
        for c in &chain {
            let Some(def) = hierarchy.get_class(c) else {
                break;
            };
            let found: Vec<MethodDescr> = def
                .methods_named(name)
                .map(|m| m.descriptor.clone())
                .collect();
            if !found.is_empty() {
                res.extend(found);
                break;
            }
        }
    }
    res
}
