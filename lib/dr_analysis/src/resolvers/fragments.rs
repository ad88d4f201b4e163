//! Fragments hosted by activities, either through fragment transactions or
//! declared in the layout an activity inflates.

use crate::backward::{Matcher, Value};
use crate::components::{ComponentId, ComponentType, FRAGMENT_CLASSES};
use crate::resolvers::{parameters_string, CallSite, Context, Resolver, OBJECT_MATCHERS};
use dr_bytecode::{MethodDescr, Reg};
use std::collections::BTreeSet;

const TRANSACTION_METHODS: &[&str] = &["add", "replace", "show", "attach"];

const LAYOUT_ID_MATCHERS: &[Matcher] = &[Matcher::ConstInt, Matcher::MoveAlias];

pub struct FragmentHosting;

impl FragmentHosting {
    fn is_transaction(target: &MethodDescr) -> bool {
        target.definer().ends_with("/FragmentTransaction")
            && TRANSACTION_METHODS.contains(&target.name())
    }

    fn is_layout(target: &MethodDescr) -> bool {
        match target.name() {
            "setContentView" => parameters_string(target) == "I",
            "inflate" => parameters_string(target).starts_with('I'),
            _ => false,
        }
    }

    fn fragment_argument(site: &CallSite) -> Option<Reg> {
        let i = site.target.parameters_types().iter().position(|t| {
            t.class_name()
                .is_some_and(|c| FRAGMENT_CLASSES.contains(&c))
        })?;
        site.instr().argument(i)
    }

    /// Activities hosting the fragments used by the calling class.
    fn hosts(site: &CallSite, ctx: &Context) -> BTreeSet<ComponentId> {
        let components = ctx.components;
        let activity = |name: &str| {
            components
                .get_id(name)
                .filter(|_| components.is_a(name, ComponentType::Activity))
        };

        let calling = site.calling_class();
        if let Some(id) = activity(calling) {
            return BTreeSet::from([id]);
        }
        if let Some(id) = ctx.hierarchy.outer_class(calling).and_then(activity) {
            return BTreeSet::from([id]);
        }
        let hosts: BTreeSet<ComponentId> = ctx
            .usage
            .users_classes(calling, ctx.config.usage_depth, ctx.cache)
            .iter()
            .filter_map(|user| {
                activity(user.as_str())
                    .or_else(|| ctx.hierarchy.outer_class(user).and_then(activity))
            })
            .collect();
        if hosts.is_empty() {
            log::debug!("{}: no activity found using {calling}", site.caller());
        }
        hosts
    }

    fn transaction_fragments(site: &CallSite, ctx: &Context) -> BTreeSet<String> {
        let Some(reg) = Self::fragment_argument(site) else {
            return BTreeSet::new();
        };
        site.resolve(reg, OBJECT_MATCHERS)
            .iter()
            .filter_map(|v| v.class_name().map(ToString::to_string))
            .filter(|c| ctx.components.is_a(c, ComponentType::Fragment))
            .collect()
    }

    fn layout_fragments(site: &CallSite, ctx: &Context) -> BTreeSet<String> {
        let Some(reg) = site.instr().argument(0) else {
            return BTreeSet::new();
        };
        site.resolve(reg, LAYOUT_ID_MATCHERS)
            .iter()
            .filter_map(|v| match v {
                Value::Int(id) => Some(*id),
                _ => None,
            })
            .flat_map(|id| ctx.layouts.fragments(id))
            .filter(|c| ctx.components.is_a(c, ComponentType::Fragment))
            .map(ToString::to_string)
            .collect()
    }
}

impl Resolver for FragmentHosting {
    fn name(&self) -> &'static str {
        "fragment"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        Self::is_transaction(target) || Self::is_layout(target)
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let fragments = if Self::is_transaction(site.target) {
            Self::transaction_fragments(site, ctx)
        } else {
            Self::layout_fragments(site, ctx)
        };
        if fragments.is_empty() {
            return BTreeSet::new();
        }

        let hosts = Self::hosts(site, ctx);
        let mut res = BTreeSet::new();
        for fragment in fragments {
            let Some(fid) = ctx.components.get_id(&fragment) else {
                continue;
            };
            for host in &hosts {
                ctx.components.host_fragment(*host, fid);
            }
            res.insert(MethodDescr::default_constructor(&fragment));
        }
        res
    }
}
