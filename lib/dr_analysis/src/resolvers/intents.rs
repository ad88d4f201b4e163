//! Activities and services started or bound through explicit intents.

use crate::backward::{Arg, Callee, Matcher, Value};
use crate::components::{ComponentKind, ComponentType};
use crate::resolvers::{callbacks_of, CallSite, Context, Resolver, OBJECT_MATCHERS};
use dr_bytecode::types::internal_class_name;
use dr_bytecode::{MethodDescr, Reg};
use std::collections::BTreeSet;

pub const INTENT: &str = "android/content/Intent";
pub const COMPONENT_NAME: &str = "android/content/ComponentName";
pub const SERVICE_CONNECTION: &str = "android/content/ServiceConnection";
const JAVA_LANG_CLASS: &str = "java/lang/Class";
const JAVA_LANG_STRING: &str = "java/lang/String";

/// Matchers following an explicit intent up to its target class.
pub const INTENT_TARGET_MATCHERS: &[Matcher] = &[
    Matcher::ConstClass,
    Matcher::ConstString,
    Matcher::MoveAlias,
    Matcher::ResultReceiver,
    Matcher::InvokeOn(Callee::new(INTENT, "<init>"), Arg::Typed(JAVA_LANG_CLASS)),
    Matcher::InvokeOn(Callee::new(INTENT, "setClass"), Arg::Typed(JAVA_LANG_CLASS)),
    Matcher::InvokeOn(Callee::new(INTENT, "setClassName"), Arg::Index(1)),
    Matcher::InvokeOn(Callee::new(INTENT, "setComponent"), Arg::Typed(COMPONENT_NAME)),
    Matcher::InvokeOn(Callee::new(COMPONENT_NAME, "<init>"), Arg::Typed(JAVA_LANG_CLASS)),
    Matcher::InvokeOn(Callee::new(COMPONENT_NAME, "<init>"), Arg::Index(1)),
];

/// Same as [`INTENT_TARGET_MATCHERS`], also following implicit intents up
/// to their action.
pub const INTENT_ACTION_MATCHERS: &[Matcher] = &[
    Matcher::ConstClass,
    Matcher::ConstString,
    Matcher::MoveAlias,
    Matcher::ResultReceiver,
    Matcher::InvokeOn(Callee::new(INTENT, "<init>"), Arg::Typed(JAVA_LANG_CLASS)),
    Matcher::InvokeOn(Callee::new(INTENT, "<init>"), Arg::Typed(JAVA_LANG_STRING)),
    Matcher::InvokeOn(Callee::new(INTENT, "setAction"), Arg::Index(0)),
    Matcher::InvokeOn(Callee::new(INTENT, "setClass"), Arg::Typed(JAVA_LANG_CLASS)),
    Matcher::InvokeOn(Callee::new(INTENT, "setClassName"), Arg::Index(1)),
    Matcher::InvokeOn(Callee::new(INTENT, "setComponent"), Arg::Typed(COMPONENT_NAME)),
    Matcher::InvokeOn(Callee::new(COMPONENT_NAME, "<init>"), Arg::Typed(JAVA_LANG_CLASS)),
    Matcher::InvokeOn(Callee::new(COMPONENT_NAME, "<init>"), Arg::Index(1)),
];

const ACTIVITY_STARTS: &[&str] = &[
    "startActivity",
    "startActivityForResult",
    "startActivityIfNeeded",
];

const SERVICE_STARTS: &[&str] = &["startService", "startForegroundService"];

const BIND_SERVICE: &str = "bindService";

/// Class named by a resolved intent value.
pub(crate) fn intent_class(value: &Value) -> Option<String> {
    match value {
        Value::Class(c) => Some(c.clone()),
        Value::Str(s) => Some(internal_class_name(s)),
        _ => None,
    }
}

pub struct ComponentStart;

impl ComponentStart {
    fn targets(site: &CallSite, ctx: &Context, reg: Reg, type_: ComponentType) -> BTreeSet<String> {
        site.resolve(reg, INTENT_TARGET_MATCHERS)
            .iter()
            .filter_map(intent_class)
            .filter(|c| {
                let ok = ctx.components.is_a(c, type_);
                if !ok {
                    log::debug!("{}: intent target {c} is not a known {type_}", site.caller());
                }
                ok
            })
            .collect()
    }

    fn bind(site: &CallSite, ctx: &Context, service: &str) -> BTreeSet<MethodDescr> {
        let mut res = BTreeSet::new();
        let Some(reg) = site.instr().argument_of_type(SERVICE_CONNECTION) else {
            return res;
        };
        let connections: BTreeSet<String> = site
            .resolve(reg, OBJECT_MATCHERS)
            .iter()
            .filter_map(|v| v.class_name().map(ToString::to_string))
            .filter(|c| ctx.hierarchy.is_app_class(c))
            .collect();
        for connection in connections {
            if let Some(id) = ctx.components.get_id(service) {
                ctx.components.update(id, |c| {
                    if let ComponentKind::Service { connection: conn, .. } = &mut c.kind {
                        *conn = Some(connection.clone());
                    }
                });
            }
            res.append(&mut callbacks_of(
                ctx.hierarchy,
                &connection,
                &["onServiceConnected"],
            ));
        }
        res
    }
}

impl Resolver for ComponentStart {
    fn name(&self) -> &'static str {
        "intent"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        let name = target.name();
        (ACTIVITY_STARTS.contains(&name) || SERVICE_STARTS.contains(&name) || name == BIND_SERVICE)
            && target
                .parameters_types()
                .first()
                .and_then(|t| t.class_name())
                == Some(INTENT)
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let mut res = BTreeSet::new();
        let Some(reg) = site.instr().argument(0) else {
            return res;
        };
        let name = site.target.name();
        let type_ = if ACTIVITY_STARTS.contains(&name) {
            ComponentType::Activity
        } else {
            ComponentType::Service
        };

        for class in Self::targets(site, ctx, reg, type_) {
            let Some(id) = ctx.components.get_id(&class) else {
                continue;
            };
            if SERVICE_STARTS.contains(&name) {
                ctx.components.update(id, |c| {
                    if let ComponentKind::Service { started, .. } = &mut c.kind {
                        *started = true;
                    }
                });
            } else if name == BIND_SERVICE {
                ctx.components.update(id, |c| {
                    if let ComponentKind::Service { bound, .. } = &mut c.kind {
                        *bound = true;
                    }
                });
                res.append(&mut Self::bind(site, ctx, &class));
            }
            res.insert(MethodDescr::default_constructor(&class));
        }
        res
    }
}
