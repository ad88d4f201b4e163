//! Broadcast receivers registered at runtime, and broadcasts sent to them.

use crate::backward::{Arg, Callee, Matcher, Value};
use crate::components::{ComponentKind, ComponentType};
use crate::resolvers::intents::{intent_class, INTENT, INTENT_ACTION_MATCHERS};
use crate::resolvers::{callbacks_of, CallSite, Context, Resolver, OBJECT_MATCHERS};
use dr_bytecode::MethodDescr;
use std::collections::BTreeSet;

pub const BROADCAST_RECEIVER: &str = "android/content/BroadcastReceiver";
pub const INTENT_FILTER: &str = "android/content/IntentFilter";
pub const LOCAL_BROADCAST_MANAGER: &[&str] = &[
    "android/support/v4/content/LocalBroadcastManager",
    "androidx/localbroadcastmanager/content/LocalBroadcastManager",
];

const ON_RECEIVE: &[&str] = &["onReceive"];

const INTENT_FILTER_MATCHERS: &[Matcher] = &[
    Matcher::ConstString,
    Matcher::MoveAlias,
    Matcher::InvokeOn(
        Callee::new(INTENT_FILTER, "<init>"),
        Arg::Typed("java/lang/String"),
    ),
    Matcher::InvokeOn(Callee::new(INTENT_FILTER, "addAction"), Arg::Index(0)),
];

const SEND_BROADCASTS: &[&str] = &[
    "sendBroadcast",
    "sendBroadcastAsUser",
    "sendBroadcastSync",
    "sendOrderedBroadcast",
    "sendStickyBroadcast",
];

/// `registerReceiver(receiver, filter, ...)`: the receiver becomes a dynamic
/// one listening to the filter action.
pub struct DynamicReceiver;

impl Resolver for DynamicReceiver {
    fn name(&self) -> &'static str {
        "receiver"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        target.name() == "registerReceiver"
            && target
                .parameters_types()
                .first()
                .and_then(|t| t.class_name())
                == Some(BROADCAST_RECEIVER)
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let mut res = BTreeSet::new();
        let Some(reg) = site.instr().argument(0) else {
            return res;
        };
        let action = site
            .instr()
            .argument_of_type(INTENT_FILTER)
            .and_then(|filter| {
                site.resolve(filter, INTENT_FILTER_MATCHERS)
                    .into_iter()
                    .find_map(|v| match v {
                        Value::Str(s) => Some(s),
                        _ => None,
                    })
            });

        for value in site.resolve(reg, OBJECT_MATCHERS) {
            let Some(class) = value.class_name() else {
                continue;
            };
            let Some(id) = ctx.components.get_id(class) else {
                log::debug!("{}: {class} is not a known receiver", site.caller());
                continue;
            };
            let updated = ctx.components.update(id, |c| match &mut c.kind {
                ComponentKind::Receiver {
                    dynamic,
                    action: current,
                } => {
                    *dynamic = true;
                    if current.is_none() {
                        current.clone_from(&action);
                    }
                    true
                }
                _ => false,
            });
            if updated == Some(true) {
                res.append(&mut callbacks_of(ctx.hierarchy, class, ON_RECEIVE));
            }
        }
        res
    }
}

/// `sendBroadcast(intent, ...)`: explicit intents reach the named receiver,
/// implicit ones every receiver listening to the action. Local broadcasts
/// only reach dynamically registered receivers.
pub struct Broadcast;

impl Resolver for Broadcast {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        SEND_BROADCASTS.contains(&target.name())
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
        let local = LOCAL_BROADCAST_MANAGER.contains(&site.target.definer());

        let mut receivers = BTreeSet::new();
        for value in site.resolve(reg, INTENT_ACTION_MATCHERS) {
            let explicit = intent_class(&value)
                .filter(|c| ctx.components.is_a(c, ComponentType::Receiver));
            match (explicit, value) {
                (Some(class), _) => {
                    receivers.insert(class);
                }
                (None, Value::Str(action)) => {
                    receivers.extend(ctx.components.ids_of(ComponentType::Receiver).filter_map(
                        |id| {
                            let c = ctx.components.read(id)?;
                            (c.action() == Some(action.as_str())).then(|| c.name().to_string())
                        },
                    ));
                }
                (None, value) => {
                    log::debug!("{}: broadcast intent resolved to {value}", site.caller());
                }
            }
        }

        for class in receivers {
            if local
                && !ctx
                    .components
                    .get(&class)
                    .is_some_and(|c| c.is_dynamic_receiver())
            {
                log::debug!("{}: {class} is not registered locally", site.caller());
                continue;
            }
            res.append(&mut callbacks_of(ctx.hierarchy, &class, ON_RECEIVE));
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::tests::{const_class, const_string, invoke, new_instance};
    use crate::resolvers::tests::{code, set, Fixture};
    use dr_bytecode::{ClassDef, InvokeKind};

    const REGISTER: &str = "Landroid/content/Context;->registerReceiver(Landroid/content/BroadcastReceiver;Landroid/content/IntentFilter;)Landroid/content/Intent;";
    const SEND: &str = "Landroid/content/Context;->sendBroadcast(Landroid/content/Intent;)V";
    const LOCAL_SEND: &str = "Landroidx/localbroadcastmanager/content/LocalBroadcastManager;->sendBroadcast(Landroid/content/Intent;)Z";
    const ON_RECEIVE_M: &str = "onReceive(Landroid/content/Context;Landroid/content/Intent;)V";

    fn classes(main: Vec<dr_bytecode::MethodDef>) -> Vec<ClassDef> {
        let mut class = ClassDef::new("app/Main").extends("android/app/Activity");
        for m in main {
            class = class.with_method(m);
        }
        vec![
            class,
            ClassDef::new("app/Dyn").extends(BROADCAST_RECEIVER).declaring(ON_RECEIVE_M),
            ClassDef::new("app/Static").extends(BROADCAST_RECEIVER).declaring(ON_RECEIVE_M),
        ]
    }

    fn register() -> dr_bytecode::MethodDef {
        code(
            "Lapp/Main;->listen()V",
            vec![
                new_instance(1, "app/Dyn"),
                new_instance(2, INTENT_FILTER),
                const_string(3, "app.REFRESH"),
                invoke(
                    InvokeKind::Direct,
                    &[2, 3],
                    "Landroid/content/IntentFilter;-><init>(Ljava/lang/String;)V",
                ),
                invoke(InvokeKind::Virtual, &[0, 1, 2], REGISTER),
            ],
        )
    }

    #[test]
    fn register_marks_dynamic_with_action() {
        let f = Fixture::new(classes(vec![register()]));
        let res = f.run(&DynamicReceiver, "app/Main", "listen", REGISTER);
        assert_eq!(res, set(&["Lapp/Dyn;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V"]));
        let dyn_ = f.components.get("app/Dyn").unwrap();
        assert!(dyn_.is_dynamic_receiver());
        assert_eq!(dyn_.action(), Some("app.REFRESH"));
    }

    #[test]
    fn explicit_and_implicit_broadcasts() {
        let f = Fixture::new(classes(vec![
            register(),
            code(
                "Lapp/Main;->notifyExplicit()V",
                vec![
                    new_instance(1, INTENT),
                    const_class(2, "app/Static"),
                    invoke(
                        InvokeKind::Direct,
                        &[1, 0, 2],
                        "Landroid/content/Intent;-><init>(Landroid/content/Context;Ljava/lang/Class;)V",
                    ),
                    invoke(InvokeKind::Virtual, &[0, 1], SEND),
                ],
            ),
            code(
                "Lapp/Main;->notifyAction()V",
                vec![
                    new_instance(1, INTENT),
                    const_string(2, "app.REFRESH"),
                    invoke(
                        InvokeKind::Direct,
                        &[1, 2],
                        "Landroid/content/Intent;-><init>(Ljava/lang/String;)V",
                    ),
                    invoke(InvokeKind::Virtual, &[0, 1], SEND),
                    invoke(InvokeKind::Virtual, &[4, 1], LOCAL_SEND),
                ],
            ),
        ]));
        assert_eq!(
            f.run(&Broadcast, "app/Main", "notifyExplicit", SEND),
            set(&["Lapp/Static;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V"])
        );

        // no action registered yet
        assert!(f.run(&Broadcast, "app/Main", "notifyAction", SEND).is_empty());
        f.run(&DynamicReceiver, "app/Main", "listen", REGISTER);
        assert_eq!(
            f.run(&Broadcast, "app/Main", "notifyAction", SEND),
            set(&["Lapp/Dyn;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V"])
        );
        assert_eq!(
            f.run(&Broadcast, "app/Main", "notifyAction", LOCAL_SEND),
            set(&["Lapp/Dyn;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V"])
        );
    }

    #[test]
    fn set_action_reaches_dynamic_receivers_locally() {
        let f = Fixture::new(classes(vec![
            register(),
            code(
                "Lapp/Main;->refresh()V",
                vec![
                    new_instance(1, INTENT),
                    invoke(InvokeKind::Direct, &[1], "Landroid/content/Intent;-><init>()V"),
                    const_string(2, "app.REFRESH"),
                    invoke(
                        InvokeKind::Virtual,
                        &[1, 2],
                        "Landroid/content/Intent;->setAction(Ljava/lang/String;)Landroid/content/Intent;",
                    ),
                    invoke(InvokeKind::Virtual, &[0, 1], SEND),
                    invoke(InvokeKind::Virtual, &[4, 1], LOCAL_SEND),
                ],
            ),
        ]));
        // app/Static listens to the same action from the manifest
        let id = f.components.get_id("app/Static").unwrap();
        f.components.update(id, |c| {
            if let ComponentKind::Receiver { action, .. } = &mut c.kind {
                *action = Some("app.REFRESH".to_string());
            }
        });
        f.run(&DynamicReceiver, "app/Main", "listen", REGISTER);

        assert_eq!(
            f.run(&Broadcast, "app/Main", "refresh", SEND),
            set(&[
                "Lapp/Dyn;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V",
                "Lapp/Static;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V",
            ])
        );
        assert_eq!(
            f.run(&Broadcast, "app/Main", "refresh", LOCAL_SEND),
            set(&["Lapp/Dyn;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V"])
        );
    }

    #[test]
    fn local_broadcast_skips_static_receivers() {
        let f = Fixture::new(classes(vec![code(
            "Lapp/Main;->notifyLocal()V",
            vec![const_class(1, "app/Static"), invoke(InvokeKind::Virtual, &[4, 1], LOCAL_SEND)],
        )]));
        assert!(f.run(&Broadcast, "app/Main", "notifyLocal", LOCAL_SEND).is_empty());
    }
}
