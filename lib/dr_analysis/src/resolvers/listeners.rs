//! Listeners and callbacks registered on framework objects.

use crate::resolvers::{CallSite, CallbackApi, Context, Resolver, Tracked, OBJECT_MATCHERS};
use dr_bytecode::MethodDescr;
use lazy_static::lazy_static;
use std::collections::{BTreeMap, BTreeSet};

const fn listener(
    name: &'static str,
    interface: &'static &'static str,
    callbacks: &'static [&'static str],
) -> CallbackApi {
    CallbackApi {
        name,
        params: "",
        object: Tracked::Argument(*interface),
        bases: std::slice::from_ref(interface),
        callbacks,
        matchers: OBJECT_MATCHERS,
    }
}

const ANIMATOR_CALLBACKS: &[&str] = &[
    "onAnimationStart",
    "onAnimationEnd",
    "onAnimationCancel",
    "onAnimationRepeat",
];

pub const LISTENERS: &[CallbackApi] = &[
    listener(
        "setOnErrorListener",
        &"android/media/MediaPlayer$OnErrorListener",
        &["onError"],
    ),
    listener(
        "setOnCompletionListener",
        &"android/media/MediaPlayer$OnCompletionListener",
        &["onCompletion"],
    ),
    listener(
        "setOnPreparedListener",
        &"android/media/MediaPlayer$OnPreparedListener",
        &["onPrepared"],
    ),
    listener(
        "requestAudioFocus",
        &"android/media/AudioManager$OnAudioFocusChangeListener",
        &["onAudioFocusChange"],
    ),
    listener(
        "abandonAudioFocus",
        &"android/media/AudioManager$OnAudioFocusChangeListener",
        &["onAudioFocusChange"],
    ),
    listener(
        "getMapAsync",
        &"com/google/android/gms/maps/OnMapReadyCallback",
        &["onMapReady"],
    ),
    listener(
        "setOnMapClickListener",
        &"com/google/android/gms/maps/GoogleMap$OnMapClickListener",
        &["onMapClick"],
    ),
    listener(
        "addListener",
        &"android/animation/Animator$AnimatorListener",
        ANIMATOR_CALLBACKS,
    ),
    listener(
        "addUpdateListener",
        &"android/animation/ValueAnimator$AnimatorUpdateListener",
        &["onAnimationUpdate"],
    ),
    listener(
        "setAnimationListener",
        &"android/view/animation/Animation$AnimationListener",
        &["onAnimationStart", "onAnimationEnd", "onAnimationRepeat"],
    ),
    listener(
        "setOnMenuItemClickListener",
        &"android/widget/PopupMenu$OnMenuItemClickListener",
        &["onMenuItemClick"],
    ),
    listener(
        "setOnDismissListener",
        &"android/widget/PopupMenu$OnDismissListener",
        &["onDismiss"],
    ),
    listener(
        "setOnClickListener",
        &"android/view/View$OnClickListener",
        &["onClick"],
    ),
    listener(
        "setOnLongClickListener",
        &"android/view/View$OnLongClickListener",
        &["onLongClick"],
    ),
    listener("schedule", &"java/util/TimerTask", &["run"]),
    listener("scheduleAtFixedRate", &"java/util/TimerTask", &["run"]),
];

lazy_static! {
    static ref BY_NAME: BTreeMap<&'static str, Vec<&'static CallbackApi>> = {
        let mut map: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for api in LISTENERS {
            map.entry(api.name).or_default().push(api);
        }
        map
    };
}

fn apis(target: &MethodDescr) -> impl Iterator<Item = &'static CallbackApi> + '_ {
    BY_NAME
        .get(target.name())
        .into_iter()
        .flatten()
        .copied()
        .filter(|api| {
            let Tracked::Argument(interface) = api.object else {
                return false;
            };
            target
                .parameters_types()
                .iter()
                .any(|t| t.class_name() == Some(interface))
        })
}

pub struct ListenerRegistration;

impl Resolver for ListenerRegistration {
    fn name(&self) -> &'static str {
        "listener"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        apis(target).next().is_some()
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        apis(site.target)
            .flat_map(|api| api.resolve(site, ctx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::tests::{invoke, new_instance, nop, r};
    use crate::resolvers::tests::{code, set, Fixture};
    use dr_bytecode::{ClassDef, FieldDescr, Instr, InvokeKind, Type};

    const SET_ON_ERROR: &str = "Landroid/media/MediaPlayer;->setOnErrorListener(Landroid/media/MediaPlayer$OnErrorListener;)V";
    const ON_ERROR_LISTENER: &str = "android/media/MediaPlayer$OnErrorListener";
    const ON_ERROR: &str = "onError(Landroid/media/MediaPlayer;II)Z";

    #[test]
    fn registered_listener_instance() {
        let f = Fixture::new(vec![
            ClassDef::new("app/Player").with_method(code(
                "Lapp/Player;->init()V",
                vec![
                    new_instance(1, "app/Listener"),
                    invoke(InvokeKind::Direct, &[1], "Lapp/Listener;-><init>()V"),
                    nop(),
                    invoke(InvokeKind::Virtual, &[0, 1], SET_ON_ERROR),
                ],
            )),
            ClassDef::new("app/Listener")
                .implements(ON_ERROR_LISTENER)
                .declaring(ON_ERROR),
        ]);
        let res = f.run(&ListenerRegistration, "app/Player", "init", SET_ON_ERROR);
        assert_eq!(
            res,
            set(&["Lapp/Listener;->onError(Landroid/media/MediaPlayer;II)Z"])
        );
    }

    #[test]
    fn listener_must_implement_interface() {
        let f = Fixture::new(vec![
            ClassDef::new("app/Player").with_method(code(
                "Lapp/Player;->init()V",
                vec![
                    new_instance(1, "app/NotAListener"),
                    invoke(InvokeKind::Virtual, &[0, 1], SET_ON_ERROR),
                ],
            )),
            ClassDef::new("app/NotAListener").declaring(ON_ERROR),
        ]);
        assert!(f
            .run(&ListenerRegistration, "app/Player", "init", SET_ON_ERROR)
            .is_empty());
    }

    #[test]
    fn this_as_listener() {
        // Player.init(): this.setOnClickListener(this), `this` in v7
        const SET_ON_CLICK: &str =
            "Landroid/view/View;->setOnClickListener(Landroid/view/View$OnClickListener;)V";
        let f = Fixture::new(vec![ClassDef::new("app/Player")
            .implements("android/view/View$OnClickListener")
            .declaring("onClick(Landroid/view/View;)V")
            .with_method(code(
                "Lapp/Player;->init()V",
                vec![nop(), invoke(InvokeKind::Virtual, &[0, 7], SET_ON_CLICK)],
            ))]);
        let res = f.run(&ListenerRegistration, "app/Player", "init", SET_ON_CLICK);
        assert_eq!(res, set(&["Lapp/Player;->onClick(Landroid/view/View;)V"]));
    }

    #[test]
    fn interface_typed_field_falls_back_to_inner_classes() {
        let field = FieldDescr::new("app/Player", "listener", Type::class(ON_ERROR_LISTENER));
        let f = Fixture::new(vec![
            ClassDef::new("app/Player").with_method(code(
                "Lapp/Player;->init()V",
                vec![
                    Instr::FieldRead {
                        dst: r(1),
                        object: Some(r(7)),
                        field,
                    },
                    invoke(InvokeKind::Virtual, &[0, 1], SET_ON_ERROR),
                ],
            )),
            ClassDef::new("app/Player$1")
                .implements(ON_ERROR_LISTENER)
                .declaring(ON_ERROR),
            ClassDef::new("app/Player$2").declaring(ON_ERROR),
        ]);
        let res = f.run(&ListenerRegistration, "app/Player", "init", SET_ON_ERROR);
        assert_eq!(
            res,
            set(&["Lapp/Player$1;->onError(Landroid/media/MediaPlayer;II)Z"])
        );
    }

    #[test]
    fn timer_task() {
        const SCHEDULE: &str = "Ljava/util/Timer;->schedule(Ljava/util/TimerTask;JJ)V";
        let f = Fixture::new(vec![
            ClassDef::new("app/Poller").with_method(code(
                "Lapp/Poller;->start()V",
                vec![
                    new_instance(1, "app/Tick"),
                    invoke(InvokeKind::Virtual, &[0, 1, 2, 3, 4, 5], SCHEDULE),
                ],
            )),
            ClassDef::new("app/Tick").extends("java/util/TimerTask").declaring("run()V"),
        ]);
        let res = f.run(&ListenerRegistration, "app/Poller", "start", SCHEDULE);
        assert_eq!(res, set(&["Lapp/Tick;->run()V"]));
    }
}
