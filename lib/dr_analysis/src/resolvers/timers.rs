//! Delayed and periodic tasks.

use crate::hierarchy::JAVA_LANG_RUNNABLE;
use crate::resolvers::threads::CALLABLE;
use crate::resolvers::{CallSite, CallbackApi, Context, Resolver, Tracked, OBJECT_MATCHERS};
use dr_bytecode::MethodDescr;
use std::collections::BTreeSet;

const fn delayed(name: &'static str, params: &'static str) -> CallbackApi {
    CallbackApi {
        name,
        params,
        object: Tracked::Argument(JAVA_LANG_RUNNABLE),
        bases: &[JAVA_LANG_RUNNABLE],
        callbacks: &["run"],
        matchers: OBJECT_MATCHERS,
    }
}

pub const DELAYED_APIS: &[CallbackApi] = &[
    // Handler and View
    delayed("postDelayed", "Ljava/lang/Runnable;J"),
    delayed("postAtTime", "Ljava/lang/Runnable;J"),
    delayed("postOnAnimationDelayed", "Ljava/lang/Runnable;J"),
    // ScheduledExecutorService
    delayed("schedule", "Ljava/lang/Runnable;J"),
    delayed("scheduleAtFixedRate", "Ljava/lang/Runnable;J"),
    delayed("scheduleWithFixedDelay", "Ljava/lang/Runnable;J"),
    CallbackApi {
        name: "schedule",
        params: "Ljava/util/concurrent/Callable;J",
        object: Tracked::Argument(CALLABLE),
        bases: &[CALLABLE],
        callbacks: &["call"],
        matchers: OBJECT_MATCHERS,
    },
];

pub struct DelayedTask;

fn apis(target: &MethodDescr) -> impl Iterator<Item = &'static CallbackApi> + '_ {
    DELAYED_APIS.iter().filter(|api| api.matches(target))
}

impl Resolver for DelayedTask {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        apis(target).next().is_some()
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        apis(site.target).flat_map(|api| api.resolve(site, ctx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::tests::{invoke, new_instance, nop};
    use crate::resolvers::tests::{code, set, Fixture};
    use dr_bytecode::{ClassDef, Instr, InvokeKind};

    #[test]
    fn handler_post_delayed() {
        let post = "Landroid/os/Handler;->postDelayed(Ljava/lang/Runnable;J)Z";
        let f = Fixture::new(vec![
            ClassDef::new("app/Splash").with_method(code(
                "Lapp/Splash;->onCreate()V",
                vec![
                    new_instance(1, "app/Splash$1"),
                    Instr::Const {
                        dst: crate::backward::tests::r(2),
                        value: 3000,
                    },
                    invoke(InvokeKind::Virtual, &[0, 1, 2, 3], post),
                ],
            )),
            ClassDef::new("app/Splash$1")
                .implements(JAVA_LANG_RUNNABLE)
                .declaring("run()V"),
        ]);
        let res = f.run(&DelayedTask, "app/Splash", "onCreate", post);
        assert_eq!(res, set(&["Lapp/Splash$1;->run()V"]));
    }

    #[test]
    fn scheduled_callable() {
        let schedule = "Ljava/util/concurrent/ScheduledExecutorService;->schedule(Ljava/util/concurrent/Callable;JLjava/util/concurrent/TimeUnit;)Ljava/util/concurrent/ScheduledFuture;";
        let f = Fixture::new(vec![
            ClassDef::new("app/Sync").with_method(code(
                "Lapp/Sync;->later()V",
                vec![
                    new_instance(1, "app/Fetch"),
                    nop(),
                    invoke(InvokeKind::Interface, &[0, 1, 2, 3, 4], schedule),
                ],
            )),
            ClassDef::new("app/Fetch")
                .implements(CALLABLE)
                .declaring("call()Ljava/lang/Object;"),
        ]);
        let res = f.run(&DelayedTask, "app/Sync", "later", schedule);
        assert_eq!(res, set(&["Lapp/Fetch;->call()Ljava/lang/Object;"]));
    }

    #[test]
    fn timer_schedule_is_not_delayed_task() {
        let target: MethodDescr = "Ljava/util/Timer;->schedule(Ljava/util/TimerTask;J)V"
            .parse()
            .unwrap();
        assert!(!DelayedTask.recognizes(&target));
    }
}
