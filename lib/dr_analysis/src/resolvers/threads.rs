//! Code run asynchronously on threads, executors, handlers and UI thread
//! queues.

use crate::backward::{Arg, Callee, Matcher};
use crate::hierarchy::{JAVA_LANG_RUNNABLE, JAVA_LANG_THREAD};
use crate::resolvers::{CallSite, CallbackApi, Context, Resolver, Tracked, OBJECT_MATCHERS};
use dr_bytecode::MethodDescr;
use std::collections::BTreeSet;

pub const CALLABLE: &str = "java/util/concurrent/Callable";
pub const ASYNC_TASK: &str = "android/os/AsyncTask";

/// Thread objects: `new Thread(runnable)` is followed up to the runnable.
const THREAD_MATCHERS: &[Matcher] = &[
    Matcher::InvokeOn(
        Callee::new(JAVA_LANG_THREAD, "<init>"),
        Arg::Typed(JAVA_LANG_RUNNABLE),
    ),
    Matcher::NewInstance,
    Matcher::MoveAlias,
    Matcher::FieldType,
    Matcher::ResultType,
];

const fn runnable(name: &'static str, params: &'static str) -> CallbackApi {
    CallbackApi {
        name,
        params,
        object: Tracked::Argument(JAVA_LANG_RUNNABLE),
        bases: &[JAVA_LANG_RUNNABLE],
        callbacks: &["run"],
        matchers: OBJECT_MATCHERS,
    }
}

pub const THREAD_APIS: &[CallbackApi] = &[
    // Thread.start(): the thread itself, or the runnable it was built with
    CallbackApi {
        name: "start",
        params: "",
        object: Tracked::Receiver,
        bases: &[JAVA_LANG_RUNNABLE, JAVA_LANG_THREAD],
        callbacks: &["run"],
        matchers: THREAD_MATCHERS,
    },
    runnable("execute", "Ljava/lang/Runnable;"),
    runnable("submit", "Ljava/lang/Runnable;"),
    CallbackApi {
        name: "submit",
        params: "Ljava/util/concurrent/Callable;",
        object: Tracked::Argument(CALLABLE),
        bases: &[CALLABLE],
        callbacks: &["call"],
        matchers: OBJECT_MATCHERS,
    },
    runnable("post", "Ljava/lang/Runnable;"),
    runnable("postAtFrontOfQueue", "Ljava/lang/Runnable;"),
    runnable("runOnUiThread", "Ljava/lang/Runnable;"),
    CallbackApi {
        name: "execute",
        params: "[Ljava/lang/Object;",
        object: Tracked::Receiver,
        bases: &[ASYNC_TASK],
        callbacks: &[
            "onPreExecute",
            "doInBackground",
            "onProgressUpdate",
            "onPostExecute",
        ],
        matchers: OBJECT_MATCHERS,
    },
    CallbackApi {
        name: "executeOnExecutor",
        params: "Ljava/util/concurrent/Executor;",
        object: Tracked::Receiver,
        bases: &[ASYNC_TASK],
        callbacks: &[
            "onPreExecute",
            "doInBackground",
            "onProgressUpdate",
            "onPostExecute",
        ],
        matchers: OBJECT_MATCHERS,
    },
];

pub struct ThreadStart;

impl ThreadStart {
    fn apis<'a>(
        target: &'a MethodDescr,
        ctx: Option<&'a Context>,
    ) -> impl Iterator<Item = &'static CallbackApi> + 'a {
        THREAD_APIS.iter().filter(move |api| {
            if !api.matches(target) {
                return false;
            }
            // `start()V` is a common name: the definer must be a thread when
            // the hierarchy tells anything about it
            if api.name == "start" {
                return target.parameters_types().is_empty()
                    && ctx.map_or(true, |ctx| {
                        let definer = target.definer();
                        definer == JAVA_LANG_THREAD
                            || !ctx.hierarchy.is_app_class(definer)
                            || ctx.hierarchy.is_subtype_of(definer, JAVA_LANG_THREAD)
                    });
            }
            true
        })
    }
}

impl Resolver for ThreadStart {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        Self::apis(target, None).next().is_some()
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        Self::apis(site.target, Some(ctx))
            .flat_map(|api| api.resolve(site, ctx))
            .collect()
    }
}
