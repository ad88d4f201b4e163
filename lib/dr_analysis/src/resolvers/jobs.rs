//! Jobs handed to the `JobScheduler` or enqueued on a `JobIntentService`.

use crate::backward::{Arg, Callee, Matcher};
use crate::components::{ComponentKind, ComponentType};
use crate::resolvers::intents::COMPONENT_NAME;
use crate::resolvers::{callbacks_of, CallSite, Context, Resolver};
use dr_bytecode::MethodDescr;
use std::collections::BTreeSet;

pub const JOB_INFO: &str = "android/app/job/JobInfo";
pub const JOB_INFO_BUILDER: &str = "android/app/job/JobInfo$Builder";
const JAVA_LANG_CLASS: &str = "java/lang/Class";

/// `JobInfo` -> `Builder.build()` -> `new Builder(id, component)` ->
/// `new ComponentName(context, class)` -> class constant.
const JOB_INFO_MATCHERS: &[Matcher] = &[
    Matcher::ConstClass,
    Matcher::MoveAlias,
    Matcher::ResultReceiver,
    Matcher::InvokeOn(
        Callee::new(JOB_INFO_BUILDER, "<init>"),
        Arg::Typed(COMPONENT_NAME),
    ),
    Matcher::InvokeOn(
        Callee::new(COMPONENT_NAME, "<init>"),
        Arg::Typed(JAVA_LANG_CLASS),
    ),
];

const CLASS_MATCHERS: &[Matcher] = &[Matcher::ConstClass, Matcher::MoveAlias];

pub struct JobScheduling;

impl JobScheduling {
    fn is_schedule(target: &MethodDescr) -> bool {
        target.name() == "schedule"
            && target.parameters_types().first().and_then(|t| t.class_name()) == Some(JOB_INFO)
    }

    fn is_enqueue_work(target: &MethodDescr) -> bool {
        target.name() == "enqueueWork"
            && target
                .parameters_types()
                .iter()
                .any(|t| t.class_name() == Some(JAVA_LANG_CLASS))
    }
}

impl Resolver for JobScheduling {
    fn name(&self) -> &'static str {
        "job"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        Self::is_schedule(target) || Self::is_enqueue_work(target)
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let (reg, matchers, callback) = if Self::is_schedule(site.target) {
            (site.instr().argument(0), JOB_INFO_MATCHERS, "onStartJob")
        } else {
            (
                site.instr().argument_of_type(JAVA_LANG_CLASS),
                CLASS_MATCHERS,
                "onHandleWork",
            )
        };
        let Some(reg) = reg else {
            return BTreeSet::new();
        };

        let mut res = BTreeSet::new();
        for value in site.resolve(reg, matchers) {
            let Some(class) = value.class_name() else {
                continue;
            };
            let Some(id) = ctx
                .components
                .get_id(class)
                .filter(|_| ctx.components.is_a(class, ComponentType::Service))
            else {
                log::debug!("{}: job service {class} is not a known service", site.caller());
                continue;
            };
            ctx.components.update(id, |c| {
                if let ComponentKind::Service { started, .. } = &mut c.kind {
                    *started = true;
                }
            });
            res.append(&mut callbacks_of(ctx.hierarchy, class, &[callback]));
        }
        res
    }
}
