//! Virtual dispatch of `invoke-virtual`, `invoke-interface` and
//! `invoke-super` instructions.

use crate::resolvers::{CallSite, Context, EdgeKind, Resolver};
use dr_bytecode::{InvokeKind, MethodDescr};
use std::collections::BTreeSet;

pub struct VirtualDispatch;

impl Resolver for VirtualDispatch {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        !target.is_constructor()
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let target = site.target;
        let mut res = match site.kind {
            kind if kind.is_dynamic_dispatch() => {
                ctx.hierarchy
                    .overridden_methods(site.calling_class(), target, ctx.config.policy)
            }
            // the literal definer of a super call is the superclass of the
            // caller, only the declaration it inherits can be reached
            InvokeKind::Super => ctx
                .hierarchy
                .resolve_method(target.definer(), target.name(), target.parameters_types())
                .into_iter()
                .collect(),
            _ => BTreeSet::new(),
        };
        res.remove(target);
        res
    }

    fn edge_kind(&self) -> EdgeKind {
        EdgeKind::VirtualOverride
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::tests::{invoke, nop};
    use crate::resolvers::tests::{code, set, Fixture};
    use dr_bytecode::ClassDef;

    fn fixture() -> Fixture {
        Fixture::new(vec![
            ClassDef::new("app/Foo")
                .extends("android/app/Activity")
                .declaring("work()V")
                .declaring("onStop()V"),
            ClassDef::new("app/Bar").extends("app/Foo").declaring("work()V"),
            ClassDef::new("app/Baz").extends("app/Bar").with_method(code(
                "Lapp/Baz;->go()V",
                vec![
                    invoke(InvokeKind::Virtual, &[0], "Lapp/Foo;->work()V"),
                    invoke(InvokeKind::Super, &[0], "Lapp/Bar;->onStop()V"),
                    invoke(InvokeKind::Direct, &[0], "Lapp/Foo;->work()V"),
                    nop(),
                ],
            )),
        ])
    }

    #[test]
    fn virtual_call_reaches_overrides() {
        let f = fixture();
        let res = f.run(&VirtualDispatch, "app/Baz", "go", "Lapp/Foo;->work()V");
        assert_eq!(res, set(&["Lapp/Bar;->work()V"]));
    }

    #[test]
    fn super_call_reaches_inherited_declaration() {
        let f = fixture();
        let res = f.run(&VirtualDispatch, "app/Baz", "go", "Lapp/Bar;->onStop()V");
        assert_eq!(res, set(&["Lapp/Foo;->onStop()V"]));
    }
}
