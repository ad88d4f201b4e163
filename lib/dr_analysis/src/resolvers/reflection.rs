//! Objects instantiated through reflection.

use crate::backward::{Arg, Callee, Matcher, Value};
use crate::hierarchy::JAVA_LANG_OBJECT;
use crate::resolvers::{CallSite, Context, Resolver};
use dr_bytecode::types::internal_class_name;
use dr_bytecode::{MethodDescr, Type};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub const JAVA_LANG_CLASS: &str = "java/lang/Class";
pub const CONSTRUCTOR: &str = "java/lang/reflect/Constructor";

const CLASS_OBJECT_MATCHERS: &[Matcher] = &[
    Matcher::ConstClass,
    Matcher::ConstString,
    Matcher::MoveAlias,
    Matcher::ResultOf(Callee::new(JAVA_LANG_CLASS, "forName"), Arg::Index(0)),
    Matcher::ResultOf(Callee::new(JAVA_LANG_CLASS, "getConstructor"), Arg::Receiver),
    Matcher::ResultOf(
        Callee::new(JAVA_LANG_CLASS, "getDeclaredConstructor"),
        Arg::Receiver,
    ),
    Matcher::ResultOf(Callee::any("getClass"), Arg::Receiver),
    Matcher::NewInstance,
];

lazy_static! {
    static ref TYPE_VARIABLE_BOUND: Regex = Regex::new(r"([A-Za-z_$][\w$]*):+L([^;<]+)[;<]")
        .expect("failed to compile type variable bound regex");
    static ref CLASS_ARGUMENT: Regex = Regex::new(r"Ljava/lang/Class<([^>]*)>;")
        .expect("failed to compile class type argument regex");
}

/// Type variable bounds declared by the formal type parameters of a generic
/// signature (`<T:Lapp/Base;>...`).
fn type_bounds(signature: &str) -> BTreeMap<String, String> {
    let Some(formals) = signature
        .strip_prefix('<')
        .and_then(|s| s.split_once(">(").map(|(f, _)| f))
        .or_else(|| signature.strip_prefix('<').and_then(|s| s.rsplit_once('>').map(|(f, _)| f)))
    else {
        return BTreeMap::new();
    };
    TYPE_VARIABLE_BOUND
        .captures_iter(formals)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

/// Class named by the `n`-th `Class<...>` parameter of a generic method
/// signature: either a concrete type argument or the bound of a type
/// variable.
pub fn class_type_argument(
    method_signature: &str,
    class_signature: Option<&str>,
    n: usize,
) -> Option<String> {
    let params = method_signature
        .split_once('(')
        .and_then(|(_, rest)| rest.rsplit_once(')'))
        .map(|(params, _)| params)?;
    let argument = CLASS_ARGUMENT.captures_iter(params).nth(n)?[1].to_string();
    let argument = argument.trim_start_matches(['+', '-']);

    let class = if let Some(class) = argument.strip_prefix('L') {
        class.split([';', '<']).next().map(ToString::to_string)
    } else if let Some(var) = argument.strip_prefix('T') {
        let var = var.trim_end_matches(';');
        let mut bounds = class_signature.map(type_bounds).unwrap_or_default();
        bounds.append(&mut type_bounds(method_signature));
        bounds.get(var).cloned()
    } else {
        None
    };
    class.filter(|c| c != JAVA_LANG_OBJECT)
}

pub struct Reflection;

impl Reflection {
    fn parameter_class(site: &CallSite, i: usize) -> Option<String> {
        let params = site.caller().parameters_types();
        match params.get(i)? {
            Type::Class(c) if c == JAVA_LANG_CLASS => {
                let n = params[..i]
                    .iter()
                    .filter(|t| t.class_name() == Some(JAVA_LANG_CLASS))
                    .count();
                let signature = site.method.generic_signature()?;
                class_type_argument(&signature, site.class.generic_signature().as_deref(), n)
            }
            Type::Class(c) => Some(c.clone()),
            _ => None,
        }
    }
}

impl Resolver for Reflection {
    fn name(&self) -> &'static str {
        "reflection"
    }

    fn recognizes(&self, target: &MethodDescr) -> bool {
        target.name() == "newInstance"
            && (target.definer() == JAVA_LANG_CLASS || target.definer() == CONSTRUCTOR)
    }

    fn resolve(&self, site: &CallSite, ctx: &Context) -> BTreeSet<MethodDescr> {
        let Some(reg) = site.instr().receiver() else {
            return BTreeSet::new();
        };
        site.resolve(reg, CLASS_OBJECT_MATCHERS)
            .into_iter()
            .filter_map(|value| match value {
                Value::Class(c) => Some(c),
                Value::Str(s) => Some(internal_class_name(&s)),
                Value::Parameter(i) => Self::parameter_class(site, i),
                Value::This(_) | Value::Int(_) => None,
            })
            .filter(|c| {
                let known = ctx.hierarchy.is_app_class(c);
                if !known {
                    log::debug!("{}: reflected class {c} is not an application class", site.caller());
                }
                known
            })
            .map(|c| MethodDescr::default_constructor(&c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::tests::{const_class, const_string, invoke, move_result, nop};
    use crate::resolvers::tests::{code, set, Fixture};
    use dr_bytecode::{Annotation, ClassDef, InvokeKind};

    const CLASS_NEW_INSTANCE: &str = "Ljava/lang/Class;->newInstance()Ljava/lang/Object;";
    const CTOR_NEW_INSTANCE: &str =
        "Ljava/lang/reflect/Constructor;->newInstance([Ljava/lang/Object;)Ljava/lang/Object;";

    #[test]
    fn const_class_new_instance() {
        let f = Fixture::new(vec![
            ClassDef::new("app/Main").with_method(code(
                "Lapp/Main;->make()V",
                vec![
                    const_class(0, "app/Plugin"),
                    invoke(InvokeKind::Virtual, &[0], CLASS_NEW_INSTANCE),
                ],
            )),
            ClassDef::new("app/Plugin"),
        ]);
        assert_eq!(
            f.run(&Reflection, "app/Main", "make", CLASS_NEW_INSTANCE),
            set(&["Lapp/Plugin;-><init>()V"])
        );
    }

    #[test]
    fn for_name_and_constructor() {
        let f = Fixture::new(vec![
            ClassDef::new("app/Main").with_method(code(
                "Lapp/Main;->make()V",
                vec![
                    const_string(0, "app.Plugin"),
                    invoke(
                        InvokeKind::Static,
                        &[0],
                        "Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;",
                    ),
                    move_result(1),
                    invoke(
                        InvokeKind::Virtual,
                        &[1, 2],
                        "Ljava/lang/Class;->getDeclaredConstructor([Ljava/lang/Class;)Ljava/lang/reflect/Constructor;",
                    ),
                    move_result(3),
                    nop(),
                    invoke(InvokeKind::Virtual, &[3, 2], CTOR_NEW_INSTANCE),
                ],
            )),
            ClassDef::new("app/Plugin"),
        ]);
        assert_eq!(
            f.run(&Reflection, "app/Main", "make", CTOR_NEW_INSTANCE),
            set(&["Lapp/Plugin;-><init>()V"])
        );
    }

    #[test]
    fn generic_class_parameter() {
        // static <T extends Base> T make(Class<T> cl) { return cl.newInstance(); }
        let make = code(
            "Lapp/Factory;->make(Ljava/lang/Class;)Ljava/lang/Object;",
            vec![nop(), invoke(InvokeKind::Virtual, &[7], CLASS_NEW_INSTANCE)],
        )
        .static_()
        .with_annotation(Annotation::signature(&[
            "<T:",
            "Lapp/Base;",
            ">(",
            "Ljava/lang/Class<",
            "TT;>;)TT;",
        ]));
        let f = Fixture::new(vec![
            ClassDef::new("app/Factory").with_method(make),
            ClassDef::new("app/Base"),
        ]);
        assert_eq!(
            f.run(&Reflection, "app/Factory", "make", CLASS_NEW_INSTANCE),
            set(&["Lapp/Base;-><init>()V"])
        );
    }

    #[test]
    fn signature_type_arguments() {
        assert_eq!(
            class_type_argument("(Ljava/lang/Class<+Lapp/Bar;>;)V", None, 0),
            Some("app/Bar".to_string())
        );
        assert_eq!(
            class_type_argument(
                "(ILjava/lang/Class<Lapp/A;>;Ljava/lang/Class<TV;>;)V",
                Some("<V::Lapp/Iface;>Ljava/lang/Object;"),
                1
            ),
            Some("app/Iface".to_string())
        );
        assert_eq!(class_type_argument("(Ljava/lang/Class<*>;)V", None, 0), None);
        assert_eq!(
            class_type_argument("<T:Ljava/lang/Object;>(Ljava/lang/Class<TT;>;)V", None, 0),
            None
        );
    }
}
