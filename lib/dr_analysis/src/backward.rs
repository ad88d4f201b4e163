//! Backward register resolution.
//!
//! Starting from an instruction and a register, the search walks the
//! instruction graph backward looking for the instruction(s) defining the
//! register value. What counts as a definition, and what counts as an alias
//! to follow, is given by an ordered list of [`Matcher`]s chosen by the
//! caller.
//!
//! The walk is a worklist over *all* predecessors, so a definition reachable
//! through any branch of a join point is found. Each instruction is inspected
//! at most once per tracked register and query, which bounds the number of
//! steps by instructions times registers and makes the walk terminate on
//! loops.

use dr_bytecode::{Instr, InstrGraph, InvokeKind, MethodDef, MethodDescr, ParamSlot, Reg, RegList};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Symbolic value a register has been resolved to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// A class: instantiated, referenced by `const-class`, declared type of a
    /// field or return type of a factory method.
    Class(String),
    Str(String),
    Int(i64),
    /// Receiver of the analyzed method, whose class is given.
    This(String),
    /// Declared parameter of the analyzed method, by position.
    Parameter(usize),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Class(cl) => write!(f, "class {cl}"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Int(i) => write!(f, "int {i:#x}"),
            Self::This(cl) => write!(f, "this ({cl})"),
            Self::Parameter(i) => write!(f, "parameter #{i}"),
        }
    }
}

impl Value {
    /// The class carried by the value (`this` included).
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Class(cl) | Self::This(cl) => Some(cl),
            _ => None,
        }
    }
}

/// Decision taken by a matcher on a visited instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The matcher does not care about this instruction.
    Continue,
    /// The tracked register is defined here with the given value.
    Match(Value),
    /// The tracked value flows from another register before this instruction.
    Retarget(Reg),
    /// The tracked register is defined here by something that cannot be
    /// resolved: the path is abandoned.
    Kill,
}

/// An instruction visited by the backward walk.
pub struct Visit<'a> {
    graph: &'a InstrGraph,
    index: usize,
    instr: &'a Instr,
    reg: Reg,
}

impl<'a> Visit<'a> {
    #[inline]
    pub fn instr(&self) -> &'a Instr {
        self.instr
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The register currently tracked.
    #[inline]
    pub fn reg(&self) -> Reg {
        self.reg
    }

    /// The invocation producing the result read by a `move-result`.
    pub fn previous_invoke(&self) -> Option<&'a Instr> {
        let graph = self.graph;
        graph
            .predecessors(self.index)
            .filter_map(|p| graph.instr(p))
            .find(|i| matches!(i, Instr::Invoke { .. }))
    }
}

/// Selects an argument of an invocation.
#[derive(Debug, Clone, Copy)]
pub enum Arg {
    /// Receiver of a non-static invocation.
    Receiver,
    /// Declared argument by position (receiver not counted).
    Index(usize),
    /// First declared argument of the given class type.
    Typed(&'static str),
}

impl Arg {
    fn register(self, instr: &Instr) -> Option<Reg> {
        match self {
            Self::Receiver => instr.receiver(),
            Self::Index(i) => instr.argument(i),
            Self::Typed(class) => instr.argument_of_type(class),
        }
    }
}

/// Selects invoked methods by definer class (any when `None`) and name.
#[derive(Debug, Clone, Copy)]
pub struct Callee {
    pub class: Option<&'static str>,
    pub name: &'static str,
}

impl Callee {
    #[must_use]
    pub const fn new(class: &'static str, name: &'static str) -> Self {
        Self {
            class: Some(class),
            name,
        }
    }

    #[must_use]
    pub const fn any(name: &'static str) -> Self {
        Self { class: None, name }
    }

    #[must_use]
    pub fn matches(&self, method: &MethodDescr) -> bool {
        method.name() == self.name && self.class.map_or(true, |c| method.definer() == c)
    }
}

/// Backward search matchers.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// `new-instance` into the tracked register.
    NewInstance,
    /// `const-class` into the tracked register.
    ConstClass,
    /// `const-string` into the tracked register.
    ConstString,
    /// Integer literal into the tracked register.
    ConstInt,
    /// Field read into the tracked register: resolves to the field declared
    /// class type.
    FieldType,
    /// `move` into the tracked register: follow its source.
    MoveAlias,
    /// `move-result` into the tracked register: resolves to the return class
    /// type of the invocation.
    ResultType,
    /// `move-result` into the tracked register: follow the receiver of the
    /// invocation (builders, fluent setters).
    ResultReceiver,
    /// `move-result` of a given invocation into the tracked register: follow
    /// one of its arguments.
    ResultOf(Callee, Arg),
    /// Invocation of a given method on the tracked register (as receiver):
    /// follow one of its arguments. Used for constructors and setters
    /// carrying the value of interest.
    InvokeOn(Callee, Arg),
    /// Custom matcher.
    Custom(fn(&Visit) -> Step),
}

impl Matcher {
    pub fn inspect(&self, visit: &Visit) -> Step {
        let reg = visit.reg();
        match (self, visit.instr()) {
            (Self::NewInstance, Instr::NewInstance { dst, class }) if *dst == reg => {
                Step::Match(Value::Class(class.clone()))
            }
            (Self::ConstClass, Instr::ConstClass { dst, class }) if *dst == reg => {
                Step::Match(Value::Class(class.clone()))
            }
            (Self::ConstString, Instr::ConstString { dst, value }) if *dst == reg => {
                Step::Match(Value::Str(value.clone()))
            }
            (Self::ConstInt, Instr::Const { dst, value }) if *dst == reg => {
                Step::Match(Value::Int(*value))
            }
            (Self::FieldType, Instr::FieldRead { dst, field, .. }) if *dst == reg => {
                match field.type_().class_name() {
                    Some(class) => Step::Match(Value::Class(class.to_string())),
                    None => Step::Kill,
                }
            }
            (Self::MoveAlias, Instr::Move { dst, src }) if *dst == reg => Step::Retarget(*src),
            (Self::ResultType, Instr::MoveResult { dst }) if *dst == reg => {
                match visit.previous_invoke().and_then(Instr::as_invoke) {
                    Some((_, _, method)) => match method.return_type().class_name() {
                        Some(class) => Step::Match(Value::Class(class.to_string())),
                        None => Step::Kill,
                    },
                    None => Step::Kill,
                }
            }
            (Self::ResultReceiver, Instr::MoveResult { dst }) if *dst == reg => {
                match visit.previous_invoke().and_then(Instr::receiver) {
                    Some(receiver) => Step::Retarget(receiver),
                    None => Step::Continue,
                }
            }
            (Self::ResultOf(callee, arg), Instr::MoveResult { dst }) if *dst == reg => {
                match visit.previous_invoke() {
                    Some(invoke) if invoke.as_invoke().is_some_and(|(_, _, m)| callee.matches(m)) => {
                        arg.register(invoke).map_or(Step::Kill, Step::Retarget)
                    }
                    _ => Step::Continue,
                }
            }
            (Self::InvokeOn(callee, arg), invoke @ Instr::Invoke { method, .. })
                if invoke.receiver() == Some(reg) && callee.matches(method) =>
            {
                arg.register(invoke).map_or(Step::Continue, Step::Retarget)
            }
            (Self::Custom(f), _) => f(visit),
            _ => Step::Continue,
        }
    }
}

/// Result of a backward walk.
#[derive(Debug, Default)]
pub struct Walk {
    pub values: BTreeSet<Value>,
    /// Number of inspected instructions.
    pub steps: usize,
}

/// Backward search over the instruction graph of a method.
pub struct Backward<'a> {
    graph: &'a InstrGraph,
    method: Option<(&'a str, &'a MethodDef)>,
}

impl<'a> Backward<'a> {
    #[must_use]
    pub fn new(graph: &'a InstrGraph) -> Self {
        Self {
            graph,
            method: None,
        }
    }

    /// Gives the method owning the graph, so that parameter registers reaching
    /// the method entry resolve to [`Value::This`] or [`Value::Parameter`].
    #[must_use]
    pub fn with_method(mut self, class: &'a str, method: &'a MethodDef) -> Self {
        self.method = Some((class, method));
        self
    }

    /// Resolves the register used by the `start` instruction to its nearest
    /// definition, following every path backward.
    #[must_use]
    pub fn resolve(&self, start: usize, reg: Reg, matchers: &[Matcher]) -> Option<Value> {
        self.walk(start, reg, matchers, true).values.into_iter().next()
    }

    /// Resolves the register used by the `start` instruction to all its
    /// definitions.
    #[must_use]
    pub fn resolve_all(&self, start: usize, reg: Reg, matchers: &[Matcher]) -> BTreeSet<Value> {
        self.walk(start, reg, matchers, false).values
    }

    /// Runs the walk, stopping at the first definition found when
    /// `first_only` is set (breadth-first, so the nearest one).
    pub fn walk(&self, start: usize, reg: Reg, matchers: &[Matcher], first_only: bool) -> Walk {
        let mut walk = Walk::default();
        let mut visited = BTreeSet::new();
        let mut worklist = VecDeque::new();
        self.push_predecessors(start, reg, &mut worklist, &mut walk);

        while let Some((index, reg)) = worklist.pop_front() {
            if !visited.insert((index, reg)) {
                continue;
            }
            let Some(instr) = self.graph.instr(index) else {
                log::warn!("backward walk reached unknown instruction {index}");
                continue;
            };
            walk.steps += 1;

            let visit = Visit {
                graph: self.graph,
                index,
                instr,
                reg,
            };
            let step = matchers
                .iter()
                .map(|m| m.inspect(&visit))
                .find(|s| *s != Step::Continue)
                .unwrap_or(Step::Continue);
            log::trace!("  {index:5}: {instr} [{reg}] -> {step:?}");

            match step {
                Step::Match(value) => {
                    walk.values.insert(value);
                    if first_only {
                        break;
                    }
                }
                Step::Retarget(new_reg) => {
                    self.push_predecessors(index, new_reg, &mut worklist, &mut walk);
                }
                Step::Kill => (),
                Step::Continue if instr.writes(reg) => (),
                Step::Continue => self.push_predecessors(index, reg, &mut worklist, &mut walk),
            }
            if first_only && !walk.values.is_empty() {
                break;
            }
        }
        walk
    }

    fn push_predecessors(
        &self,
        index: usize,
        reg: Reg,
        worklist: &mut VecDeque<(usize, Reg)>,
        walk: &mut Walk,
    ) {
        let mut any = false;
        for pred in self.graph.predecessors(index) {
            any = true;
            worklist.push_back((pred, reg));
        }
        if !any {
            if let Some(value) = self.entry_value(reg) {
                walk.values.insert(value);
            }
        }
    }

    // Value of a register at method entry.
    fn entry_value(&self, reg: Reg) -> Option<Value> {
        let (class, method) = self.method?;
        match method.parameter_slot(reg)? {
            ParamSlot::This => Some(Value::This(class.to_string())),
            ParamSlot::Declared(i) => Some(Value::Parameter(i)),
        }
    }
}

/// Invocation sites of a graph, with their index.
pub fn invocations(graph: &InstrGraph) -> impl Iterator<Item = (usize, InvokeKind, &RegList, &MethodDescr)> {
    graph.iter().filter_map(|(i, instr)| {
        instr
            .as_invoke()
            .map(|(kind, args, method)| (i, kind, args, method))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dr_bytecode::{FieldDescr, Type};

    pub(crate) fn r(n: u16) -> Reg {
        Reg::from(n)
    }

    pub(crate) fn invoke(kind: InvokeKind, regs: &[u16], m: &str) -> Instr {
        Instr::invoke(kind, regs.to_vec(), m.parse().unwrap())
    }

    pub(crate) fn new_instance(dst: u16, class: &str) -> Instr {
        Instr::NewInstance {
            dst: r(dst),
            class: class.to_string(),
        }
    }

    pub(crate) fn const_class(dst: u16, class: &str) -> Instr {
        Instr::ConstClass {
            dst: r(dst),
            class: class.to_string(),
        }
    }

    pub(crate) fn const_string(dst: u16, value: &str) -> Instr {
        Instr::ConstString {
            dst: r(dst),
            value: value.to_string(),
        }
    }

    pub(crate) fn move_result(dst: u16) -> Instr {
        Instr::MoveResult { dst: r(dst) }
    }

    pub(crate) fn nop() -> Instr {
        Instr::Other {
            mnemonic: "nop".to_string(),
            dst: None,
            srcs: Vec::new(),
        }
    }

    const OBJECTS: &[Matcher] = &[
        Matcher::NewInstance,
        Matcher::ConstClass,
        Matcher::FieldType,
        Matcher::MoveAlias,
        Matcher::ResultType,
    ];

    #[test]
    fn straight_line_new_instance() {
        let g = InstrGraph::sequential(vec![
            new_instance(1, "app/Listener"),
            invoke(InvokeKind::Direct, &[1], "Lapp/Listener;-><init>()V"),
            nop(),
            invoke(
                InvokeKind::Virtual,
                &[0, 1],
                "Landroid/media/MediaPlayer;->setOnErrorListener(Landroid/media/MediaPlayer$OnErrorListener;)V",
            ),
        ]);
        let res = Backward::new(&g).resolve(3, r(1), OBJECTS);
        assert_eq!(res, Some(Value::Class("app/Listener".to_string())));
    }

    #[test]
    fn overwritten_register_kills_path() {
        let g = InstrGraph::sequential(vec![
            new_instance(1, "app/Listener"),
            Instr::Other {
                mnemonic: "aget-object".to_string(),
                dst: Some(r(1)),
                srcs: vec![r(2), r(3)],
            },
            nop(),
        ]);
        assert_eq!(Backward::new(&g).resolve(2, r(1), OBJECTS), None);
    }

    #[test]
    fn move_alias_retargets() {
        let g = InstrGraph::sequential(vec![
            const_class(4, "app/Target"),
            Instr::Move { dst: r(2), src: r(4) },
            nop(),
        ]);
        assert_eq!(
            Backward::new(&g).resolve(2, r(2), OBJECTS),
            Some(Value::Class("app/Target".to_string()))
        );
    }

    #[test]
    fn field_and_factory_types() {
        let field = FieldDescr::new("app/Main", "listener", Type::class("app/Listener"));
        let g = InstrGraph::sequential(vec![
            Instr::FieldRead {
                dst: r(0),
                object: Some(r(5)),
                field,
            },
            invoke(InvokeKind::Static, &[], "Lapp/Frag;->newInstance()Lapp/Frag;"),
            move_result(1),
            nop(),
        ]);
        let b = Backward::new(&g);
        assert_eq!(
            b.resolve(3, r(0), OBJECTS),
            Some(Value::Class("app/Listener".to_string()))
        );
        assert_eq!(
            b.resolve(3, r(1), OBJECTS),
            Some(Value::Class("app/Frag".to_string()))
        );
    }

    #[test]
    fn all_predecessors_are_explored() {
        // 0: new-instance v0 A ; 1: if ; 2: new-instance v0 B ; 3: use v0
        // 3 has predecessors 1 (branch taken) and 2 (fallthrough).
        let instrs = vec![
            new_instance(0, "app/A"),
            Instr::Branch { srcs: vec![r(1)] },
            new_instance(0, "app/B"),
            nop(),
        ];
        let preds = vec![vec![], vec![0], vec![1], vec![1, 2]];
        let g = InstrGraph::from_predecessors(instrs, preds).unwrap();
        let all = Backward::new(&g).resolve_all(3, r(0), OBJECTS);
        assert_eq!(
            all,
            BTreeSet::from([
                Value::Class("app/A".to_string()),
                Value::Class("app/B".to_string())
            ])
        );
    }

    #[test]
    fn branches_aliasing_different_registers() {
        // 0: const-class v2 A ; 1: const-class v3 B ; 2: if
        // 3: move v1, v2 ; 4: move v1, v3 ; 5: use v1
        let instrs = vec![
            const_class(2, "app/A"),
            const_class(3, "app/B"),
            Instr::Branch { srcs: vec![r(0)] },
            Instr::Move { dst: r(1), src: r(2) },
            Instr::Move { dst: r(1), src: r(3) },
            nop(),
        ];
        let preds = vec![vec![], vec![0], vec![1], vec![2], vec![2], vec![3, 4]];
        let g = InstrGraph::from_predecessors(instrs, preds).unwrap();
        let walk = Backward::new(&g).walk(5, r(1), OBJECTS, false);
        assert_eq!(
            walk.values,
            BTreeSet::from([
                Value::Class("app/A".to_string()),
                Value::Class("app/B".to_string())
            ])
        );
        // both moves, the branch once per register, then each definition
        // reached from 1 (v3) and 0 (v2) after passing 1 with v2
        assert_eq!(walk.steps, 7);
    }

    #[test]
    fn loops_terminate_within_bound() {
        // 0: nop ; 1: nop ; 2: nop (loops back to 1) ; 3: use v7
        let instrs = vec![nop(), nop(), nop(), nop()];
        let preds = vec![vec![], vec![0, 2], vec![1], vec![2]];
        let g = InstrGraph::from_predecessors(instrs, preds).unwrap();
        let walk = Backward::new(&g).walk(3, r(7), OBJECTS, false);
        assert!(walk.values.is_empty());
        assert!(walk.steps <= g.len());
    }

    #[test]
    fn parameters_at_entry() {
        let g = InstrGraph::sequential(vec![nop(), nop()]);
        let m = MethodDef::new("Lapp/Main;->go(Ljava/lang/Class;)V".parse().unwrap())
            .with_code(3, g.clone());
        let b = Backward::new(&g).with_method("app/Main", &m);
        assert_eq!(b.resolve(1, r(1), OBJECTS), Some(Value::This("app/Main".to_string())));
        assert_eq!(b.resolve(1, r(2), OBJECTS), Some(Value::Parameter(0)));
        assert_eq!(b.resolve(1, r(0), OBJECTS), None);
    }

    #[test]
    fn constructor_chain_retarget() {
        // new Intent(ctx, Target.class) then startActivity(intent)
        let g = InstrGraph::sequential(vec![
            new_instance(0, "android/content/Intent"),
            const_class(1, "app/Target"),
            invoke(
                InvokeKind::Direct,
                &[0, 2, 1],
                "Landroid/content/Intent;-><init>(Landroid/content/Context;Ljava/lang/Class;)V",
            ),
            invoke(
                InvokeKind::Virtual,
                &[2, 0],
                "Landroid/app/Activity;->startActivity(Landroid/content/Intent;)V",
            ),
        ]);
        let matchers = [
            Matcher::ConstClass,
            Matcher::InvokeOn(
                Callee::new("android/content/Intent", "<init>"),
                Arg::Typed("java/lang/Class"),
            ),
        ];
        assert_eq!(
            Backward::new(&g).resolve(3, r(0), &matchers),
            Some(Value::Class("app/Target".to_string()))
        );
    }

    #[test]
    fn result_of_static_call() {
        let g = InstrGraph::sequential(vec![
            const_string(0, "com.example.Plugin"),
            invoke(
                InvokeKind::Static,
                &[0],
                "Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;",
            ),
            move_result(1),
            nop(),
        ]);
        let matchers = [
            Matcher::ConstString,
            Matcher::ResultOf(Callee::new("java/lang/Class", "forName"), Arg::Index(0)),
        ];
        assert_eq!(
            Backward::new(&g).resolve(3, r(1), &matchers),
            Some(Value::Str("com.example.Plugin".to_string()))
        );
    }

    #[test]
    fn custom_matcher() {
        fn any_const(v: &Visit) -> Step {
            match v.instr() {
                Instr::Const { dst, value } if *dst == v.reg() => Step::Match(Value::Int(value * 2)),
                _ => Step::Continue,
            }
        }
        let g = InstrGraph::sequential(vec![
            Instr::Const {
                dst: r(0),
                value: 21,
            },
            nop(),
        ]);
        assert_eq!(
            Backward::new(&g).resolve(1, r(0), &[Matcher::Custom(any_const)]),
            Some(Value::Int(42))
        );
    }
}
