//! Compiles a [`Program`] into an executable [`Plan`].
//!
//! Modulators (`by`, `from`, `to`, `times`) and the repeat companions
//! (`until`, `emit`) are folded into the operation they decorate, so the
//! executor never sees them as standalone steps. A modulator that has
//! nothing to decorate is an unsupported operand.

use crate::error::{Error, Result};
use crate::translation::{CustomFunction, Labels, Program, Step, P};
use crate::types::{Cardinality, Column, Direction, Order, Scope, Value};

/// How a `by()` modulator maps an object.
#[derive(Debug, Clone, PartialEq)]
pub enum ByModulator {
    Identity,
    Traversal(Plan),
    Key(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepeatSpec {
    pub body: Plan,
    pub times: Option<u32>,
    pub until: Option<Plan>,
    /// `until` placed before `repeat`: checked before each iteration.
    pub until_first: bool,
    pub emit: bool,
    pub emit_first: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    V { start: bool },
    /// Anchored `V()` narrowed by `hasLabel()`, answered from the label index.
    LabelledV(Labels),
    E { start: bool },
    Inject(Vec<Value>),
    AddV { label: Option<String>, start: bool },
    AddE {
        label: String,
        from: Option<String>,
        to: Option<String>,
    },
    Vertices(Direction, Labels),
    Edges(Direction, Labels),
    EdgeVertex(Direction),
    OtherV,
    Unfold,
    Fold,
    Path,
    Properties(Labels),
    Values(Labels),
    ValueMap,
    Id,
    Label,
    Key,
    Value,
    Constant(Value),
    Map(CustomFunction),
    Has(String),
    HasValue(String, P),
    HasKey(Labels),
    HasLabel(Labels),
    HasNot(String),
    Is(P),
    WhereP(P),
    Where(Plan),
    Dedup,
    Range(u64, u64),
    And(Vec<Plan>),
    Or(Vec<Plan>),
    Not(Plan),
    Choose {
        condition: Plan,
        then: Plan,
        otherwise: Plan,
    },
    ChooseP {
        predicate: P,
        then: Plan,
        otherwise: Option<Plan>,
    },
    Coalesce(Vec<Plan>),
    Union(Vec<Plan>),
    Repeat(Box<RepeatSpec>),
    SideEffect(Plan),
    Local(Plan),
    Optional(Plan),
    Count(Scope),
    Sum(Scope),
    Min(Scope),
    Max(Scope),
    Mean(Scope),
    Group {
        key: ByModulator,
        value: Option<ByModulator>,
    },
    Aggregate(String),
    Barrier,
    Order {
        scope: Scope,
        by: Vec<(ByModulator, Order)>,
    },
    As(String),
    Select {
        labels: Labels,
        by: Vec<ByModulator>,
    },
    SelectColumn(Column),
    Project {
        keys: Labels,
        by: Vec<ByModulator>,
    },
    Property {
        cardinality: Cardinality,
        key: String,
        value: Value,
    },
    Drop,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::V { .. } | Op::LabelledV(_) => "V",
            Op::E { .. } => "E",
            Op::Inject(_) => "inject",
            Op::AddV { .. } => "addV",
            Op::AddE { .. } => "addE",
            Op::Vertices(..) => "vertices",
            Op::Edges(..) => "edges",
            Op::EdgeVertex(_) => "edgeVertex",
            Op::OtherV => "otherV",
            Op::Unfold => "unfold",
            Op::Fold => "fold",
            Op::Path => "path",
            Op::Properties(_) => "properties",
            Op::Values(_) => "values",
            Op::ValueMap => "valueMap",
            Op::Id => "id",
            Op::Label => "label",
            Op::Key => "key",
            Op::Value => "value",
            Op::Constant(_) => "constant",
            Op::Map(_) => "map",
            Op::Has(_) | Op::HasValue(..) => "has",
            Op::HasKey(_) => "hasKey",
            Op::HasLabel(_) => "hasLabel",
            Op::HasNot(_) => "hasNot",
            Op::Is(_) => "is",
            Op::WhereP(_) | Op::Where(_) => "where",
            Op::Dedup => "dedup",
            Op::Range(..) => "range",
            Op::And(_) => "and",
            Op::Or(_) => "or",
            Op::Not(_) => "not",
            Op::Choose { .. } | Op::ChooseP { .. } => "choose",
            Op::Coalesce(_) => "coalesce",
            Op::Union(_) => "union",
            Op::Repeat(_) => "repeat",
            Op::SideEffect(_) => "sideEffect",
            Op::Local(_) => "local",
            Op::Optional(_) => "optional",
            Op::Count(_) => "count",
            Op::Sum(_) => "sum",
            Op::Min(_) => "min",
            Op::Max(_) => "max",
            Op::Mean(_) => "mean",
            Op::Group { .. } => "group",
            Op::Aggregate(_) => "aggregate",
            Op::Barrier => "barrier",
            Op::Order { .. } => "order",
            Op::As(_) => "as",
            Op::Select { .. } => "select",
            Op::SelectColumn(_) => "select",
            Op::Project { .. } => "project",
            Op::Property { .. } => "property",
            Op::Drop => "drop",
        }
    }

    /// Global reducing operations collapse the whole stream into one object.
    pub fn is_reducing(&self) -> bool {
        matches!(
            self,
            Op::Count(Scope::Global)
                | Op::Sum(Scope::Global)
                | Op::Min(Scope::Global)
                | Op::Max(Scope::Global)
                | Op::Mean(Scope::Global)
                | Op::Fold
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    ops: Vec<Op>,
}

impl Plan {
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ends_with_reduction(&self) -> bool {
        self.ops.last().is_some_and(Op::is_reducing)
    }

    pub fn compile(program: &Program) -> Result<Self> {
        Compiler::default().compile(program)
    }

    /// Top-level operator names, as printed by the CLI `explain` command.
    pub fn explain(&self) -> String {
        let names: Vec<&str> = self.ops.iter().map(Op::name).collect();
        format!("[{}]", names.join(", "))
    }
}

fn unsupported(message: String) -> Error {
    Error::UnsupportedOperand(message)
}

#[derive(Default)]
struct Compiler {
    ops: Vec<Op>,
    /// `until`/`emit`/`times` seen before the `repeat` they belong to
    pending: Option<RepeatSpec>,
}

impl Compiler {
    fn compile(mut self, program: &Program) -> Result<Plan> {
        for step in program {
            self.step(step)?;
        }
        if self.pending.is_some() {
            return Err(unsupported(
                "until()/emit()/times() without a following repeat()".to_string(),
            ));
        }
        Ok(Plan { ops: self.ops })
    }

    fn nested(program: &Program) -> Result<Plan> {
        Compiler::default().compile(program)
    }

    fn all(programs: &[Program]) -> Result<Vec<Plan>> {
        programs.iter().map(Self::nested).collect()
    }

    fn by(traversal: &Program) -> Result<ByModulator> {
        if traversal.is_empty() {
            Ok(ByModulator::Identity)
        } else {
            Ok(ByModulator::Traversal(Self::nested(traversal)?))
        }
    }

    fn push(&mut self, op: Op) -> Result<()> {
        if self.pending.is_some() {
            return Err(unsupported(format!(
                "until()/emit()/times() must be followed by repeat(), found {}()",
                op.name()
            )));
        }
        if let (Op::HasLabel(labels), Some(Op::V { start: true })) = (&op, self.ops.last()) {
            let labels = labels.clone();
            self.ops.pop();
            self.ops.push(Op::LabelledV(labels));
            return Ok(());
        }
        self.ops.push(op);
        Ok(())
    }

    fn pending(&mut self) -> &mut RepeatSpec {
        self.pending.get_or_insert_with(RepeatSpec::default)
    }

    fn last_repeat(&mut self) -> Option<&mut RepeatSpec> {
        if self.pending.is_some() {
            return None;
        }
        match self.ops.last_mut() {
            Some(Op::Repeat(spec)) => Some(spec),
            _ => None,
        }
    }

    fn modulate_by(&mut self, by: ByModulator, order: Option<Order>) -> Result<()> {
        let target = self.ops.last_mut();
        match target {
            Some(Op::Project { by: list, .. }) | Some(Op::Select { by: list, .. }) => {
                list.push(by);
                Ok(())
            }
            Some(Op::Order { by: list, .. }) => {
                list.push((by, order.unwrap_or(Order::Asc)));
                Ok(())
            }
            Some(Op::Group { key, value }) => {
                if *key == ByModulator::Identity && value.is_none() {
                    *key = by;
                    *value = Some(ByModulator::Identity);
                } else if value == &Some(ByModulator::Identity) {
                    *value = Some(by);
                } else {
                    return Err(unsupported("group() accepts at most two by()".to_string()));
                }
                Ok(())
            }
            Some(op) => Err(unsupported(format!("by() cannot modulate {}()", op.name()))),
            None => Err(unsupported("by() without a preceding step".to_string())),
        }
    }

    fn modulate_edge(&mut self, label: &str, is_from: bool) -> Result<()> {
        match self.ops.last_mut() {
            Some(Op::AddE { from, to, .. }) => {
                let slot = if is_from { from } else { to };
                *slot = Some(label.to_string());
                Ok(())
            }
            _ => Err(unsupported(format!(
                "{}() must follow addE()",
                if is_from { "from" } else { "to" }
            ))),
        }
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        let op = match step {
            Step::V { start } => Op::V { start: *start },
            Step::E { start } => Op::E { start: *start },
            Step::Inject(values) => Op::Inject(values.clone()),
            Step::AddV { label, start } => Op::AddV {
                label: label.clone(),
                start: *start,
            },
            Step::AddE(label) => Op::AddE {
                label: label.clone(),
                from: None,
                to: None,
            },
            Step::Out(ls) => Op::Vertices(Direction::Out, ls.clone()),
            Step::In(ls) => Op::Vertices(Direction::In, ls.clone()),
            Step::Both(ls) => Op::Vertices(Direction::Both, ls.clone()),
            Step::OutE(ls) => Op::Edges(Direction::Out, ls.clone()),
            Step::InE(ls) => Op::Edges(Direction::In, ls.clone()),
            Step::BothE(ls) => Op::Edges(Direction::Both, ls.clone()),
            Step::OutV => Op::EdgeVertex(Direction::Out),
            Step::InV => Op::EdgeVertex(Direction::In),
            Step::BothV => Op::EdgeVertex(Direction::Both),
            Step::OtherV => Op::OtherV,
            Step::Unfold => Op::Unfold,
            Step::Fold => Op::Fold,
            Step::Path => Op::Path,
            Step::Properties(keys) => Op::Properties(keys.clone()),
            Step::Values(keys) => Op::Values(keys.clone()),
            Step::ValueMap => Op::ValueMap,
            Step::Id => Op::Id,
            Step::Label => Op::Label,
            Step::Key => Op::Key,
            Step::Value => Op::Value,
            Step::Constant(v) => Op::Constant(v.clone()),
            Step::Map(f) => Op::Map(*f),
            Step::Has(key) => Op::Has(key.clone()),
            Step::HasValue(key, p) => Op::HasValue(key.clone(), p.clone()),
            Step::HasKey(keys) => Op::HasKey(keys.clone()),
            Step::HasLabel(ls) => Op::HasLabel(ls.clone()),
            Step::HasNot(key) => Op::HasNot(key.clone()),
            Step::Is(p) => Op::Is(p.clone()),
            Step::WhereP(p) => Op::WhereP(p.clone()),
            Step::Where(p) => Op::Where(Self::nested(p)?),
            Step::Dedup => Op::Dedup,
            Step::Range(low, high) => Op::Range(*low, *high),
            Step::Limit(n) => Op::Range(0, *n),
            Step::Skip(n) => Op::Range(*n, u64::MAX),
            Step::And(ps) => Op::And(Self::all(ps)?),
            Step::Or(ps) => Op::Or(Self::all(ps)?),
            Step::Not(p) => Op::Not(Self::nested(p)?),
            Step::ChooseTraversal {
                condition,
                then,
                otherwise,
            } => Op::Choose {
                condition: Self::nested(condition)?,
                then: Self::nested(then)?,
                otherwise: Self::nested(otherwise)?,
            },
            Step::ChooseP {
                predicate,
                then,
                otherwise,
            } => Op::ChooseP {
                predicate: predicate.clone(),
                then: Self::nested(then)?,
                otherwise: otherwise.as_ref().map(Self::nested).transpose()?,
            },
            Step::Coalesce(ps) => Op::Coalesce(Self::all(ps)?),
            Step::Union(ps) => Op::Union(Self::all(ps)?),
            Step::Repeat(body) => {
                let mut spec = self.pending.take().unwrap_or_default();
                spec.body = Self::nested(body)?;
                Op::Repeat(Box::new(spec))
            }
            Step::Until(condition) => {
                let condition = Self::nested(condition)?;
                match self.last_repeat() {
                    Some(spec) if spec.until.is_none() => spec.until = Some(condition),
                    Some(_) => return Err(unsupported("repeat() has two until()".to_string())),
                    None => {
                        let spec = self.pending();
                        spec.until = Some(condition);
                        spec.until_first = true;
                    }
                }
                return Ok(());
            }
            Step::Emit => {
                match self.last_repeat() {
                    Some(spec) => spec.emit = true,
                    None => self.pending().emit_first = true,
                }
                return Ok(());
            }
            Step::Times(n) => {
                match self.last_repeat() {
                    Some(spec) => spec.times = Some(*n),
                    None => self.pending().times = Some(*n),
                }
                return Ok(());
            }
            Step::SideEffect(p) => Op::SideEffect(Self::nested(p)?),
            Step::Local(p) => Op::Local(Self::nested(p)?),
            Step::Optional(p) => Op::Optional(Self::nested(p)?),
            Step::By { traversal, order } => {
                let by = Self::by(traversal)?;
                return self.modulate_by(by, *order);
            }
            Step::ByKey { key, order } => {
                return self.modulate_by(ByModulator::Key(key.clone()), *order);
            }
            Step::From(label) => return self.modulate_edge(label, true),
            Step::To(label) => return self.modulate_edge(label, false),
            Step::Count(s) => Op::Count(*s),
            Step::Sum(s) => Op::Sum(*s),
            Step::Min(s) => Op::Min(*s),
            Step::Max(s) => Op::Max(*s),
            Step::Mean(s) => Op::Mean(*s),
            Step::Group => Op::Group {
                key: ByModulator::Identity,
                value: None,
            },
            Step::Aggregate(label) => Op::Aggregate(label.clone()),
            Step::Barrier => Op::Barrier,
            Step::Order(scope) => Op::Order {
                scope: *scope,
                by: Vec::new(),
            },
            Step::As(label) => Op::As(label.clone()),
            Step::Select(labels) => Op::Select {
                labels: labels.clone(),
                by: Vec::new(),
            },
            Step::SelectColumn(c) => Op::SelectColumn(*c),
            Step::Project(keys) => Op::Project {
                keys: keys.clone(),
                by: Vec::new(),
            },
            Step::Property {
                cardinality,
                key,
                value,
            } => Op::Property {
                cardinality: *cardinality,
                key: key.clone(),
                value: value.clone(),
            },
            Step::Drop => Op::Drop,
        };
        self.push(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{BytecodeBuilder, TranslationBuilder};

    #[test]
    fn test_by_folds_into_project() {
        let mut g = BytecodeBuilder::new();
        let mut name = g.start();
        name.values(&["name"]);
        g.v().project(&["a", "b"]).unwrap().by(name).by_key("age");

        let plan = Plan::compile(g.current()).unwrap();
        assert_eq!(plan.ops().len(), 2);
        match &plan.ops()[1] {
            Op::Project { keys, by } => {
                assert_eq!(keys.len(), 2);
                assert!(matches!(by[0], ByModulator::Traversal(_)));
                assert_eq!(by[1], ByModulator::Key("age".into()));
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_repeat_modulators_either_side() {
        let mut g = BytecodeBuilder::new();
        let mut body = g.start();
        body.out(&[] as &[&str]);
        let mut done = g.start();
        done.has_label(&["end"]);
        g.v().emit().until(done).repeat(body).times(3);

        let plan = Plan::compile(g.current()).unwrap();
        match &plan.ops()[1] {
            Op::Repeat(spec) => {
                assert!(spec.emit_first && !spec.emit);
                assert!(spec.until_first);
                assert_eq!(spec.times, Some(3));
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_misplaced_modulators_rejected() {
        let mut g = BytecodeBuilder::new();
        let name = g.start();
        g.v().out(&["knows"]).by(name);
        assert!(matches!(
            Plan::compile(g.current()),
            Err(Error::UnsupportedOperand(_))
        ));

        let mut g = BytecodeBuilder::new();
        g.v().from("a");
        assert!(matches!(
            Plan::compile(g.current()),
            Err(Error::UnsupportedOperand(_))
        ));

        let mut g = BytecodeBuilder::new();
        g.v().times(2).count();
        assert!(matches!(
            Plan::compile(g.current()),
            Err(Error::UnsupportedOperand(_))
        ));
    }

    #[test]
    fn test_anchored_has_label_uses_index() {
        let mut g = BytecodeBuilder::new();
        g.v().has_label(&["person", "software"]).out(&["knows"]).has_label(&["person"]);
        let plan = Plan::compile(g.current()).unwrap();
        assert_eq!(plan.ops().len(), 3);
        assert!(matches!(&plan.ops()[0], Op::LabelledV(labels) if labels.len() == 2));
        assert!(matches!(&plan.ops()[2], Op::HasLabel(_)));
        assert_eq!(plan.explain(), "[V, vertices, hasLabel]");

        // only the anchored source is narrowed
        let mut g = BytecodeBuilder::new();
        let mut child = g.start();
        child.v().has_label(&["person"]);
        let plan = Plan::compile(child.current()).unwrap();
        assert_eq!(plan.ops().len(), 2);
    }

    #[test]
    fn test_limit_and_skip_become_range() {
        let mut g = BytecodeBuilder::new();
        g.v().skip(1).limit(2);
        let plan = Plan::compile(g.current()).unwrap();
        assert_eq!(plan.ops()[1], Op::Range(1, u64::MAX));
        assert_eq!(plan.ops()[2], Op::Range(0, 2));
        assert_eq!(plan.explain(), "[V, range, range]");
    }
}
