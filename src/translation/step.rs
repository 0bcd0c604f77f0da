//! Step model: the closed set of traversal steps and the program that owns
//! them.
//!
//! A [`Program`] is an append-only list of [`Step`]s. Steps that take
//! sub-programs own them outright; once a child builder's program has been
//! moved into a parent step it can no longer be extended.

use super::predicate::P;
use crate::types::{Cardinality, Column, Order, Scope, Value};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Short list of labels or property keys carried by a step.
pub type Labels = SmallVec<[String; 2]>;

pub(crate) fn labels<S: AsRef<str>>(items: &[S]) -> Labels {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

/// Named functions applied by `map()`. They operate on plain values only,
/// so every target can reference them by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomFunction {
    /// `[container, index]` -> element; list index or map key.
    ContainerIndex,
    ToString,
    ToInteger,
    ToFloat,
    ToBoolean,
    Size,
}

impl CustomFunction {
    pub const ALL: [CustomFunction; 6] = [
        CustomFunction::ContainerIndex,
        CustomFunction::ToString,
        CustomFunction::ToInteger,
        CustomFunction::ToFloat,
        CustomFunction::ToBoolean,
        CustomFunction::Size,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CustomFunction::ContainerIndex => "cypherContainerIndex",
            CustomFunction::ToString => "cypherToString",
            CustomFunction::ToInteger => "cypherToInteger",
            CustomFunction::ToFloat => "cypherToFloat",
            CustomFunction::ToBoolean => "cypherToBoolean",
            CustomFunction::Size => "cypherSize",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    // source
    V { start: bool },
    E { start: bool },
    Inject(Vec<Value>),
    AddV { label: Option<String>, start: bool },
    AddE(String),

    // traversal
    Out(Labels),
    In(Labels),
    Both(Labels),
    OutE(Labels),
    InE(Labels),
    BothE(Labels),
    OutV,
    InV,
    OtherV,
    BothV,
    Unfold,
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

    // filter
    Has(String),
    HasValue(String, P),
    HasKey(Labels),
    HasLabel(Labels),
    HasNot(String),
    Is(P),
    WhereP(P),
    Where(Program),
    Dedup,
    Range(u64, u64),
    Limit(u64),
    Skip(u64),

    // branching and nested programs
    And(Vec<Program>),
    Or(Vec<Program>),
    Not(Program),
    ChooseTraversal {
        condition: Program,
        then: Program,
        otherwise: Program,
    },
    ChooseP {
        predicate: P,
        then: Program,
        otherwise: Option<Program>,
    },
    Coalesce(Vec<Program>),
    Union(Vec<Program>),
    Repeat(Program),
    Until(Program),
    Emit,
    Times(u32),
    SideEffect(Program),
    Local(Program),
    Optional(Program),

    // modulators
    By {
        traversal: Program,
        order: Option<Order>,
    },
    ByKey {
        key: String,
        order: Option<Order>,
    },
    From(String),
    To(String),

    // aggregation
    Count(Scope),
    Sum(Scope),
    Min(Scope),
    Max(Scope),
    Mean(Scope),
    Fold,
    Group,
    Aggregate(String),
    Barrier,
    Order(Scope),

    // labels and selection
    As(String),
    Select(Labels),
    SelectColumn(Column),
    Project(Labels),

    // mutation
    Property {
        cardinality: Cardinality,
        key: String,
        value: Value,
    },
    Drop,
}

impl Step {
    /// Step name in the traversal language.
    pub fn operator(&self) -> &'static str {
        match self {
            Step::V { .. } => "V",
            Step::E { .. } => "E",
            Step::Inject(_) => "inject",
            Step::AddV { .. } => "addV",
            Step::AddE(_) => "addE",
            Step::Out(_) => "out",
            Step::In(_) => "in",
            Step::Both(_) => "both",
            Step::OutE(_) => "outE",
            Step::InE(_) => "inE",
            Step::BothE(_) => "bothE",
            Step::OutV => "outV",
            Step::InV => "inV",
            Step::OtherV => "otherV",
            Step::BothV => "bothV",
            Step::Unfold => "unfold",
            Step::Path => "path",
            Step::Properties(_) => "properties",
            Step::Values(_) => "values",
            Step::ValueMap => "valueMap",
            Step::Id => "id",
            Step::Label => "label",
            Step::Key => "key",
            Step::Value => "value",
            Step::Constant(_) => "constant",
            Step::Map(_) => "map",
            Step::Has(_) | Step::HasValue(..) => "has",
            Step::HasKey(_) => "hasKey",
            Step::HasLabel(_) => "hasLabel",
            Step::HasNot(_) => "hasNot",
            Step::Is(_) => "is",
            Step::WhereP(_) | Step::Where(_) => "where",
            Step::Dedup => "dedup",
            Step::Range(..) => "range",
            Step::Limit(_) => "limit",
            Step::Skip(_) => "skip",
            Step::And(_) => "and",
            Step::Or(_) => "or",
            Step::Not(_) => "not",
            Step::ChooseTraversal { .. } | Step::ChooseP { .. } => "choose",
            Step::Coalesce(_) => "coalesce",
            Step::Union(_) => "union",
            Step::Repeat(_) => "repeat",
            Step::Until(_) => "until",
            Step::Emit => "emit",
            Step::Times(_) => "times",
            Step::SideEffect(_) => "sideEffect",
            Step::Local(_) => "local",
            Step::Optional(_) => "optional",
            Step::By { .. } | Step::ByKey { .. } => "by",
            Step::From(_) => "from",
            Step::To(_) => "to",
            Step::Count(_) => "count",
            Step::Sum(_) => "sum",
            Step::Min(_) => "min",
            Step::Max(_) => "max",
            Step::Mean(_) => "mean",
            Step::Fold => "fold",
            Step::Group => "group",
            Step::Aggregate(_) => "aggregate",
            Step::Barrier => "barrier",
            Step::Order(_) => "order",
            Step::As(_) => "as",
            Step::Select(_) | Step::SelectColumn(_) => "select",
            Step::Project(_) => "project",
            Step::Property { .. } => "property",
            Step::Drop => "drop",
        }
    }

    /// Nested programs owned by this step, in operand order.
    pub fn programs(&self) -> Vec<&Program> {
        match self {
            Step::Where(p)
            | Step::Not(p)
            | Step::Repeat(p)
            | Step::Until(p)
            | Step::SideEffect(p)
            | Step::Local(p)
            | Step::Optional(p)
            | Step::By { traversal: p, .. } => vec![p],
            Step::And(ps) | Step::Or(ps) | Step::Coalesce(ps) | Step::Union(ps) => {
                ps.iter().collect()
            }
            Step::ChooseTraversal {
                condition,
                then,
                otherwise,
            } => vec![condition, then, otherwise],
            Step::ChooseP {
                then, otherwise, ..
            } => std::iter::once(then).chain(otherwise.as_ref()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    steps: Vec<Step>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Total number of steps including nested programs.
    pub fn deep_len(&self) -> usize {
        self.steps
            .iter()
            .map(|s| 1 + s.programs().iter().map(|p| p.deep_len()).sum::<usize>())
            .sum()
    }
}

impl From<Vec<Step>> for Program {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl fmt::Display for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
