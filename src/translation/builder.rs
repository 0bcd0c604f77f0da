//! Translation builder contract.
//!
//! The planner drives a [`TranslationBuilder`] one step at a time. Every
//! step method is a provided method on the trait, so all targets share the
//! same scoping and rewrite rules; a target only decides how the finished
//! program is rendered ([`TranslationBuilder::build`]).
//!
//! Nested programs are built in a child obtained from
//! [`TranslationBuilder::start`] and handed back to the parent by value:
//!
//! ```
//! use gremlin_translation::translation::{BytecodeBuilder, TranslationBuilder};
//! use gremlin_translation::translation::P;
//!
//! let mut g = BytecodeBuilder::new();
//! let mut adult = g.start();
//! adult.values(&["age"]).is(P::gte(18));
//! g.v().as_("n").where_(adult).select(&["n"]).unwrap();
//! assert_eq!(g.to_string(), "[V(), as(n), where([values(age), is(gte(18))]), select(n)]");
//! ```

use super::alias::AliasHistory;
use super::predicate::P;
use super::step::{labels, CustomFunction, Program, Step};
use crate::error::{Error, Result};
use crate::types::{Cardinality, Column, Order, Scope, Value};
use tracing::{debug, trace};

/// Program under construction plus its scoping state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    program: Program,
    aliases: AliasHistory,
    child: bool,
}

impl Fragment {
    /// Empty top-level fragment.
    pub fn root() -> Self {
        Self::default()
    }

    /// Top-level fragment around an existing program.
    pub fn from_program(program: Program) -> Self {
        Self {
            program,
            ..Self::default()
        }
    }

    /// Empty sub-program fragment that can read, but not write, our aliases.
    pub fn fork_child(&self) -> Self {
        Self {
            program: Program::new(),
            aliases: self.aliases.fork(),
            child: true,
        }
    }

    /// Divergent continuation of this fragment.
    pub fn fork_copy(&self) -> Self {
        Self {
            program: self.program.clone(),
            aliases: self.aliases.fork(),
            child: false,
        }
    }

    /// A source step appended now starts the whole traversal.
    pub fn is_anchor(&self) -> bool {
        self.program.is_empty() && !self.child
    }

    pub fn is_child(&self) -> bool {
        self.child
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn aliases(&self) -> &AliasHistory {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasHistory {
        &mut self.aliases
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.program.push(step);
    }
}

fn drop_property<B: TranslationBuilder>(builder: &mut B, key: &str) {
    // the target has no null property value: setting null means removing it
    debug!(key = key, "rewriting null property to drop");
    let mut remove = builder.start();
    remove.properties(&[key]).drop();
    builder.side_effect(remove);
}

fn programs<B: TranslationBuilder, I: IntoIterator<Item = B>>(children: I) -> Vec<Program> {
    children.into_iter().map(TranslationBuilder::into_program).collect()
}

pub trait TranslationBuilder: Sized {
    /// Finished artifact produced by this target.
    type Output;

    fn fragment(&self) -> &Fragment;

    fn fragment_mut(&mut self) -> &mut Fragment;

    fn into_fragment(self) -> Fragment;

    /// A builder for the same target wrapping `fragment`.
    fn with_fragment(&self, fragment: Fragment) -> Self;

    /// Renders the program. Operands the target cannot express are
    /// reported here rather than when the step was appended.
    fn build(&self) -> Result<Self::Output>;

    // ==================== scoping ====================

    /// Detached builder for a sub-program operand.
    fn start(&self) -> Self {
        self.with_fragment(self.fragment().fork_child())
    }

    /// Independent copy of the program built so far.
    fn copy(&self) -> Self {
        self.with_fragment(self.fragment().fork_copy())
    }

    fn current(&self) -> &Program {
        self.fragment().program()
    }

    fn into_program(self) -> Program {
        self.into_fragment().into_program()
    }

    /// Bound name a caller label currently resolves to.
    fn alias(&self, label: &str) -> String {
        self.fragment().aliases().current(label)
    }

    fn is_anchor(&self) -> bool {
        self.fragment().is_anchor()
    }

    fn mutate<F: FnOnce(&mut Self)>(&mut self, mutator: F) -> &mut Self {
        mutator(self);
        self
    }

    fn append(&mut self, step: Step) -> &mut Self {
        trace!(operator = step.operator(), "append step");
        self.fragment_mut().push(step);
        self
    }

    // ==================== source steps ====================

    fn v(&mut self) -> &mut Self {
        let start = self.is_anchor();
        self.append(Step::V { start })
    }

    fn e(&mut self) -> &mut Self {
        let start = self.is_anchor();
        self.append(Step::E { start })
    }

    fn add_v(&mut self) -> &mut Self {
        let start = self.is_anchor();
        self.append(Step::AddV { label: None, start })
    }

    fn add_v_label(&mut self, label: &str) -> &mut Self {
        let start = self.is_anchor();
        self.append(Step::AddV {
            label: Some(label.to_string()),
            start,
        })
    }

    fn add_e(&mut self, label: &str) -> &mut Self {
        self.append(Step::AddE(label.to_string()))
    }

    fn inject<I: IntoIterator<Item = Value>>(&mut self, values: I) -> &mut Self {
        self.append(Step::Inject(values.into_iter().collect()))
    }

    // ==================== traversal steps ====================

    fn out<S: AsRef<str>>(&mut self, edge_labels: &[S]) -> &mut Self {
        self.append(Step::Out(labels(edge_labels)))
    }

    fn in_<S: AsRef<str>>(&mut self, edge_labels: &[S]) -> &mut Self {
        self.append(Step::In(labels(edge_labels)))
    }

    fn both<S: AsRef<str>>(&mut self, edge_labels: &[S]) -> &mut Self {
        self.append(Step::Both(labels(edge_labels)))
    }

    fn out_e<S: AsRef<str>>(&mut self, edge_labels: &[S]) -> &mut Self {
        self.append(Step::OutE(labels(edge_labels)))
    }

    fn in_e<S: AsRef<str>>(&mut self, edge_labels: &[S]) -> &mut Self {
        self.append(Step::InE(labels(edge_labels)))
    }

    fn both_e<S: AsRef<str>>(&mut self, edge_labels: &[S]) -> &mut Self {
        self.append(Step::BothE(labels(edge_labels)))
    }

    fn out_v(&mut self) -> &mut Self {
        self.append(Step::OutV)
    }

    fn in_v(&mut self) -> &mut Self {
        self.append(Step::InV)
    }

    fn other_v(&mut self) -> &mut Self {
        self.append(Step::OtherV)
    }

    fn both_v(&mut self) -> &mut Self {
        self.append(Step::BothV)
    }

    fn unfold(&mut self) -> &mut Self {
        self.append(Step::Unfold)
    }

    fn fold(&mut self) -> &mut Self {
        self.append(Step::Fold)
    }

    fn path(&mut self) -> &mut Self {
        self.append(Step::Path)
    }

    fn properties<S: AsRef<str>>(&mut self, keys: &[S]) -> &mut Self {
        self.append(Step::Properties(labels(keys)))
    }

    fn values<S: AsRef<str>>(&mut self, keys: &[S]) -> &mut Self {
        self.append(Step::Values(labels(keys)))
    }

    fn value_map(&mut self) -> &mut Self {
        self.append(Step::ValueMap)
    }

    fn id(&mut self) -> &mut Self {
        self.append(Step::Id)
    }

    fn label(&mut self) -> &mut Self {
        self.append(Step::Label)
    }

    fn key(&mut self) -> &mut Self {
        self.append(Step::Key)
    }

    fn value(&mut self) -> &mut Self {
        self.append(Step::Value)
    }

    fn constant(&mut self, value: impl Into<Value>) -> &mut Self {
        self.append(Step::Constant(value.into()))
    }

    fn map(&mut self, function: CustomFunction) -> &mut Self {
        self.append(Step::Map(function))
    }

    // ==================== filters ====================

    fn has(&mut self, key: &str) -> &mut Self {
        self.append(Step::Has(key.to_string()))
    }

    fn has_value(&mut self, key: &str, predicate: P) -> &mut Self {
        self.append(Step::HasValue(key.to_string(), predicate))
    }

    /// No step is emitted for an empty key set.
    fn has_key<S: AsRef<str>>(&mut self, keys: &[S]) -> &mut Self {
        if keys.is_empty() {
            return self;
        }
        self.append(Step::HasKey(labels(keys)))
    }

    /// No step is emitted for an empty label set.
    fn has_label<S: AsRef<str>>(&mut self, vertex_labels: &[S]) -> &mut Self {
        if vertex_labels.is_empty() {
            return self;
        }
        self.append(Step::HasLabel(labels(vertex_labels)))
    }

    fn has_not(&mut self, key: &str) -> &mut Self {
        self.append(Step::HasNot(key.to_string()))
    }

    fn is(&mut self, predicate: P) -> &mut Self {
        self.append(Step::Is(predicate))
    }

    fn where_(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::Where(traversal.into_program()))
    }

    fn where_p(&mut self, predicate: P) -> &mut Self {
        self.append(Step::WhereP(predicate))
    }

    fn dedup(&mut self) -> &mut Self {
        self.append(Step::Dedup)
    }

    fn range(&mut self, low: u64, high: u64) -> &mut Self {
        self.append(Step::Range(low, high))
    }

    fn limit(&mut self, limit: u64) -> &mut Self {
        self.append(Step::Limit(limit))
    }

    fn skip(&mut self, skip: u64) -> &mut Self {
        self.append(Step::Skip(skip))
    }

    // ==================== branching ====================

    fn and<I: IntoIterator<Item = Self>>(&mut self, traversals: I) -> &mut Self {
        let programs = programs(traversals);
        self.append(Step::And(programs))
    }

    fn or<I: IntoIterator<Item = Self>>(&mut self, traversals: I) -> &mut Self {
        let programs = programs(traversals);
        self.append(Step::Or(programs))
    }

    fn not(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::Not(traversal.into_program()))
    }

    fn choose(&mut self, condition: Self, then: Self, otherwise: Self) -> &mut Self {
        self.append(Step::ChooseTraversal {
            condition: condition.into_program(),
            then: then.into_program(),
            otherwise: otherwise.into_program(),
        })
    }

    fn choose_p(&mut self, predicate: P, then: Self) -> &mut Self {
        self.append(Step::ChooseP {
            predicate,
            then: then.into_program(),
            otherwise: None,
        })
    }

    fn choose_p_else(&mut self, predicate: P, then: Self, otherwise: Self) -> &mut Self {
        self.append(Step::ChooseP {
            predicate,
            then: then.into_program(),
            otherwise: Some(otherwise.into_program()),
        })
    }

    fn coalesce<I: IntoIterator<Item = Self>>(&mut self, traversals: I) -> &mut Self {
        let programs = programs(traversals);
        self.append(Step::Coalesce(programs))
    }

    fn union<I: IntoIterator<Item = Self>>(&mut self, traversals: I) -> &mut Self {
        let programs = programs(traversals);
        self.append(Step::Union(programs))
    }

    fn repeat(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::Repeat(traversal.into_program()))
    }

    fn until(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::Until(traversal.into_program()))
    }

    fn emit(&mut self) -> &mut Self {
        self.append(Step::Emit)
    }

    fn times(&mut self, max_loops: u32) -> &mut Self {
        self.append(Step::Times(max_loops))
    }

    fn side_effect(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::SideEffect(traversal.into_program()))
    }

    fn local(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::Local(traversal.into_program()))
    }

    fn optional(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::Optional(traversal.into_program()))
    }

    // ==================== modulators ====================

    fn by(&mut self, traversal: Self) -> &mut Self {
        self.append(Step::By {
            traversal: traversal.into_program(),
            order: None,
        })
    }

    fn by_order(&mut self, traversal: Self, order: Order) -> &mut Self {
        self.append(Step::By {
            traversal: traversal.into_program(),
            order: Some(order),
        })
    }

    fn by_key(&mut self, key: &str) -> &mut Self {
        self.append(Step::ByKey {
            key: key.to_string(),
            order: None,
        })
    }

    fn by_key_order(&mut self, key: &str, order: Order) -> &mut Self {
        self.append(Step::ByKey {
            key: key.to_string(),
            order: Some(order),
        })
    }

    fn from(&mut self, step_label: &str) -> &mut Self {
        self.append(Step::From(step_label.to_string()))
    }

    fn to(&mut self, step_label: &str) -> &mut Self {
        self.append(Step::To(step_label.to_string()))
    }

    // ==================== aggregation ====================

    fn count(&mut self) -> &mut Self {
        self.append(Step::Count(Scope::Global))
    }

    fn count_in(&mut self, scope: Scope) -> &mut Self {
        self.append(Step::Count(scope))
    }

    fn sum(&mut self) -> &mut Self {
        self.append(Step::Sum(Scope::Global))
    }

    fn sum_in(&mut self, scope: Scope) -> &mut Self {
        self.append(Step::Sum(scope))
    }

    fn min(&mut self) -> &mut Self {
        self.append(Step::Min(Scope::Global))
    }

    fn min_in(&mut self, scope: Scope) -> &mut Self {
        self.append(Step::Min(scope))
    }

    fn max(&mut self) -> &mut Self {
        self.append(Step::Max(Scope::Global))
    }

    fn max_in(&mut self, scope: Scope) -> &mut Self {
        self.append(Step::Max(scope))
    }

    fn mean(&mut self) -> &mut Self {
        self.append(Step::Mean(Scope::Global))
    }

    fn mean_in(&mut self, scope: Scope) -> &mut Self {
        self.append(Step::Mean(scope))
    }

    fn group(&mut self) -> &mut Self {
        self.append(Step::Group)
    }

    fn aggregate(&mut self, label: &str) -> &mut Self {
        self.append(Step::Aggregate(label.to_string()))
    }

    fn barrier(&mut self) -> &mut Self {
        self.append(Step::Barrier)
    }

    fn order(&mut self) -> &mut Self {
        self.append(Step::Order(Scope::Global))
    }

    fn order_in(&mut self, scope: Scope) -> &mut Self {
        self.append(Step::Order(scope))
    }

    // ==================== labels and selection ====================

    /// Binds the current object under a freshly minted name for `label`.
    fn as_(&mut self, label: &str) -> &mut Self {
        let aliases = self.fragment_mut().aliases_mut();
        let rebinding = aliases.is_bound(label);
        let bound = aliases.next(label);
        if rebinding {
            debug!(label = label, bound = %bound, "rebinding label");
        }
        self.append(Step::As(bound))
    }

    /// Selects caller labels, resolved to their current bindings.
    fn select<S: AsRef<str>>(&mut self, step_labels: &[S]) -> Result<&mut Self> {
        let aliases: Vec<String> = step_labels
            .iter()
            .map(|label| self.alias(label.as_ref()))
            .collect();
        self.select_labels(&aliases)
    }

    /// Selects already-bound names verbatim.
    fn select_labels<S: AsRef<str>>(&mut self, step_labels: &[S]) -> Result<&mut Self> {
        if step_labels.is_empty() {
            return Err(Error::Arity("select step should have arguments".to_string()));
        }
        Ok(self.append(Step::Select(labels(step_labels))))
    }

    fn select_column(&mut self, column: Column) -> &mut Self {
        self.append(Step::SelectColumn(column))
    }

    fn project<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<&mut Self> {
        if keys.is_empty() {
            return Err(Error::Arity("`project()` step requires keys".to_string()));
        }
        Ok(self.append(Step::Project(labels(keys))))
    }

    // ==================== mutation ====================

    /// Sets a single-valued property; the null sentinel removes it instead.
    fn property(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        if value.is_null() {
            drop_property(self, key);
            return self;
        }
        self.append(Step::Property {
            cardinality: Cardinality::Single,
            key: key.to_string(),
            value,
        })
    }

    /// Appends list-cardinality values in order; an empty list removes the
    /// property.
    fn property_list<I: IntoIterator<Item = Value>>(&mut self, key: &str, values: I) -> &mut Self {
        let values: Vec<Value> = values.into_iter().collect();
        if values.is_empty() {
            drop_property(self, key);
            return self;
        }
        for value in values {
            self.append(Step::Property {
                cardinality: Cardinality::List,
                key: key.to_string(),
                value,
            });
        }
        self
    }

    fn drop(&mut self) -> &mut Self {
        self.append(Step::Drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::BytecodeBuilder;

    fn steps(builder: &BytecodeBuilder) -> Vec<Step> {
        builder.current().steps().to_vec()
    }

    #[test]
    fn test_source_step_anchor() {
        let mut g = BytecodeBuilder::new();
        assert!(g.is_anchor());
        g.v().v();
        assert_eq!(
            steps(&g),
            vec![Step::V { start: true }, Step::V { start: false }]
        );

        let mut child = g.start();
        assert!(!child.is_anchor());
        child.v();
        assert_eq!(steps(&child), vec![Step::V { start: false }]);

        let mut created = BytecodeBuilder::new();
        created.add_v_label("person").add_v();
        assert_eq!(
            steps(&created),
            vec![
                Step::AddV {
                    label: Some("person".into()),
                    start: true
                },
                Step::AddV {
                    label: None,
                    start: false
                },
            ]
        );
    }

    #[test]
    fn test_child_sources_are_never_anchored() {
        let g = BytecodeBuilder::new();
        let mut child = g.start();
        child.add_v_label("person");
        let mut unlabelled = g.start();
        unlabelled.add_v();
        let mut edges = g.start();
        edges.e();

        assert_eq!(
            steps(&child),
            vec![Step::AddV {
                label: Some("person".into()),
                start: false
            }]
        );
        assert_eq!(
            steps(&unlabelled),
            vec![Step::AddV {
                label: None,
                start: false
            }]
        );
        assert_eq!(steps(&edges), vec![Step::E { start: false }]);

        let mut top = BytecodeBuilder::new();
        top.e();
        assert_eq!(steps(&top), vec![Step::E { start: true }]);
    }

    #[test]
    fn test_copy_of_empty_builder_is_anchor() {
        let g = BytecodeBuilder::new();
        let child = g.start();
        let mut copy = child.copy();
        copy.v();
        assert_eq!(steps(&copy), vec![Step::V { start: true }]);
    }

    #[test]
    fn test_start_does_not_leak_bindings() {
        let mut g = BytecodeBuilder::new();
        g.v().as_("L");
        let before = g.alias("L");

        let mut child = g.start();
        assert_eq!(child.alias("L"), before);
        child.as_("L");
        assert_ne!(child.alias("L"), before);

        assert_eq!(g.alias("L"), before);
    }

    #[test]
    fn test_copy_diverges_independently() {
        let mut g = BytecodeBuilder::new();
        g.v().as_("n");

        let mut left = g.copy();
        let mut right = g.copy();
        left.out(&["knows"]).as_("n");
        right.in_(&["knows"]);

        assert_eq!(g.current().len(), 2);
        assert_eq!(left.current().len(), 4);
        assert_eq!(right.current().len(), 3);
        assert_eq!(g.alias("n"), "n");
        assert_eq!(right.alias("n"), "n");
        assert_ne!(left.alias("n"), "n");
    }

    #[test]
    fn test_rebinding_freshness() {
        let mut g = BytecodeBuilder::new();
        g.v().as_("x").out(&["next"]).as_("x");
        let second = match &steps(&g)[3] {
            Step::As(name) => name.clone(),
            other => panic!("unexpected step {:?}", other),
        };
        assert_eq!(g.alias("x"), second);
        assert_ne!(second, "x");

        g.select(&["x"]).unwrap();
        assert_eq!(steps(&g).last(), Some(&Step::Select(labels(&[second]))));
    }

    #[test]
    fn test_null_property_becomes_drop() {
        let mut g = BytecodeBuilder::new();
        g.v().property("k", Value::Null);

        let expected_inner = Program::from(vec![Step::Properties(labels(&["k"])), Step::Drop]);
        assert_eq!(
            steps(&g),
            vec![Step::V { start: true }, Step::SideEffect(expected_inner)]
        );
    }

    #[test]
    fn test_property_list() {
        let mut g = BytecodeBuilder::new();
        g.v()
            .property_list("k", vec![Value::from("a"), Value::from("b"), Value::from("a")]);
        let values: Vec<Value> = steps(&g)
            .into_iter()
            .filter_map(|s| match s {
                Step::Property {
                    cardinality: Cardinality::List,
                    value,
                    ..
                } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![Value::from("a"), Value::from("b"), Value::from("a")]);

        let mut empty = BytecodeBuilder::new();
        empty.v().property_list("k", Vec::new());
        let mut null = BytecodeBuilder::new();
        null.v().property("k", Value::Null);
        assert_eq!(empty.current(), null.current());
    }

    #[test]
    fn test_project_arity() {
        let mut g = BytecodeBuilder::new();
        let none: [&str; 0] = [];
        let err = g.project(&none).unwrap_err();
        assert!(matches!(err, Error::Arity(ref msg) if msg.contains("requires keys")));

        g.project(&["a"]).unwrap();
        assert_eq!(steps(&g), vec![Step::Project(labels(&["a"]))]);
    }

    #[test]
    fn test_select_arity() {
        let mut g = BytecodeBuilder::new();
        let none: [&str; 0] = [];
        assert!(matches!(g.select_labels(&none), Err(Error::Arity(_))));
        assert!(matches!(g.select(&none), Err(Error::Arity(_))));

        g.select_labels(&["a"]).unwrap();
        g.select_labels(&["a", "b"]).unwrap();
        g.select_column(Column::Values);
        assert_eq!(
            steps(&g),
            vec![
                Step::Select(labels(&["a"])),
                Step::Select(labels(&["a", "b"])),
                Step::SelectColumn(Column::Values),
            ]
        );
    }

    #[test]
    fn test_empty_has_key_and_has_label_are_noops() {
        let mut g = BytecodeBuilder::new();
        let none: [&str; 0] = [];
        g.v().has_label(&none).has_key(&none);
        assert_eq!(g.current().len(), 1);

        g.has_label(&["person", "software"]);
        assert_eq!(
            steps(&g).last(),
            Some(&Step::HasLabel(labels(&["person", "software"])))
        );
    }

    #[test]
    fn test_variadic_combinators_keep_operand_order() {
        let mut g = BytecodeBuilder::new();
        let mut first = g.start();
        first.has("a");
        let mut second = g.start();
        second.has("b");
        g.v().union([first, second]);

        match &steps(&g)[1] {
            Step::Union(programs) => {
                assert_eq!(programs[0].steps(), &[Step::Has("a".into())]);
                assert_eq!(programs[1].steps(), &[Step::Has("b".into())]);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_mutate() {
        let mut g = BytecodeBuilder::new();
        g.v().mutate(|b| {
            b.has("name");
        });
        assert_eq!(g.current().len(), 2);
    }
}
