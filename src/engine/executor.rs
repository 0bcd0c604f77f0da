//! Traversal executor.
//!
//! Runs a compiled [`Plan`] over an in-memory [`Graph`]. Execution is
//! breadth-first: every operation consumes the full traverser stream of the
//! previous one, which keeps barrier steps (`fold`, `order`, `group`,
//! `count`) trivial.

use super::functions;
use super::plan::{ByModulator, Op, Plan, RepeatSpec};
use super::traverser::Traverser;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::{Edge, EdgeId, Graph, Vertex, VertexId};
use crate::translation::Program;
use crate::types::{Cardinality, Column, Direction, Element, Order, PropertyRef, Scope, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalStats {
    pub steps_executed: usize,
    pub traversers_returned: usize,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TraversalResult {
    pub values: Vec<Value>,
    pub stats: TraversalStats,
}

/// Executable traversal bound to a graph.
pub struct Traversal {
    plan: Plan,
    graph: Arc<Graph>,
    config: EngineConfig,
}

impl Traversal {
    pub fn compile(program: &Program, graph: Arc<Graph>, config: EngineConfig) -> Result<Self> {
        let plan = Plan::compile(program)?;
        debug!(
            steps = program.deep_len(),
            ops = plan.ops().len(),
            "compiled traversal"
        );
        Ok(Self {
            plan,
            graph,
            config,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn execute(&self) -> Result<TraversalResult> {
        Executor::new(self.graph.clone(), self.config.clone()).execute(&self.plan)
    }

    pub fn to_list(&self) -> Result<Vec<Value>> {
        Ok(self.execute()?.values)
    }

    /// Runs for side effects only.
    pub fn iterate(&self) -> Result<()> {
        self.execute().map(|_| ())
    }
}

#[derive(Default)]
struct Context {
    side_effects: IndexMap<String, Vec<Value>>,
    steps_executed: usize,
}

#[derive(Clone, Copy)]
enum Reducer {
    Sum,
    Min,
    Max,
    Mean,
}

pub struct Executor {
    graph: Arc<Graph>,
    config: EngineConfig,
}

fn map_values<F>(input: Vec<Traverser>, mut f: F) -> Result<Vec<Traverser>>
where
    F: FnMut(&Traverser) -> Result<Value>,
{
    input.iter().map(|t| Ok(t.split(f(t)?))).collect()
}

fn flat_map_values<F>(input: Vec<Traverser>, mut f: F) -> Result<Vec<Traverser>>
where
    F: FnMut(&Traverser) -> Result<Vec<Value>>,
{
    let mut out = Vec::with_capacity(input.len());
    for t in &input {
        for value in f(t)? {
            out.push(t.split(value));
        }
    }
    Ok(out)
}

fn filter<F>(input: Vec<Traverser>, mut f: F) -> Result<Vec<Traverser>>
where
    F: FnMut(&Traverser) -> Result<bool>,
{
    let mut out = Vec::with_capacity(input.len());
    for t in input {
        if f(&t)? {
            out.push(t);
        }
    }
    Ok(out)
}

fn values_of(input: Vec<Traverser>) -> Vec<Value> {
    input.into_iter().map(Traverser::into_value).collect()
}

fn not_element(step: &str, value: &Value) -> Error {
    Error::Execution(format!(
        "{}() requires an element, found {} {}",
        step,
        value.type_name(),
        value
    ))
}

fn label_matches(labels: &[String], label: &str) -> bool {
    labels.is_empty() || labels.iter().any(|l| l == label)
}

fn to_index(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Members of a collection for local-scope steps; scalars are their own
/// single member.
fn members(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        Value::Map(entries) => entries.values().cloned().collect(),
        other => vec![other.clone()],
    }
}

fn reduce_values(reducer: Reducer, values: Vec<Value>) -> Result<Option<Value>> {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return Ok(None);
    }
    let numbers = || -> Result<Vec<f64>> {
        values
            .iter()
            .map(|v| {
                v.as_f64().ok_or_else(|| {
                    Error::Execution(format!("expected a number, found {} {}", v.type_name(), v))
                })
            })
            .collect()
    };
    let reduced = match reducer {
        Reducer::Sum => {
            let ints: Option<Vec<i64>> = values.iter().map(Value::as_int).collect();
            match ints.and_then(|ints| ints.into_iter().try_fold(0i64, i64::checked_add)) {
                Some(sum) => Value::Int(sum),
                None => Value::Float(numbers()?.into_iter().sum()),
            }
        }
        Reducer::Mean => {
            let numbers = numbers()?;
            Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
        Reducer::Min => values.iter().min_by(|a, b| a.sort_cmp(b)).cloned().unwrap_or(Value::Null),
        Reducer::Max => values.iter().max_by(|a, b| a.sort_cmp(b)).cloned().unwrap_or(Value::Null),
    };
    Ok(Some(reduced))
}

fn compare_keys(a: &[Value], b: &[Value], orders: &[Order]) -> Ordering {
    for ((x, y), order) in a.iter().zip(b).zip(orders) {
        let ordering = match order {
            Order::Asc => x.sort_cmp(y),
            Order::Desc => y.sort_cmp(x),
            Order::Shuffle => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl Executor {
    pub fn new(graph: Arc<Graph>, config: EngineConfig) -> Self {
        Self { graph, config }
    }

    pub fn execute(&self, plan: &Plan) -> Result<TraversalResult> {
        let start = Instant::now();
        let mut ctx = Context::default();

        let output = self.run(plan, Vec::new(), &mut ctx)?;
        let values = values_of(output);

        let stats = TraversalStats {
            steps_executed: ctx.steps_executed,
            traversers_returned: values.len(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            steps = stats.steps_executed,
            results = stats.traversers_returned,
            "traversal finished"
        );
        Ok(TraversalResult { values, stats })
    }

    fn run(&self, plan: &Plan, mut stream: Vec<Traverser>, ctx: &mut Context) -> Result<Vec<Traverser>> {
        for op in plan.ops() {
            trace!(op = op.name(), traversers = stream.len(), "execute op");
            stream = self.apply(op, stream, ctx)?;
            ctx.steps_executed += 1;
            if stream.len() > self.config.max_traversers {
                return Err(Error::Execution(format!(
                    "{}() produced {} traversers, limit is {}",
                    op.name(),
                    stream.len(),
                    self.config.max_traversers
                )));
            }
        }
        Ok(stream)
    }

    /// Runs a child plan seeded with one traverser.
    fn sub(&self, plan: &Plan, t: &Traverser, ctx: &mut Context) -> Result<Vec<Traverser>> {
        self.run(plan, vec![t.clone()], ctx)
    }

    fn test(&self, plan: &Plan, t: &Traverser, ctx: &mut Context) -> Result<bool> {
        Ok(!self.sub(plan, t, ctx)?.is_empty())
    }

    fn apply(&self, op: &Op, input: Vec<Traverser>, ctx: &mut Context) -> Result<Vec<Traverser>> {
        match op {
            Op::V { start } => {
                let ids = self.graph.vertex_ids();
                if *start {
                    Ok(ids.into_iter().map(|id| Traverser::new(Value::Vertex(id))).collect())
                } else {
                    flat_map_values(input, |_| Ok(ids.iter().map(|&id| Value::Vertex(id)).collect()))
                }
            }
            Op::LabelledV(labels) => Ok(self
                .graph
                .vertex_ids_by_label(&labels[..])
                .into_iter()
                .map(|id| Traverser::new(Value::Vertex(id)))
                .collect()),
            Op::E { start } => {
                let ids = self.graph.edge_ids();
                if *start {
                    Ok(ids.into_iter().map(|id| Traverser::new(Value::Edge(id))).collect())
                } else {
                    flat_map_values(input, |_| Ok(ids.iter().map(|&id| Value::Edge(id)).collect()))
                }
            }
            Op::Inject(values) => Ok(values
                .iter()
                .cloned()
                .map(Traverser::new)
                .chain(input)
                .collect()),
            Op::AddV { label, start } => {
                let label = label.as_deref().unwrap_or("vertex");
                if *start {
                    let id = self.graph.add_vertex(label);
                    debug!(id = id.as_u64(), label = label, "added vertex");
                    Ok(vec![Traverser::new(Value::Vertex(id))])
                } else {
                    map_values(input, |_| Ok(Value::Vertex(self.graph.add_vertex(label))))
                }
            }
            Op::AddE { label, from, to } => map_values(input, |t| {
                let endpoint = |slot: &Option<String>| match slot {
                    Some(l) => self
                        .lookup(t, l, ctx)
                        .ok_or_else(|| Error::Execution(format!("addE(): no object labelled {}", l)))
                        .and_then(|v| self.vertex_id(&v)),
                    None => self.vertex_id(t.value()),
                };
                if from.is_none() && to.is_none() {
                    return Err(Error::Execution("addE() requires from() or to()".to_string()));
                }
                let id = self.graph.add_edge(label, endpoint(from)?, endpoint(to)?)?;
                Ok(Value::Edge(id))
            }),
            Op::Vertices(direction, labels) => {
                flat_map_values(input, |t| self.adjacent(t.value(), *direction, labels, false))
            }
            Op::Edges(direction, labels) => {
                flat_map_values(input, |t| self.adjacent(t.value(), *direction, labels, true))
            }
            Op::EdgeVertex(direction) => flat_map_values(input, |t| {
                let edge = self.edge(t.value(), "edgeVertex")?;
                Ok(match direction {
                    Direction::Out => vec![Value::Vertex(edge.src())],
                    Direction::In => vec![Value::Vertex(edge.dst())],
                    Direction::Both => vec![Value::Vertex(edge.src()), Value::Vertex(edge.dst())],
                })
            }),
            Op::OtherV => map_values(input, |t| {
                let edge = self.edge(t.value(), "otherV")?;
                let came_from = t
                    .path()
                    .iter()
                    .rev()
                    .skip(1)
                    .find_map(|entry| match entry.value {
                        Value::Vertex(id) => Some(id),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        Error::Execution("otherV() requires a vertex earlier on the path".to_string())
                    })?;
                Ok(Value::Vertex(edge.other(came_from)))
            }),
            Op::Unfold => flat_map_values(input, |t| {
                Ok(match t.value() {
                    Value::List(items) => items.clone(),
                    Value::Map(entries) => entries
                        .iter()
                        .map(|(k, v)| {
                            let mut entry = IndexMap::new();
                            entry.insert(k.clone(), v.clone());
                            Value::Map(entry)
                        })
                        .collect(),
                    other => vec![other.clone()],
                })
            }),
            Op::Fold => Ok(vec![Traverser::new(Value::List(values_of(input)))]),
            Op::Path => map_values(input, |t| Ok(Value::List(t.path_values()))),
            Op::Properties(keys) => flat_map_values(input, |t| {
                Ok(self
                    .properties(t.value(), keys, "properties")?
                    .into_iter()
                    .map(|p| Value::Property(Box::new(p)))
                    .collect())
            }),
            Op::Values(keys) => flat_map_values(input, |t| self.property_values(t.value(), keys)),
            Op::ValueMap => map_values(input, |t| self.value_map(t.value())),
            Op::Id => map_values(input, |t| match t.value() {
                Value::Vertex(id) => Ok(Value::Int(id.as_u64() as i64)),
                Value::Edge(id) => Ok(Value::Int(id.as_u64() as i64)),
                other => Err(not_element("id", other)),
            }),
            Op::Label => map_values(input, |t| self.label_of(t.value()).map(Value::String)),
            Op::Key | Op::Value => map_values(input, |t| match t.value() {
                Value::Property(p) if matches!(op, Op::Key) => Ok(Value::String(p.key.clone())),
                Value::Property(p) => Ok(p.value.clone()),
                other => Err(Error::Execution(format!(
                    "{}() requires a property, found {}",
                    op.name(),
                    other.type_name()
                ))),
            }),
            Op::Constant(value) => map_values(input, |_| Ok(value.clone())),
            Op::Map(function) => {
                map_values(input, |t| functions::apply(*function, t.value(), &self.graph))
            }
            Op::Has(key) => filter(input, |t| {
                Ok(!self.property_values(t.value(), std::slice::from_ref(key))?.is_empty())
            }),
            Op::HasValue(key, p) => filter(input, |t| {
                Ok(self
                    .property_values(t.value(), std::slice::from_ref(key))?
                    .iter()
                    .any(|v| p.test(v)))
            }),
            Op::HasNot(key) => filter(input, |t| {
                Ok(self.property_values(t.value(), std::slice::from_ref(key))?.is_empty())
            }),
            Op::HasKey(keys) => filter(input, |t| {
                Ok(matches!(t.value(), Value::Property(p) if keys.contains(&p.key)))
            }),
            Op::HasLabel(labels) => filter(input, |t| match t.value().as_element() {
                Some(_) => Ok(labels.contains(&self.label_of(t.value())?)),
                None => Ok(false),
            }),
            Op::Is(p) => filter(input, |t| Ok(p.test(t.value()))),
            Op::WhereP(p) => filter(input, |t| {
                let resolved = p.resolve_labels(&|label: &str| self.lookup(t, label, ctx));
                Ok(resolved.test(t.value()))
            }),
            Op::Where(plan) => filter(input, |t| self.test(plan, t, ctx)),
            Op::Dedup => {
                let mut seen: Vec<Value> = Vec::new();
                filter(input, |t| {
                    if seen.iter().any(|v| v.loose_eq(t.value())) {
                        Ok(false)
                    } else {
                        seen.push(t.value().clone());
                        Ok(true)
                    }
                })
            }
            Op::Range(low, high) => Ok(input
                .into_iter()
                .skip(to_index(*low))
                .take(to_index(high.saturating_sub(*low)))
                .collect()),
            Op::And(plans) => filter(input, |t| {
                for plan in plans {
                    if !self.test(plan, t, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }),
            Op::Or(plans) => filter(input, |t| {
                for plan in plans {
                    if self.test(plan, t, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }),
            Op::Not(plan) => filter(input, |t| Ok(!self.test(plan, t, ctx)?)),
            Op::Choose {
                condition,
                then,
                otherwise,
            } => self.each(input, |t, ctx| {
                if self.test(condition, &t, ctx)? {
                    self.sub(then, &t, ctx)
                } else {
                    self.sub(otherwise, &t, ctx)
                }
            }, ctx),
            Op::ChooseP {
                predicate,
                then,
                otherwise,
            } => self.each(input, |t, ctx| {
                if predicate.test(t.value()) {
                    self.sub(then, &t, ctx)
                } else {
                    match otherwise {
                        Some(plan) => self.sub(plan, &t, ctx),
                        None => Ok(vec![t]),
                    }
                }
            }, ctx),
            Op::Coalesce(plans) => self.each(input, |t, ctx| {
                for plan in plans {
                    let out = self.sub(plan, &t, ctx)?;
                    if !out.is_empty() {
                        return Ok(out);
                    }
                }
                Ok(Vec::new())
            }, ctx),
            Op::Union(plans) => self.each(input, |t, ctx| {
                let mut out = Vec::new();
                for plan in plans {
                    out.extend(self.sub(plan, &t, ctx)?);
                }
                Ok(out)
            }, ctx),
            Op::Repeat(spec) => self.repeat(spec, input, ctx),
            Op::SideEffect(plan) => self.each(input, |t, ctx| {
                self.sub(plan, &t, ctx)?;
                Ok(vec![t])
            }, ctx),
            Op::Local(plan) => self.each(input, |t, ctx| self.sub(plan, &t, ctx), ctx),
            Op::Optional(plan) => self.each(input, |t, ctx| {
                let out = self.sub(plan, &t, ctx)?;
                Ok(if out.is_empty() { vec![t] } else { out })
            }, ctx),
            Op::Count(Scope::Global) => Ok(vec![Traverser::new(Value::Int(input.len() as i64))]),
            Op::Count(Scope::Local) => map_values(input, |t| {
                Ok(Value::Int(match t.value() {
                    Value::List(items) => items.len() as i64,
                    Value::Map(entries) => entries.len() as i64,
                    _ => 1,
                }))
            }),
            Op::Sum(scope) => self.reduce(Reducer::Sum, *scope, input),
            Op::Min(scope) => self.reduce(Reducer::Min, *scope, input),
            Op::Max(scope) => self.reduce(Reducer::Max, *scope, input),
            Op::Mean(scope) => self.reduce(Reducer::Mean, *scope, input),
            Op::Group { key, value } => self.group(key, value.as_ref(), input, ctx),
            Op::Aggregate(label) => {
                ctx.side_effects
                    .entry(label.clone())
                    .or_default()
                    .extend(input.iter().map(|t| t.value().clone()));
                Ok(input)
            }
            Op::Barrier => Ok(input),
            Op::Order { scope, by } => self.order(*scope, by, input, ctx),
            Op::As(label) => Ok(input
                .into_iter()
                .map(|mut t| {
                    t.label(label);
                    t
                })
                .collect()),
            Op::Select { labels, by } => self.select(labels, by, input, ctx),
            Op::SelectColumn(column) => map_values(input, |t| match t.value() {
                Value::Map(entries) => Ok(Value::List(match column {
                    Column::Keys => entries.keys().cloned().map(Value::String).collect(),
                    Column::Values => entries.values().cloned().collect(),
                })),
                other => Err(Error::Execution(format!(
                    "select({}) requires a map, found {}",
                    column.as_str(),
                    other.type_name()
                ))),
            }),
            Op::Project { keys, by } => {
                let identity = ByModulator::Identity;
                map_values(input, |t| {
                    let mut row = IndexMap::with_capacity(keys.len());
                    for (i, key) in keys.iter().enumerate() {
                        let modulator = if by.is_empty() {
                            &identity
                        } else {
                            &by[i % by.len()]
                        };
                        let value = self.by_value(modulator, t, ctx)?.unwrap_or(Value::Null);
                        row.insert(key.clone(), value);
                    }
                    Ok(Value::Map(row))
                })
            }
            Op::Property {
                cardinality,
                key,
                value,
            } => {
                for t in &input {
                    self.set_property(t.value(), *cardinality, key, value)?;
                }
                Ok(input)
            }
            Op::Drop => {
                for t in &input {
                    self.drop_value(t.value())?;
                }
                Ok(Vec::new())
            }
        }
    }

    fn each<F>(&self, input: Vec<Traverser>, mut f: F, ctx: &mut Context) -> Result<Vec<Traverser>>
    where
        F: FnMut(Traverser, &mut Context) -> Result<Vec<Traverser>>,
    {
        let mut out = Vec::with_capacity(input.len());
        for t in input {
            out.extend(f(t, ctx)?);
        }
        Ok(out)
    }

    fn repeat(&self, spec: &RepeatSpec, input: Vec<Traverser>, ctx: &mut Context) -> Result<Vec<Traverser>> {
        if spec.times == Some(0) {
            return Ok(input);
        }

        let mut out = Vec::new();
        let mut frontier = Vec::with_capacity(input.len());
        for mut t in input {
            t.set_loops(0);
            self.admit(spec, t, &mut out, &mut frontier, ctx)?;
        }

        let mut iterations = 0u32;
        while !frontier.is_empty() {
            if iterations >= self.config.max_loops {
                warn!(max_loops = self.config.max_loops, "repeat() loop limit reached");
                return Err(Error::Execution(format!(
                    "repeat() exceeded {} iterations",
                    self.config.max_loops
                )));
            }
            iterations += 1;

            let next = self.run(&spec.body, std::mem::take(&mut frontier), ctx)?;
            for mut t in next {
                t.increment_loops();
                if spec.times.is_some_and(|n| t.loops() >= n) {
                    out.push(t);
                    continue;
                }
                if !spec.until_first {
                    if let Some(until) = &spec.until {
                        if self.test(until, &t, ctx)? {
                            out.push(t);
                            continue;
                        }
                    }
                }
                if spec.emit {
                    out.push(t.clone());
                }
                self.admit(spec, t, &mut out, &mut frontier, ctx)?;
            }
        }
        trace!(iterations = iterations, emitted = out.len(), "repeat finished");
        Ok(out)
    }

    /// Checks the conditions placed before `repeat()` and queues the
    /// traverser for the next iteration.
    fn admit(
        &self,
        spec: &RepeatSpec,
        t: Traverser,
        out: &mut Vec<Traverser>,
        frontier: &mut Vec<Traverser>,
        ctx: &mut Context,
    ) -> Result<()> {
        if spec.until_first {
            if let Some(until) = &spec.until {
                if self.test(until, &t, ctx)? {
                    out.push(t);
                    return Ok(());
                }
            }
        }
        if spec.emit_first {
            out.push(t.clone());
        }
        frontier.push(t);
        Ok(())
    }

    fn reduce(&self, reducer: Reducer, scope: Scope, input: Vec<Traverser>) -> Result<Vec<Traverser>> {
        match scope {
            Scope::Global => Ok(reduce_values(reducer, values_of(input))?
                .map(Traverser::new)
                .into_iter()
                .collect()),
            Scope::Local => {
                let mut out = Vec::with_capacity(input.len());
                for t in &input {
                    if let Some(value) = reduce_values(reducer, members(t.value()))? {
                        out.push(t.split(value));
                    }
                }
                Ok(out)
            }
        }
    }

    fn group(
        &self,
        key: &ByModulator,
        value: Option<&ByModulator>,
        input: Vec<Traverser>,
        ctx: &mut Context,
    ) -> Result<Vec<Traverser>> {
        let mut groups: IndexMap<String, Vec<Traverser>> = IndexMap::new();
        for t in input {
            if let Some(k) = self.by_value(key, &t, ctx)? {
                groups.entry(k.key_string()).or_default().push(t);
            }
        }

        let mut result = IndexMap::with_capacity(groups.len());
        for (k, group) in groups {
            let reduced = match value {
                None | Some(ByModulator::Identity) => Value::List(values_of(group)),
                Some(ByModulator::Key(property)) => {
                    let mut values = Vec::with_capacity(group.len());
                    for t in &group {
                        values.extend(
                            self.property_values(t.value(), std::slice::from_ref(property))?
                                .into_iter()
                                .take(1),
                        );
                    }
                    Value::List(values)
                }
                Some(ByModulator::Traversal(plan)) => {
                    let out = values_of(self.run(plan, group, ctx)?);
                    if plan.ends_with_reduction() {
                        out.into_iter().next().unwrap_or(Value::Null)
                    } else {
                        Value::List(out)
                    }
                }
            };
            result.insert(k, reduced);
        }
        Ok(vec![Traverser::new(Value::Map(result))])
    }

    fn order(
        &self,
        scope: Scope,
        by: &[(ByModulator, Order)],
        input: Vec<Traverser>,
        ctx: &mut Context,
    ) -> Result<Vec<Traverser>> {
        let default = [(ByModulator::Identity, Order::Asc)];
        let by = if by.is_empty() { &default[..] } else { by };
        let orders: Vec<Order> = by.iter().map(|(_, o)| *o).collect();

        let sort = |items: Vec<Traverser>, ctx: &mut Context| -> Result<Vec<Traverser>> {
            let mut keyed = Vec::with_capacity(items.len());
            for t in items {
                let mut keys = Vec::with_capacity(by.len());
                for (modulator, _) in by {
                    keys.push(self.by_value(modulator, &t, ctx)?.unwrap_or(Value::Null));
                }
                keyed.push((keys, t));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &orders));
            Ok(keyed.into_iter().map(|(_, t)| t).collect())
        };

        match scope {
            Scope::Global => sort(input, ctx),
            Scope::Local => {
                let mut out = Vec::with_capacity(input.len());
                for t in input {
                    let sorted = match t.value() {
                        Value::List(items) => {
                            let items = items.iter().map(|v| t.split(v.clone())).collect();
                            Value::List(values_of(sort(items, ctx)?))
                        }
                        Value::Map(entries) => {
                            let items = entries
                                .iter()
                                .map(|(k, v)| {
                                    let mut entry = IndexMap::new();
                                    entry.insert(k.clone(), v.clone());
                                    t.split(Value::Map(entry))
                                })
                                .collect();
                            let mut merged = IndexMap::with_capacity(entries.len());
                            for entry in values_of(sort(items, ctx)?) {
                                if let Value::Map(entry) = entry {
                                    merged.extend(entry);
                                }
                            }
                            Value::Map(merged)
                        }
                        other => other.clone(),
                    };
                    out.push(t.split(sorted));
                }
                Ok(out)
            }
        }
    }

    fn select(
        &self,
        labels: &[String],
        by: &[ByModulator],
        input: Vec<Traverser>,
        ctx: &mut Context,
    ) -> Result<Vec<Traverser>> {
        let mut out = Vec::with_capacity(input.len());
        'traversers: for t in input {
            let mut selected = IndexMap::with_capacity(labels.len());
            for (i, label) in labels.iter().enumerate() {
                let Some(value) = self.lookup(&t, label, ctx) else {
                    continue 'traversers;
                };
                let value = match by.get(i % by.len().max(1)) {
                    Some(modulator) => match self.by_value(modulator, &t.split(value), ctx)? {
                        Some(v) => v,
                        None => continue 'traversers,
                    },
                    None => value,
                };
                selected.insert(label.clone(), value);
            }
            let value = if labels.len() == 1 {
                selected.into_values().next().unwrap_or(Value::Null)
            } else {
                Value::Map(selected)
            };
            out.push(t.split(value));
        }
        Ok(out)
    }

    // ==================== objects ====================

    /// Resolves a step label: map key first, then side effects, then the
    /// path.
    fn lookup(&self, t: &Traverser, label: &str, ctx: &Context) -> Option<Value> {
        if let Value::Map(entries) = t.value() {
            if let Some(v) = entries.get(label) {
                return Some(v.clone());
            }
        }
        if let Some(vs) = ctx.side_effects.get(label) {
            return Some(Value::List(vs.clone()));
        }
        t.labelled(label).cloned()
    }

    fn by_value(&self, by: &ByModulator, t: &Traverser, ctx: &mut Context) -> Result<Option<Value>> {
        match by {
            ByModulator::Identity => Ok(Some(t.value().clone())),
            ByModulator::Key(key) => Ok(self
                .property_values(t.value(), std::slice::from_ref(key))?
                .into_iter()
                .next()),
            ByModulator::Traversal(plan) => Ok(self
                .sub(plan, t, ctx)?
                .into_iter()
                .next()
                .map(Traverser::into_value)),
        }
    }

    fn vertex(&self, id: VertexId) -> Result<Vertex> {
        self.graph
            .get_vertex(id)
            .ok_or(Error::VertexNotFound(id.as_u64()))
    }

    fn vertex_id(&self, value: &Value) -> Result<VertexId> {
        match value {
            Value::Vertex(id) => Ok(*id),
            other => Err(Error::Execution(format!(
                "expected a vertex, found {} {}",
                other.type_name(),
                other
            ))),
        }
    }

    fn edge(&self, value: &Value, step: &str) -> Result<Edge> {
        match value {
            Value::Edge(id) => self.edge_by_id(*id),
            other => Err(Error::Execution(format!(
                "{}() requires an edge, found {}",
                step,
                other.type_name()
            ))),
        }
    }

    fn edge_by_id(&self, id: EdgeId) -> Result<Edge> {
        self.graph.get_edge(id).ok_or(Error::EdgeNotFound(id.as_u64()))
    }

    fn label_of(&self, value: &Value) -> Result<String> {
        match value {
            Value::Vertex(id) => Ok(self.vertex(*id)?.label().to_string()),
            Value::Edge(id) => Ok(self.edge_by_id(*id)?.label().to_string()),
            other => Err(not_element("label", other)),
        }
    }

    fn adjacent(&self, value: &Value, direction: Direction, labels: &[String], edges: bool) -> Result<Vec<Value>> {
        let id = match value {
            Value::Vertex(id) => *id,
            other => return Err(not_element("out/in/both", other)),
        };
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for edge in self.graph.get_outgoing_edges(id) {
                if label_matches(labels, edge.label()) {
                    out.push(if edges { Value::Edge(edge.id()) } else { Value::Vertex(edge.dst()) });
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for edge in self.graph.get_incoming_edges(id) {
                if label_matches(labels, edge.label()) {
                    out.push(if edges { Value::Edge(edge.id()) } else { Value::Vertex(edge.src()) });
                }
            }
        }
        Ok(out)
    }

    fn properties(&self, value: &Value, keys: &[String], step: &str) -> Result<Vec<PropertyRef>> {
        let mut out = Vec::new();
        match value {
            Value::Vertex(id) => {
                let vertex = self.vertex(*id)?;
                let owner = Element::Vertex(*id);
                let mut push = |key: &str, values: &[Value]| {
                    out.extend(values.iter().map(|v| PropertyRef {
                        owner,
                        key: key.to_string(),
                        value: v.clone(),
                    }))
                };
                if keys.is_empty() {
                    for (key, values) in vertex.properties() {
                        push(key, values);
                    }
                } else {
                    for key in keys {
                        push(key, vertex.values(key));
                    }
                }
            }
            Value::Edge(id) => {
                let edge = self.edge_by_id(*id)?;
                let owner = Element::Edge(*id);
                for (key, v) in edge.properties() {
                    if label_matches(keys, key) {
                        out.push(PropertyRef {
                            owner,
                            key: key.clone(),
                            value: v.clone(),
                        });
                    }
                }
            }
            other => return Err(not_element(step, other)),
        }
        Ok(out)
    }

    fn property_values(&self, value: &Value, keys: &[String]) -> Result<Vec<Value>> {
        match value {
            Value::Map(entries) if keys.is_empty() => Ok(entries.values().cloned().collect()),
            Value::Map(entries) => Ok(keys
                .iter()
                .filter_map(|k| entries.get(k))
                .filter(|v| !v.is_null())
                .cloned()
                .collect()),
            other => Ok(self
                .properties(other, keys, "values")?
                .into_iter()
                .map(|p| p.value)
                .collect()),
        }
    }

    fn value_map(&self, value: &Value) -> Result<Value> {
        let mut map = IndexMap::new();
        match value {
            Value::Vertex(id) => {
                for (key, values) in self.vertex(*id)?.properties() {
                    map.insert(key.clone(), Value::List(values.clone()));
                }
            }
            Value::Edge(id) => {
                for (key, v) in self.edge_by_id(*id)?.properties() {
                    map.insert(key.clone(), v.clone());
                }
            }
            other => return Err(not_element("valueMap", other)),
        }
        Ok(Value::Map(map))
    }

    fn set_property(&self, target: &Value, cardinality: Cardinality, key: &str, value: &Value) -> Result<()> {
        match target {
            Value::Vertex(id) if value.is_null() => self.graph.remove_vertex_property(*id, key, None),
            Value::Vertex(id) => {
                self.graph
                    .set_vertex_property(*id, key, value.clone(), cardinality)
            }
            Value::Edge(id) if value.is_null() => self.graph.remove_edge_property(*id, key),
            Value::Edge(id) => self.graph.set_edge_property(*id, key, value.clone()),
            other => Err(not_element("property", other)),
        }
    }

    fn drop_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Vertex(id) => {
                if self.graph.get_vertex(*id).is_some() {
                    self.graph.remove_vertex(*id)?;
                }
            }
            Value::Edge(id) => {
                if self.graph.get_edge(*id).is_some() {
                    self.graph.remove_edge(*id)?;
                }
            }
            Value::Property(p) => match p.owner {
                Element::Vertex(id) if self.graph.get_vertex(id).is_some() => {
                    self.graph
                        .remove_vertex_property(id, &p.key, Some(&p.value))?
                }
                Element::Edge(id) if self.graph.get_edge(id).is_some() => {
                    self.graph.remove_edge_property(id, &p.key)?
                }
                _ => {}
            },
            other => return Err(not_element("drop", other)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{TranslationBuilder, TraversalBuilder, P};

    struct Modern {
        graph: Arc<Graph>,
        marko: VertexId,
    }

    fn person(graph: &Graph, name: &str, age: i64) -> VertexId {
        let id = graph.add_vertex("person");
        graph
            .set_vertex_property(id, "name", Value::from(name), Cardinality::Single)
            .unwrap();
        graph
            .set_vertex_property(id, "age", Value::Int(age), Cardinality::Single)
            .unwrap();
        id
    }

    fn modern() -> Modern {
        let graph = Graph::in_memory();
        let marko = person(&graph, "marko", 29);
        let vadas = person(&graph, "vadas", 27);
        let josh = person(&graph, "josh", 32);
        let lop = graph.add_vertex("software");
        graph
            .set_vertex_property(lop, "name", Value::from("lop"), Cardinality::Single)
            .unwrap();
        graph.add_edge("knows", marko, vadas).unwrap();
        graph.add_edge("knows", marko, josh).unwrap();
        graph.add_edge("created", marko, lop).unwrap();
        graph.add_edge("created", josh, lop).unwrap();
        Modern { graph, marko }
    }

    fn g(graph: &Arc<Graph>) -> TraversalBuilder {
        TraversalBuilder::new(graph.clone())
    }

    fn run(builder: &TraversalBuilder) -> Vec<Value> {
        builder.build().unwrap().to_list().unwrap()
    }

    fn names(items: &[&str]) -> Vec<Value> {
        items.iter().map(|&s| Value::from(s)).collect()
    }

    const ALL: [&str; 0] = [];

    #[test]
    fn test_label_index_matches_scan() {
        let m = modern();
        let mut indexed = g(&m.graph);
        indexed.v().has_label(&["software", "person"]).values(&["name"]);
        assert_eq!(run(&indexed), names(&["marko", "vadas", "josh", "lop"]));

        let mut scanned = g(&m.graph);
        scanned.inject([Value::Int(0)]).v().has_label(&["software"]).values(&["name"]);
        assert_eq!(run(&scanned), names(&["lop"]));

        let mut removed = g(&m.graph);
        removed.v().has_label(&["software"]).drop();
        run(&removed);
        let mut after = g(&m.graph);
        after.v().has_label(&["software"]);
        assert!(run(&after).is_empty());
    }

    #[test]
    fn test_branch_and_parent_share_minted_name() {
        let graph = Graph::in_memory();
        let mut t = g(&graph);
        t.inject([Value::Int(1)]).as_("n");
        let mut branch = t.start();
        branch.constant(2).as_("n");
        t.union([branch]).constant(3).as_("n");
        assert_eq!(
            t.to_string(),
            "[inject(1), as(n), union([constant(2), as(n  2)]), constant(3), as(n  2)]"
        );

        let mut selected = t.copy();
        selected.select(&["n"]).unwrap();
        assert_eq!(run(&selected), vec![Value::Int(3)]);

        let mut path = t.copy();
        path.path();
        assert_eq!(
            run(&path),
            vec![Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])]
        );
    }

    #[test]
    fn test_null_property_matches_explicit_drop() {
        let rewritten = modern();
        let explicit = modern();

        let mut a = g(&rewritten.graph);
        a.v().has_label(&["person"]).property("age", Value::Null);

        let mut b = g(&explicit.graph);
        let mut drop = b.start();
        drop.properties(&["age"]).drop();
        b.v().has_label(&["person"]).side_effect(drop);

        assert_eq!(run(&a), run(&b));
        for graph in [&rewritten.graph, &explicit.graph] {
            let vertex = graph.get_vertex(rewritten.marko).unwrap();
            assert!(!vertex.has_property("age"));
            assert!(vertex.has_property("name"));
        }
    }

    #[test]
    fn test_empty_list_property_drops_and_list_keeps_order() {
        let m = modern();
        let mut add = g(&m.graph);
        add.v()
            .has_value("name", P::eq("marko"))
            .property_list("tags", names(&["a", "b", "a"]));
        run(&add);

        let mut read = g(&m.graph);
        read.v().has_value("name", P::eq("marko")).values(&["tags"]);
        assert_eq!(run(&read), names(&["a", "b", "a"]));

        let mut clear = g(&m.graph);
        clear
            .v()
            .has_value("name", P::eq("marko"))
            .property_list("tags", Vec::new());
        run(&clear);
        assert_eq!(run(&read), Vec::<Value>::new());
    }

    #[test]
    fn test_navigation() {
        let m = modern();
        let mut known = g(&m.graph);
        known
            .v()
            .has_value("name", P::eq("marko"))
            .out(&["knows"])
            .values(&["name"]);
        assert_eq!(run(&known), names(&["vadas", "josh"]));

        let mut creators = g(&m.graph);
        creators
            .v()
            .has_value("name", P::eq("lop"))
            .in_(&["created"])
            .values(&["name"]);
        assert_eq!(run(&creators), names(&["marko", "josh"]));

        let mut other = g(&m.graph);
        other
            .v()
            .has_value("name", P::eq("josh"))
            .both_e(&["knows"])
            .other_v()
            .values(&["name"]);
        assert_eq!(run(&other), names(&["marko"]));
    }

    #[test]
    fn test_repeat_times_emit_until() {
        let m = modern();
        let out = |b: &TraversalBuilder| {
            let mut body = b.start();
            body.out(&ALL);
            body
        };

        let mut times = g(&m.graph);
        let body = out(&times);
        times
            .v()
            .has_value("name", P::eq("marko"))
            .repeat(body)
            .times(2)
            .values(&["name"]);
        assert_eq!(run(&times), names(&["lop"]));

        let mut emit = g(&m.graph);
        let body = out(&emit);
        emit.v()
            .has_value("name", P::eq("marko"))
            .repeat(body)
            .times(2)
            .emit()
            .values(&["name"]);
        assert_eq!(run(&emit), names(&["vadas", "josh", "lop", "lop"]));

        let mut until = g(&m.graph);
        let body = out(&until);
        let mut software = until.start();
        software.has_label(&["software"]);
        until
            .v()
            .has_value("name", P::eq("marko"))
            .repeat(body)
            .until(software)
            .values(&["name"]);
        assert_eq!(run(&until), names(&["lop", "lop"]));
    }

    #[test]
    fn test_repeat_loop_limit() {
        let graph = Graph::in_memory();
        let v = graph.add_vertex("node");
        graph.add_edge("self", v, v).unwrap();

        let config = EngineConfig {
            max_loops: 5,
            ..EngineConfig::default()
        };
        let mut g = TraversalBuilder::with_config(graph, config);
        let mut body = g.start();
        body.out(&ALL);
        g.v().repeat(body).emit();

        let err = g.build().unwrap().to_list().unwrap_err();
        assert!(matches!(err, Error::Execution(ref msg) if msg.contains("repeat")));
    }

    #[test]
    fn test_group_and_order() {
        let m = modern();
        let mut grouped = g(&m.graph);
        let mut key = grouped.start();
        key.label();
        let mut count = grouped.start();
        count.count();
        grouped.v().group().by(key).by(count);

        let mut expected = IndexMap::new();
        expected.insert("person".to_string(), Value::Int(3));
        expected.insert("software".to_string(), Value::Int(1));
        assert_eq!(run(&grouped), vec![Value::Map(expected)]);

        let mut ordered = g(&m.graph);
        ordered
            .v()
            .has_label(&["person"])
            .order()
            .by_key_order("age", Order::Desc)
            .values(&["name"]);
        assert_eq!(run(&ordered), names(&["josh", "marko", "vadas"]));

        let mut local = g(&m.graph);
        local
            .inject([Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)])])
            .order_in(Scope::Local);
        assert_eq!(
            run(&local),
            vec![Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])]
        );
    }

    #[test]
    fn test_where_predicate_resolves_labels() {
        let graph = Graph::in_memory();
        let mut g = g(&graph);
        g.inject([Value::Int(1), Value::Int(2), Value::Int(3)])
            .as_("x")
            .constant(2)
            .where_p(P::eq("x"));
        assert_eq!(run(&g), vec![Value::Int(2)]);
    }

    #[test]
    fn test_choose_and_coalesce() {
        let m = modern();
        let mut chosen = g(&m.graph);
        let mut big = chosen.start();
        big.constant("big");
        let mut small = chosen.start();
        small.constant("small");
        chosen
            .inject([Value::Int(1), Value::Int(5)])
            .choose_p_else(P::gt(2), big, small);
        assert_eq!(run(&chosen), names(&["small", "big"]));

        let mut fallback = g(&m.graph);
        let mut created = fallback.start();
        created.out(&["created"]).values(&["name"]);
        let mut none = fallback.start();
        none.constant("none");
        fallback
            .v()
            .has_value("name", P::within(["vadas", "josh"]))
            .coalesce([created, none]);
        assert_eq!(run(&fallback), names(&["none", "lop"]));
    }

    #[test]
    fn test_select_and_project() {
        let m = modern();
        let mut selected = g(&m.graph);
        selected
            .v()
            .has_value("name", P::eq("marko"))
            .as_("m")
            .out(&["created"])
            .as_("c")
            .select(&["m", "c"])
            .unwrap()
            .by_key("name");
        let mut row = IndexMap::new();
        row.insert("m".to_string(), Value::from("marko"));
        row.insert("c".to_string(), Value::from("lop"));
        assert_eq!(run(&selected), vec![Value::Map(row)]);

        let mut projected = g(&m.graph);
        projected
            .v()
            .has_value("name", P::eq("lop"))
            .project(&["name", "age"])
            .unwrap()
            .by_key("name")
            .by_key("age");
        let mut row = IndexMap::new();
        row.insert("name".to_string(), Value::from("lop"));
        row.insert("age".to_string(), Value::Null);
        assert_eq!(run(&projected), vec![Value::Map(row)]);

        let mut missing = g(&m.graph);
        missing.v().select(&["nope"]).unwrap();
        assert!(run(&missing).is_empty());
    }

    #[test]
    fn test_aggregate_visible_to_select() {
        let graph = Graph::in_memory();
        let mut g = g(&graph);
        g.inject([Value::Int(1), Value::Int(2)])
            .aggregate("xs")
            .select(&["xs"])
            .unwrap();
        let both = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(run(&g), vec![both.clone(), both]);
    }

    #[test]
    fn test_side_effect_shadows_step_label() {
        let graph = Graph::in_memory();
        let mut g = g(&graph);
        g.inject([Value::Int(1), Value::Int(2)])
            .as_("x")
            .aggregate("x")
            .select(&["x"])
            .unwrap();
        let both = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(run(&g), vec![both.clone(), both]);
    }

    #[test]
    fn test_add_edge_and_drop() {
        let graph = Graph::in_memory();
        let mut create = g(&graph);
        create
            .add_v_label("a")
            .as_("x")
            .add_v_label("b")
            .add_e("link")
            .from("x");
        let created = run(&create);
        assert_eq!(created.len(), 1);
        assert_eq!(graph.edge_count(), 1);

        let mut endpoints = g(&graph);
        endpoints.e().out_v().label();
        assert_eq!(run(&endpoints), names(&["a"]));

        let mut drop = g(&graph);
        drop.v().has_label(&["a"]).drop();
        assert!(run(&drop).is_empty());
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_dedup_range_and_reductions() {
        let m = modern();
        let mut reachable = g(&m.graph);
        reachable.v().out(&ALL).dedup().count();
        assert_eq!(run(&reachable), vec![Value::Int(3)]);

        let mut window = g(&m.graph);
        window.v().values(&["name"]).range(1, 3);
        assert_eq!(run(&window), names(&["vadas", "josh"]));

        let mut folded = g(&m.graph);
        folded.v().fold().count_in(Scope::Local);
        assert_eq!(run(&folded), vec![Value::Int(4)]);

        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let mut sum = g(&m.graph);
        sum.inject([list.clone()]).unfold().sum();
        assert_eq!(run(&sum), vec![Value::Int(6)]);

        let mut mean = g(&m.graph);
        mean.inject([list]).mean_in(Scope::Local);
        assert_eq!(run(&mean), vec![Value::Float(2.0)]);

        let mut empty = g(&m.graph);
        empty.v().has_label(&["nothing"]).values(&["age"]).max();
        assert!(run(&empty).is_empty());
    }

    #[test]
    fn test_property_requires_element() {
        let graph = Graph::in_memory();
        let mut g = g(&graph);
        g.inject([Value::Int(1)]).property("k", 1);
        let err = g.build().unwrap().to_list().unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }
}
