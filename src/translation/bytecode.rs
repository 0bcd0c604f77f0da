//! Structured target: a flat instruction list with nested instruction lists
//! for sub-program operands.
//!
//! Bytecode is also the interchange form of a program. It serializes to JSON
//! and [`Bytecode::to_program`] decodes it back into steps, which is how the
//! command-line tool reads programs from disk.

use super::builder::{Fragment, TranslationBuilder};
use super::predicate::P;
use super::step::{CustomFunction, Labels, Program, Step};
use crate::error::{Error, Result};
use crate::types::{Cardinality, Column, Order, Scope, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumeration constants that travel as arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Token {
    Scope(Scope),
    Column(Column),
    Order(Order),
    Cardinality(Cardinality),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Token::Scope(s) => s.as_str(),
            Token::Column(c) => c.as_str(),
            Token::Order(o) => o.as_str(),
            Token::Cardinality(c) => c.as_str(),
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Argument {
    Literal(Value),
    Predicate(P),
    Bytecode(Bytecode),
    Token(Token),
    Function(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Literal(v) => write!(f, "{}", v),
            Argument::Predicate(p) => write!(f, "{}", p),
            Argument::Bytecode(b) => write!(f, "{}", b),
            Argument::Token(t) => write!(f, "{}", t),
            Argument::Function(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub operator: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

impl Instruction {
    pub fn new(operator: &str, arguments: Vec<Argument>) -> Self {
        Self {
            operator: operator.to_string(),
            arguments,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operator)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
}

fn literal(value: impl Into<Value>) -> Argument {
    Argument::Literal(value.into())
}

fn strings(items: &Labels) -> Vec<Argument> {
    items.iter().map(|s| literal(s.as_str())).collect()
}

fn nested(program: &Program) -> Argument {
    Argument::Bytecode(Bytecode::from_program(program))
}

fn scoped(scope: Scope) -> Vec<Argument> {
    match scope {
        Scope::Global => Vec::new(),
        Scope::Local => vec![Argument::Token(Token::Scope(Scope::Local))],
    }
}

fn count_arg(n: u64) -> Argument {
    literal(i64::try_from(n).unwrap_or(i64::MAX))
}

fn encode(step: &Step) -> Instruction {
    let args = match step {
        Step::V { .. } | Step::E { .. } => Vec::new(),
        Step::Inject(values) => values.iter().cloned().map(Argument::Literal).collect(),
        Step::AddV { label, .. } => label.iter().map(|l| literal(l.as_str())).collect(),
        Step::AddE(label)
        | Step::Has(label)
        | Step::HasNot(label)
        | Step::Aggregate(label)
        | Step::As(label)
        | Step::From(label)
        | Step::To(label) => vec![literal(label.as_str())],
        Step::Out(ls)
        | Step::In(ls)
        | Step::Both(ls)
        | Step::OutE(ls)
        | Step::InE(ls)
        | Step::BothE(ls)
        | Step::Properties(ls)
        | Step::Values(ls)
        | Step::HasKey(ls)
        | Step::HasLabel(ls)
        | Step::Select(ls)
        | Step::Project(ls) => strings(ls),
        Step::Constant(v) => vec![Argument::Literal(v.clone())],
        Step::Map(function) => vec![Argument::Function(function.name().to_string())],
        Step::HasValue(key, p) => vec![literal(key.as_str()), Argument::Predicate(p.clone())],
        Step::Is(p) | Step::WhereP(p) => vec![Argument::Predicate(p.clone())],
        Step::Where(p)
        | Step::Not(p)
        | Step::Repeat(p)
        | Step::Until(p)
        | Step::SideEffect(p)
        | Step::Local(p)
        | Step::Optional(p) => vec![nested(p)],
        Step::Range(low, high) => vec![count_arg(*low), count_arg(*high)],
        Step::Limit(n) | Step::Skip(n) => vec![count_arg(*n)],
        Step::Times(n) => vec![literal(i64::from(*n))],
        Step::And(ps) | Step::Or(ps) | Step::Coalesce(ps) | Step::Union(ps) => {
            ps.iter().map(nested).collect()
        }
        Step::ChooseTraversal {
            condition,
            then,
            otherwise,
        } => vec![nested(condition), nested(then), nested(otherwise)],
        Step::ChooseP {
            predicate,
            then,
            otherwise,
        } => {
            let mut args = vec![Argument::Predicate(predicate.clone()), nested(then)];
            args.extend(otherwise.as_ref().map(nested));
            args
        }
        Step::By { traversal, order } => {
            let mut args = vec![nested(traversal)];
            args.extend(order.map(|o| Argument::Token(Token::Order(o))));
            args
        }
        Step::ByKey { key, order } => {
            let mut args = vec![literal(key.as_str())];
            args.extend(order.map(|o| Argument::Token(Token::Order(o))));
            args
        }
        Step::Count(s) | Step::Sum(s) | Step::Min(s) | Step::Max(s) | Step::Mean(s) | Step::Order(s) => {
            scoped(*s)
        }
        Step::SelectColumn(c) => vec![Argument::Token(Token::Column(*c))],
        Step::Property {
            cardinality,
            key,
            value,
        } => {
            let mut args = Vec::with_capacity(3);
            if *cardinality == Cardinality::List {
                args.push(Argument::Token(Token::Cardinality(Cardinality::List)));
            }
            args.push(literal(key.as_str()));
            args.push(Argument::Literal(value.clone()));
            args
        }
        Step::OutV
        | Step::InV
        | Step::OtherV
        | Step::BothV
        | Step::Unfold
        | Step::Path
        | Step::ValueMap
        | Step::Id
        | Step::Label
        | Step::Key
        | Step::Value
        | Step::Dedup
        | Step::Emit
        | Step::Fold
        | Step::Group
        | Step::Barrier
        | Step::Drop => Vec::new(),
    };
    Instruction::new(step.operator(), args)
}

// ==================== decoding ====================

fn malformed(instruction: &Instruction) -> Error {
    Error::UnsupportedOperand(format!("malformed instruction: {}", instruction))
}

struct Args<'a> {
    instruction: &'a Instruction,
}

impl<'a> Args<'a> {
    fn all(&self) -> &'a [Argument] {
        &self.instruction.arguments
    }

    fn get(&self, index: usize) -> Result<&'a Argument> {
        self.all().get(index).ok_or_else(|| malformed(self.instruction))
    }

    fn none(&self) -> Result<()> {
        if self.all().is_empty() {
            Ok(())
        } else {
            Err(malformed(self.instruction))
        }
    }

    fn string_at(&self, index: usize) -> Result<String> {
        match self.get(index)? {
            Argument::Literal(Value::String(s)) => Ok(s.clone()),
            _ => Err(malformed(self.instruction)),
        }
    }

    fn string(&self) -> Result<String> {
        if self.all().len() != 1 {
            return Err(malformed(self.instruction));
        }
        self.string_at(0)
    }

    fn strings(&self) -> Result<Labels> {
        (0..self.all().len()).map(|i| self.string_at(i)).collect()
    }

    fn count_at(&self, index: usize) -> Result<u64> {
        match self.get(index)? {
            Argument::Literal(Value::Int(n)) if *n >= 0 => Ok(*n as u64),
            _ => Err(malformed(self.instruction)),
        }
    }

    fn predicate_at(&self, index: usize) -> Result<P> {
        match self.get(index)? {
            Argument::Predicate(p) => Ok(p.clone()),
            _ => Err(malformed(self.instruction)),
        }
    }

    fn program_at(&self, index: usize) -> Result<Program> {
        match self.get(index)? {
            Argument::Bytecode(b) => b.decode(false),
            _ => Err(malformed(self.instruction)),
        }
    }

    fn program(&self) -> Result<Program> {
        if self.all().len() != 1 {
            return Err(malformed(self.instruction));
        }
        self.program_at(0)
    }

    fn programs(&self) -> Result<Vec<Program>> {
        (0..self.all().len()).map(|i| self.program_at(i)).collect()
    }

    fn scope(&self) -> Result<Scope> {
        match self.all() {
            [] => Ok(Scope::Global),
            [Argument::Token(Token::Scope(s))] => Ok(*s),
            _ => Err(malformed(self.instruction)),
        }
    }

    fn order_at(&self, index: usize) -> Result<Option<Order>> {
        match self.all().get(index) {
            None => Ok(None),
            Some(Argument::Token(Token::Order(o))) if self.all().len() == index + 1 => Ok(Some(*o)),
            Some(_) => Err(malformed(self.instruction)),
        }
    }
}

fn decode(instruction: &Instruction, anchor: bool) -> Result<Step> {
    let args = Args { instruction };
    let step = match instruction.operator.as_str() {
        "V" => {
            args.none()?;
            Step::V { start: anchor }
        }
        "E" => {
            args.none()?;
            Step::E { start: anchor }
        }
        "inject" => Step::Inject(
            args.all()
                .iter()
                .map(|a| match a {
                    Argument::Literal(v) => Ok(v.clone()),
                    _ => Err(malformed(instruction)),
                })
                .collect::<Result<_>>()?,
        ),
        "addV" => {
            let label = match args.all().len() {
                0 => None,
                _ => Some(args.string()?),
            };
            Step::AddV {
                label,
                start: anchor,
            }
        }
        "addE" => Step::AddE(args.string()?),
        "out" => Step::Out(args.strings()?),
        "in" => Step::In(args.strings()?),
        "both" => Step::Both(args.strings()?),
        "outE" => Step::OutE(args.strings()?),
        "inE" => Step::InE(args.strings()?),
        "bothE" => Step::BothE(args.strings()?),
        "properties" => Step::Properties(args.strings()?),
        "values" => Step::Values(args.strings()?),
        "hasKey" => Step::HasKey(args.strings()?),
        "hasLabel" => Step::HasLabel(args.strings()?),
        "project" => Step::Project(args.strings()?),
        "constant" => match args.all() {
            [Argument::Literal(v)] => Step::Constant(v.clone()),
            _ => return Err(malformed(instruction)),
        },
        "map" => match args.all() {
            [Argument::Function(name)] => {
                Step::Map(CustomFunction::from_name(name).ok_or_else(|| {
                    Error::UnsupportedOperand(format!("unknown function: {}", name))
                })?)
            }
            _ => return Err(malformed(instruction)),
        },
        "has" => match args.all().len() {
            1 => Step::Has(args.string_at(0)?),
            2 => Step::HasValue(args.string_at(0)?, args.predicate_at(1)?),
            _ => return Err(malformed(instruction)),
        },
        "hasNot" => Step::HasNot(args.string()?),
        "is" => Step::Is(args.predicate_at(0)?),
        "where" => match args.all() {
            [Argument::Predicate(p)] => Step::WhereP(p.clone()),
            _ => Step::Where(args.program()?),
        },
        "dedup" => {
            args.none()?;
            Step::Dedup
        }
        "range" => Step::Range(args.count_at(0)?, args.count_at(1)?),
        "limit" => Step::Limit(args.count_at(0)?),
        "skip" => Step::Skip(args.count_at(0)?),
        "and" => Step::And(args.programs()?),
        "or" => Step::Or(args.programs()?),
        "coalesce" => Step::Coalesce(args.programs()?),
        "union" => Step::Union(args.programs()?),
        "not" => Step::Not(args.program()?),
        "repeat" => Step::Repeat(args.program()?),
        "until" => Step::Until(args.program()?),
        "sideEffect" => Step::SideEffect(args.program()?),
        "local" => Step::Local(args.program()?),
        "optional" => Step::Optional(args.program()?),
        "choose" => match args.all() {
            [Argument::Predicate(predicate), _] => Step::ChooseP {
                predicate: predicate.clone(),
                then: args.program_at(1)?,
                otherwise: None,
            },
            [Argument::Predicate(predicate), _, _] => Step::ChooseP {
                predicate: predicate.clone(),
                then: args.program_at(1)?,
                otherwise: Some(args.program_at(2)?),
            },
            [_, _, _] => Step::ChooseTraversal {
                condition: args.program_at(0)?,
                then: args.program_at(1)?,
                otherwise: args.program_at(2)?,
            },
            _ => return Err(malformed(instruction)),
        },
        "emit" => {
            args.none()?;
            Step::Emit
        }
        "times" => {
            let n = args.count_at(0)?;
            Step::Times(u32::try_from(n).map_err(|_| malformed(instruction))?)
        }
        "by" => match args.get(0)? {
            Argument::Bytecode(_) => Step::By {
                traversal: args.program_at(0)?,
                order: args.order_at(1)?,
            },
            Argument::Literal(Value::String(key)) => Step::ByKey {
                key: key.clone(),
                order: args.order_at(1)?,
            },
            _ => return Err(malformed(instruction)),
        },
        "from" => Step::From(args.string()?),
        "to" => Step::To(args.string()?),
        "count" => Step::Count(args.scope()?),
        "sum" => Step::Sum(args.scope()?),
        "min" => Step::Min(args.scope()?),
        "max" => Step::Max(args.scope()?),
        "mean" => Step::Mean(args.scope()?),
        "order" => Step::Order(args.scope()?),
        "aggregate" => Step::Aggregate(args.string()?),
        "as" => Step::As(args.string()?),
        "select" => match args.all() {
            [Argument::Token(Token::Column(c))] => Step::SelectColumn(*c),
            [] => return Err(Error::Arity("select step should have arguments".to_string())),
            _ => Step::Select(args.strings()?),
        },
        "property" => match args.all() {
            [Argument::Token(Token::Cardinality(cardinality)), _, Argument::Literal(value)] => {
                Step::Property {
                    cardinality: *cardinality,
                    key: args.string_at(1)?,
                    value: value.clone(),
                }
            }
            [_, Argument::Literal(value)] => Step::Property {
                cardinality: Cardinality::Single,
                key: args.string_at(0)?,
                value: value.clone(),
            },
            _ => return Err(malformed(instruction)),
        },
        operator => {
            let step = match operator {
                "outV" => Step::OutV,
                "inV" => Step::InV,
                "otherV" => Step::OtherV,
                "bothV" => Step::BothV,
                "unfold" => Step::Unfold,
                "path" => Step::Path,
                "valueMap" => Step::ValueMap,
                "id" => Step::Id,
                "label" => Step::Label,
                "key" => Step::Key,
                "value" => Step::Value,
                "fold" => Step::Fold,
                "group" => Step::Group,
                "barrier" => Step::Barrier,
                "drop" => Step::Drop,
                unknown => {
                    return Err(Error::UnsupportedOperand(format!(
                        "unknown operator: {}",
                        unknown
                    )))
                }
            };
            args.none()?;
            step
        }
    };
    Ok(step)
}

impl Bytecode {
    pub fn from_program(program: &Program) -> Self {
        Self {
            instructions: program.iter().map(encode).collect(),
        }
    }

    /// Decodes a top-level program: a leading `V`, `E` or `addV` starts the
    /// traversal.
    pub fn to_program(&self) -> Result<Program> {
        self.decode(true)
    }

    fn decode(&self, root: bool) -> Result<Program> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, instruction)| decode(instruction, root && i == 0))
            .collect::<Result<Vec<_>>>()
            .map(Program::from)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, instruction) in self.instructions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", instruction)?;
        }
        write!(f, "]")
    }
}

/// Builder producing [`Bytecode`].
#[derive(Debug, Clone, Default)]
pub struct BytecodeBuilder {
    fragment: Fragment,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranslationBuilder for BytecodeBuilder {
    type Output = Bytecode;

    fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    fn fragment_mut(&mut self) -> &mut Fragment {
        &mut self.fragment
    }

    fn into_fragment(self) -> Fragment {
        self.fragment
    }

    fn with_fragment(&self, fragment: Fragment) -> Self {
        Self { fragment }
    }

    fn build(&self) -> Result<Bytecode> {
        Ok(Bytecode::from_program(self.current()))
    }
}

impl fmt::Display for BytecodeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Bytecode::from_program(self.current()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::step::labels;

    fn sample() -> BytecodeBuilder {
        let mut g = BytecodeBuilder::new();
        let mut knows = g.start();
        knows.out(&["knows"]);
        let mut name = g.start();
        name.values(&["name"]);
        g.v()
            .has_label(&["person"])
            .as_("a")
            .repeat(knows)
            .times(2)
            .order()
            .by_order(name, Order::Desc)
            .count_in(Scope::Local)
            .property_list("tag", vec![Value::from("x")])
            .map(CustomFunction::ToString);
        g
    }

    #[test]
    fn test_display_format() {
        let g = sample();
        assert_eq!(
            g.to_string(),
            "[V(), hasLabel(person), as(a), repeat([out(knows)]), times(2), order(), \
             by([values(name)], desc), count(local), property(list, tag, x), map(cypherToString)]"
        );
        assert_eq!(g.build().unwrap().len(), 10);
    }

    #[test]
    fn test_decode_restores_program() {
        let g = sample();
        let bytecode = g.build().unwrap();
        assert_eq!(&bytecode.to_program().unwrap(), g.current());
    }

    #[test]
    fn test_json_interchange() {
        let mut g = BytecodeBuilder::new();
        let (then, otherwise) = (g.start(), g.start());
        g.inject([Value::Int(1)])
            .choose_p_else(P::gt(0), then, otherwise)
            .select_column(Column::Keys);
        let json = g.build().unwrap().to_json().unwrap();
        let parsed = Bytecode::from_json(&json).unwrap();
        assert_eq!(&parsed.to_program().unwrap(), g.current());

        let handwritten = r#"[{"operator": "V"}, {"operator": "values", "arguments": [{"literal": {"String": "age"}}]}]"#;
        let program = Bytecode::from_json(handwritten).unwrap().to_program().unwrap();
        assert_eq!(
            program.steps(),
            &[Step::V { start: true }, Step::Values(labels(&["age"]))]
        );
    }

    #[test]
    fn test_nested_source_is_not_anchor() {
        let bytecode = Bytecode {
            instructions: vec![
                Instruction::new("inject", vec![literal(1)]),
                Instruction::new(
                    "union",
                    vec![Argument::Bytecode(Bytecode {
                        instructions: vec![Instruction::new("V", Vec::new())],
                    })],
                ),
            ],
        };
        let program = bytecode.to_program().unwrap();
        assert_eq!(
            program.steps()[1],
            Step::Union(vec![Program::from(vec![Step::V { start: false }])])
        );
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        let unknown = Bytecode {
            instructions: vec![Instruction::new("teleport", Vec::new())],
        };
        assert!(matches!(
            unknown.to_program(),
            Err(Error::UnsupportedOperand(_))
        ));

        let malformed = Bytecode {
            instructions: vec![Instruction::new("limit", vec![literal("ten")])],
        };
        assert!(matches!(
            malformed.to_program(),
            Err(Error::UnsupportedOperand(_))
        ));

        let empty_select = Bytecode {
            instructions: vec![Instruction::new("select", Vec::new())],
        };
        assert!(matches!(empty_select.to_program(), Err(Error::Arity(_))));
    }
}
