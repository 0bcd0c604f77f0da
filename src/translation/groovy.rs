//! Textual target: a Gremlin-Groovy traversal script.

use super::builder::{Fragment, TranslationBuilder};
use super::bytecode::{Argument, Bytecode, Token};
use super::predicate::P;
use crate::config::ScriptConfig;
use crate::error::{Error, Result};
use crate::types::Value;
use std::fmt;
use tracing::debug;

/// Builder producing a script string.
#[derive(Debug, Clone, Default)]
pub struct GroovyBuilder {
    fragment: Fragment,
    config: ScriptConfig,
}

impl GroovyBuilder {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            fragment: Fragment::root(),
            config,
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }
}

impl TranslationBuilder for GroovyBuilder {
    type Output = String;

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
        Self {
            fragment,
            config: self.config.clone(),
        }
    }

    fn build(&self) -> Result<String> {
        let bytecode = Bytecode::from_program(self.current());
        let script =
            ScriptWriter::new(&self.config).traversal(self.fragment.is_child(), &bytecode)?;
        debug!(steps = self.current().deep_len(), "rendered script");
        Ok(script)
    }
}

impl fmt::Display for GroovyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Bytecode::from_program(self.current()))
    }
}

struct ScriptWriter<'a> {
    config: &'a ScriptConfig,
}

impl<'a> ScriptWriter<'a> {
    fn new(config: &'a ScriptConfig) -> Self {
        Self { config }
    }

    fn traversal(&self, child: bool, bytecode: &Bytecode) -> Result<String> {
        let mut out = if child {
            self.config.anonymous_source.clone()
        } else {
            self.config.traversal_source.clone()
        };
        if child && bytecode.is_empty() {
            out.push_str(".identity()");
        }
        for instruction in &bytecode.instructions {
            let args = instruction
                .arguments
                .iter()
                .map(|arg| self.argument(arg))
                .collect::<Result<Vec<_>>>()?;
            out.push_str(&format!(".{}({})", instruction.operator, args.join(", ")));
        }
        Ok(out)
    }

    fn argument(&self, argument: &Argument) -> Result<String> {
        match argument {
            Argument::Literal(value) => literal(value),
            Argument::Predicate(p) => predicate(p),
            Argument::Bytecode(nested) => self.traversal(true, nested),
            Argument::Token(token) => Ok(token_name(token)),
            Argument::Function(name) => Ok(format!("{}()", name)),
        }
    }
}

fn token_name(token: &Token) -> String {
    match token {
        Token::Scope(s) => format!("Scope.{}", s.as_str()),
        Token::Column(c) => format!("Column.{}", c.as_str()),
        Token::Order(o) => format!("Order.{}", o.as_str()),
        Token::Cardinality(c) => format!("VertexProperty.Cardinality.{}", c.as_str()),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn literal(value: &Value) -> Result<String> {
    let rendered = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "Double.NaN".to_string(),
        Value::Float(f) if f.is_infinite() => {
            if *f > 0.0 {
                "Double.POSITIVE_INFINITY".to_string()
            } else {
                "Double.NEGATIVE_INFINITY".to_string()
            }
        }
        Value::Float(f) => format!("{:?}d", f),
        Value::String(s) => quote(s),
        Value::List(items) => {
            let items = items.iter().map(literal).collect::<Result<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) if entries.is_empty() => "[:]".to_string(),
        Value::Map(entries) => {
            let entries = entries
                .iter()
                .map(|(k, v)| Ok(format!("{}: {}", quote(k), literal(v)?)))
                .collect::<Result<Vec<_>>>()?;
            format!("[{}]", entries.join(", "))
        }
        Value::Vertex(_) | Value::Edge(_) | Value::Property(_) => {
            return Err(Error::UnsupportedOperand(format!(
                "{} literal cannot be written in a script: {}",
                value.type_name(),
                value
            )))
        }
    };
    Ok(rendered)
}

fn predicate(p: &P) -> Result<String> {
    let class = if p.is_text() { "TextP" } else { "P" };
    let rendered = match p {
        P::Eq(v) | P::Neq(v) | P::Lt(v) | P::Lte(v) | P::Gt(v) | P::Gte(v) => {
            format!("{}.{}({})", class, p.name(), literal(v)?)
        }
        P::Inside(a, b) | P::Outside(a, b) | P::Between(a, b) => {
            format!("{}.{}({}, {})", class, p.name(), literal(a)?, literal(b)?)
        }
        P::Within(vs) | P::Without(vs) => {
            let vs = vs.iter().map(literal).collect::<Result<Vec<_>>>()?;
            format!("{}.{}({})", class, p.name(), vs.join(", "))
        }
        P::StartingWith(s) | P::EndingWith(s) | P::Containing(s) => {
            format!("{}.{}({})", class, p.name(), quote(s))
        }
        P::Not(inner) => format!("{}.not({})", class, predicate(inner)?),
        P::And(a, b) | P::Or(a, b) => {
            format!("{}.{}({})", predicate(a)?, p.name(), predicate(b)?)
        }
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::CustomFunction;
    use crate::types::{Cardinality, Column, Order, Scope};
    use indexmap::IndexMap;

    fn builder() -> GroovyBuilder {
        GroovyBuilder::new(ScriptConfig::default())
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut g = builder();
        let mut adult = g.start();
        adult.values(&["age"]).is(P::gte(18));
        g.v().as_("n").where_(adult).select(&["n"]).unwrap();

        let first = g.build().unwrap();
        assert_eq!(first, g.build().unwrap());
        assert_eq!(
            first,
            "g.V().as('n').where(__.values('age').is(P.gte(18))).select('n')"
        );
    }

    #[test]
    fn test_literals() {
        let mut map = IndexMap::new();
        map.insert("it's".to_string(), Value::Float(2.5));
        map.insert("b".to_string(), Value::List(vec![Value::Null, Value::Bool(true)]));

        let mut g = builder();
        g.inject([Value::Map(map), Value::Map(IndexMap::new()), Value::from("a\\b$")]);
        assert_eq!(
            g.build().unwrap(),
            r"g.inject(['it\'s': 2.5d, 'b': [null, true]], [:], 'a\\b\$')"
        );
    }

    #[test]
    fn test_tokens_and_functions() {
        let mut g = builder();
        let mut by = g.start();
        by.values(&["name"]);
        g.v()
            .property_list("tag", vec![Value::from("x")])
            .order_in(Scope::Local)
            .by_order(by, Order::Desc)
            .select_column(Column::Keys)
            .map(CustomFunction::ContainerIndex);
        assert_eq!(
            g.build().unwrap(),
            "g.V().property(VertexProperty.Cardinality.list, 'tag', 'x')\
             .order(Scope.local).by(__.values('name'), Order.desc)\
             .select(Column.keys).map(cypherContainerIndex())"
        );
        assert_eq!(
            token_name(&Token::Cardinality(Cardinality::Single)),
            "VertexProperty.Cardinality.single"
        );
    }

    #[test]
    fn test_predicates() {
        let p = P::gt(1).and(P::lt(5)).or(P::within([7, 8]).negate());
        assert_eq!(
            predicate(&p).unwrap(),
            "P.gt(1).and(P.lt(5)).or(P.not(P.within(7, 8)))"
        );
        assert_eq!(
            predicate(&P::StartingWith("ma".into())).unwrap(),
            "TextP.startingWith('ma')"
        );
        assert_eq!(
            predicate(&P::Containing("o".into()).negate()).unwrap(),
            "P.not(TextP.containing('o'))"
        );
    }

    #[test]
    fn test_nested_sources() {
        let mut g = builder();
        let mut any = g.start();
        any.v();
        let empty = g.start();
        g.inject([Value::Int(1)]).coalesce([any, empty]);
        assert_eq!(
            g.build().unwrap(),
            "g.inject(1).coalesce(__.V(), __.identity())"
        );

        let mut child = g.start();
        child.out(&["knows"]);
        assert_eq!(child.build().unwrap(), "__.out('knows')");
    }

    #[test]
    fn test_custom_sources() {
        let config = ScriptConfig {
            traversal_source: "social".to_string(),
            anonymous_source: "anon".to_string(),
        };
        let mut g = GroovyBuilder::new(config);
        let mut name = g.start();
        name.values(&["name"]);
        g.v().local(name);
        assert_eq!(g.build().unwrap(), "social.V().local(anon.values('name'))");
    }

    #[test]
    fn test_element_literal_is_unsupported() {
        let mut g = builder();
        g.inject([Value::Vertex(crate::graph::VertexId::new(1))]);
        assert!(matches!(g.build(), Err(Error::UnsupportedOperand(_))));
        // the step itself was accepted
        assert_eq!(g.current().len(), 1);
    }
}
