//! Predicates used by `has`, `is`, `where` and `choose` steps.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum P {
    Eq(Value),
    Neq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// low < x < high
    Inside(Value, Value),
    /// x < low || x > high
    Outside(Value, Value),
    /// low <= x < high
    Between(Value, Value),
    Within(Vec<Value>),
    Without(Vec<Value>),
    StartingWith(String),
    EndingWith(String),
    Containing(String),
    Not(Box<P>),
    And(Box<P>, Box<P>),
    Or(Box<P>, Box<P>),
}

impl P {
    pub fn eq(value: impl Into<Value>) -> Self {
        P::Eq(value.into())
    }

    pub fn neq(value: impl Into<Value>) -> Self {
        P::Neq(value.into())
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        P::Lt(value.into())
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        P::Lte(value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        P::Gt(value.into())
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        P::Gte(value.into())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        P::Between(low.into(), high.into())
    }

    pub fn within<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        P::Within(values.into_iter().map(Into::into).collect())
    }

    pub fn without<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        P::Without(values.into_iter().map(Into::into).collect())
    }

    pub fn negate(self) -> Self {
        P::Not(Box::new(self))
    }

    pub fn and(self, other: P) -> Self {
        P::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: P) -> Self {
        P::Or(Box::new(self), Box::new(other))
    }

    /// Operator name in the traversal language.
    pub fn name(&self) -> &'static str {
        match self {
            P::Eq(_) => "eq",
            P::Neq(_) => "neq",
            P::Lt(_) => "lt",
            P::Lte(_) => "lte",
            P::Gt(_) => "gt",
            P::Gte(_) => "gte",
            P::Inside(..) => "inside",
            P::Outside(..) => "outside",
            P::Between(..) => "between",
            P::Within(_) => "within",
            P::Without(_) => "without",
            P::StartingWith(_) => "startingWith",
            P::EndingWith(_) => "endingWith",
            P::Containing(_) => "containing",
            P::Not(_) => "not",
            P::And(..) => "and",
            P::Or(..) => "or",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            P::StartingWith(_) | P::EndingWith(_) | P::Containing(_)
        )
    }

    pub fn test(&self, value: &Value) -> bool {
        let cmp = |other: &Value| value.compare(other);
        match self {
            P::Eq(v) => value.loose_eq(v),
            P::Neq(v) => !value.loose_eq(v),
            P::Lt(v) => cmp(v) == Some(Ordering::Less),
            P::Lte(v) => matches!(cmp(v), Some(Ordering::Less | Ordering::Equal)),
            P::Gt(v) => cmp(v) == Some(Ordering::Greater),
            P::Gte(v) => matches!(cmp(v), Some(Ordering::Greater | Ordering::Equal)),
            P::Inside(low, high) => {
                cmp(low) == Some(Ordering::Greater) && cmp(high) == Some(Ordering::Less)
            }
            P::Outside(low, high) => {
                cmp(low) == Some(Ordering::Less) || cmp(high) == Some(Ordering::Greater)
            }
            P::Between(low, high) => {
                matches!(cmp(low), Some(Ordering::Greater | Ordering::Equal))
                    && cmp(high) == Some(Ordering::Less)
            }
            P::Within(values) => values.iter().any(|v| value.loose_eq(v)),
            P::Without(values) => !values.iter().any(|v| value.loose_eq(v)),
            P::StartingWith(s) => value.as_str().is_some_and(|v| v.starts_with(s.as_str())),
            P::EndingWith(s) => value.as_str().is_some_and(|v| v.ends_with(s.as_str())),
            P::Containing(s) => value.as_str().is_some_and(|v| v.contains(s.as_str())),
            P::Not(p) => !p.test(value),
            P::And(a, b) => a.test(value) && b.test(value),
            P::Or(a, b) => a.test(value) || b.test(value),
        }
    }

    /// Replaces string operands naming a bound label with the labelled value.
    /// Used by `where(P)`, whose operands refer to step labels.
    pub fn resolve_labels<F>(&self, lookup: &F) -> P
    where
        F: Fn(&str) -> Option<Value>,
    {
        let resolve = |v: &Value| match v {
            Value::String(label) => lookup(label).unwrap_or_else(|| v.clone()),
            other => other.clone(),
        };
        match self {
            P::Eq(v) => P::Eq(resolve(v)),
            P::Neq(v) => P::Neq(resolve(v)),
            P::Lt(v) => P::Lt(resolve(v)),
            P::Lte(v) => P::Lte(resolve(v)),
            P::Gt(v) => P::Gt(resolve(v)),
            P::Gte(v) => P::Gte(resolve(v)),
            P::Inside(a, b) => P::Inside(resolve(a), resolve(b)),
            P::Outside(a, b) => P::Outside(resolve(a), resolve(b)),
            P::Between(a, b) => P::Between(resolve(a), resolve(b)),
            P::Within(vs) => P::Within(vs.iter().map(resolve).collect()),
            P::Without(vs) => P::Without(vs.iter().map(resolve).collect()),
            P::Not(p) => P::Not(Box::new(p.resolve_labels(lookup))),
            P::And(a, b) => P::And(
                Box::new(a.resolve_labels(lookup)),
                Box::new(b.resolve_labels(lookup)),
            ),
            P::Or(a, b) => P::Or(
                Box::new(a.resolve_labels(lookup)),
                Box::new(b.resolve_labels(lookup)),
            ),
            text => text.clone(),
        }
    }
}

impl fmt::Display for P {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            P::Eq(v) | P::Neq(v) | P::Lt(v) | P::Lte(v) | P::Gt(v) | P::Gte(v) => {
                write!(f, "{}({})", self.name(), v)
            }
            P::Inside(a, b) | P::Outside(a, b) | P::Between(a, b) => {
                write!(f, "{}({}, {})", self.name(), a, b)
            }
            P::Within(vs) | P::Without(vs) => {
                write!(f, "{}({})", self.name(), Value::List(vs.clone()))
            }
            P::StartingWith(s) | P::EndingWith(s) | P::Containing(s) => {
                write!(f, "{}({})", self.name(), s)
            }
            P::Not(p) => write!(f, "not({})", p),
            P::And(a, b) | P::Or(a, b) => write!(f, "{}({}, {})", self.name(), a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_predicates() {
        assert!(P::eq(2).test(&Value::Float(2.0)));
        assert!(P::gt(1).test(&Value::Int(2)));
        assert!(!P::gt(1).test(&Value::from("2")));
        assert!(P::lte(2).test(&Value::Int(2)));
        assert!(P::between(1, 3).test(&Value::Int(1)));
        assert!(!P::between(1, 3).test(&Value::Int(3)));
        assert!(P::Outside(Value::Int(1), Value::Int(3)).test(&Value::Int(4)));
    }

    #[test]
    fn test_collection_and_text_predicates() {
        assert!(P::within([1, 2, 3]).test(&Value::Int(3)));
        assert!(P::without(["a", "b"]).test(&Value::from("c")));
        assert!(P::StartingWith("ma".into()).test(&Value::from("marko")));
        assert!(!P::Containing("x".into()).test(&Value::Int(1)));
    }

    #[test]
    fn test_connectives() {
        let p = P::gt(1).and(P::lt(5)).or(P::eq(10));
        assert!(p.test(&Value::Int(3)));
        assert!(p.test(&Value::Int(10)));
        assert!(!p.test(&Value::Int(7)));
        assert!(P::eq(1).negate().test(&Value::Int(2)));
    }

    #[test]
    fn test_resolve_labels() {
        let p = P::eq("a").and(P::StartingWith("a".into()));
        let resolved = p.resolve_labels(&|label: &str| {
            (label == "a").then(|| Value::Int(1))
        });
        assert_eq!(resolved, P::eq(1).and(P::StartingWith("a".into())));
    }

    #[test]
    fn test_display() {
        assert_eq!(P::gte(18).to_string(), "gte(18)");
        assert_eq!(P::within([1, 2]).to_string(), "within([1, 2])");
        assert_eq!(
            P::gt(1).and(P::lt(5)).negate().to_string(),
            "not(and(gt(1), lt(5)))"
        );
    }
}
