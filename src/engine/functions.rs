//! Named functions applied by `map()`.

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::translation::CustomFunction;
use crate::types::Value;

fn type_error(function: CustomFunction, value: &Value) -> Error {
    Error::Execution(format!(
        "{}() cannot be applied to {} value {}",
        function.name(),
        value.type_name(),
        value
    ))
}

pub fn apply(function: CustomFunction, value: &Value, graph: &Graph) -> Result<Value> {
    match function {
        CustomFunction::ContainerIndex => container_index(value, graph),
        CustomFunction::ToString => to_string(value),
        CustomFunction::ToInteger => to_integer(value),
        CustomFunction::ToFloat => to_float(value),
        CustomFunction::ToBoolean => to_boolean(value),
        CustomFunction::Size => size(value),
    }
}

/// `[container, index]` -> element. Lists take an integer index, negative
/// counting from the end; maps and elements take a string key. Anything
/// out of range or missing is null.
fn container_index(value: &Value, graph: &Graph) -> Result<Value> {
    let (container, index) = match value.as_list() {
        Some([container, index]) => (container, index),
        _ => return Err(type_error(CustomFunction::ContainerIndex, value)),
    };

    match (container, index) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::List(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let position = if *i < 0 { len + i } else { *i };
            if (0..len).contains(&position) {
                Ok(items[position as usize].clone())
            } else {
                Ok(Value::Null)
            }
        }
        (Value::Map(entries), Value::String(key)) => {
            Ok(entries.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Vertex(id), Value::String(key)) => Ok(graph
            .get_vertex(*id)
            .and_then(|v| v.property(key).cloned())
            .unwrap_or(Value::Null)),
        (Value::Edge(id), Value::String(key)) => Ok(graph
            .get_edge(*id)
            .and_then(|e| e.property(key).cloned())
            .unwrap_or(Value::Null)),
        _ => Err(Error::Execution(format!(
            "cannot index {} with {}",
            container.type_name(),
            index.type_name()
        ))),
    }
}

fn to_string(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(_) => Ok(value.clone()),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => Ok(Value::String(value.to_string())),
        other => Err(type_error(CustomFunction::ToString, other)),
    }
}

fn to_integer(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(_) => Ok(value.clone()),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            Ok(s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
                .map(Value::Int)
                .unwrap_or(Value::Null))
        }
        other => Err(type_error(CustomFunction::ToInteger, other)),
    }
}

fn to_float(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Float(_) => Ok(value.clone()),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::String(s) => Ok(s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null)),
        other => Err(type_error(CustomFunction::ToFloat, other)),
    }
}

fn to_boolean(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) => Ok(match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Null,
        }),
        other => Err(type_error(CustomFunction::ToBoolean, other)),
    }
}

fn size(value: &Value) -> Result<Value> {
    let n = match value {
        Value::Null => return Ok(Value::Null),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        Value::String(s) => s.chars().count(),
        other => return Err(type_error(CustomFunction::Size, other)),
    };
    Ok(Value::Int(n as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cardinality;
    use indexmap::IndexMap;

    fn pair(container: Value, index: impl Into<Value>) -> Value {
        Value::List(vec![container, index.into()])
    }

    #[test]
    fn test_container_index_list() {
        let graph = Graph::new();
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let index = |i: i64| container_index(&pair(list.clone(), i), &graph).unwrap();

        assert_eq!(index(1), Value::Int(2));
        assert_eq!(index(-1), Value::Int(3));
        assert_eq!(index(3), Value::Null);
        assert_eq!(index(-4), Value::Null);
        assert!(container_index(&pair(list.clone(), "a"), &graph).is_err());
    }

    #[test]
    fn test_container_index_map_and_element() {
        let graph = Graph::new();
        let mut map = IndexMap::new();
        map.insert("bar".to_string(), Value::Int(2));
        let map = Value::Map(map);

        assert_eq!(container_index(&pair(map.clone(), "bar"), &graph).unwrap(), Value::Int(2));
        assert_eq!(container_index(&pair(map, "baz"), &graph).unwrap(), Value::Null);
        assert_eq!(container_index(&pair(Value::Null, 0), &graph).unwrap(), Value::Null);

        let v = graph.add_vertex("person");
        graph
            .set_vertex_property(v, "name", Value::from("marko"), Cardinality::Single)
            .unwrap();
        assert_eq!(
            container_index(&pair(Value::Vertex(v), "name"), &graph).unwrap(),
            Value::from("marko")
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(to_string(&Value::Int(2)).unwrap(), Value::from("2"));
        assert_eq!(to_string(&Value::Float(2.0)).unwrap(), Value::from("2.0"));
        assert_eq!(to_string(&Value::Null).unwrap(), Value::Null);
        assert_eq!(to_integer(&Value::from("42")).unwrap(), Value::Int(42));
        assert_eq!(to_integer(&Value::from("4.7")).unwrap(), Value::Int(4));
        assert_eq!(to_integer(&Value::from("x")).unwrap(), Value::Null);
        assert_eq!(to_float(&Value::Int(3)).unwrap(), Value::Float(3.0));
        assert_eq!(to_boolean(&Value::from("TRUE")).unwrap(), Value::Bool(true));
        assert_eq!(size(&Value::from("héllo")).unwrap(), Value::Int(5));
        assert!(to_integer(&Value::List(Vec::new())).is_err());
    }
}
