//! Traverser: an object in flight plus the history that led to it.

use crate::translation::Labels;
use crate::types::Value;
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub labels: Labels,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Traverser {
    value: Value,
    path: Vec<PathEntry>,
    loops: u32,
}

impl Traverser {
    pub fn new(value: Value) -> Self {
        Self {
            path: vec![PathEntry {
                labels: SmallVec::new(),
                value: value.clone(),
            }],
            value,
            loops: 0,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn path(&self) -> &[PathEntry] {
        &self.path
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub(crate) fn set_loops(&mut self, loops: u32) {
        self.loops = loops;
    }

    pub(crate) fn increment_loops(&mut self) {
        self.loops += 1;
    }

    /// Moves to a new object, extending the path.
    pub fn split(&self, value: Value) -> Self {
        let mut path = self.path.clone();
        path.push(PathEntry {
            labels: SmallVec::new(),
            value: value.clone(),
        });
        Self {
            value,
            path,
            loops: self.loops,
        }
    }

    /// Labels the current object.
    pub fn label(&mut self, label: &str) {
        match self.path.last_mut() {
            Some(entry) if entry.value == self.value => entry.labels.push(label.to_string()),
            _ => {
                let mut labels = Labels::new();
                labels.push(label.to_string());
                self.path.push(PathEntry {
                    labels,
                    value: self.value.clone(),
                });
            }
        }
    }

    /// Most recent object labelled `label` on the path.
    pub fn labelled(&self, label: &str) -> Option<&Value> {
        self.path
            .iter()
            .rev()
            .find(|entry| entry.labels.iter().any(|l| l == label))
            .map(|entry| &entry.value)
    }

    pub fn path_values(&self) -> Vec<Value> {
        self.path.iter().map(|entry| entry.value.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extends_path() {
        let start = Traverser::new(Value::Int(1));
        let next = start.split(Value::Int(2));
        assert_eq!(start.path().len(), 1);
        assert_eq!(next.path_values(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(next.value(), &Value::Int(2));
    }

    #[test]
    fn test_latest_label_wins() {
        let mut t = Traverser::new(Value::from("a"));
        t.label("x");
        let mut t = t.split(Value::from("b"));
        t.label("x");
        t.label("y");
        assert_eq!(t.labelled("x"), Some(&Value::from("b")));
        assert_eq!(t.labelled("y"), Some(&Value::from("b")));
        assert_eq!(t.labelled("z"), None);
    }
}
