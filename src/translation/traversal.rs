//! Native target: the program compiled into an executable [`Traversal`]
//! over an in-memory graph.

use super::builder::{Fragment, TranslationBuilder};
use super::bytecode::Bytecode;
use super::step::Program;
use crate::config::EngineConfig;
use crate::engine::Traversal;
use crate::error::Result;
use crate::graph::Graph;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct TraversalBuilder {
    fragment: Fragment,
    graph: Arc<Graph>,
    config: EngineConfig,
}

impl TraversalBuilder {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self::with_config(graph, EngineConfig::default())
    }

    pub fn with_config(graph: Arc<Graph>, config: EngineConfig) -> Self {
        Self {
            fragment: Fragment::root(),
            graph,
            config,
        }
    }

    /// Top-level builder continuing an already decoded program.
    pub fn from_program(program: Program, graph: Arc<Graph>, config: EngineConfig) -> Self {
        Self {
            fragment: Fragment::from_program(program),
            graph,
            config,
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }
}

impl TranslationBuilder for TraversalBuilder {
    type Output = Traversal;

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
            graph: self.graph.clone(),
            config: self.config.clone(),
        }
    }

    fn build(&self) -> Result<Traversal> {
        Traversal::compile(self.current(), self.graph.clone(), self.config.clone())
    }
}

impl fmt::Display for TraversalBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Bytecode::from_program(self.current()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Value;

    #[test]
    fn test_build_is_repeatable() {
        let graph = Graph::in_memory();
        graph.add_vertex("person");
        graph.add_vertex("person");

        let mut g = TraversalBuilder::new(graph);
        g.v().count();
        assert_eq!(g.build().unwrap().to_list().unwrap(), vec![Value::Int(2)]);
        assert_eq!(g.build().unwrap().to_list().unwrap(), vec![Value::Int(2)]);
        assert_eq!(g.to_string(), "[V(), count()]");
    }

    #[test]
    fn test_misplaced_modulator_reported_at_build() {
        let mut g = TraversalBuilder::new(Graph::in_memory());
        let key = g.start();
        g.v().by(key);
        assert!(matches!(g.build(), Err(Error::UnsupportedOperand(_))));
    }

    #[test]
    fn test_from_program_keeps_anchor() {
        let mut g = TraversalBuilder::new(Graph::in_memory());
        g.inject([Value::Int(1), Value::Int(2)]);
        let program = g.into_program();

        let mut resumed =
            TraversalBuilder::from_program(program, Graph::in_memory(), EngineConfig::default());
        resumed.sum();
        assert_eq!(resumed.build().unwrap().to_list().unwrap(), vec![Value::Int(3)]);
    }
}
