//! Alias history: scoping table from caller labels to bound step labels.
//!
//! Every call to [`AliasHistory::next`] mints a fresh underlying name for a
//! label, so a label rebound inside a loop body or a later clause never
//! collides with an earlier binding. Forks are plain clones: a branch sees
//! everything bound before the fork point and nothing bound afterwards in
//! its siblings or its parent.

use indexmap::IndexMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasHistory {
    /// label -> number of times it has been bound in this scope
    bindings: IndexMap<String, u32>,
}

impl AliasHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints and records a new underlying name for `label`.
    pub fn next(&mut self, label: &str) -> String {
        let count = self.bindings.entry(label.to_string()).or_insert(0);
        *count += 1;
        Self::mint(label, *count)
    }

    /// Most recently minted name for `label`, or `label` itself when it was
    /// never bound here (labels coming from outside the translated query).
    pub fn current(&self, label: &str) -> String {
        match self.bindings.get(label) {
            Some(&count) => Self::mint(label, count),
            None => label.to_string(),
        }
    }

    /// Independent copy carrying the current bindings.
    ///
    /// Counters are not shared, so a branch and its parent may both mint the
    /// same name for a label bound after the fork. Once the branch merges
    /// back, a traverser path can carry two entries under that name; lookups
    /// resolve to the most recent one.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn is_bound(&self, label: &str) -> bool {
        self.bindings.contains_key(label)
    }

    // Two spaces cannot appear in a source-level identifier, so rebound
    // names never shadow a caller label.
    fn mint(label: &str, count: u32) -> String {
        if count <= 1 {
            label.to_string()
        } else {
            format!("{}  {}", label, count)
        }
    }
}
