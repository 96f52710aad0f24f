use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Packet and byte counters attached to a chain policy or a rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub packets: u64,
    pub bytes: u64,
}

impl Counters {
    pub fn new(packets: u64, bytes: u64) -> Self {
        Self { packets, bytes }
    }

    /// Accumulate another pair into this one
    pub fn add(&mut self, other: Counters) {
        self.packets = self.packets.saturating_add(other.packets);
        self.bytes = self.bytes.saturating_add(other.bytes);
    }

    pub fn packets_f64(&self) -> f64 {
        self.packets as f64
    }

    pub fn bytes_f64(&self) -> f64 {
        self.bytes as f64
    }
}

/// Default policy of a chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Policy {
    Accept,
    Drop,
    Return,
    Queue,
    /// Any other target token, kept verbatim
    Other(String),
    /// User-defined chains carry no policy (`-` in the dump)
    None,
}

impl Policy {
    pub fn from_token(token: &str) -> Self {
        match token {
            "-" => Policy::None,
            "ACCEPT" => Policy::Accept,
            "DROP" => Policy::Drop,
            "RETURN" => Policy::Return,
            "QUEUE" => Policy::Queue,
            other => Policy::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Policy::Accept => "ACCEPT",
            Policy::Drop => "DROP",
            Policy::Return => "RETURN",
            Policy::Queue => "QUEUE",
            Policy::Other(token) => token,
            Policy::None => "-",
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Policy::None)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Policy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single appended rule with its counters stripped from the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub body: String,
    pub counters: Counters,
}

impl Rule {
    pub fn new(body: impl Into<String>, counters: Counters) -> Self {
        Self {
            body: body.into(),
            counters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chain {
    pub name: String,
    pub policy: Policy,
    pub counters: Counters,
    pub rules: Vec<Rule>,
}

impl Chain {
    pub fn new(name: impl Into<String>, policy: Policy, counters: Counters) -> Self {
        Self {
            name: name.into(),
            policy,
            counters,
            rules: vec![],
        }
    }

    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Sum of the counters of every rule in the chain
    pub fn rule_totals(&self) -> Counters {
        let mut total = Counters::default();
        for rule in &self.rules {
            total.add(rule.counters);
        }
        total
    }
}

/// Chains of one table, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    name: String,
    chains: Vec<Chain>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chains: vec![],
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn contains_chain(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.index.get(name).and_then(|&i| self.chains.get(i))
    }

    pub fn chain_mut(&mut self, name: &str) -> Option<&mut Chain> {
        let i = *self.index.get(name)?;
        self.chains.get_mut(i)
    }

    /// Add a chain. Returns false (and leaves the table untouched) if a chain
    /// with the same name already exists.
    pub fn add_chain(&mut self, chain: Chain) -> bool {
        if self.index.contains_key(&chain.name) {
            return false;
        }
        self.index.insert(chain.name.clone(), self.chains.len());
        self.chains.push(chain);
        true
    }

    pub fn rule_count(&self) -> usize {
        self.chains.iter().map(|c| c.rules.len()).sum()
    }
}

/// Full firewall state captured by one scrape, tables in dump order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ruleset {
    tables: Vec<Table>,
}

impl Ruleset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Add a table. Returns false if the name is already taken.
    pub fn add_table(&mut self, table: Table) -> bool {
        if self.contains_table(&table.name) {
            return false;
        }
        self.tables.push(table);
        true
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
