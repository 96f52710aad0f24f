use crate::capture::RuleIdentifier;
use crate::model::{Counters, Policy, Ruleset};
use std::collections::HashMap;
use tracing::debug;

/// Exported counters of one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMetrics {
    pub table: String,
    pub chain: String,
    pub policy: Policy,
    /// Traffic that fell through to the default policy
    pub default: Counters,
    /// Rule counters keyed by derived identifier
    pub rules: HashMap<String, Counters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedMetrics {
    pub chains: Vec<ChainMetrics>,
}

impl AggregatedMetrics {
    pub fn chain(&self, table: &str, chain: &str) -> Option<&ChainMetrics> {
        self.chains
            .iter()
            .find(|c| c.table == table && c.chain == chain)
    }

    /// Number of per-identifier series across all chains
    pub fn rule_series(&self) -> usize {
        self.chains.iter().map(|c| c.rules.len()).sum()
    }
}

/// Collapse every chain of `ruleset` into its default-policy counters plus one
/// counter pair per distinct rule identifier.
///
/// Rules the identifier rejects are left out of the per-identifier counters.
pub fn aggregate(ruleset: &Ruleset, identifier: &dyn RuleIdentifier) -> AggregatedMetrics {
    let mut chains = Vec::new();

    for table in ruleset.tables() {
        for chain in table.chains() {
            let mut rules: HashMap<String, Counters> = HashMap::new();

            for rule in &chain.rules {
                let Some(id) = identifier.identify(&rule.body) else {
                    continue;
                };

                if let Some(existing) = rules.get_mut(&*id) {
                    debug!(
                        "Merging counters for {} in chain {}[{}]",
                        id,
                        chain.name,
                        table.name()
                    );
                    existing.add(rule.counters);
                } else {
                    rules.insert(id.into_owned(), rule.counters);
                }
            }

            chains.push(ChainMetrics {
                table: table.name().to_string(),
                chain: chain.name.clone(),
                policy: chain.policy.clone(),
                default: chain.counters,
                rules,
            });
        }
    }

    AggregatedMetrics { chains }
}
