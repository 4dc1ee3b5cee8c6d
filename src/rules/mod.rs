use crate::config::RulesConfig;
use crate::reference::MethodReference;

pub(crate) mod sink;
pub(crate) mod source;

/// Metadata describing a knowledge rule.
#[derive(Clone, Debug)]
pub(crate) struct RuleMetadata {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
}

/// Rule that tags method nodes from a fixed knowledge base.
pub(crate) trait Rule: Send + Sync {
    fn metadata(&self) -> RuleMetadata;
    /// Tag `method` and report whether anything changed.
    fn apply(&self, method: &mut MethodReference) -> bool;
}

/// Built-in rules extended with the configured entries.
pub(crate) fn knowledge_rules(config: &RulesConfig) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(sink::SinkRule::new(&config.sinks)),
        Box::new(source::SourceRule::new(&config.sources)),
    ]
}

/// Apply every rule to `method`, returning the ids of rules that tagged it.
pub(crate) fn apply_rules(rules: &[Box<dyn Rule>], method: &mut MethodReference) -> Vec<&'static str> {
    let mut matched = Vec::new();
    for rule in rules {
        if rule.apply(method) {
            matched.push(rule.metadata().id);
        }
    }
    matched
}
