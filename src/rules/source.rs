use std::collections::BTreeSet;

use crate::reference::MethodReference;
use crate::rules::{Rule, RuleMetadata};

/// Sub-signatures invoked by the platform while deserializing an object graph.
const BUILTIN_SOURCES: &[&str] = &[
    "void readObject(java.io.ObjectInputStream)",
    "java.lang.Object readResolve()",
    "void readExternal(java.io.ObjectInput)",
    "void readObjectNoData()",
    "void finalize()",
    "int hashCode()",
    "boolean equals(java.lang.Object)",
    "int compareTo(java.lang.Object)",
    "java.lang.String toString()",
];

/// Rule that marks deserialization entry points on serializable classes as sources.
pub(crate) struct SourceRule {
    sub_signatures: BTreeSet<String>,
}

impl SourceRule {
    pub(crate) fn new(extra: &[String]) -> Self {
        let mut sub_signatures: BTreeSet<String> =
            BUILTIN_SOURCES.iter().map(|s| s.to_string()).collect();
        sub_signatures.extend(extra.iter().cloned());
        SourceRule { sub_signatures }
    }
}

impl Rule for SourceRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "SOURCE",
            name: "Deserialization source",
            description: "Methods reachable from object deserialization on serializable classes",
        }
    }

    fn apply(&self, method: &mut MethodReference) -> bool {
        if method.is_source
            || method.is_static
            || !method.is_serializable
            || !self.sub_signatures.contains(&method.sub_signature)
        {
            return false;
        }
        method.is_source = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_rule_requires_serializable_class() {
        let rule = SourceRule::new(&[]);
        let signature = "<com.example.Gadget: void readObject(java.io.ObjectInputStream)>";
        let mut plain = MethodReference::phantom(signature);
        let mut serializable = MethodReference::phantom(signature);
        serializable.is_serializable = true;

        assert!(!rule.apply(&mut plain));
        assert!(rule.apply(&mut serializable));
        assert!(serializable.is_source);
    }

    #[test]
    fn configured_sources_extend_builtins() {
        let rule = SourceRule::new(&["java.lang.Object get(java.lang.Object)".to_string()]);
        let mut method =
            MethodReference::phantom("<com.example.LazyMap: java.lang.Object get(java.lang.Object)>");
        method.is_serializable = true;

        assert!(rule.apply(&mut method));
    }
}
