//! Typed relationships between class and method nodes.
//!
//! Edges are held apart from node records and keyed by their own fingerprint, so
//! repeated derivation of the same edge always collapses onto one identity.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::action::ActionSet;
use crate::fingerprint::{fingerprint, fingerprint_parts};
use crate::ir::CallKind;
use crate::reference::{ClassReference, MethodReference};

/// Class to superclass. At most one per class; the store rejects a second target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Extend {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) target: String,
}

impl Extend {
    pub(crate) fn new(source: &str, target: &str) -> Self {
        Extend {
            id: fingerprint_parts(&["EXTEND", source, target]),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// One direction of a class/interface link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Interfaces {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) target: String,
}

impl Interfaces {
    fn new(source: &str, target: &str) -> Self {
        Interfaces {
            id: fingerprint_parts(&["INTERFACES", source, target]),
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// Both directions of the link, so traversal works from either endpoint.
    pub(crate) fn pair(class: &str, interface: &str) -> [Interfaces; 2] {
        [
            Interfaces::new(class, interface),
            Interfaces::new(interface, class),
        ]
    }
}

/// Class to declared method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Has {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) target: String,
}

impl Has {
    pub(crate) fn new(class: &str, method: &str) -> Self {
        Has {
            id: fingerprint_parts(&["HAS", class, method]),
            source: class.to_string(),
            target: method.to_string(),
        }
    }
}

/// One call site from caller to callee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Call {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) target: String,
    pub(crate) line_number: i64,
    pub(crate) invoker_type: String,
    pub(crate) polluted_position: Vec<i32>,
    pub(crate) dispatch: CallKind,
}

impl Call {
    pub(crate) fn new(
        caller: &str,
        callee: &str,
        line_number: i64,
        invoker_type: &str,
        polluted_position: Vec<i32>,
        dispatch: CallKind,
    ) -> Self {
        let line = line_number.to_string();
        let positions = polluted_position
            .iter()
            .map(|position| position.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let id = fingerprint_parts(&[
            "CALL",
            caller,
            callee,
            &line,
            invoker_type,
            &positions,
            dispatch.as_str(),
        ]);
        Call {
            id,
            source: caller.to_string(),
            target: callee.to_string(),
            line_number,
            invoker_type: invoker_type.to_string(),
            polluted_position,
            dispatch,
        }
    }
}

/// Method linked to the overridden or implemented counterpart it borrows behavior from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Alias {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) target: String,
}

impl Alias {
    /// Identity ignores direction: `a <-> b` and `b <-> a` are one alias.
    pub(crate) fn new(source: &str, target: &str) -> Self {
        let (low, high) = if source <= target {
            (source, target)
        } else {
            (target, source)
        };
        Alias {
            id: fingerprint_parts(&["ALIAS", low, high]),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Inheritance and interface edges implied by one class record.
pub(crate) fn structural_edges(class: &ClassReference) -> (Option<Extend>, Vec<Interfaces>) {
    let extend = class
        .super_class
        .as_deref()
        .filter(|_| class.has_super_class)
        .map(|super_class| Extend::new(&class.id, &fingerprint(super_class)));
    let interfaces = class
        .interfaces
        .iter()
        .flat_map(|interface| Interfaces::pair(&class.id, &fingerprint(interface)))
        .collect();
    (extend, interfaces)
}

/// Class lookup for walking superclasses and interfaces by name.
pub(crate) struct Hierarchy<'a> {
    classes: &'a BTreeMap<String, ClassReference>,
}

impl<'a> Hierarchy<'a> {
    /// `classes` is keyed by class id.
    pub(crate) fn new(classes: &'a BTreeMap<String, ClassReference>) -> Self {
        Hierarchy { classes }
    }

    fn class(&self, name: &str) -> Option<&'a ClassReference> {
        self.classes.get(&fingerprint(name))
    }

    /// Supertype names nearest first: superclass before interfaces, breadth first.
    pub(crate) fn ancestors(&self, name: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        seen.insert(name.to_string());
        let mut queue = VecDeque::new();
        queue.push_back(name.to_string());
        while let Some(current) = queue.pop_front() {
            let Some(class) = self.class(&current) else {
                continue;
            };
            let parents = class.super_class.iter().chain(class.interfaces.iter());
            for parent in parents {
                if seen.insert(parent.clone()) {
                    order.push(parent.clone());
                    queue.push_back(parent.clone());
                }
            }
        }
        order
    }

    /// Alias edge from each overriding method to the nearest supertype method with
    /// the same sub-signature.
    pub(crate) fn derive_aliases<'m>(
        &self,
        methods: impl IntoIterator<Item = &'m MethodReference>,
    ) -> Vec<Alias> {
        let methods: Vec<&MethodReference> = methods.into_iter().collect();
        let mut declared: BTreeMap<(String, String), &MethodReference> = BTreeMap::new();
        for method in &methods {
            declared.insert(
                (method.classname.clone(), method.sub_signature.clone()),
                *method,
            );
        }

        let mut aliases = Vec::new();
        for method in methods {
            if method.is_static
                || method.sub_signature.is_empty()
                || method.name == "<init>"
                || method.name == "<clinit>"
            {
                continue;
            }
            let nearest = self
                .ancestors(&method.classname)
                .into_iter()
                .find_map(|ancestor| declared.get(&(ancestor, method.sub_signature.clone())));
            if let Some(target) = nearest {
                aliases.push(Alias::new(&method.id, &target.id));
            }
        }
        aliases
    }
}

/// Alias adjacency built once per batch, used to borrow actions for methods whose
/// own summary is not initialized.
pub(crate) struct AliasIndex<'a> {
    next: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> AliasIndex<'a> {
    pub(crate) fn new(aliases: impl IntoIterator<Item = &'a Alias>) -> Self {
        let mut next: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for alias in aliases {
            next.entry(alias.source.as_str())
                .or_default()
                .push(alias.target.as_str());
        }
        Self { next }
    }

    /// Actions of `method_id`, or of the nearest initialized method along its aliases.
    pub(crate) fn resolve<'m>(
        &self,
        method_id: &str,
        methods: &'m BTreeMap<String, MethodReference>,
    ) -> Option<&'m ActionSet> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([method_id]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(method) = methods.get(current) {
                if method.action_initialized {
                    return Some(&method.actions);
                }
            }
            if let Some(targets) = self.next.get(current) {
                queue.extend(targets.iter().copied());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Position;

    fn class(name: &str, super_class: Option<&str>, interfaces: &[&str]) -> ClassReference {
        let mut class = ClassReference::new(name);
        class.super_class = super_class.map(str::to_string);
        class.has_super_class = super_class.is_some();
        class.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        class.has_interfaces = !class.interfaces.is_empty();
        class
    }

    fn method(class: &str, sub_signature: &str) -> MethodReference {
        let name = sub_signature
            .split(' ')
            .nth(1)
            .and_then(|rest| rest.split('(').next())
            .unwrap_or_default();
        let mut method = MethodReference::new(name, Some(format!("<{class}: {sub_signature}>").as_str()));
        method.classname = class.to_string();
        method.sub_signature = sub_signature.to_string();
        method
    }

    fn by_id(classes: Vec<ClassReference>) -> BTreeMap<String, ClassReference> {
        classes.into_iter().map(|c| (c.id.clone(), c)).collect()
    }

    #[test]
    fn class_without_superclass_has_no_extend_edge() {
        let (extend, interfaces) = structural_edges(&class("com.example.Foo", None, &[]));

        assert!(extend.is_none());
        assert!(interfaces.is_empty());
    }

    #[test]
    fn interface_link_is_materialized_both_ways() {
        let foo = class("com.example.Foo", None, &["com.example.Bar"]);
        let bar_id = fingerprint("com.example.Bar");

        let (_, interfaces) = structural_edges(&foo);

        assert_eq!(2, interfaces.len());
        assert_eq!((foo.id.as_str(), bar_id.as_str()), (interfaces[0].source.as_str(), interfaces[0].target.as_str()));
        assert_eq!((bar_id.as_str(), foo.id.as_str()), (interfaces[1].source.as_str(), interfaces[1].target.as_str()));
        assert_ne!(interfaces[0].id, interfaces[1].id);
    }

    #[test]
    fn extend_identity_covers_both_endpoints() {
        let first = Extend::new("a", "b");
        let second = Extend::new("a", "c");

        assert_ne!(first.id, second.id);
        assert_eq!(first.id, Extend::new("a", "b").id);
    }

    #[test]
    fn call_sites_on_different_lines_are_distinct() {
        let first = Call::new("a", "b", 10, "InstanceInvoke", vec![0], CallKind::Virtual);
        let second = Call::new("a", "b", 12, "InstanceInvoke", vec![0], CallKind::Virtual);
        let repeat = Call::new("a", "b", 10, "InstanceInvoke", vec![0], CallKind::Virtual);

        assert_ne!(first.id, second.id);
        assert_eq!(first.id, repeat.id);
    }

    #[test]
    fn alias_identity_ignores_direction() {
        assert_eq!(Alias::new("a", "b").id, Alias::new("b", "a").id);
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let classes = by_id(vec![
            class("c.Child", Some("c.Parent"), &["c.Iface"]),
            class("c.Parent", Some("c.Grand"), &[]),
            class("c.Grand", None, &["java.io.Serializable"]),
        ]);

        let ancestors = Hierarchy::new(&classes).ancestors("c.Child");

        assert_eq!(
            vec!["c.Parent", "c.Iface", "c.Grand", "java.io.Serializable"],
            ancestors
        );
    }

    #[test]
    fn alias_targets_nearest_declaring_ancestor() {
        let classes = by_id(vec![
            class("c.Child", Some("c.Parent"), &[]),
            class("c.Parent", Some("c.Grand"), &[]),
            class("c.Grand", None, &[]),
        ]);
        let child = method("c.Child", "int hashCode()");
        let parent = method("c.Parent", "int hashCode()");
        let grand = method("c.Grand", "int hashCode()");
        let methods = [child.clone(), parent.clone(), grand.clone()];

        let aliases = Hierarchy::new(&classes).derive_aliases(methods.iter());

        assert_eq!(2, aliases.len());
        assert!(aliases.contains(&Alias::new(&child.id, &parent.id)));
        assert!(aliases.contains(&Alias::new(&parent.id, &grand.id)));
    }

    #[test]
    fn alias_index_borrows_from_alias_chain() {
        let child = method("c.Child", "java.lang.Object get(int)");
        let parent = method("c.Parent", "java.lang.Object get(int)");
        let mut grand = method("c.Grand", "java.lang.Object get(int)");
        grand.action_initialized = true;
        grand.actions.insert(Position::Return, Position::This);
        let aliases = vec![
            Alias::new(&child.id, &parent.id),
            Alias::new(&parent.id, &grand.id),
            Alias::new(&grand.id, &child.id),
        ];
        let methods: BTreeMap<String, MethodReference> = [child.clone(), parent, grand]
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let index = AliasIndex::new(&aliases);
        let actions = index.resolve(&child.id, &methods).expect("borrowed actions");

        assert_eq!(Some(&Position::This), actions.get(&Position::Return));
        assert!(index.resolve("unknown", &methods).is_none());
    }
}
