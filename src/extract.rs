use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::edge::{Alias, AliasIndex, Call, Extend, Has, Hierarchy, Interfaces, structural_edges};
use crate::error::IntegrityError;
use crate::fingerprint::fingerprint;
use crate::ir::{CallSiteFact, ClassDescriptor, Lenient};
use crate::reference::{ClassReference, MethodReference};
use crate::rules::{apply_rules, knowledge_rules};

/// Node and edge records accumulated for one ingestion batch, keyed by id.
#[derive(Clone, Debug, Default)]
pub(crate) struct GraphBatch {
    pub(crate) classes: BTreeMap<String, ClassReference>,
    pub(crate) methods: BTreeMap<String, MethodReference>,
    pub(crate) extends: BTreeMap<String, Extend>,
    pub(crate) interfaces: BTreeMap<String, Interfaces>,
    pub(crate) has: BTreeMap<String, Has>,
    pub(crate) calls: BTreeMap<String, Call>,
    pub(crate) aliases: BTreeMap<String, Alias>,
}

impl GraphBatch {
    /// Add a class; a supplied record replaces a phantom, two supplied records must agree.
    pub(crate) fn insert_class(&mut self, class: ClassReference) -> Result<(), IntegrityError> {
        match self.classes.entry(class.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(class);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.is_phantom && !class.is_phantom {
                    *existing = class;
                } else if !existing.is_phantom && !class.is_phantom {
                    existing.check_consistent(&class)?;
                }
            }
        }
        Ok(())
    }

    /// Add a method; a second analyzed record for the same id is merged into the first.
    pub(crate) fn insert_method(&mut self, method: MethodReference) -> Result<(), IntegrityError> {
        match self.methods.entry(method.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(method);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if !method.is_initialized {
                    return Ok(());
                }
                if existing.is_initialized {
                    existing.check_consistent(&method)?;
                    existing.merge_update(&method);
                } else {
                    *existing = method;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn insert_extend(&mut self, edge: Extend) {
        self.extends.entry(edge.id.clone()).or_insert(edge);
    }

    pub(crate) fn insert_interfaces(&mut self, edge: Interfaces) {
        self.interfaces.entry(edge.id.clone()).or_insert(edge);
    }

    pub(crate) fn insert_has(&mut self, edge: Has) {
        self.has.entry(edge.id.clone()).or_insert(edge);
    }

    pub(crate) fn insert_call(&mut self, edge: Call) {
        self.calls.entry(edge.id.clone()).or_insert(edge);
    }

    pub(crate) fn insert_alias(&mut self, edge: Alias) {
        self.aliases.entry(edge.id.clone()).or_insert(edge);
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.extends.len()
            + self.interfaces.len()
            + self.has.len()
            + self.calls.len()
            + self.aliases.len()
    }

    fn absorb(&mut self, unit: ExtractedClass) -> Result<(), IntegrityError> {
        self.insert_class(unit.class)?;
        for method in unit.methods {
            self.insert_method(method)?;
        }
        if let Some(extend) = unit.extend {
            self.insert_extend(extend);
        }
        for edge in unit.interfaces {
            self.insert_interfaces(edge);
        }
        for edge in unit.has {
            self.insert_has(edge);
        }
        Ok(())
    }
}

/// Shared accumulator that parallel extraction workers append to.
///
/// Units are folded into a [`GraphBatch`] in input order, so merges of repeated
/// records resolve the same way on every run regardless of worker scheduling.
#[derive(Default)]
struct StagingBuffer {
    units: Mutex<Vec<(usize, ExtractedClass)>>,
}

impl StagingBuffer {
    fn append(&self, index: usize, unit: ExtractedClass) {
        // Appends are single pushes, so a poisoned lock still guards a valid vector.
        let mut units = self.units.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        units.push((index, unit));
    }

    fn into_batch(self) -> Result<GraphBatch, IntegrityError> {
        let mut units = self
            .units
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        units.sort_by_key(|(index, _)| *index);
        let mut batch = GraphBatch::default();
        for (_, unit) in units {
            batch.absorb(unit)?;
        }
        Ok(batch)
    }
}

/// Records produced from one class descriptor, independent of every other class.
struct ExtractedClass {
    class: ClassReference,
    methods: Vec<MethodReference>,
    extend: Option<Extend>,
    interfaces: Vec<Interfaces>,
    has: Vec<Has>,
}

fn extract_class(descriptor: &ClassDescriptor, config: &Config) -> ExtractedClass {
    let class = ClassReference::from_descriptor(descriptor, config);
    let mut methods = Vec::with_capacity(descriptor.methods.len());
    for (index, method) in descriptor.methods.iter().enumerate() {
        let Lenient(Some(method)) = method else {
            warn!(class = %descriptor.name, index, "skipping unreadable method");
            continue;
        };
        if method.name.is_empty() {
            warn!(class = %descriptor.name, index, "skipping method without a name");
            continue;
        }
        methods.push(MethodReference::from_descriptor(&class.name, method));
    }
    let (extend, interfaces) = structural_edges(&class);
    let has = methods
        .iter()
        .map(|method| Has::new(&class.id, &method.id))
        .collect();
    debug!(class = %class.name, methods = methods.len(), "extracted class");
    ExtractedClass {
        class,
        methods,
        extend,
        interfaces,
        has,
    }
}

/// Build the graph batch for a set of descriptors and call-site facts.
///
/// Classes are extracted in parallel; the batch is then completed with call edges,
/// phantom endpoints, serializable propagation, knowledge tags and alias edges.
pub(crate) fn extract(
    classes: &[ClassDescriptor],
    calls: &[CallSiteFact],
    config: &Config,
) -> Result<GraphBatch, IntegrityError> {
    let buffer = StagingBuffer::default();
    classes
        .par_iter()
        .enumerate()
        .for_each(|(index, descriptor)| buffer.append(index, extract_class(descriptor, config)));
    let mut batch = buffer.into_batch()?;

    add_calls(&mut batch, calls)?;
    finalize(&mut batch, config)?;

    info!(
        classes = batch.classes.len(),
        methods = batch.methods.len(),
        edges = batch.edge_count(),
        "extraction finished"
    );
    Ok(batch)
}

fn add_calls(batch: &mut GraphBatch, calls: &[CallSiteFact]) -> Result<(), IntegrityError> {
    for fact in calls {
        if fact.caller.is_empty() || fact.callee.is_empty() {
            warn!(caller = %fact.caller, callee = %fact.callee, "skipping call without endpoints");
            continue;
        }
        let caller = fingerprint(&fact.caller);
        let callee = fingerprint(&fact.callee);
        for (id, signature) in [(&caller, &fact.caller), (&callee, &fact.callee)] {
            if !batch.methods.contains_key(id) {
                batch.insert_method(MethodReference::phantom(signature))?;
            }
        }
        batch.insert_call(Call::new(
            &caller,
            &callee,
            fact.line_number,
            &fact.invoker_type,
            fact.polluted_position.clone(),
            fact.dispatch,
        ));
    }
    Ok(())
}

fn finalize(batch: &mut GraphBatch, config: &Config) -> Result<(), IntegrityError> {
    add_phantom_endpoints(batch)?;
    propagate_serializable(batch, config);

    let rules = knowledge_rules(&config.rules);
    for method in batch.methods.values_mut() {
        let matched = apply_rules(&rules, method);
        if !matched.is_empty() {
            debug!(method = %method.name, class = %method.classname, rules = ?matched, "tagged method");
        }
    }

    let aliases = Hierarchy::new(&batch.classes).derive_aliases(batch.methods.values());
    let index = AliasIndex::new(&aliases);
    let borrowed = batch
        .methods
        .values()
        .filter(|method| !method.action_initialized)
        .filter(|method| index.resolve(&method.id, &batch.methods).is_some())
        .count();
    drop(index);
    if borrowed > 0 {
        debug!(methods = borrowed, "methods without a summary resolve actions through aliases");
    }
    for alias in aliases {
        batch.insert_alias(alias);
    }
    Ok(())
}

/// Give every edge endpoint a node: referenced supertypes and the owners of
/// call-target methods become phantom classes.
fn add_phantom_endpoints(batch: &mut GraphBatch) -> Result<(), IntegrityError> {
    let mut referenced: Vec<String> = Vec::new();
    for class in batch.classes.values() {
        referenced.extend(class.super_class.iter().cloned());
        referenced.extend(class.interfaces.iter().cloned());
    }

    let mut orphan_methods = Vec::new();
    for method in batch.methods.values() {
        if method.classname.is_empty() {
            continue;
        }
        let class_id = fingerprint(&method.classname);
        if !batch.has.contains_key(&Has::new(&class_id, &method.id).id) {
            orphan_methods.push((class_id, method.id.clone()));
            referenced.push(method.classname.clone());
        }
    }

    for name in referenced {
        if !batch.classes.contains_key(&fingerprint(&name)) {
            batch.insert_class(ClassReference::phantom(&name))?;
        }
    }
    for (class_id, method_id) in orphan_methods {
        batch.insert_has(Has::new(&class_id, &method_id));
    }
    Ok(())
}

fn propagate_serializable(batch: &mut GraphBatch, config: &Config) {
    let hierarchy = Hierarchy::new(&batch.classes);
    let serializable: Vec<String> = batch
        .classes
        .values()
        .filter(|class| {
            class.is_serializable
                || hierarchy.ancestors(&class.name).iter().any(|ancestor| {
                    *ancestor == config.serializable_type
                        || batch
                            .classes
                            .get(&fingerprint(ancestor))
                            .is_some_and(|class| class.is_serializable)
                })
        })
        .map(|class| class.id.clone())
        .collect();

    for id in &serializable {
        if let Some(class) = batch.classes.get_mut(id) {
            class.is_serializable = true;
        }
    }
    for method in batch.methods.values_mut() {
        let class_id = fingerprint(&method.classname);
        method.is_serializable = batch
            .classes
            .get(&class_id)
            .is_some_and(|class| class.is_serializable);
    }
}
