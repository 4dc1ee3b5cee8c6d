use std::collections::BTreeSet;

use tracing::warn;

use crate::action::{ActionSet, MethodScope, PollutedPositions};
use crate::config::Config;
use crate::encoding::{Canonical, FieldInfo, ParameterAnnotations, PositionedType};
use crate::error::{ActionError, IntegrityError};
use crate::fingerprint::{fingerprint, random_fingerprint};
use crate::ir::{
    AnnotationDescriptor, ClassDescriptor, Lenient, MethodDescriptor, MethodSignature,
    normalize_type_name,
};

/// Graph node for one class name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ClassReference {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) super_class: Option<String>,
    /// Declaration order.
    pub(crate) interfaces: Vec<String>,
    /// Encoded [`FieldInfo`] tuples.
    pub(crate) fields: BTreeSet<String>,
    /// Encoded [`PositionedType`] tuples.
    pub(crate) annotations: BTreeSet<String>,
    pub(crate) is_phantom: bool,
    pub(crate) is_interface: bool,
    pub(crate) has_super_class: bool,
    pub(crate) has_interfaces: bool,
    pub(crate) is_initialized: bool,
    pub(crate) is_serializable: bool,
    pub(crate) has_annotations: bool,
}

impl ClassReference {
    pub(crate) fn new(name: &str) -> Self {
        ClassReference {
            id: fingerprint(name),
            name: name.to_string(),
            super_class: None,
            interfaces: Vec::new(),
            fields: BTreeSet::new(),
            annotations: BTreeSet::new(),
            is_phantom: false,
            is_interface: false,
            has_super_class: false,
            has_interfaces: false,
            is_initialized: false,
            is_serializable: false,
            has_annotations: false,
        }
    }

    /// Placeholder for a class that is referenced but was never supplied.
    pub(crate) fn phantom(name: &str) -> Self {
        let mut class = ClassReference::new(name);
        class.is_phantom = true;
        class
    }

    pub(crate) fn from_descriptor(descriptor: &ClassDescriptor, config: &Config) -> Self {
        let mut class = ClassReference::new(&normalize_type_name(&descriptor.name));
        class.is_phantom = descriptor.is_phantom;
        class.is_interface = descriptor.is_interface;

        for (index, field) in descriptor.fields.iter().enumerate() {
            let Lenient(Some(field)) = field else {
                warn!(class = %descriptor.name, index, "skipping unreadable field");
                continue;
            };
            let info = FieldInfo {
                name: field.name.clone(),
                modifiers: field.modifiers,
                type_name: field.type_name.clone(),
            };
            class.fields.insert(info.encode());
        }

        class.annotations = encode_annotations(&descriptor.annotations, &descriptor.name);
        class.has_annotations = !class.annotations.is_empty();

        // Inheritance from the root type is implied and never materialized.
        if let Lenient(Some(super_name)) = &descriptor.super_name {
            let super_name = normalize_type_name(super_name);
            if !super_name.is_empty() && super_name != config.root_type {
                class.has_super_class = true;
                class.super_class = Some(super_name);
            }
        }

        for (index, interface) in descriptor.interfaces.iter().enumerate() {
            let Lenient(Some(interface)) = interface else {
                warn!(class = %descriptor.name, index, "skipping unreadable interface");
                continue;
            };
            let interface = normalize_type_name(interface);
            if !interface.is_empty() && !class.interfaces.contains(&interface) {
                class.interfaces.push(interface);
            }
        }
        class.has_interfaces = !class.interfaces.is_empty();
        class.is_serializable = class.interfaces.contains(&config.serializable_type);
        class.is_initialized = !class.is_phantom;
        class
    }

    /// First immutable attribute that differs from `other`, if any.
    pub(crate) fn check_consistent(&self, other: &ClassReference) -> Result<(), IntegrityError> {
        let conflict = |attribute: &'static str, existing: String, incoming: String| {
            Err(IntegrityError {
                id: self.id.clone(),
                attribute,
                existing,
                incoming,
            })
        };
        if self.name != other.name {
            return conflict("name", self.name.clone(), other.name.clone());
        }
        if self.super_class != other.super_class {
            return conflict(
                "superClass",
                self.super_class.clone().unwrap_or_default(),
                other.super_class.clone().unwrap_or_default(),
            );
        }
        if self.interfaces != other.interfaces {
            return conflict(
                "interfaces",
                self.interfaces.join(","),
                other.interfaces.join(","),
            );
        }
        if self.is_interface != other.is_interface {
            return conflict(
                "isInterface",
                self.is_interface.to_string(),
                other.is_interface.to_string(),
            );
        }
        if self.fields != other.fields {
            return conflict("fields", self.fields.len().to_string(), other.fields.len().to_string());
        }
        Ok(())
    }
}

/// Graph node for one method signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MethodReference {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) signature: Option<String>,
    pub(crate) sub_signature: String,
    pub(crate) classname: String,
    pub(crate) return_type: String,
    pub(crate) modifiers: u32,
    pub(crate) parameter_size: usize,
    pub(crate) method_annotation_size: usize,
    pub(crate) param_annotation_size: usize,
    pub(crate) vul: Option<String>,
    pub(crate) parameters: BTreeSet<String>,
    pub(crate) method_annotations: BTreeSet<String>,
    pub(crate) param_annotations: BTreeSet<String>,
    pub(crate) is_sink: bool,
    pub(crate) is_source: bool,
    pub(crate) is_static: bool,
    pub(crate) is_polluted: bool,
    pub(crate) has_parameters: bool,
    pub(crate) is_initialized: bool,
    pub(crate) action_initialized: bool,
    pub(crate) is_ignore: bool,
    pub(crate) is_serializable: bool,
    pub(crate) has_method_annotations: bool,
    pub(crate) has_param_annotations: bool,
    pub(crate) actions: ActionSet,
    pub(crate) polluted_position: PollutedPositions,
}

impl MethodReference {
    /// A missing or empty signature gets a random id, unique but not stable across runs.
    pub(crate) fn new(name: &str, signature: Option<&str>) -> Self {
        let signature = signature.filter(|signature| !signature.is_empty());
        let id = match signature {
            Some(signature) => fingerprint(signature),
            None => random_fingerprint(),
        };
        MethodReference {
            id,
            name: name.to_string(),
            signature: signature.map(str::to_string),
            sub_signature: String::new(),
            classname: String::new(),
            return_type: String::new(),
            modifiers: 0,
            parameter_size: 0,
            method_annotation_size: 0,
            param_annotation_size: 0,
            vul: None,
            parameters: BTreeSet::new(),
            method_annotations: BTreeSet::new(),
            param_annotations: BTreeSet::new(),
            is_sink: false,
            is_source: false,
            is_static: false,
            is_polluted: false,
            has_parameters: false,
            is_initialized: false,
            action_initialized: false,
            is_ignore: false,
            is_serializable: false,
            has_method_annotations: false,
            has_param_annotations: false,
            actions: ActionSet::default(),
            polluted_position: PollutedPositions::default(),
        }
    }

    /// Method known only from a call target signature.
    pub(crate) fn phantom(signature: &str) -> Self {
        let Some(parsed) = MethodSignature::parse(signature) else {
            return MethodReference::new(signature, Some(signature));
        };
        let mut method = MethodReference::new(&parsed.name, Some(signature));
        method.classname = parsed.class_name.clone();
        method.sub_signature = parsed.sub_signature();
        method.return_type = parsed.return_type.clone();
        method.set_parameters(parsed.parameter_types.iter().map(|t| Some(t.as_str())));
        method
    }

    pub(crate) fn from_descriptor(classname: &str, descriptor: &MethodDescriptor) -> Self {
        let signature = descriptor
            .signature
            .clone()
            .filter(|signature| !signature.is_empty())
            .or_else(|| {
                descriptor
                    .sub_signature
                    .as_ref()
                    .filter(|sub_signature| !sub_signature.is_empty())
                    .map(|sub_signature| format!("<{classname}: {sub_signature}>"))
            });
        let mut method = MethodReference::new(&descriptor.name, signature.as_deref());
        method.classname = classname.to_string();
        method.modifiers = descriptor.modifiers;
        method.is_static = descriptor.is_static;
        method.return_type = descriptor.return_type.0.clone().unwrap_or_default();
        method.sub_signature = descriptor.sub_signature.clone().unwrap_or_else(|| {
            signature
                .as_deref()
                .and_then(MethodSignature::parse)
                .map(|parsed| parsed.sub_signature())
                .unwrap_or_default()
        });

        for (index, parameter) in descriptor.parameter_types.iter().enumerate() {
            if parameter.0.is_none() {
                warn!(method = %descriptor.name, class = classname, index, "skipping unreadable parameter type");
            }
        }
        method.set_parameters(descriptor.parameter_types.iter().map(|t| t.0.as_deref()));

        method.method_annotations = encode_annotations(&descriptor.annotations, &descriptor.name);
        method.method_annotation_size = method.method_annotations.len();
        method.has_method_annotations = !method.method_annotations.is_empty();

        for (position, annotations) in descriptor.parameter_annotations.iter().enumerate() {
            let types: Vec<String> = annotations
                .iter()
                .filter_map(|annotation| annotation.0.as_ref())
                .map(|annotation| normalize_type_name(&annotation.type_name))
                .collect();
            let encoded = ParameterAnnotations { position, types }.encode();
            method.param_annotations.insert(encoded);
        }
        // One entry per parameter, annotated or not.
        method.param_annotation_size = descriptor.parameter_annotations.len();
        method.has_param_annotations = !descriptor.parameter_annotations.is_empty();

        method.is_sink = descriptor.tags.sink;
        method.is_source = descriptor.tags.source;
        method.is_ignore = descriptor.tags.ignore;
        method.vul = descriptor.tags.vul.clone();

        if let Some(actions) = &descriptor.actions {
            method.action_initialized = true;
            for (key, value) in actions {
                if let Err(error) = method.add_action(key, value) {
                    warn!(method = %descriptor.name, class = classname, %error, "skipping action");
                }
            }
        }
        for index in &descriptor.polluted_position {
            if let Err(error) = method.add_polluted_position(*index) {
                warn!(method = %descriptor.name, class = classname, %error, "skipping polluted position");
            }
        }
        method.is_initialized = true;
        method
    }

    fn set_parameters<'a>(&mut self, types: impl Iterator<Item = Option<&'a str>>) {
        let mut count = 0;
        for (position, type_name) in types.enumerate() {
            count += 1;
            if let Some(type_name) = type_name {
                let encoded = PositionedType {
                    position,
                    type_name: type_name.to_string(),
                }
                .encode();
                self.parameters.insert(encoded);
            }
        }
        self.parameter_size = count;
        self.has_parameters = count > 0;
    }

    pub(crate) fn scope(&self) -> MethodScope {
        MethodScope {
            parameter_count: self.parameter_size,
            is_static: self.is_static,
        }
    }

    /// Validate and record one action; the value replaces any earlier one for `key`.
    pub(crate) fn add_action(&mut self, key: &str, value: &str) -> Result<(), ActionError> {
        let scope = self.scope();
        self.actions.insert_text(key, value, scope)
    }

    pub(crate) fn add_polluted_position(&mut self, index: usize) -> Result<(), ActionError> {
        let scope = self.scope();
        self.polluted_position.insert(index, scope)?;
        self.is_polluted = true;
        Ok(())
    }

    /// Fold a newer analysis result for the same id into this record.
    ///
    /// Actions are replaced per key, polluted positions are unioned, and tag
    /// flags take the newer value.
    pub(crate) fn merge_update(&mut self, newer: &MethodReference) {
        self.actions.merge(&newer.actions);
        self.polluted_position.union(&newer.polluted_position);
        self.is_polluted = !self.polluted_position.is_empty();
        self.action_initialized |= newer.action_initialized;
        self.is_sink = newer.is_sink;
        self.is_source = newer.is_source;
        self.is_ignore = newer.is_ignore;
        if newer.vul.is_some() {
            self.vul = newer.vul.clone();
        }
    }

    pub(crate) fn check_consistent(&self, other: &MethodReference) -> Result<(), IntegrityError> {
        let conflict = |attribute: &'static str, existing: &str, incoming: &str| {
            Err(IntegrityError {
                id: self.id.clone(),
                attribute,
                existing: existing.to_string(),
                incoming: incoming.to_string(),
            })
        };
        if self.signature != other.signature {
            return conflict(
                "signature",
                self.signature.as_deref().unwrap_or_default(),
                other.signature.as_deref().unwrap_or_default(),
            );
        }
        if self.classname != other.classname {
            return conflict("classname", &self.classname, &other.classname);
        }
        if self.sub_signature != other.sub_signature {
            return conflict("subSignature", &self.sub_signature, &other.sub_signature);
        }
        if self.modifiers != other.modifiers {
            return conflict(
                "modifiers",
                &self.modifiers.to_string(),
                &other.modifiers.to_string(),
            );
        }
        Ok(())
    }
}

fn encode_annotations(annotations: &[Lenient<AnnotationDescriptor>], owner: &str) -> BTreeSet<String> {
    let mut encoded = BTreeSet::new();
    for (position, annotation) in annotations.iter().enumerate() {
        let Lenient(Some(annotation)) = annotation else {
            warn!(owner, position, "skipping unreadable annotation");
            continue;
        };
        let type_name = normalize_type_name(&annotation.type_name);
        encoded.insert(PositionedType { position, type_name }.encode());
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Position;
    use crate::fingerprint::fingerprint;

    fn class_descriptor(value: serde_json::Value) -> ClassDescriptor {
        serde_json::from_value(value).expect("class descriptor")
    }

    fn method_descriptor(value: serde_json::Value) -> MethodDescriptor {
        serde_json::from_value(value).expect("method descriptor")
    }

    #[test]
    fn root_superclass_is_elided() {
        let descriptor = class_descriptor(serde_json::json!({
            "name": "com.example.Foo",
            "superName": "java.lang.Object"
        }));

        let class = ClassReference::from_descriptor(&descriptor, &Config::default());

        assert_eq!(fingerprint("com.example.Foo"), class.id);
        assert!(!class.has_super_class);
        assert_eq!(None, class.super_class);
        assert!(class.is_initialized);
    }

    #[test]
    fn internal_class_names_share_ids_with_superclass_references() {
        let base = class_descriptor(serde_json::json!({"name": "com/example/Base"}));
        let child = class_descriptor(serde_json::json!({
            "name": "Lcom/example/Child;",
            "superName": "com/example/Base"
        }));

        let base = ClassReference::from_descriptor(&base, &Config::default());
        let child = ClassReference::from_descriptor(&child, &Config::default());

        assert_eq!("com.example.Base", base.name);
        assert_eq!(fingerprint("com.example.Child"), child.id);
        assert_eq!(child.super_class.as_deref().map(fingerprint), Some(base.id));
    }

    #[test]
    fn class_attributes_are_encoded() {
        let descriptor = class_descriptor(serde_json::json!({
            "name": "com.example.Foo",
            "superName": "com/example/Base",
            "interfaces": ["com.example.Bar", "java.io.Serializable", "com.example.Bar"],
            "fields": [{"name": "target", "modifiers": 2, "type": "java.lang.Object"}, {"modifiers": 1}],
            "annotations": [{"type": "Ljavax/annotation/Resource;"}]
        }));

        let class = ClassReference::from_descriptor(&descriptor, &Config::default());

        assert_eq!(Some("com.example.Base".to_string()), class.super_class);
        assert!(class.has_super_class);
        assert_eq!(vec!["com.example.Bar", "java.io.Serializable"], class.interfaces);
        assert!(class.has_interfaces);
        assert!(class.is_serializable);
        assert_eq!(1, class.fields.len());
        assert!(class.fields.contains(r#"["target","2","java.lang.Object"]"#));
        assert!(class.annotations.contains(r#"[0,"javax.annotation.Resource"]"#));
        assert!(class.has_annotations);
    }

    #[test]
    fn conflicting_class_attributes_are_reported() {
        let mut first = ClassReference::new("com.example.Foo");
        first.super_class = Some("com.example.A".to_string());
        let mut second = ClassReference::new("com.example.Foo");
        second.super_class = Some("com.example.B".to_string());

        let error = first.check_consistent(&second).expect_err("conflict");

        assert_eq!("superClass", error.attribute);
        assert!(first.check_consistent(&first.clone()).is_ok());
    }

    #[test]
    fn method_id_is_signature_fingerprint() {
        let signature = "<com.example.Foo: void run(int)>";

        let method = MethodReference::new("run", Some(signature));

        assert_eq!(fingerprint(signature), method.id);
    }

    #[test]
    fn signature_less_methods_never_collide() {
        let first = MethodReference::new("lambda$0", None);
        let second = MethodReference::new("lambda$0", Some(""));

        assert_ne!(first.id, second.id);
        assert_eq!(None, second.signature);
    }

    #[test]
    fn method_from_descriptor_populates_attributes() {
        let descriptor = method_descriptor(serde_json::json!({
            "name": "transform",
            "signature": "<com.example.Foo: java.lang.Object transform(java.lang.Object,int)>",
            "subSignature": "java.lang.Object transform(java.lang.Object,int)",
            "returnType": "java.lang.Object",
            "modifiers": 1,
            "parameterTypes": ["java.lang.Object", "int"],
            "annotations": [{"type": "java.lang.Override"}],
            "parameterAnnotations": [[{"type": "a/B"}, {"type": "c.D"}], []],
            "actions": {"return": "param-0", "this.cache": "param-9", "bogus": "this"},
            "pollutedPosition": [0, 5],
            "tags": {"sink": true, "vul": "EXEC"}
        }));

        let method = MethodReference::from_descriptor("com.example.Foo", &descriptor);

        assert_eq!(2, method.parameter_size);
        assert!(method.has_parameters);
        assert!(method.parameters.contains(r#"[1,"int"]"#));
        assert_eq!(1, method.method_annotation_size);
        assert!(method.param_annotations.contains(r#"[0,"a.B","c.D"]"#));
        assert!(method.param_annotations.contains("[1]"));
        assert_eq!(2, method.param_annotation_size);
        assert!(method.has_param_annotations);
        assert_eq!(1, method.actions.len());
        assert_eq!(Some(&Position::Param(0)), method.actions.get(&Position::Return));
        assert_eq!(&[0], method.polluted_position.as_slice());
        assert!(method.is_polluted);
        assert!(method.action_initialized);
        assert!(method.is_sink);
        assert_eq!(Some("EXEC".to_string()), method.vul);
    }

    #[test]
    fn method_signature_is_derived_from_sub_signature() {
        let descriptor = method_descriptor(serde_json::json!({
            "name": "run",
            "subSignature": "void run()"
        }));

        let method = MethodReference::from_descriptor("com.example.Foo", &descriptor);

        assert_eq!(Some("<com.example.Foo: void run()>"), method.signature.as_deref());
        assert_eq!(fingerprint("<com.example.Foo: void run()>"), method.id);
    }

    #[test]
    fn phantom_method_is_built_from_signature() {
        let method = MethodReference::phantom("<java.lang.Runtime: java.lang.Process exec(java.lang.String)>");

        assert_eq!("exec", method.name);
        assert_eq!("java.lang.Runtime", method.classname);
        assert_eq!("java.lang.Process exec(java.lang.String)", method.sub_signature);
        assert_eq!(1, method.parameter_size);
        assert!(!method.is_initialized);
    }

    #[test]
    fn merging_update_replaces_actions_and_unions_positions() {
        let signature = "<com.example.Foo: java.lang.Object get(java.lang.Object,int)>";
        let mut stored = MethodReference::phantom(signature);
        stored.add_action("return", "this.field").expect("stored action");
        stored.add_polluted_position(1).expect("stored position");
        let mut newer = MethodReference::phantom(signature);
        newer.add_action("return", "param-0").expect("newer action");
        newer.add_polluted_position(0).expect("newer position");

        stored.merge_update(&newer);

        assert_eq!(1, stored.actions.len());
        assert_eq!(Some(&Position::Param(0)), stored.actions.get(&Position::Return));
        assert_eq!(&[1, 0], stored.polluted_position.as_slice());
    }
}
