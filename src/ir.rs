use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// One descriptor document emitted by the bytecode front-end.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DescriptorDocument {
    pub(crate) classes: Vec<serde_json::Value>,
    pub(crate) calls: Vec<serde_json::Value>,
}

/// Value that falls back to `None` when its JSON shape is unreadable.
///
/// Lets one bad attribute be skipped without rejecting the enclosing descriptor.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Lenient<T>(pub(crate) Option<T>);

impl<T> Default for Lenient<T> {
    fn default() -> Self {
        Lenient(None)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Lenient(serde_json::from_value(value).ok()))
    }
}

/// Class metadata as decoded by the front-end.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClassDescriptor {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) super_name: Lenient<String>,
    #[serde(default)]
    pub(crate) interfaces: Vec<Lenient<String>>,
    #[serde(default)]
    pub(crate) is_interface: bool,
    #[serde(default)]
    pub(crate) is_phantom: bool,
    #[serde(default)]
    pub(crate) fields: Vec<Lenient<FieldDescriptor>>,
    #[serde(default)]
    pub(crate) annotations: Vec<Lenient<AnnotationDescriptor>>,
    #[serde(default)]
    pub(crate) methods: Vec<Lenient<MethodDescriptor>>,
}

/// Field declared by a class.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) modifiers: u32,
    #[serde(rename = "type")]
    pub(crate) type_name: String,
}

/// Annotation attached to a class, method, or parameter. Values are not interpreted.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct AnnotationDescriptor {
    #[serde(rename = "type")]
    pub(crate) type_name: String,
}

/// Method metadata as decoded by the front-end.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct MethodDescriptor {
    pub(crate) name: String,
    pub(crate) signature: Option<String>,
    pub(crate) sub_signature: Option<String>,
    pub(crate) return_type: Lenient<String>,
    pub(crate) modifiers: u32,
    pub(crate) is_static: bool,
    pub(crate) parameter_types: Vec<Lenient<String>>,
    pub(crate) annotations: Vec<Lenient<AnnotationDescriptor>>,
    pub(crate) parameter_annotations: Vec<Vec<Lenient<AnnotationDescriptor>>>,
    pub(crate) tags: MethodTags,
    pub(crate) actions: Option<BTreeMap<String, String>>,
    pub(crate) polluted_position: Vec<usize>,
}

/// Analysis tags the front-end may already know about a method.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct MethodTags {
    pub(crate) sink: bool,
    pub(crate) source: bool,
    pub(crate) ignore: bool,
    pub(crate) vul: Option<String>,
}

/// Call site supplied by the call-graph builder.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CallSiteFact {
    pub(crate) caller: String,
    pub(crate) callee: String,
    #[serde(default)]
    pub(crate) line_number: i64,
    #[serde(default)]
    pub(crate) invoker_type: String,
    pub(crate) dispatch: CallKind,
    #[serde(default)]
    pub(crate) polluted_position: Vec<i32>,
}

/// Resolved dispatch kind of a call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

impl CallKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CallKind::Virtual => "virtual",
            CallKind::Interface => "interface",
            CallKind::Special => "special",
            CallKind::Static => "static",
        }
    }
}

/// Parts of a `<owner: return name(params)>` method signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MethodSignature {
    pub(crate) class_name: String,
    pub(crate) return_type: String,
    pub(crate) name: String,
    pub(crate) parameter_types: Vec<String>,
}

impl MethodSignature {
    pub(crate) fn parse(signature: &str) -> Option<Self> {
        let inner = signature.strip_prefix('<')?.strip_suffix('>')?;
        let (class_name, rest) = inner.split_once(": ")?;
        let (return_type, rest) = rest.split_once(' ')?;
        let open = rest.find('(')?;
        let name = &rest[..open];
        let params = rest[open + 1..].strip_suffix(')')?;
        if class_name.is_empty() || name.is_empty() {
            return None;
        }
        let parameter_types = if params.trim().is_empty() {
            Vec::new()
        } else {
            params.split(',').map(|param| param.trim().to_string()).collect()
        };
        Some(MethodSignature {
            class_name: class_name.to_string(),
            return_type: return_type.to_string(),
            name: name.to_string(),
            parameter_types,
        })
    }

    /// `return name(params)` part, shared by overriding methods.
    pub(crate) fn sub_signature(&self) -> String {
        format!(
            "{} {}({})",
            self.return_type,
            self.name,
            self.parameter_types.join(",")
        )
    }
}

/// Normalize a JVM internal or descriptor-form type name to its dotted form.
pub(crate) fn normalize_type_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(trimmed);
    unwrapped.replace('/', ".")
}
