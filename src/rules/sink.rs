use crate::config::SinkEntry;
use crate::reference::MethodReference;
use crate::rules::{Rule, RuleMetadata};

/// Built-in `(class, method, vul)` sinks.
const BUILTIN_SINKS: &[(&str, &str, &str)] = &[
    ("java.lang.Runtime", "exec", "EXEC"),
    ("java.lang.ProcessBuilder", "<init>", "EXEC"),
    ("java.lang.ProcessBuilder", "start", "EXEC"),
    ("java.lang.reflect.Method", "invoke", "REFLECTION"),
    ("java.lang.reflect.Constructor", "newInstance", "REFLECTION"),
    ("java.lang.Class", "forName", "CLASSLOADER"),
    ("java.lang.ClassLoader", "loadClass", "CLASSLOADER"),
    ("java.net.URLClassLoader", "newInstance", "CLASSLOADER"),
    ("javax.naming.Context", "lookup", "JNDI"),
    ("javax.naming.InitialContext", "lookup", "JNDI"),
    ("java.io.ObjectInputStream", "readObject", "SERIALIZE"),
    ("java.io.FileOutputStream", "<init>", "FILE"),
    ("java.net.URL", "openConnection", "SSRF"),
];

/// Rule that marks dangerous callees as sinks.
pub(crate) struct SinkRule {
    entries: Vec<(String, String, String)>,
}

impl SinkRule {
    pub(crate) fn new(extra: &[SinkEntry]) -> Self {
        let mut entries: Vec<(String, String, String)> = BUILTIN_SINKS
            .iter()
            .map(|(class, method, vul)| (class.to_string(), method.to_string(), vul.to_string()))
            .collect();
        entries.extend(
            extra
                .iter()
                .map(|entry| (entry.class.clone(), entry.method.clone(), entry.vul.clone())),
        );
        SinkRule { entries }
    }

    fn lookup(&self, class: &str, method: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(owner, name, _)| owner == class && name == method)
            .map(|(_, _, vul)| vul.as_str())
    }
}

impl Rule for SinkRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "SINK",
            name: "Dangerous sink",
            description: "Process execution, reflection, class loading, JNDI and similar calls",
        }
    }

    fn apply(&self, method: &mut MethodReference) -> bool {
        let Some(vul) = self.lookup(&method.classname, &method.name) else {
            return false;
        };
        if method.is_sink && method.vul.as_deref() == Some(vul) {
            return false;
        }
        method.is_sink = true;
        method.vul = Some(vul.to_string());
        true
    }
}
