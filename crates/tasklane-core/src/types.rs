//! Tool and task identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_key!(
    /// Kind of a tool (e.g. "golang", "docker", "workflow")
    ToolKind
);
string_key!(
    /// Name of a tool instance; empty means the default tool of its kind
    ToolName
);
string_key!(
    /// Kind of a task (e.g. "build", "run")
    TaskKind
);
string_key!(
    /// Name of a task instance
    TaskName
);

/// Identifies a tool: `<kind>:<name>`
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolKey {
    pub kind: ToolKind,
    pub name: ToolName,
}

impl ToolKey {
    pub fn new(kind: impl Into<ToolKind>, name: impl Into<ToolName>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse a tool key from "kind:name" (or just "kind")
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, name) = s.split_once(':').unwrap_or((s, ""));
        if kind.is_empty() || name.contains(':') {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Identifies a task within its tool: `<kind>:<name>`
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub kind: TaskKind,
    pub name: TaskName,
}

impl TaskKey {
    pub fn new(kind: impl Into<TaskKind>, name: impl Into<TaskName>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse a task key from "kind:name"
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, name) = s.split_once(':')?;
        if kind.is_empty() || name.contains(':') {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_key_display() {
        assert_eq!(ToolKey::new("golang", "").to_string(), "golang:");
        assert_eq!(ToolKey::new("docker", "buildx").to_string(), "docker:buildx");
    }

    #[test]
    fn test_tool_key_parse() {
        assert_eq!(ToolKey::parse("golang"), Some(ToolKey::new("golang", "")));
        assert_eq!(
            ToolKey::parse("docker:buildx"),
            Some(ToolKey::new("docker", "buildx"))
        );
        assert!(ToolKey::parse(":x").is_none());
        assert!(ToolKey::parse("a:b:c").is_none());
    }

    #[test]
    fn test_task_key_parse() {
        let key = TaskKey::parse("build:release").unwrap();
        assert_eq!(key.kind.as_str(), "build");
        assert_eq!(key.name.as_str(), "release");
        assert_eq!(key.to_string(), "build:release");
        assert!(TaskKey::parse("build").is_none());
    }

    #[test]
    fn test_keys_are_map_keys() {
        let mut map = std::collections::HashMap::new();
        map.insert(ToolKey::new("golang", ""), 1);
        assert_eq!(map.get(&ToolKey::new("golang", "")), Some(&1));
        assert_eq!(map.get(&ToolKey::new("golang", "alt")), None);
    }
}
