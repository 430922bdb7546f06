//! Task reference parsing
//!
//! A task reference names another task to invoke, optionally narrowed by a
//! matrix filter:
//!
//! ```text
//! <tool-kind>{:<tool-name>}:<task-kind>(<task-name>{, <matrix-filter>})
//! ```
//!
//! With only two prefix segments the tool name comes from the caller, which
//! lets a hook target "the sibling tool of the current invocation".

use std::fmt;

use crate::error::{ParseError, Result};
use crate::matrix::MatrixFilter;
use crate::types::{TaskKey, TaskKind, TaskName, ToolKey, ToolKind, ToolName};

/// A parsed task reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReference {
    pub tool_kind: ToolKind,
    pub tool_name: ToolName,
    pub task_kind: TaskKind,
    pub task_name: TaskName,
    pub matrix_filter: MatrixFilter,
}

impl TaskReference {
    pub fn tool_key(&self) -> ToolKey {
        ToolKey {
            kind: self.tool_kind.clone(),
            name: self.tool_name.clone(),
        }
    }

    pub fn task_key(&self) -> TaskKey {
        TaskKey {
            kind: self.task_kind.clone(),
            name: self.task_name.clone(),
        }
    }
}

impl fmt::Display for TaskReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}({}",
            self.tool_kind, self.tool_name, self.task_kind, self.task_name
        )?;
        if !self.matrix_filter.is_empty() {
            write!(f, ", {}", self.matrix_filter.to_flow_yaml())?;
        }
        f.write_str(")")
    }
}

/// Parse a task reference, using `default_tool_name` when the reference has
/// no tool name segment
pub fn parse_task_reference(input: &str, default_tool_name: &str) -> Result<TaskReference> {
    let trimmed = input.trim();

    let open = find_unescaped(trimmed, '(')
        .ok_or_else(|| ParseError::MissingTaskCall(input.to_string()))?;

    let prefix = &trimmed[..open];
    let segments: Vec<&str> = prefix.split(':').map(str::trim).collect();
    let (tool_kind, tool_name, task_kind) = match segments.as_slice() {
        [kind, task_kind] => (*kind, default_tool_name, *task_kind),
        [kind, name, task_kind] => (*kind, *name, *task_kind),
        _ => {
            return Err(ParseError::InvalidPrefix {
                input: input.to_string(),
                segments: segments.len(),
            }
            .into())
        }
    };
    if tool_kind.is_empty() || task_kind.is_empty() {
        return Err(ParseError::InvalidPrefix {
            input: input.to_string(),
            segments: segments.len(),
        }
        .into());
    }

    let body_start = open + 1;
    let close = find_matching_close(&trimmed[body_start..])
        .map(|offset| body_start + offset)
        .ok_or_else(|| ParseError::UnbalancedParens(input.to_string()))?;

    if !trimmed[close + 1..].trim().is_empty() {
        return Err(ParseError::UnbalancedParens(input.to_string()).into());
    }

    let body = &trimmed[body_start..close];
    let (name, filter) = match body.split_once(',') {
        Some((name, filter)) => (name.trim(), Some(filter)),
        None => (body.trim(), None),
    };
    if name.is_empty() {
        return Err(ParseError::MissingTaskName(input.to_string()).into());
    }

    let matrix_filter = match filter {
        Some(filter) => MatrixFilter::from_yaml(filter)?,
        None => MatrixFilter::new(),
    };

    Ok(TaskReference {
        tool_kind: tool_kind.into(),
        tool_name: tool_name.into(),
        task_kind: task_kind.into(),
        task_name: name.into(),
        matrix_filter,
    })
}

/// Byte offset of the first `target` not preceded by a backslash
fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == target {
            return Some(i);
        }
    }
    None
}

/// Offset of the `)` closing an already-opened paren
fn find_matching_close(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_segments_uses_default_tool_name() {
        let r = parse_task_reference("golang:build(app)", "local").unwrap();
        assert_eq!(r.tool_kind.as_str(), "golang");
        assert_eq!(r.tool_name.as_str(), "local");
        assert_eq!(r.task_kind.as_str(), "build");
        assert_eq!(r.task_name.as_str(), "app");
        assert!(r.matrix_filter.is_empty());
    }

    #[test]
    fn test_parse_three_segments_with_filter() {
        let r = parse_task_reference("docker:buildx:build(image, {os: [linux]})", "").unwrap();
        assert_eq!(r.tool_key(), ToolKey::new("docker", "buildx"));
        assert_eq!(r.task_key(), TaskKey::new("build", "image"));
        assert_eq!(r.matrix_filter, MatrixFilter::new().with("os", "linux"));
    }

    #[test]
    fn test_parse_filter_with_commas() {
        let r = parse_task_reference("a:b(n, {os: [linux, darwin], arch: amd64})", "").unwrap();
        assert_eq!(
            r.matrix_filter.allowed("os"),
            Some(&["linux".to_string(), "darwin".to_string()][..])
        );
        assert_eq!(r.matrix_filter.allowed("arch"), Some(&["amd64".to_string()][..]));
    }

    #[test]
    fn test_parse_nested_parens() {
        let r = parse_task_reference("shell:run(echo(1))", "").unwrap();
        assert_eq!(r.task_name.as_str(), "echo(1)");
    }

    #[test]
    fn test_parse_escaped_paren_in_prefix() {
        assert!(matches!(
            parse_task_reference("a:b\\(x", ""),
            Err(crate::TasklaneError::Parse(ParseError::MissingTaskCall(_)))
        ));
    }

    #[test]
    fn test_round_trip() {
        for input in ["k1:k2(n)", "k1:k2:k3(n, {a: [x]})", "golang:local:build(app)"] {
            let parsed = parse_task_reference(input, "dflt").unwrap();
            let again = parse_task_reference(&parsed.to_string(), "other").unwrap();
            assert_eq!(parsed, again, "round trip of {input}");
        }
    }

    #[test]
    fn test_malformed_references_fail() {
        for input in [
            "golang:build",
            "golang:build(app",
            "golang:build(app))",
            "build(app)",
            "a:b:c:d(app)",
            ":build(app)",
            "golang:build()",
            "golang:build(app, [x])",
        ] {
            assert!(
                parse_task_reference(input, "").is_err(),
                "expected {input} to fail"
            );
        }
    }
}
