//! Built-in renderers

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use tasklane_core::{RenderingContext, Renderer, Result};

static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid regex"));

/// Expands `${NAME}` from the rendering environment; unknown names expand to
/// an empty string
#[derive(Debug, Default, Clone)]
pub struct EnvRenderer;

impl Renderer for EnvRenderer {
    fn name(&self) -> &str {
        "env"
    }

    fn render(&self, rc: &RenderingContext, input: &str) -> Result<String> {
        let rendered = VAR_REGEX.replace_all(input, |caps: &Captures<'_>| {
            rc.env(&caps[1]).unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

/// Renderers registered by default
pub fn builtin_renderers() -> Vec<Arc<dyn Renderer>> {
    vec![Arc::new(EnvRenderer)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_renderer() {
        let rc = RenderingContext::new();
        rc.set_env("OS", "linux");
        rc.set_env("ARCH", "amd64");

        let out = EnvRenderer
            .render(&rc, "build-${OS}-${ARCH}-${MISSING}.tar")
            .unwrap();
        assert_eq!(out, "build-linux-amd64-.tar");
    }

    #[test]
    fn test_env_renderer_leaves_other_text() {
        let rc = RenderingContext::new();
        let out = EnvRenderer.render(&rc, "$HOME ${} ${1X}").unwrap();
        assert_eq!(out, "$HOME ${} ${1X}");
    }
}
