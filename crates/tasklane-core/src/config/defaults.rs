//! Default configuration values

use super::types::Config;

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "tasklane.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "tasklane.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".tasklane.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        "tasklane.yml",
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
    ]
}

/// Generate default configuration YAML
pub fn default_config_yaml() -> String {
    let config = Config::default();
    serde_yaml::to_string(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Tasklane Configuration

fail_fast: true
color: auto

shells:
  - name: sh
    default: true

tools:
  workflow:
    - name: ""

tasks:
  workflow:run:
    - name: hello
      matrix:
        os: [linux, darwin]
      steps:
        - run: echo "hello from $MATRIX_OS"
"#;
