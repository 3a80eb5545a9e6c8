//! Layered configuration for dexplorer.
//!
//! Settings are read from `explorer.toml`, then overridden by environment
//! variables, then by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [tools]
//! kotlinc = "/opt/kotlinc/bin/kotlinc"
//! build_tools = "/opt/android-sdk/build-tools/34.0.0"
//! # defaults to <build_tools>/lib/d8.jar
//! d8_jar = "/opt/android-sdk/build-tools/34.0.0/lib/d8.jar"
//! platform_jar = "/opt/android-sdk/platforms/android-34/android.jar"
//! kotlin_libs = [
//!     "/opt/kotlinc/lib/kotlin-stdlib.jar",
//!     "/opt/kotlinc/lib/annotations-13.0.jar",
//! ]
//! java = "java"
//! javap = "javap"
//! adb = "adb"
//!
//! [workspace]
//! dir = "/tmp/dexplorer"
//! isolated = false
//!
//! [run]
//! stage_timeout_secs = 300
//!
//! [logging]
//! dir = "/tmp/dexplorer/logs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file, looked up in `.dexplorer/` and the user config dir.
pub const CONFIG_FILE_NAME: &str = "explorer.toml";

/// Locations of every external tool the pipeline invokes.
///
/// The pipeline never constructs this itself; it comes from [`Config`] or
/// directly from the embedding caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub kotlinc: PathBuf,
    pub build_tools_dir: PathBuf,
    pub d8_jar: PathBuf,
    pub platform_jar: PathBuf,
    /// Extra `--lib` jars for R8, in the order they are passed.
    pub kotlin_libs: Vec<PathBuf>,
    pub java: PathBuf,
    pub javap: PathBuf,
    pub adb: PathBuf,
}

impl ToolPaths {
    pub fn dexdump(&self) -> PathBuf {
        self.build_tools_dir.join("dexdump")
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default)]
    pub kotlinc: Option<PathBuf>,
    #[serde(default)]
    pub build_tools: Option<PathBuf>,
    #[serde(default)]
    pub d8_jar: Option<PathBuf>,
    #[serde(default)]
    pub platform_jar: Option<PathBuf>,
    #[serde(default)]
    pub kotlin_libs: Vec<PathBuf>,
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default = "default_javap")]
    pub javap: PathBuf,
    #[serde(default = "default_adb")]
    pub adb: PathBuf,
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

fn default_javap() -> PathBuf {
    PathBuf::from("javap")
}

fn default_adb() -> PathBuf {
    PathBuf::from("adb")
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            kotlinc: None,
            build_tools: None,
            d8_jar: None,
            platform_jar: None,
            kotlin_libs: Vec::new(),
            java: default_java(),
            javap: default_javap(),
            adb: default_adb(),
        }
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSection {
    /// Shared run directory (defaults to `<tmp>/dexplorer`)
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Give every run its own temporary directory
    #[serde(default)]
    pub isolated: bool,
}

/// `[run]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    /// Per-stage timeout; unset means wait forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Directory for daily rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// The complete explorer.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplorerToml {
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ExplorerToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse explorer.toml")
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize explorer.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KOTLINC") {
            self.tools.kotlinc = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ANDROID_BUILD_TOOLS") {
            self.tools.build_tools = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("R8_JAR") {
            self.tools.d8_jar = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ANDROID_PLATFORM_JAR") {
            self.tools.platform_jar = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DEXPLORER_WORKSPACE") {
            self.workspace.dir = Some(PathBuf::from(v));
        }
    }

    /// Resolve the `[tools]` section into concrete paths.
    pub fn tool_paths(&self) -> Result<ToolPaths> {
        let tools = &self.tools;
        let kotlinc = tools
            .kotlinc
            .clone()
            .context("tools.kotlinc is not set (explorer.toml or KOTLINC)")?;
        let build_tools_dir = tools
            .build_tools
            .clone()
            .context("tools.build_tools is not set (explorer.toml or ANDROID_BUILD_TOOLS)")?;
        let d8_jar = tools
            .d8_jar
            .clone()
            .unwrap_or_else(|| build_tools_dir.join("lib").join("d8.jar"));
        let platform_jar = tools
            .platform_jar
            .clone()
            .context("tools.platform_jar is not set (explorer.toml or ANDROID_PLATFORM_JAR)")?;

        Ok(ToolPaths {
            kotlinc,
            build_tools_dir,
            d8_jar,
            platform_jar,
            kotlin_libs: tools.kotlin_libs.clone(),
            java: tools.java.clone(),
            javap: tools.javap.clone(),
            adb: tools.adb.clone(),
        })
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let required = [
            ("tools.kotlinc", &self.tools.kotlinc),
            ("tools.build_tools", &self.tools.build_tools),
            ("tools.platform_jar", &self.tools.platform_jar),
        ];
        for (key, value) in required {
            match value {
                None => warnings.push(format!("{} is not set", key)),
                Some(path) if !path.exists() => {
                    warnings.push(format!("{} points to missing path {}", key, path.display()))
                }
                Some(_) => {}
            }
        }

        if let Some(ref jar) = self.tools.d8_jar
            && !jar.exists()
        {
            warnings.push(format!("tools.d8_jar points to missing path {}", jar.display()));
        }

        for lib in &self.tools.kotlin_libs {
            if !lib.exists() {
                warnings.push(format!("tools.kotlin_libs entry {} does not exist", lib.display()));
            }
        }

        if self.run.stage_timeout_secs == Some(0) {
            warnings.push("run.stage_timeout_secs = 0 would fail every stage".to_string());
        }

        if self.workspace.isolated && self.workspace.dir.is_some() {
            warnings.push("workspace.dir is ignored when workspace.isolated = true".to_string());
        }

        warnings
    }
}

/// Project-local config file location, `./.dexplorer/explorer.toml`.
pub fn local_config_path(cwd: &Path) -> PathBuf {
    cwd.join(".dexplorer").join(CONFIG_FILE_NAME)
}

/// Locate the config file: explicit path, then `./.dexplorer/`, then the user config dir.
pub fn find_config_file(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = local_config_path(cwd);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("dexplorer").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

/// CLI-level overrides, highest priority.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub isolated: bool,
    pub stage_timeout_secs: Option<u64>,
}

/// Runtime configuration with every layer applied.
#[derive(Debug, Clone)]
pub struct Config {
    /// File the settings were loaded from, if any
    pub source: Option<PathBuf>,
    pub toml: ExplorerToml,
    pub workspace_dir: PathBuf,
    pub isolated: bool,
    pub stage_timeout: Option<Duration>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load file → environment → CLI overrides.
    pub fn load(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let source = find_config_file(explicit, &cwd);
        let mut toml = match source {
            Some(ref path) => ExplorerToml::load(path)?,
            None => ExplorerToml::default(),
        };
        toml.apply_env(|key| std::env::var(key).ok());

        Ok(Self::from_toml(source, toml, overrides))
    }

    pub fn from_toml(
        source: Option<PathBuf>,
        toml: ExplorerToml,
        overrides: &ConfigOverrides,
    ) -> Self {
        let workspace_dir = overrides
            .workspace
            .clone()
            .or_else(|| toml.workspace.dir.clone())
            .unwrap_or_else(default_workspace_dir);
        // An explicit --workspace wins over isolated mode from the file.
        let isolated = overrides.isolated || (toml.workspace.isolated && overrides.workspace.is_none());
        let stage_timeout = overrides
            .stage_timeout_secs
            .or(toml.run.stage_timeout_secs)
            .map(Duration::from_secs);
        let log_dir = toml.logging.dir.clone();

        Self {
            source,
            toml,
            workspace_dir,
            isolated,
            stage_timeout,
            log_dir,
        }
    }

    pub fn tool_paths(&self) -> Result<ToolPaths> {
        self.toml.tool_paths()
    }
}

pub fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir().join("dexplorer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const FULL: &str = r#"
[tools]
kotlinc = "/opt/kotlinc/bin/kotlinc"
build_tools = "/sdk/build-tools/34.0.0"
platform_jar = "/sdk/platforms/android-34/android.jar"
kotlin_libs = ["/opt/kotlinc/lib/kotlin-stdlib.jar", "/opt/kotlinc/lib/annotations-13.0.jar"]

[workspace]
dir = "/var/tmp/dx"

[run]
stage_timeout_secs = 120
"#;

    #[test]
    fn test_parse_empty() {
        let toml = ExplorerToml::parse("").unwrap();
        assert!(toml.tools.kotlinc.is_none());
        assert_eq!(toml.tools.java, PathBuf::from("java"));
        assert_eq!(toml.tools.javap, PathBuf::from("javap"));
        assert_eq!(toml.tools.adb, PathBuf::from("adb"));
        assert!(!toml.workspace.isolated);
    }

    #[test]
    fn test_tool_paths_from_full_config() {
        let toml = ExplorerToml::parse(FULL).unwrap();
        let tools = toml.tool_paths().unwrap();
        assert_eq!(tools.kotlinc, PathBuf::from("/opt/kotlinc/bin/kotlinc"));
        assert_eq!(
            tools.d8_jar,
            PathBuf::from("/sdk/build-tools/34.0.0/lib/d8.jar"),
            "d8.jar defaults to build-tools/lib"
        );
        assert_eq!(tools.dexdump(), PathBuf::from("/sdk/build-tools/34.0.0/dexdump"));
        assert_eq!(tools.kotlin_libs.len(), 2);
        assert_eq!(
            tools.kotlin_libs[0],
            PathBuf::from("/opt/kotlinc/lib/kotlin-stdlib.jar")
        );
    }

    #[test]
    fn test_tool_paths_missing_compiler_is_error() {
        let toml = ExplorerToml::parse("[tools]\nbuild_tools = \"/bt\"\nplatform_jar = \"/p.jar\"").unwrap();
        let err = toml.tool_paths().unwrap_err();
        assert!(err.to_string().contains("tools.kotlinc"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = ExplorerToml::parse(FULL).unwrap();
        let env: HashMap<&str, &str> = [
            ("KOTLINC", "/env/kotlinc"),
            ("R8_JAR", "/env/r8.jar"),
            ("DEXPLORER_WORKSPACE", "/env/ws"),
        ]
        .into_iter()
        .collect();
        toml.apply_env(|key| env.get(key).map(|v| v.to_string()));

        let tools = toml.tool_paths().unwrap();
        assert_eq!(tools.kotlinc, PathBuf::from("/env/kotlinc"));
        assert_eq!(tools.d8_jar, PathBuf::from("/env/r8.jar"));
        assert_eq!(toml.workspace.dir, Some(PathBuf::from("/env/ws")));
        // Untouched keys keep file values
        assert_eq!(tools.build_tools_dir, PathBuf::from("/sdk/build-tools/34.0.0"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let toml = ExplorerToml::parse(FULL).unwrap();
        let overrides = ConfigOverrides {
            workspace: Some(PathBuf::from("/cli/ws")),
            isolated: false,
            stage_timeout_secs: Some(5),
        };
        let config = Config::from_toml(None, toml, &overrides);
        assert_eq!(config.workspace_dir, PathBuf::from("/cli/ws"));
        assert_eq!(config.stage_timeout, Some(Duration::from_secs(5)));
        assert!(!config.isolated);
    }

    #[test]
    fn test_file_values_used_without_overrides() {
        let toml = ExplorerToml::parse(FULL).unwrap();
        let config = Config::from_toml(None, toml, &ConfigOverrides::default());
        assert_eq!(config.workspace_dir, PathBuf::from("/var/tmp/dx"));
        assert_eq!(config.stage_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_default_has_no_timeout() {
        let config = Config::from_toml(None, ExplorerToml::default(), &ConfigOverrides::default());
        assert!(config.stage_timeout.is_none());
        assert_eq!(config.workspace_dir, default_workspace_dir());
    }

    #[test]
    fn test_validate_reports_missing_fields_and_paths() {
        let warnings = ExplorerToml::default().validate();
        assert!(warnings.iter().any(|w| w.contains("tools.kotlinc is not set")));
        assert!(warnings.iter().any(|w| w.contains("tools.platform_jar is not set")));

        let toml = ExplorerToml::parse(FULL).unwrap();
        let warnings = toml.validate();
        assert!(warnings.iter().any(|w| w.contains("missing path /opt/kotlinc/bin/kotlinc")));
        assert!(warnings.iter().any(|w| w.contains("kotlin-stdlib.jar does not exist")));
    }

    #[test]
    fn test_validate_clean_config() {
        let dir = tempdir().unwrap();
        let file = |name: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, "").unwrap();
            p
        };
        let mut toml = ExplorerToml::default();
        toml.tools.kotlinc = Some(file("kotlinc"));
        toml.tools.build_tools = Some(dir.path().to_path_buf());
        toml.tools.platform_jar = Some(file("android.jar"));
        toml.tools.kotlin_libs = vec![file("kotlin-stdlib.jar")];
        assert!(toml.validate().is_empty(), "{:?}", toml.validate());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".dexplorer").join(CONFIG_FILE_NAME);
        let toml = ExplorerToml::parse(FULL).unwrap();
        toml.save(&path).unwrap();

        let loaded = ExplorerToml::load(&path).unwrap();
        assert_eq!(loaded.tools.kotlin_libs, toml.tools.kotlin_libs);
        assert_eq!(loaded.run.stage_timeout_secs, Some(120));
    }

    #[test]
    fn test_find_config_file_prefers_explicit_then_local() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("custom.toml");
        assert_eq!(
            find_config_file(Some(&explicit), dir.path()),
            Some(explicit.clone())
        );

        let local = dir.path().join(".dexplorer").join(CONFIG_FILE_NAME);
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, "").unwrap();
        assert_eq!(find_config_file(None, dir.path()), Some(local));
    }
}
