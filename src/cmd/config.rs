//! Configuration view and validation commands, `dexplorer config`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::super::ConfigCommands;
use dexplorer::config::{
    Config, ConfigOverrides, ExplorerToml, find_config_file, local_config_path,
};

/// Best-effort lookup of `[logging] dir` before logging is set up.
pub fn peek_log_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    Config::load(explicit, &ConfigOverrides::default())
        .ok()
        .and_then(|config| config.log_dir)
}

pub fn cmd_config(explicit: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Explorer Configuration");
            println!("======================");
            println!();

            match find_config_file(explicit, &cwd) {
                Some(path) => {
                    println!("Config file: {}", path.display());
                    println!();
                    let explorer = ExplorerToml::load(&path)?;
                    let rendered = toml::to_string_pretty(&explorer)
                        .context("Failed to render configuration")?;
                    println!("{}", rendered.trim_end());
                    println!();
                }
                None => {
                    println!("No explorer.toml found.");
                    println!("Run 'dexplorer config init' to create one.");
                    println!();
                }
            }

            println!("Effective values (with env/CLI overrides):");
            let config = Config::load(explicit, &ConfigOverrides::default())?;
            if config.isolated {
                println!("  workspace = (private temporary directory)");
            } else {
                println!("  workspace = \"{}\"", config.workspace_dir.display());
            }
            match config.stage_timeout {
                Some(timeout) => println!("  stage_timeout = {}s", timeout.as_secs()),
                None => println!("  stage_timeout = none"),
            }
            if let Some(dir) = &config.log_dir {
                println!("  log_dir = \"{}\"", dir.display());
            }
            match config.tool_paths() {
                Ok(tools) => {
                    println!("  kotlinc = \"{}\"", tools.kotlinc.display());
                    println!("  dexdump = \"{}\"", tools.dexdump().display());
                    println!("  d8_jar = \"{}\"", tools.d8_jar.display());
                    println!("  platform_jar = \"{}\"", tools.platform_jar.display());
                    println!("  kotlin_libs = {} entries", tools.kotlin_libs.len());
                    println!("  java = \"{}\"", tools.java.display());
                    println!("  javap = \"{}\"", tools.javap.display());
                    println!("  adb = \"{}\"", tools.adb.display());
                }
                Err(e) => println!("  tools: {:#}", e),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let mut explorer = match find_config_file(explicit, &cwd) {
                Some(path) => ExplorerToml::load(&path)?,
                None => {
                    println!("No explorer.toml found; checking environment only.");
                    ExplorerToml::default()
                }
            };
            explorer.apply_env(|key| std::env::var(key).ok());
            let warnings = explorer.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(|| local_config_path(&cwd));

            if config_path.exists() {
                println!("explorer.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            ExplorerToml::default().save(&config_path)?;

            println!("Created explorer.toml at {}", config_path.display());
            println!();
            println!("You can now set:");
            println!("  - [tools] kotlinc, build_tools, platform_jar, kotlin_libs");
            println!("  - [workspace] dir, isolated");
            println!("  - [run] stage_timeout_secs");
            println!("  - [logging] dir");
            println!();
        }
    }

    Ok(())
}
