//! Argument vectors for every pipeline stage.
//!
//! Builders are pure over workspace contents and [`ToolPaths`]; the only
//! side effect is [`write_r8_rules`], which the optimize stage needs on disk
//! before R8 starts.

use crate::config::ToolPaths;
use crate::errors::WorkspaceError;
use crate::orchestrator::PipelineState;
use crate::workspace::{
    CLASS_EXTENSION, DEVICE_DEX_PATH, DEVICE_OAT_PATH, DEX_FILE, RULES_FILE, Workspace,
    is_class_file,
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Keep every class but let R8 optimize method bodies.
pub const R8_RULES: &str = "-keep,allowoptimization class * {\n  <methods>;\n}";

const R8_MAIN_CLASS: &str = "com.android.tools.r8.R8";

/// One external invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Names of all `*.class` files directly inside `dir`, sorted ascending.
///
/// Fails instead of returning a short list when the directory cannot be
/// expressed as a pattern or an entry cannot be read.
pub fn list_class_files(dir: &Path) -> Result<Vec<String>, WorkspaceError> {
    let dir_str = dir.to_str().ok_or_else(|| WorkspaceError::NonUtf8Path {
        path: dir.to_path_buf(),
    })?;
    let pattern = format!("{}/*.{}", glob::Pattern::escape(dir_str), CLASS_EXTENSION);
    let paths = glob::glob(&pattern).map_err(|e| WorkspaceError::BadPattern {
        dir: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut names = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| WorkspaceError::ScanFailed {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        if !is_class_file(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub fn compile_command(tools: &ToolPaths, workspace: &Workspace) -> StageCommand {
    StageCommand::new(&tools.kotlinc).arg(workspace.source_path().to_string_lossy())
}

pub fn javap_command(tools: &ToolPaths, class_files: &[String]) -> StageCommand {
    StageCommand::new(&tools.javap)
        .args(["-p", "-l", "-c"])
        .args(class_files.iter().cloned())
}

pub fn r8_command(tools: &ToolPaths, class_files: &[String]) -> StageCommand {
    let mut command = StageCommand::new(&tools.java)
        .arg("-classpath")
        .arg(tools.d8_jar.to_string_lossy())
        .arg(R8_MAIN_CLASS)
        .arg("--release")
        .args(["--pg-conf", RULES_FILE])
        .args(["--output", "."])
        .arg("--lib")
        .arg(tools.platform_jar.to_string_lossy());

    for jar in &tools.kotlin_libs {
        command = command.arg("--lib").arg(jar.to_string_lossy());
    }

    command.args(class_files.iter().cloned())
}

pub fn write_r8_rules(dir: &Path) -> Result<(), WorkspaceError> {
    let path = dir.join(RULES_FILE);
    std::fs::write(&path, R8_RULES).map_err(|source| WorkspaceError::WriteFailed { path, source })
}

pub fn dexdump_command(tools: &ToolPaths) -> StageCommand {
    StageCommand::new(tools.dexdump()).args(["-d", DEX_FILE])
}

pub fn push_command(tools: &ToolPaths) -> StageCommand {
    StageCommand::new(&tools.adb).args(["push", DEX_FILE, DEVICE_DEX_PATH])
}

pub fn dex2oat_command(tools: &ToolPaths) -> StageCommand {
    StageCommand::new(&tools.adb).args([
        "shell".to_string(),
        "dex2oat".to_string(),
        format!("--dex-file={}", DEVICE_DEX_PATH),
        format!("--oat-file={}", DEVICE_OAT_PATH),
    ])
}

pub fn oatdump_command(tools: &ToolPaths) -> StageCommand {
    StageCommand::new(&tools.adb).args([
        "shell".to_string(),
        "oatdump".to_string(),
        format!("--oat-file={}", DEVICE_OAT_PATH),
    ])
}

/// Build the command for `state`, scanning the workspace where needed.
///
/// Returns `None` for `Idle` and `Ready`, which run nothing.
pub fn build_stage_command(
    state: PipelineState,
    workspace: &Workspace,
    tools: &ToolPaths,
) -> Result<Option<StageCommand>, WorkspaceError> {
    let command = match state {
        PipelineState::Idle | PipelineState::Ready => return Ok(None),
        PipelineState::Compiling => compile_command(tools, workspace),
        PipelineState::DisassembleBytecode => {
            javap_command(tools, &list_class_files(workspace.root())?)
        }
        PipelineState::Optimize => {
            write_r8_rules(workspace.root())?;
            r8_command(tools, &list_class_files(workspace.root())?)
        }
        PipelineState::DisassembleOptimized => dexdump_command(tools),
        PipelineState::Push => push_command(tools),
        PipelineState::AotCompile => dex2oat_command(tools),
        PipelineState::DisassembleNative => oatdump_command(tools),
    };
    Ok(Some(command))
}
