//! Pipeline states, their status labels and output channels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-visible text sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    /// `javap` listing, or compiler diagnostics when compilation fails
    Bytecode,
    /// `dexdump` listing, or R8 diagnostics
    Optimized,
    /// `oatdump` listing, or adb/dex2oat diagnostics
    Native,
}

impl OutputChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputChannel::Bytecode => "bytecode",
            OutputChannel::Optimized => "optimized",
            OutputChannel::Native => "native",
        }
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a stage's captured text reaches its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Disassembly stages: the text is the product
    Always,
    /// Producer stages: only diagnostics are interesting
    OnFailure,
}

/// Pipeline states in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Compiling,
    DisassembleBytecode,
    Optimize,
    DisassembleOptimized,
    Push,
    AotCompile,
    DisassembleNative,
    Ready,
}

impl PipelineState {
    /// Every state that runs an external tool, in order.
    pub const STAGES: [PipelineState; 7] = [
        PipelineState::Compiling,
        PipelineState::DisassembleBytecode,
        PipelineState::Optimize,
        PipelineState::DisassembleOptimized,
        PipelineState::Push,
        PipelineState::AotCompile,
        PipelineState::DisassembleNative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Compiling => "compiling",
            PipelineState::DisassembleBytecode => "disassemble_bytecode",
            PipelineState::Optimize => "optimize",
            PipelineState::DisassembleOptimized => "disassemble_optimized",
            PipelineState::Push => "push",
            PipelineState::AotCompile => "aot_compile",
            PipelineState::DisassembleNative => "disassemble_native",
            PipelineState::Ready => "ready",
        }
    }

    /// The state entered after this one succeeds.
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Idle => Some(PipelineState::Compiling),
            PipelineState::Compiling => Some(PipelineState::DisassembleBytecode),
            PipelineState::DisassembleBytecode => Some(PipelineState::Optimize),
            PipelineState::Optimize => Some(PipelineState::DisassembleOptimized),
            PipelineState::DisassembleOptimized => Some(PipelineState::Push),
            PipelineState::Push => Some(PipelineState::AotCompile),
            PipelineState::AotCompile => Some(PipelineState::DisassembleNative),
            PipelineState::DisassembleNative => Some(PipelineState::Ready),
            PipelineState::Ready => None,
        }
    }

    /// Status text shown when the state is entered.
    ///
    /// `AotCompile` has none: the push and the on-device compile are
    /// reported to the user as one step.
    pub fn status_label(&self) -> Option<&'static str> {
        match self {
            PipelineState::Idle | PipelineState::AotCompile => None,
            PipelineState::Compiling => Some("Compiling Kotlin…"),
            PipelineState::DisassembleBytecode => Some("Disassembling bytecode…"),
            PipelineState::Optimize => Some("Optimizing with R8…"),
            PipelineState::DisassembleOptimized => Some("Disassembling DEX…"),
            PipelineState::Push => Some("AOT compilation…"),
            PipelineState::DisassembleNative => Some("Disassembling OAT…"),
            PipelineState::Ready => Some("Ready"),
        }
    }

    pub fn output_channel(&self) -> Option<OutputChannel> {
        match self {
            PipelineState::Idle | PipelineState::Ready => None,
            PipelineState::Compiling | PipelineState::DisassembleBytecode => {
                Some(OutputChannel::Bytecode)
            }
            PipelineState::Optimize | PipelineState::DisassembleOptimized => {
                Some(OutputChannel::Optimized)
            }
            PipelineState::Push | PipelineState::AotCompile | PipelineState::DisassembleNative => {
                Some(OutputChannel::Native)
            }
        }
    }

    pub fn output_policy(&self) -> OutputPolicy {
        match self {
            PipelineState::DisassembleBytecode
            | PipelineState::DisassembleOptimized
            | PipelineState::DisassembleNative => OutputPolicy::Always,
            _ => OutputPolicy::OnFailure,
        }
    }

    /// Whether entering this state runs a tool.
    pub fn runs_tool(&self) -> bool {
        !matches!(self, PipelineState::Idle | PipelineState::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Ready)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
