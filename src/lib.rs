//! Compile a Kotlin snippet and show what it becomes at each layer of the
//! Android toolchain: JVM bytecode, optimized DEX and on-device native code.

pub mod commands;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod process;
pub mod report;
pub mod ui;
pub mod workspace;
