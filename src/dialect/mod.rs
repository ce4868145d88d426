//! Controller languages.
//!
//! A dialect supplies a handler table, a buffer layout, a driver that walks
//! the program's routines, and the assembly of buffers into output files.

pub mod krl;
pub mod rapid;
pub mod urscript;

pub use krl::Krl;
pub use rapid::Rapid;
pub use urscript::UrScript;

use crate::dispatch::{HandlerTable, Recurse, flatten_program};
use crate::emission::{BufferSpec, EmissionState, Emitter};
use crate::error::PostError;
use crate::program::{Motion, PathMotion, Program, Statement};
use std::path::{Path, PathBuf};

/// A generated file, not yet written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: String,
}

/// One manufacturer's controller language.
pub trait Dialect: Sized {
    const MANUFACTURER: &'static str;

    /// Extension of the main program file, without the dot.
    const EXTENSION: &'static str;

    fn handlers(&self) -> &HandlerTable<Self>;

    /// Buffers in finalization order.
    fn layout(&self) -> Vec<BufferSpec>;

    /// Forgets state collected while emitting a previous unit.
    fn reset(&mut self);

    /// Runs pre-passes and emits every routine.
    fn emit_program(&mut self, em: &mut Emitter<'_>) -> Result<(), PostError>;

    /// Assembles the buffers into files next to `target`.
    fn files(&self, state: &EmissionState, target: &Path) -> Vec<OutputFile>;
}

/// `target` with its extension replaced, e.g. `cell/Main.src`.
pub fn sibling(target: &Path, extension: &str) -> PathBuf {
    target.with_extension(extension)
}

/// A file in the same directory as `target`.
pub fn beside(target: &Path, file_name: &str) -> PathBuf {
    match target.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Every motion-bearing statement of the program, for frame pre-passes.
pub fn motion_statements(program: &Program) -> Vec<&Statement> {
    flatten_program(program, Recurse::ALL)
        .into_iter()
        .filter(|s| s.motion_frames().is_some())
        .collect()
}

/// Path points expanded to linear motions named `<statement>_P<n>`.
pub fn path_motions(statement: &Statement, path: &PathMotion) -> Vec<Motion> {
    path.points
        .iter()
        .enumerate()
        .map(|(i, point)| point.to_motion(format!("{}_P{}", statement.name, i + 1), path))
        .collect()
}
