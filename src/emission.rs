//! Mutable state of one translation pass.
//!
//! An [`EmissionState`] owns the output buffers, the current indentation, the
//! name allocator, the motion-mode cache and the collected diagnostics. It is
//! built at the start of a translation unit and dropped at its end.

use crate::cell::{Cell, Robot};
use crate::config::PostConfig;
use crate::error::{Diagnostic, Severity};
use crate::frame::FrameResolver;
use crate::names::NameAllocator;
use crate::program::{Program, Routine, Statement};
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use tracing::{error, info, warn};

/// Identifies an output buffer within a dialect layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub &'static str);

/// How lines written to a buffer are indented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndentMode {
    /// Follow the current scope depth.
    Scoped,
    /// Always use this many indent units (declaration tables).
    Fixed(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSpec {
    pub id: BufferId,
    pub indent: IndentMode,
}

impl BufferSpec {
    pub const fn scoped(id: BufferId) -> Self {
        Self {
            id,
            indent: IndentMode::Scoped,
        }
    }

    pub const fn fixed(id: BufferId, levels: usize) -> Self {
        Self {
            id,
            indent: IndentMode::Fixed(levels),
        }
    }
}

#[derive(Clone, Debug)]
struct Buffer {
    spec: BufferSpec,
    text: String,
}

/// A cached value used to emit mode lines only when they change.
#[derive(Clone, Debug, PartialEq)]
pub struct Latch<T> {
    value: Option<T>,
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: PartialEq> Latch<T> {
    /// Stores `value`. Returns true if it differs from the stored one.
    pub fn update(&mut self, value: T) -> bool {
        if self.value.as_ref() == Some(&value) {
            false
        } else {
            self.value = Some(value);
            true
        }
    }

    /// The last stored value, `None` until the first update.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// The controller modes the generated code has set so far in a routine.
#[derive(Clone, Debug, Default)]
pub struct MotionModes {
    pub tool: Latch<String>,
    pub base: Latch<String>,
    pub interpolation: Latch<String>,
    pub joint_speed: Latch<String>,
    pub cartesian_speed: Latch<String>,
    pub accuracy: Latch<String>,
    once: HashSet<&'static str>,
}

impl MotionModes {
    /// Returns true the first time `key` is seen since the last reset.
    pub fn first(&mut self, key: &'static str) -> bool {
        self.once.insert(key)
    }

    /// Forgets everything; the next motion re-emits all modes.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Buffers, names, modes and diagnostics of one translation unit.
#[derive(Clone, Debug)]
pub struct EmissionState {
    indent_unit: String,
    indent_depth: usize,
    buffers: Vec<Buffer>,
    pub names: NameAllocator,
    pub modes: MotionModes,
    diagnostics: Vec<Diagnostic>,
}

impl EmissionState {
    /// Creates one empty buffer per layout entry, in layout order.
    pub fn new(layout: &[BufferSpec], config: &PostConfig) -> Self {
        Self {
            indent_unit: config.indent.clone(),
            indent_depth: 0,
            buffers: layout
                .iter()
                .map(|&spec| Buffer {
                    spec,
                    text: String::new(),
                })
                .collect(),
            names: NameAllocator::new(config.name_attempt_limit),
            modes: MotionModes::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Current indentation level of the active buffer writes.
    pub fn depth(&self) -> usize {
        self.indent_depth
    }

    pub(crate) fn enter_scope(&mut self) {
        self.indent_depth += 1;
    }

    pub(crate) fn exit_scope(&mut self) {
        self.indent_depth = self.indent_depth.saturating_sub(1);
    }

    fn buffer_mut(&mut self, id: BufferId) -> &mut Buffer {
        let index = match self.buffers.iter().position(|b| b.spec.id == id) {
            Some(index) => index,
            None => {
                self.buffers.push(Buffer {
                    spec: BufferSpec::scoped(id),
                    text: String::new(),
                });
                self.buffers.len() - 1
            }
        };
        &mut self.buffers[index]
    }

    /// Appends one indented line to `id`.
    ///
    /// Writing to a buffer missing from the layout creates it at the end.
    pub fn write(&mut self, id: BufferId, line: impl AsRef<str>) {
        let depth = self.indent_depth;
        let unit = self.indent_unit.clone();
        let buffer = self.buffer_mut(id);
        let levels = match buffer.spec.indent {
            IndentMode::Scoped => depth,
            IndentMode::Fixed(levels) => levels,
        };
        for _ in 0..levels {
            buffer.text.push_str(&unit);
        }
        buffer.text.push_str(line.as_ref());
        buffer.text.push('\n');
    }

    pub fn blank(&mut self, id: BufferId) {
        self.buffer_mut(id).text.push('\n');
    }

    /// The text written to `id` so far.
    pub fn buffer(&self, id: BufferId) -> Option<&str> {
        self.buffers
            .iter()
            .find(|b| b.spec.id == id)
            .map(|b| b.text.as_str())
    }

    pub fn is_empty(&self, id: BufferId) -> bool {
        self.buffer(id).is_none_or(str::is_empty)
    }

    /// Joins the given buffers in order. Unknown ids contribute nothing.
    pub fn concat(&self, ids: &[BufferId]) -> String {
        ids.iter().filter_map(|&id| self.buffer(id)).collect()
    }

    /// Records a diagnostic and mirrors it to the log.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => info!("{}", diagnostic.message),
            Severity::Warning => warn!("{}", diagnostic.message),
            Severity::Error => error!("{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.report(Diagnostic::info(message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.report(Diagnostic::warning(message));
    }

    /// Reports a statement the dialect has no handler for.
    pub fn unsupported(&mut self, statement: &Statement) {
        self.warn(format!(
            "Unsupported statement {:?} `{}` skipped",
            statement.statement_type(),
            statement.name
        ));
    }

    /// Diagnostics recorded so far, oldest first.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drains the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Everything a statement handler reads or writes.
pub struct Emitter<'a> {
    pub program: &'a Program,
    pub cell: &'a Cell,
    pub config: &'a PostConfig,
    /// Stem of the target file, used for module and data-list names.
    pub unit_name: String,
    pub state: EmissionState,
    routine: Option<&'a Routine>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        program: &'a Program,
        cell: &'a Cell,
        config: &'a PostConfig,
        unit_name: impl Into<String>,
        layout: &[BufferSpec],
    ) -> Self {
        Self {
            program,
            cell,
            config,
            unit_name: unit_name.into(),
            state: EmissionState::new(layout, config),
            routine: None,
        }
    }

    pub fn robot(&self) -> &'a Robot {
        &self.program.robot
    }

    pub fn resolver(&self) -> FrameResolver<'a> {
        FrameResolver::new(self.cell, &self.program.robot)
    }

    /// Starts a routine: motion modes are routine-scoped, names are not.
    pub fn begin_routine(&mut self, routine: &'a Routine) {
        self.routine = Some(routine);
        self.state.modes.reset();
    }

    /// The routine currently being emitted.
    pub fn routine(&self) -> Option<&'a Routine> {
        self.routine
    }

    /// Writes a line to `id` at the current depth.
    pub fn write(&mut self, id: BufferId, line: impl AsRef<str>) {
        self.state.write(id, line);
    }

    /// Enters one nesting level until the returned guard is dropped.
    pub fn indented(&mut self) -> Indented<'_, 'a> {
        self.state.enter_scope();
        Indented { emitter: self }
    }
}

/// Scope guard returned by [`Emitter::indented`].
pub struct Indented<'e, 'a> {
    emitter: &'e mut Emitter<'a>,
}

impl<'a> Deref for Indented<'_, 'a> {
    type Target = Emitter<'a>;

    fn deref(&self) -> &Self::Target {
        self.emitter
    }
}

impl DerefMut for Indented<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.emitter
    }
}

impl Drop for Indented<'_, '_> {
    fn drop(&mut self) {
        self.emitter.state.exit_scope();
    }
}
