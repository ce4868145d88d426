//! Entry point: translate a program and write the resulting files.

use crate::cell::Cell;
use crate::config::PostConfig;
use crate::dialect::{Dialect, Krl, Rapid, UrScript};
use crate::emission::Emitter;
use crate::error::{Diagnostic, PostError};
use crate::program::Program;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Outcome of one translation unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Translation {
    /// False when any error aborted the unit or a file could not be written.
    pub success: bool,

    /// Every file written, including those written before a failure.
    pub files: Vec<PathBuf>,

    pub diagnostics: Vec<Diagnostic>,
}

/// Translates `program` with `dialect` and writes the output next to `target`.
///
/// Never panics on bad input: every error is logged, recorded as a diagnostic
/// and turned into `success == false`.
#[tracing::instrument(skip_all, fields(dialect = D::MANUFACTURER, target = %target.display()))]
pub fn translate<D: Dialect>(
    dialect: &mut D,
    cell: &Cell,
    program: &Program,
    target: &Path,
    config: &PostConfig,
) -> Translation {
    let unit_name = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.main.name.clone());

    dialect.reset();
    let layout = dialect.layout();
    let mut em = Emitter::new(program, cell, config, unit_name, &layout);
    let emitted = program
        .validate()
        .and_then(|()| dialect.emit_program(&mut em));

    let mut state = em.state;
    let mut diagnostics = state.take_diagnostics();
    let mut files = Vec::new();

    if let Err(err) = emitted {
        error!("{err}");
        diagnostics.push(Diagnostic::error(err.to_string()));
        return Translation {
            success: false,
            files,
            diagnostics,
        };
    }

    for output in dialect.files(&state, target) {
        if let Err(source) = std::fs::write(&output.path, &output.contents) {
            let err = PostError::Io {
                path: output.path,
                source,
            };
            error!("{err}");
            diagnostics.push(Diagnostic::error(err.to_string()));
            return Translation {
                success: false,
                files,
                diagnostics,
            };
        }
        debug!(path = %output.path.display(), bytes = output.contents.len(), "wrote file");
        files.push(output.path);
    }

    Translation {
        success: true,
        files,
        diagnostics,
    }
}

/// The built-in dialects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectKind {
    Krl,
    Rapid,
    UrScript,
}

impl DialectKind {
    pub const ALL: [DialectKind; 3] = [DialectKind::Krl, DialectKind::Rapid, DialectKind::UrScript];

    pub fn manufacturer(self) -> &'static str {
        match self {
            DialectKind::Krl => Krl::MANUFACTURER,
            DialectKind::Rapid => Rapid::MANUFACTURER,
            DialectKind::UrScript => UrScript::MANUFACTURER,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DialectKind::Krl => Krl::EXTENSION,
            DialectKind::Rapid => Rapid::EXTENSION,
            DialectKind::UrScript => UrScript::EXTENSION,
        }
    }

    /// Picks the dialect whose main file uses `extension` (case-insensitive).
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(extension))
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Krl => write!(f, "KRL"),
            DialectKind::Rapid => write!(f, "RAPID"),
            DialectKind::UrScript => write!(f, "URScript"),
        }
    }
}

/// Translates with a freshly configured built-in dialect.
pub fn post_process(
    kind: DialectKind,
    cell: &Cell,
    program: &Program,
    target: &Path,
    config: &PostConfig,
) -> Translation {
    match kind {
        DialectKind::Krl => translate(&mut Krl::new(config), cell, program, target, config),
        DialectKind::Rapid => translate(&mut Rapid::new(config), cell, program, target, config),
        DialectKind::UrScript => {
            translate(&mut UrScript::new(config), cell, program, target, config)
        }
    }
}
