//! Statement dispatch and tree traversal.
//!
//! Each dialect registers one [`Handler`] per statement kind it understands in
//! a [`HandlerTable`]. Kinds without a handler are reported and skipped, never
//! fatal. Compound handlers recurse through [`emit_nested`].

use crate::dialect::Dialect;
use crate::emission::Emitter;
use crate::error::PostError;
use crate::program::{Program, Statement, StatementKind, StatementType};

/// Emits code for one statement.
pub type Handler<D> = fn(&mut D, &mut Emitter<'_>, &Statement) -> Result<(), PostError>;

/// Per-dialect mapping from statement kind to handler.
pub struct HandlerTable<D> {
    handlers: [Option<Handler<D>>; StatementType::COUNT],
}

impl<D> Clone for HandlerTable<D> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers,
        }
    }
}

impl<D> Default for HandlerTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> HandlerTable<D> {
    /// A table without any handler: every statement is unsupported.
    pub fn new() -> Self {
        Self {
            handlers: [None; StatementType::COUNT],
        }
    }

    /// Registers `handler` for `ty` (builder pattern).
    pub fn with(mut self, ty: StatementType, handler: Handler<D>) -> Self {
        self.set(ty, handler);
        self
    }

    pub fn set(&mut self, ty: StatementType, handler: Handler<D>) {
        self.handlers[ty.index()] = Some(handler);
    }

    pub fn get(&self, ty: StatementType) -> Option<Handler<D>> {
        self.handlers[ty.index()]
    }
}

/// Emits one statement through the dialect's table.
pub fn emit_statement<D: Dialect>(
    dialect: &mut D,
    em: &mut Emitter<'_>,
    statement: &Statement,
) -> Result<(), PostError> {
    match dialect.handlers().get(statement.statement_type()) {
        Some(handler) => handler(dialect, em, statement),
        None => {
            em.state.unsupported(statement);
            Ok(())
        }
    }
}

/// Emits every statement of `scope` at the current depth.
pub fn emit_scope<D: Dialect>(
    dialect: &mut D,
    em: &mut Emitter<'_>,
    scope: &[Statement],
) -> Result<(), PostError> {
    for statement in scope {
        emit_statement(dialect, em, statement)?;
    }
    Ok(())
}

/// Emits `scope` one level deeper. The depth is restored on every exit path.
pub fn emit_nested<D: Dialect>(
    dialect: &mut D,
    em: &mut Emitter<'_>,
    scope: &[Statement],
) -> Result<(), PostError> {
    let mut inner = em.indented();
    emit_scope(dialect, &mut inner, scope)
}

/// Which scope-bearing statements [`flatten`] descends into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recurse {
    pub if_scopes: bool,
    pub while_scope: bool,
    pub switch_cases: bool,
}

impl Recurse {
    pub const ALL: Self = Self {
        if_scopes: true,
        while_scope: true,
        switch_cases: true,
    };

    pub const NONE: Self = Self {
        if_scopes: false,
        while_scope: false,
        switch_cases: false,
    };
}

impl Default for Recurse {
    fn default() -> Self {
        Self::ALL
    }
}

/// Lists the statements of `scope` in pre-order, descending into the
/// compound kinds `recurse` selects. Compound statements are listed before
/// their children.
pub fn flatten(scope: &[Statement], recurse: Recurse) -> Vec<&Statement> {
    let mut out = Vec::new();
    collect(scope, recurse, &mut out);
    out
}

fn collect<'s>(scope: &'s [Statement], recurse: Recurse, out: &mut Vec<&'s Statement>) {
    for statement in scope {
        out.push(statement);
        match &statement.kind {
            StatementKind::If(branch) if recurse.if_scopes => {
                collect(&branch.then_scope, recurse, out);
                for else_if in &branch.else_ifs {
                    collect(&else_if.scope, recurse, out);
                }
                collect(&branch.else_scope, recurse, out);
            }
            StatementKind::While(body) if recurse.while_scope => {
                collect(&body.scope, recurse, out);
            }
            StatementKind::SwitchCase(switch) if recurse.switch_cases => {
                for case in &switch.cases {
                    collect(&case.scope, recurse, out);
                }
            }
            _ => {}
        }
    }
}

/// [`flatten`] over every routine of `program`, main first.
pub fn flatten_program(program: &Program, recurse: Recurse) -> Vec<&Statement> {
    program
        .all_routines()
        .flat_map(|routine| flatten(&routine.statements, recurse))
        .collect()
}
