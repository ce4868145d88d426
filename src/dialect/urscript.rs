//! Universal Robots URScript.
//!
//! A single `.script` file. The main routine becomes the outer `def`, with
//! subroutines nested inside it and poses declared as globals at its top. The
//! last line calls the program.

use crate::cell::FrameKind;
use crate::config::{PostConfig, UrScriptOptions};
use crate::dialect::{Dialect, OutputFile, path_motions, sibling};
use crate::dispatch::{HandlerTable, emit_nested, emit_scope};
use crate::emission::{BufferId, BufferSpec, EmissionState, Emitter};
use crate::error::PostError;
use crate::expr::RewriteTable;
use crate::format::{NumberFormat, fixed, general, near_zero};
use crate::frame::{Attachment, FrameRoles, Pose};
use crate::program::{
    AccuracyMethod, Motion, Statement, StatementKind, StatementType, Value, Variable,
};
use glam::DAffine3;
use std::path::Path;

const HEADER: BufferId = BufferId("header");
const DATA: BufferId = BufferId("data");
const POSITIONS: BufferId = BufferId("positions");
const ROUTINES: BufferId = BufferId("routines");
const BODY: BufferId = BufferId("body");
const FOOTER: BufferId = BufferId("footer");

const UNITS: NumberFormat = NumberFormat::M_RAD;

/// Emitter for CB3 and e-Series controllers.
pub struct UrScript {
    handlers: HandlerTable<UrScript>,
    options: UrScriptOptions,
    expr: RewriteTable,
    /// Buffer the current routine writes to.
    out: BufferId,
}

impl UrScript {
    pub fn new(config: &PostConfig) -> Self {
        let handlers = HandlerTable::new()
            .with(StatementType::Comment, UrScript::comment)
            .with(StatementType::Delay, UrScript::delay)
            .with(StatementType::Halt, UrScript::keyword)
            .with(StatementType::Return, UrScript::keyword)
            .with(StatementType::Break, UrScript::keyword)
            .with(StatementType::Continue, UrScript::keyword)
            .with(StatementType::Call, UrScript::call)
            .with(StatementType::If, UrScript::branch)
            .with(StatementType::While, UrScript::repeat)
            .with(StatementType::SwitchCase, UrScript::switch)
            .with(StatementType::SetProperty, UrScript::assign)
            .with(StatementType::Print, UrScript::print)
            .with(StatementType::SetDigitalOutput, UrScript::set_output)
            .with(StatementType::WaitDigitalInput, UrScript::wait_input)
            .with(StatementType::LinearMotion, UrScript::motion)
            .with(StatementType::JointMotion, UrScript::motion)
            .with(StatementType::PathMotion, UrScript::path);

        Self {
            handlers,
            options: config.urscript.clone(),
            expr: RewriteTable::urscript(),
            out: BODY,
        }
    }

    fn write_routine(&mut self, em: &mut Emitter<'_>, nested: bool) -> Result<(), PostError> {
        let Some(routine) = em.routine() else {
            return Ok(());
        };
        if nested {
            self.out = ROUTINES;
            em.write(ROUTINES, format!("def {}():", routine.name));
        } else {
            self.out = BODY;
        }
        {
            let mut body = em.indented();
            for variable in &routine.variables {
                let line = format!("{} = {}", variable.name, value_string(&variable.value));
                body.write(self.out, line);
            }
            emit_scope(self, &mut body, &routine.statements)?;
        }
        if nested {
            em.write(ROUTINES, format!("end #{}", routine.name));
            em.state.blank(ROUTINES);
        }
        Ok(())
    }

    // --- Handlers ---

    fn comment(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Comment { text } = &s.kind {
            em.write(self.out, format!("# {text}"));
        }
        Ok(())
    }

    fn delay(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Delay { seconds } = s.kind {
            em.write(self.out, format!("sleep({})", fixed(seconds, 3)));
        }
        Ok(())
    }

    fn keyword(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let word = match s.kind {
            StatementKind::Halt => "halt",
            StatementKind::Return => "return",
            StatementKind::Break => "break",
            StatementKind::Continue => "continue",
            _ => return Ok(()),
        };
        em.write(self.out, word);
        Ok(())
    }

    fn call(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Call { routine } = &s.kind {
            em.write(self.out, format!("{routine}()"));
        }
        Ok(())
    }

    fn branch(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::If(branch) = &s.kind else {
            return Ok(());
        };
        em.write(self.out, format!("if {}:", self.expr.rewrite(&branch.condition)));
        emit_nested(self, em, &branch.then_scope)?;
        for else_if in &branch.else_ifs {
            em.write(self.out, format!("elif {}:", self.expr.rewrite(&else_if.condition)));
            emit_nested(self, em, &else_if.scope)?;
        }
        if !branch.else_scope.is_empty() {
            em.write(self.out, "else:");
            emit_nested(self, em, &branch.else_scope)?;
        }
        em.write(self.out, "end");
        Ok(())
    }

    fn repeat(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::While(body) = &s.kind {
            em.write(self.out, format!("while {}:", self.expr.rewrite(&body.condition)));
            emit_nested(self, em, &body.scope)?;
            em.write(self.out, "end");
        }
        Ok(())
    }

    /// No native switch: the selector is stored once in a temporary and
    /// compared in an `if`/`elif` chain. The default case becomes `else`.
    fn switch(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::SwitchCase(switch) = &s.kind else {
            return Ok(());
        };
        let temp = em.state.names.allocate("switch_1")?;
        em.write(self.out, format!("{temp} = {}", self.expr.rewrite(&switch.condition)));

        let default = switch.cases.iter().find(|c| c.is_default());
        let mut opened = false;
        for case in switch.cases.iter().filter(|c| !c.is_default()) {
            let keyword = if opened { "elif" } else { "if" };
            em.write(
                self.out,
                format!("{keyword} {temp} == {}:", self.expr.rewrite(&case.condition)),
            );
            emit_nested(self, em, &case.scope)?;
            opened = true;
        }
        match (opened, default) {
            (true, Some(case)) => {
                em.write(self.out, "else:");
                emit_nested(self, em, &case.scope)?;
                em.write(self.out, "end");
            }
            (true, None) => em.write(self.out, "end"),
            (false, Some(case)) => emit_scope(self, em, &case.scope)?,
            (false, None) => {}
        }
        Ok(())
    }

    fn assign(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::SetProperty { target, expression } = &s.kind {
            em.write(self.out, format!("{target} = {}", self.expr.rewrite(expression)));
        }
        Ok(())
    }

    fn print(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Print { message } = &s.kind {
            em.write(self.out, format!("textmsg(\"{message}\")"));
        }
        Ok(())
    }

    fn set_output(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::SetDigitalOutput { port, value } = s.kind {
            em.write(
                self.out,
                format!(
                    "{}({port}, {})",
                    self.options.output_mapping.function(),
                    script_bool(value)
                ),
            );
        }
        Ok(())
    }

    /// Busy wait polling the input.
    fn wait_input(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::WaitDigitalInput { port, value } = s.kind {
            let negate = if value { "not " } else { "" };
            let read = self.options.input_mapping.function();
            em.write(self.out, format!("while {negate}{read}({port}):"));
            em.indented()
                .write(self.out, format!("sleep({})", fixed(self.options.input_poll, 3)));
            em.write(self.out, "end");
        }
        Ok(())
    }

    fn motion(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        match &s.kind {
            StatementKind::LinearMotion(m) => self.write_motion(em, s, m, "movel"),
            StatementKind::JointMotion(m) => self.write_motion(em, s, m, "movej"),
            _ => Ok(()),
        }
    }

    fn path(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::PathMotion(path) = &s.kind {
            let command = if self.options.movep_paths { "movep" } else { "movel" };
            for motion in path_motions(s, path) {
                self.write_motion(em, s, &motion, command)?;
            }
        }
        Ok(())
    }

    /// Activates the motion's tool if it differs from the last one set.
    fn write_tcp(&mut self, em: &mut Emitter<'_>, m: &Motion) -> Result<(), PostError> {
        if !self.options.set_tcp {
            return Ok(());
        }
        let key = m.tool.clone().unwrap_or_default();
        if !em.state.modes.tool.update(key) {
            return Ok(());
        }
        let tcp = match m.tool.as_deref() {
            Some(name) => {
                let resolver = em.resolver();
                resolver.resolve_tool(resolver.lookup(FrameKind::Tool, name)?)?.transform
            }
            None => DAffine3::IDENTITY,
        };
        em.write(self.out, format!("set_tcp({})", pose_string(&tcp)));
        Ok(())
    }

    fn write_motion(
        &mut self,
        em: &mut Emitter<'_>,
        s: &Statement,
        m: &Motion,
        command: &str,
    ) -> Result<(), PostError> {
        let joint = command == "movej";
        let resolver = em.resolver();
        let base = m
            .base
            .as_deref()
            .map(|b| resolver.lookup(FrameKind::Base, b))
            .transpose()?;
        let tool = m
            .tool
            .as_deref()
            .map(|t| resolver.lookup(FrameKind::Tool, t))
            .transpose()?;
        match resolver.frame_roles(base, tool) {
            FrameRoles::Standard => {}
            FrameRoles::ExternalTcp => {
                return Err(PostError::UnsupportedGeometry {
                    statement: s.name.clone(),
                    reason: "URScript has no external TCP motion".to_string(),
                });
            }
            FrameRoles::Unsupported(reason) => {
                return Err(PostError::UnsupportedGeometry {
                    statement: s.name.clone(),
                    reason,
                });
            }
        }
        let base = base.map(|b| resolver.resolve_base(b)).transpose()?;
        if base.is_some_and(|b| matches!(b.attachment, Attachment::Positioner(_))) {
            return Err(PostError::UnsupportedGeometry {
                statement: s.name.clone(),
                reason: "URScript cannot track a positioner-mounted base".to_string(),
            });
        }

        self.write_tcp(em, m)?;

        let name = em.state.names.allocate(&m.position_name)?;
        let use_joints = (joint || self.options.movel_as_joints) && m.joints.len() >= 6;
        let value = if use_joints {
            joint_string(&m.joints)
        } else {
            let world = base.map_or(DAffine3::IDENTITY, |b| b.transform) * m.target;
            pose_string(&world)
        };
        em.write(POSITIONS, format!("global {name} = {value}"));

        let blend = blend_radius(m)
            .map(|r| format!(", r={}", fixed(r, 3)))
            .unwrap_or_default();
        let (accel, speed) = if joint {
            (
                self.options.joint_acceleration,
                m.joint_speed * UNITS.angle(em.robot().max_joint_speed),
            )
        } else {
            (
                m.acceleration
                    .map_or(self.options.acceleration, |a| UNITS.length(a)),
                UNITS.length(m.speed),
            )
        };
        let accel = if self.options.use_acceleration {
            format!(", a={}", fixed(accel, 3))
        } else {
            String::new()
        };
        em.write(
            self.out,
            format!("{command}({name}{accel}, v={}{blend})", fixed(speed, 3)),
        );
        Ok(())
    }
}

impl Dialect for UrScript {
    const MANUFACTURER: &'static str = "Universal Robots";
    const EXTENSION: &'static str = "script";

    fn handlers(&self) -> &HandlerTable<Self> {
        &self.handlers
    }

    fn layout(&self) -> Vec<BufferSpec> {
        vec![
            BufferSpec::fixed(HEADER, 0),
            BufferSpec::fixed(DATA, 1),
            BufferSpec::fixed(POSITIONS, 1),
            BufferSpec::scoped(ROUTINES),
            BufferSpec::scoped(BODY),
            BufferSpec::fixed(FOOTER, 0),
        ]
    }

    fn reset(&mut self) {
        self.out = BODY;
    }

    fn emit_program(&mut self, em: &mut Emitter<'_>) -> Result<(), PostError> {
        let program = em.program;
        for routine in program.all_routines() {
            em.state.names.reserve(routine.name.clone());
            for variable in &routine.variables {
                em.state.names.reserve(variable.name.clone());
            }
        }
        for variable in &program.globals {
            em.state.names.reserve(variable.name.clone());
        }

        let unit = em.unit_name.clone();
        em.state.names.reserve(unit.clone());
        em.write(HEADER, format!("def {unit}():"));
        for variable in &program.globals {
            em.write(DATA, global_declaration(variable));
        }

        em.begin_routine(&program.main);
        self.write_routine(em, false)?;

        let mut nested = em.indented();
        for routine in &program.routines {
            nested.begin_routine(routine);
            self.write_routine(&mut nested, true)?;
        }
        drop(nested);

        em.write(FOOTER, format!("end #{unit}"));
        em.state.blank(FOOTER);
        em.write(FOOTER, format!("{unit}()"));
        Ok(())
    }

    fn files(&self, state: &EmissionState, target: &Path) -> Vec<OutputFile> {
        let mut script = state.concat(&[HEADER, DATA, POSITIONS]);
        if !state.is_empty(DATA) || !state.is_empty(POSITIONS) {
            script.push('\n');
        }
        script.push_str(&state.concat(&[ROUTINES, BODY, FOOTER]));
        vec![OutputFile {
            path: sibling(target, Self::EXTENSION),
            contents: script,
        }]
    }
}

fn script_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn value_string(value: &Value) -> String {
    match value {
        Value::Bool(b) => script_bool(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => general(*r),
        Value::Str(s) => format!("\"{s}\""),
    }
}

fn global_declaration(variable: &Variable) -> String {
    format!("global {} = {}", variable.name, value_string(&variable.value))
}

/// `p[x, y, z, rx, ry, rz]` in metres and a rotation vector in radians.
fn pose_string(transform: &DAffine3) -> String {
    let pose = Pose::from_transform(transform);
    let p = pose.position;
    let r = pose.rotation_vector();
    let values = [
        UNITS.length(p.x),
        UNITS.length(p.y),
        UNITS.length(p.z),
        r.x,
        r.y,
        r.z,
    ];
    let values: Vec<_> = values.iter().map(|v| fixed(*v, 6)).collect();
    format!("p[{}]", values.join(", "))
}

fn joint_string(joints: &[f64]) -> String {
    let values: Vec<_> = joints
        .iter()
        .take(6)
        .map(|j| fixed(UNITS.angle(*j), 6))
        .collect();
    format!("[{}]", values.join(", "))
}

/// Blend radius in metres, if the motion blends by distance.
fn blend_radius(m: &Motion) -> Option<f64> {
    (m.accuracy.method == AccuracyMethod::Distance && !near_zero(m.accuracy.value))
        .then(|| UNITS.length(m.accuracy.value))
}
