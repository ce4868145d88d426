//! ABB RAPID.
//!
//! One `.mod` module holding frame data, global variables, a robtarget table
//! and one `PROC` per routine. Digital signals referenced by the program are
//! declared in an `EIO.cfg` written next to the module.

use crate::cell::{Frame, FrameKind};
use crate::config::{PostConfig, RapidOptions};
use crate::dialect::{Dialect, OutputFile, beside, motion_statements, path_motions, sibling};
use crate::dispatch::{HandlerTable, Recurse, emit_nested, emit_scope, flatten};
use crate::emission::{BufferId, BufferSpec, EmissionState, Emitter};
use crate::error::PostError;
use crate::expr::RewriteTable;
use crate::format::{general, near_zero};
use crate::frame::{Attachment, FrameRoles, Pose};
use crate::program::{
    AccuracyMethod, Motion, Statement, StatementKind, StatementType, Value, Variable,
};
use glam::DAffine3;
use std::collections::BTreeSet;
use std::path::Path;

const HEADER: BufferId = BufferId("header");
const DATA: BufferId = BufferId("data");
const POSITIONS: BufferId = BufferId("positions");
const BODY: BufferId = BufferId("body");
const FOOTER: BufferId = BufferId("footer");
const EIO: BufferId = BufferId("eio");

const SPEEDS: [f64; 22] = [
    5000.0, 4000.0, 3000.0, 2500.0, 2000.0, 1500.0, 1000.0, 800.0, 600.0, 500.0, 400.0, 300.0,
    200.0, 150.0, 100.0, 80.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0,
];
const ZONES: [f64; 13] = [
    200.0, 150.0, 100.0, 80.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0, 5.0, 1.0, 0.3,
];

/// Value RAPID uses for unused external axes.
const AXIS_UNUSED: &str = "9E+09";

/// Emitter for ABB IRC5 style controllers.
pub struct Rapid {
    handlers: HandlerTable<Rapid>,
    options: RapidOptions,
    expr: RewriteTable,
    /// Signals referenced by the current unit.
    inputs: BTreeSet<u32>,
    outputs: BTreeSet<u32>,
}

impl Rapid {
    pub fn new(config: &PostConfig) -> Self {
        let handlers = HandlerTable::new()
            .with(StatementType::Comment, Rapid::comment)
            .with(StatementType::Delay, Rapid::delay)
            .with(StatementType::Halt, Rapid::halt)
            .with(StatementType::Return, Rapid::ret)
            .with(StatementType::Call, Rapid::call)
            .with(StatementType::If, Rapid::branch)
            .with(StatementType::While, Rapid::repeat)
            .with(StatementType::SwitchCase, Rapid::switch)
            .with(StatementType::SetProperty, Rapid::assign)
            .with(StatementType::Print, Rapid::print)
            .with(StatementType::SetDigitalOutput, Rapid::set_output)
            .with(StatementType::WaitDigitalInput, Rapid::wait_input)
            .with(StatementType::DefineBase, Rapid::define_frame)
            .with(StatementType::DefineTool, Rapid::define_frame)
            .with(StatementType::LinearMotion, Rapid::motion)
            .with(StatementType::JointMotion, Rapid::motion)
            .with(StatementType::PathMotion, Rapid::path);

        Self {
            handlers,
            options: config.rapid.clone(),
            expr: RewriteTable::rapid(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
        }
    }

    /// `wobjdata` and `tooldata` for every frame a motion uses.
    fn write_frames(&self, em: &mut Emitter<'_>) -> Result<(), PostError> {
        let resolver = em.resolver();
        let mut bases: Vec<&str> = Vec::new();
        let mut tools: Vec<&str> = Vec::new();
        for statement in motion_statements(em.program) {
            if let Some((base, tool)) = statement.motion_frames() {
                if let Some(base) = base.filter(|b| !bases.contains(b)) {
                    bases.push(base);
                }
                if let Some(tool) = tool.filter(|t| !tools.contains(t)) {
                    tools.push(tool);
                }
            }
        }

        for name in &bases {
            let base = resolver.lookup(FrameKind::Base, name)?;
            let resolved = resolver.resolve_base(base)?;
            let mut uframe = format!("[{}]", pose_string(&resolved.transform));
            let mut oframe = format!("[{}]", pose_string(&DAffine3::IDENTITY));
            let robhold = resolved.attachment == Attachment::Flange;
            let (ufprog, ufmec) = match resolved.attachment {
                Attachment::Positioner(pid) => {
                    std::mem::swap(&mut uframe, &mut oframe);
                    let mech = em
                        .cell
                        .positioners
                        .get(pid as usize)
                        .map(|p| p.name.clone())
                        .unwrap_or_default();
                    (false, mech)
                }
                _ => (true, String::new()),
            };
            em.write(
                DATA,
                format!(
                    "PERS wobjdata {name}:=[{},{},\"{ufmec}\",{uframe},{oframe}];",
                    rapid_bool(robhold),
                    rapid_bool(ufprog)
                ),
            );
        }
        if !bases.is_empty() {
            em.state.blank(DATA);
        }

        for name in &tools {
            let tool = resolver.lookup(FrameKind::Tool, name)?;
            let resolved = resolver.resolve_tool(tool)?;
            let robhold = matches!(resolved.attachment, Attachment::Detached | Attachment::Flange);
            em.write(
                DATA,
                format!(
                    "PERS tooldata {name}:=[{},[{}],[5,[0,0,0.001],[1,0,0,0],0,0,0]];",
                    rapid_bool(robhold),
                    pose_string(&resolved.transform)
                ),
            );
        }
        if !tools.is_empty() {
            em.state.blank(DATA);
        }
        Ok(())
    }

    /// Program-level variables targeted by assignments outside their routine.
    fn write_globals(&self, em: &mut Emitter<'_>) {
        let program = em.program;
        let mut declared = BTreeSet::new();
        for routine in program.all_routines() {
            for statement in flatten(&routine.statements, Recurse::ALL) {
                let StatementKind::SetProperty { target, .. } = &statement.kind else {
                    continue;
                };
                if routine.variable(target).is_some() || declared.contains(target) {
                    continue;
                }
                if let Some(variable) = program.global(target) {
                    em.write(DATA, declaration(variable));
                    declared.insert(target.clone());
                }
            }
        }
        if !declared.is_empty() {
            em.state.blank(DATA);
        }
    }

    fn write_routine(&mut self, em: &mut Emitter<'_>) -> Result<(), PostError> {
        let Some(routine) = em.routine() else {
            return Ok(());
        };
        em.write(BODY, format!("PROC {}()", routine.name));
        {
            let mut body = em.indented();
            for variable in &routine.variables {
                body.write(BODY, declaration(variable));
            }
            if !routine.variables.is_empty() {
                body.state.blank(BODY);
            }
            emit_scope(self, &mut body, &routine.statements)?;
        }
        em.write(BODY, "ENDPROC");
        em.state.blank(BODY);
        Ok(())
    }

    fn write_eio(&self, em: &mut Emitter<'_>) {
        if !self.options.signal_config || (self.inputs.is_empty() && self.outputs.is_empty()) {
            return;
        }
        em.write(EIO, "EIO:CFG_1.0:6:1::");
        em.write(EIO, "#");
        em.write(EIO, "EIO_SIGNAL:");
        em.state.blank(EIO);
        for port in &self.inputs {
            em.write(EIO, format!("      -Name \"di{port}\" -SignalType \"DI\" -Access \"All\""));
            em.state.blank(EIO);
        }
        for port in &self.outputs {
            em.write(EIO, format!("      -Name \"do{port}\" -SignalType \"DO\" -Access \"All\""));
            em.state.blank(EIO);
        }
    }

    // --- Handlers ---

    fn comment(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Comment { text } = &s.kind {
            em.write(BODY, format!("!{text}"));
        }
        Ok(())
    }

    fn delay(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Delay { seconds } = s.kind {
            em.write(BODY, format!("WaitTime {};", general(seconds)));
        }
        Ok(())
    }

    fn halt(&mut self, em: &mut Emitter<'_>, _: &Statement) -> Result<(), PostError> {
        em.write(BODY, "Stop;");
        Ok(())
    }

    fn ret(&mut self, em: &mut Emitter<'_>, _: &Statement) -> Result<(), PostError> {
        em.write(BODY, "RETURN;");
        Ok(())
    }

    fn call(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Call { routine } = &s.kind {
            em.write(BODY, format!("{routine};"));
        }
        Ok(())
    }

    fn branch(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::If(branch) = &s.kind else {
            return Ok(());
        };
        em.write(BODY, format!("IF {} THEN", self.expr.rewrite(&branch.condition)));
        emit_nested(self, em, &branch.then_scope)?;
        for else_if in &branch.else_ifs {
            em.write(BODY, format!("ELSEIF {} THEN", self.expr.rewrite(&else_if.condition)));
            emit_nested(self, em, &else_if.scope)?;
        }
        if !branch.else_scope.is_empty() {
            em.write(BODY, "ELSE");
            emit_nested(self, em, &branch.else_scope)?;
        }
        em.write(BODY, "ENDIF");
        Ok(())
    }

    fn repeat(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::While(body) = &s.kind {
            em.write(BODY, format!("WHILE {} DO", self.expr.rewrite(&body.condition)));
            emit_nested(self, em, &body.scope)?;
            em.write(BODY, "ENDWHILE");
        }
        Ok(())
    }

    fn switch(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::SwitchCase(switch) = &s.kind else {
            return Ok(());
        };
        em.write(BODY, format!("TEST {}", self.expr.rewrite(&switch.condition)));
        for case in &switch.cases {
            if case.is_default() {
                em.write(BODY, "DEFAULT:");
            } else {
                em.write(BODY, format!("CASE {}:", self.expr.rewrite(&case.condition)));
            }
            emit_nested(self, em, &case.scope)?;
        }
        em.write(BODY, "ENDTEST");
        Ok(())
    }

    fn assign(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::SetProperty { target, expression } = &s.kind {
            em.write(BODY, format!("{target} := {};", self.expr.rewrite(expression)));
        }
        Ok(())
    }

    fn print(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Print { message } = &s.kind {
            em.write(BODY, format!("TPWrite \"{message}\";"));
        }
        Ok(())
    }

    fn set_output(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::SetDigitalOutput { port, value } = s.kind {
            em.write(BODY, format!("SetDO do{port},{};", u8::from(value)));
            self.outputs.insert(port);
        }
        Ok(())
    }

    fn wait_input(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::WaitDigitalInput { port, value } = s.kind {
            em.write(BODY, format!("WaitDI di{port},{};", u8::from(value)));
            self.inputs.insert(port);
        }
        Ok(())
    }

    fn define_frame(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let (kind, define, field) = match &s.kind {
            StatementKind::DefineBase(define) => (FrameKind::Base, define, "uframe"),
            StatementKind::DefineTool(define) => (FrameKind::Tool, define, "tframe"),
            _ => return Ok(()),
        };
        let name = &define.frame;
        let value = match define.node.filter(|_| !define.relative) {
            Some(node) => {
                let frame = Frame::attached(name.clone(), node, define.position);
                em.resolver().resolve(kind, &frame)?.transform
            }
            None => define.position,
        };
        let value = pose_string(&value);
        if define.relative {
            em.write(BODY, format!("{name}.{field}:=PoseMult({name}.{field}, [{value}]);"));
        } else {
            em.write(BODY, format!("{name}.{field}:=[{value}];"));
        }
        Ok(())
    }

    fn motion(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        match &s.kind {
            StatementKind::LinearMotion(m) => self.write_motion(em, s, m, false),
            StatementKind::JointMotion(m) => self.write_motion(em, s, m, true),
            _ => Ok(()),
        }
    }

    fn path(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::PathMotion(path) = &s.kind {
            em.write(BODY, "!Path start");
            for motion in path_motions(s, path) {
                self.write_motion(em, s, &motion, false)?;
            }
            em.write(BODY, "!Path end");
        }
        Ok(())
    }

    fn write_motion(
        &mut self,
        em: &mut Emitter<'_>,
        s: &Statement,
        m: &Motion,
        joint: bool,
    ) -> Result<(), PostError> {
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
        // Stationary tools are handled by the controller through robhold.
        if let FrameRoles::Unsupported(reason) = resolver.frame_roles(base, tool) {
            return Err(PostError::UnsupportedGeometry {
                statement: s.name.clone(),
                reason,
            });
        }

        let name = em.state.names.allocate(&m.position_name)?;
        em.write(
            POSITIONS,
            format!(
                "PERS robtarget {name}:=[[{}],[{}],[{}],[{}]];",
                position_string(&m.target),
                orientation_string(&m.target),
                configuration_string(m),
                external_axes_string(&m.external_joints)
            ),
        );

        let instruction = if joint { "MoveJ" } else { "MoveL" };
        let speed = speed_data(m, joint);
        let zone = zone_data(m);
        let tool = m.tool.as_deref().unwrap_or("tool0");
        let wobj = m
            .base
            .as_deref()
            .map(|b| format!("\\WObj:={b}"))
            .unwrap_or_default();
        em.write(BODY, format!("{instruction} {name},{speed},{zone},{tool}{wobj};"));
        Ok(())
    }
}

impl Dialect for Rapid {
    const MANUFACTURER: &'static str = "ABB";
    const EXTENSION: &'static str = "mod";

    fn handlers(&self) -> &HandlerTable<Self> {
        &self.handlers
    }

    fn layout(&self) -> Vec<BufferSpec> {
        vec![
            BufferSpec::fixed(HEADER, 0),
            BufferSpec::fixed(DATA, 1),
            BufferSpec::fixed(POSITIONS, 1),
            BufferSpec::scoped(BODY),
            BufferSpec::fixed(FOOTER, 0),
            BufferSpec::fixed(EIO, 0),
        ]
    }

    fn reset(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
    }

    fn emit_program(&mut self, em: &mut Emitter<'_>) -> Result<(), PostError> {
        let program = em.program;
        for routine in program.all_routines() {
            em.state.names.reserve(routine.name.clone());
            for variable in &routine.variables {
                em.state.names.reserve(variable.name.clone());
            }
        }
        for frame in program.robot.bases.iter().chain(&program.robot.tools) {
            em.state.names.reserve(frame.name.clone());
        }
        for variable in &program.globals {
            em.state.names.reserve(variable.name.clone());
        }

        let unit = em.unit_name.clone();
        em.write(HEADER, format!("MODULE {unit}"));
        em.state.blank(HEADER);
        self.write_frames(em)?;
        self.write_globals(em);

        let mut body = em.indented();
        for routine in program.all_routines() {
            body.begin_routine(routine);
            self.write_routine(&mut body)?;
        }
        drop(body);

        em.write(FOOTER, "ENDMODULE");
        self.write_eio(em);
        Ok(())
    }

    fn files(&self, state: &EmissionState, target: &Path) -> Vec<OutputFile> {
        let mut module = state.concat(&[HEADER, DATA, POSITIONS]);
        if !state.is_empty(POSITIONS) {
            module.push('\n');
        }
        module.push_str(&state.concat(&[BODY, FOOTER]));

        let mut files = vec![OutputFile {
            path: sibling(target, Self::EXTENSION),
            contents: module,
        }];
        if !state.is_empty(EIO) {
            files.push(OutputFile {
                path: beside(target, "EIO.cfg"),
                contents: state.concat(&[EIO]),
            });
        }
        files
    }
}

fn rapid_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// `%g` with values below a micrometre snapped to zero.
fn num(v: f64) -> String {
    if v.abs() < 1e-6 { "0".to_string() } else { general(v) }
}

fn position_string(transform: &DAffine3) -> String {
    let p = Pose::from_transform(transform).position;
    format!("{},{},{}", num(p.x), num(p.y), num(p.z))
}

/// Quaternion in RAPID order: `q1` is the scalar part.
fn orientation_string(transform: &DAffine3) -> String {
    let q = Pose::from_transform(transform).rotation;
    format!("{},{},{},{}", num(q.w), num(q.x), num(q.y), num(q.z))
}

fn pose_string(transform: &DAffine3) -> String {
    format!(
        "[{}],[{}]",
        position_string(transform),
        orientation_string(transform)
    )
}

/// `cf1,cf4,cf6,cfx`: joint quadrants of axes 1, 4 and 6 plus the posture index.
fn configuration_string(m: &Motion) -> String {
    let quadrant = |i: usize| -> i64 {
        m.joints
            .get(i)
            .filter(|_| m.joints.len() == 6)
            .map(|j| (j / 90.0).floor() as i64)
            .unwrap_or(0)
    };
    format!(
        "{},{},{},{}",
        quadrant(0),
        quadrant(3),
        quadrant(5),
        m.configuration
    )
}

fn external_axes_string(values: &[f64]) -> String {
    (0..6)
        .map(|i| values.get(i).map(|v| num(*v)).unwrap_or_else(|| AXIS_UNUSED.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Nearest predefined `speeddata` not faster than requested.
fn speed_data(m: &Motion, joint: bool) -> String {
    let v = if joint {
        if m.joint_speed < 1.0 {
            m.joint_speed * 5000.0
        } else {
            5001.0
        }
    } else {
        m.speed
    };
    if v > 5000.0 {
        return "vmax".to_string();
    }
    let v = SPEEDS.iter().copied().find(|&s| v >= s).unwrap_or(5.0);
    format!("v{v:.0}")
}

/// Nearest predefined `zonedata` not larger than requested.
fn zone_data(m: &Motion) -> String {
    if m.accuracy.method != AccuracyMethod::Distance || near_zero(m.accuracy.value) {
        return "fine".to_string();
    }
    match ZONES.iter().copied().find(|&z| m.accuracy.value >= z) {
        Some(z) => format!("z{z:.0}"),
        None => "fine".to_string(),
    }
}

fn declaration(variable: &Variable) -> String {
    let (ty, value) = match &variable.value {
        Value::Bool(b) => ("bool", rapid_bool(*b).to_string()),
        Value::Int(i) => ("num", i.to_string()),
        Value::Real(r) => ("num", general(*r)),
        Value::Str(s) => ("string", format!("\"{s}\"")),
    };
    format!("VAR {ty} {} := {value};", variable.name)
}
