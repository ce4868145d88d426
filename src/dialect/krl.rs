//! KUKA Robot Language.
//!
//! Produces a `.src` file with the routines and a `.dat` data list holding
//! variable declarations and `E6POS` positions. Frames are addressed through
//! the `BASE_DATA`/`TOOL_DATA` register arrays; names are mapped to slots
//! before anything is emitted.
//!
//! With [`KrlOptions::inline_form`] commands are wrapped in `;FOLD` blocks the
//! teach pendant can edit, and motions read their parameters from `FDAT`,
//! `PDAT` and `LDAT` records in the data list.

use crate::cell::FrameKind;
use crate::config::{KrlOptions, PostConfig};
use crate::dialect::{Dialect, OutputFile, motion_statements, path_motions, sibling};
use crate::dispatch::{HandlerTable, emit_nested, emit_scope};
use crate::emission::{BufferId, BufferSpec, EmissionState, Emitter};
use crate::error::PostError;
use crate::expr::RewriteTable;
use crate::format::{fixed, general};
use crate::frame::{FrameRoles, Pose};
use crate::program::{
    ConditionalScope, DefineFrame, Motion, Statement, StatementKind, StatementType, Value,
};
use crate::slots::{NULL_FRAME, SlotMap};
use glam::DAffine3;
use std::collections::HashMap;
use std::path::Path;

const SRC: BufferId = BufferId("src");
const DAT_HEADER: BufferId = BufferId("dat_header");
const DECLARATIONS: BufferId = BufferId("declarations");
const POSITIONS: BufferId = BufferId("positions");
const DAT_FOOTER: BufferId = BufferId("dat_footer");

/// Controller posture index to KRL `S` (status) bits.
const STATUS_MAP: [u32; 8] = [2, 6, 0, 4, 3, 7, 1, 5];

/// Inline-form attributes shared by every fold header.
const FOLD_TAG: &str = "%{PE}%R 8.3.48,%MKUKATPBASIS";

/// Emitter for KUKA KR C4 style controllers.
pub struct Krl {
    handlers: HandlerTable<Krl>,
    options: KrlOptions,
    expr: RewriteTable,
    bases: SlotMap,
    tools: SlotMap,
    /// `(base, tool)` pairs used as external TCP; their registers are swapped.
    external_pairs: Vec<(String, String)>,
    /// Data-list declarations by variable name. `None` marks a variable that
    /// was reported instead of declared.
    declared: HashMap<String, Option<&'static str>>,
}

impl Krl {
    pub fn new(config: &PostConfig) -> Self {
        let handlers = HandlerTable::new()
            .with(StatementType::Comment, Krl::comment)
            .with(StatementType::Delay, Krl::delay)
            .with(StatementType::Halt, Krl::halt)
            .with(StatementType::Return, Krl::ret)
            .with(StatementType::Break, Krl::brk)
            .with(StatementType::Call, Krl::call)
            .with(StatementType::If, Krl::branch)
            .with(StatementType::While, Krl::repeat)
            .with(StatementType::SwitchCase, Krl::switch)
            .with(StatementType::SetProperty, Krl::assign)
            .with(StatementType::SetDigitalOutput, Krl::set_output)
            .with(StatementType::WaitDigitalInput, Krl::wait_input)
            .with(StatementType::DefineBase, Krl::define_frame)
            .with(StatementType::DefineTool, Krl::define_frame)
            .with(StatementType::LinearMotion, Krl::motion)
            .with(StatementType::JointMotion, Krl::motion)
            .with(StatementType::PathMotion, Krl::path);

        Self {
            handlers,
            options: config.krl.clone(),
            expr: RewriteTable::krl(),
            bases: SlotMap::new("BASE_DATA", config.krl.base_slots),
            tools: SlotMap::new("TOOL_DATA", config.krl.tool_slots),
            external_pairs: Vec::new(),
            declared: HashMap::new(),
        }
    }

    /// Base register assignments of the last translated unit.
    pub fn base_slots(&self) -> &SlotMap {
        &self.bases
    }

    /// Tool register assignments of the last translated unit.
    pub fn tool_slots(&self) -> &SlotMap {
        &self.tools
    }

    /// Classifies a pair without failing on frames the robot does not define
    /// (`BASE_DATA[3]` and friends may only exist on the controller).
    fn roles(em: &Emitter<'_>, base: &str, tool: &str) -> FrameRoles {
        let robot = em.robot();
        let base = (base != NULL_FRAME).then(|| robot.base(base)).flatten();
        let tool = (tool != NULL_FRAME).then(|| robot.tool(tool)).flatten();
        em.resolver().frame_roles(base, tool)
    }

    /// Assigns every frame used by a motion to a register slot.
    ///
    /// Default names (`Null`, `BASE_DATA[n]`) keep their index, other names
    /// take the lowest free slot, and external TCP pairs are mapped last with
    /// base and tool exchanged.
    fn map_frames(&mut self, em: &mut Emitter<'_>) {
        let mut pairs = Vec::new();
        for statement in motion_statements(em.program) {
            let Some((base, tool)) = statement.motion_frames() else {
                continue;
            };
            let base = base.unwrap_or(NULL_FRAME).to_string();
            let tool = tool.unwrap_or(NULL_FRAME).to_string();
            match Self::roles(em, &base, &tool) {
                FrameRoles::Standard => pairs.push((base, tool)),
                FrameRoles::ExternalTcp => {
                    if !self.external_pairs.contains(&(base.clone(), tool.clone())) {
                        self.external_pairs.push((base, tool));
                    }
                }
                // Reported when the motion is emitted.
                FrameRoles::Unsupported(_) => {}
            }
        }

        for (base, tool) in &pairs {
            self.bases.assign_default(base);
            self.tools.assign_default(tool);
        }
        for (base, tool) in &pairs {
            if self.bases.assign_free(base).is_none() {
                em.state
                    .warn(format!("Cannot map {base} to any default base frame index."));
            }
            if self.tools.assign_free(tool).is_none() {
                em.state
                    .warn(format!("Cannot map {tool} to any default tool frame index."));
            }
        }

        for (base, tool) in self.external_pairs.clone() {
            if let (Some(b), Some(t)) = (
                self.bases.default_index(&base),
                self.tools.default_index(&tool),
            ) && b == t
                && b > 0
                && !self.bases.contains(&tool)
                && !self.tools.contains(&base)
            {
                self.bases.assign(&tool, t);
                self.tools.assign(&base, b);
                continue;
            }
            if self.bases.assign_free(&tool).is_none() {
                em.state.warn(format!(
                    "Cannot map {tool} (extTCP) to any default base frame index."
                ));
            }
            if self.tools.assign_default(&base).is_none()
                && self.tools.assign_free(&base).is_none()
            {
                em.state.warn(format!(
                    "Cannot map {base} (extTCP) to any default tool frame index."
                ));
            }
        }
    }

    fn is_external_tool(&self, name: &str) -> bool {
        self.external_pairs.iter().any(|(_, tool)| tool == name)
    }

    fn is_external_base(&self, name: &str) -> bool {
        self.external_pairs.iter().any(|(base, _)| base == name)
    }

    /// `BASE_DATA`/`TOOL_DATA` assignments at the top of the main routine.
    fn write_frame_data(&self, em: &mut Emitter<'_>) -> Result<(), PostError> {
        let comment = if self.options.comment_out_frames { ";" } else { "" };
        let resolver = em.resolver();
        let robot = em.robot();
        let mut lines = Vec::new();

        for (name, slot) in self.bases.iter().filter(|&(_, slot)| slot > 0) {
            // An external TCP's base register holds the stationary tool.
            let resolved = if self.is_external_tool(name) {
                robot.tool(name).map(|t| resolver.resolve_tool(t)).transpose()?
            } else {
                robot.base(name).map(|b| resolver.resolve_base(b)).transpose()?
            };
            if let Some(resolved) = resolved {
                lines.push(format!(
                    "{comment}BASE_DATA[{slot}]={{{}}}",
                    frame_string(&resolved.transform)
                ));
            }
        }
        for (name, slot) in self.tools.iter().filter(|&(_, slot)| slot > 0) {
            let resolved = if self.is_external_base(name) {
                robot.base(name).map(|b| resolver.resolve_base(b)).transpose()?
            } else {
                robot.tool(name).map(|t| resolver.resolve_tool(t)).transpose()?
            };
            if let Some(resolved) = resolved {
                lines.push(format!(
                    "{comment}TOOL_DATA[{slot}]={{{}}}",
                    frame_string(&resolved.transform)
                ));
            }
        }

        if !lines.is_empty() {
            for line in lines {
                em.write(SRC, line);
            }
            em.state.blank(SRC);
        }
        Ok(())
    }

    fn write_routine(
        &mut self,
        em: &mut Emitter<'_>,
        name: &str,
        statements: &[Statement],
        is_main: bool,
    ) -> Result<(), PostError> {
        em.write(SRC, format!("DEF {name}()"));
        {
            let mut body = em.indented();
            if is_main {
                self.write_frame_data(&mut body)?;
            }
            self.write_init(&mut body);
            body.state.blank(SRC);
            body.write(SRC, ";COMMANDS");
            emit_scope(self, &mut body, statements)?;
        }
        em.write(SRC, "END");
        Ok(())
    }

    fn write_init(&self, em: &mut Emitter<'_>) {
        const INIT: [&str; 3] = [
            "GLOBAL INTERRUPT DECL 3 WHEN $STOPMESS==TRUE DO IR_STOPM()",
            "INTERRUPT ON 3",
            "BAS (#INITMOV,0 )",
        ];
        if !self.options.inline_form {
            for line in INIT {
                em.write(SRC, line);
            }
            return;
        }
        em.write(SRC, ";FOLD INI;%{PE}");
        {
            let mut ini = em.indented();
            ini.write(SRC, ";FOLD BASISTECH INI");
            {
                let mut basis = ini.indented();
                for line in INIT {
                    basis.write(SRC, line);
                }
            }
            ini.write(SRC, ";ENDFOLD (BASISTECH INI)");
            ini.write(SRC, ";FOLD USER INI");
            ini.write(SRC, ";Make your modifications here");
            ini.state.blank(SRC);
            ini.write(SRC, ";ENDFOLD (USER INI)");
        }
        em.write(SRC, ";ENDFOLD (INI)");
    }

    /// Writes `lines`, wrapped in a fold opened by `header` in inline form.
    fn write_folded(
        &self,
        em: &mut Emitter<'_>,
        header: impl FnOnce() -> String,
        lines: &[String],
    ) {
        if !self.options.inline_form {
            for line in lines {
                em.write(SRC, line);
            }
            return;
        }
        em.write(SRC, format!(";FOLD {}", header()));
        {
            let mut inner = em.indented();
            for line in lines {
                inner.write(SRC, line);
            }
        }
        em.write(SRC, ";ENDFOLD");
    }

    /// Declares `target` in the data list the first time it is assigned.
    ///
    /// The data list is shared by all routines, so one name cannot carry two
    /// types; a second type is reported and left undeclared.
    fn declare(&mut self, em: &mut Emitter<'_>, target: &str, expression: &str) {
        let program = em.program;
        let routine = em.routine();
        let variable = routine
            .and_then(|r| r.variable(target))
            .or_else(|| program.global(target));
        let data_type = match variable.map(|v| &v.value) {
            Some(Value::Bool(_)) => Some("BOOL"),
            Some(Value::Int(_)) => Some("INT"),
            Some(Value::Real(_)) => Some("REAL"),
            Some(Value::Str(_)) | None => None,
        };

        match (self.declared.get(target).copied(), data_type) {
            (Some(Some(existing)), Some(wanted)) if existing != wanted => {
                let routine = routine.map_or("", |r| r.name.as_str());
                em.state.warn(format!(
                    "Variable {target} is declared as {existing} but used as {wanted} in \
                     {routine}; keeping {existing}"
                ));
            }
            (Some(Some(_)), _) | (Some(None), None) => {}
            (None | Some(None), Some(wanted)) => {
                em.write(DECLARATIONS, format!("DECL {wanted} {target}"));
                self.declared.insert(target.to_string(), Some(wanted));
            }
            (None, None) => {
                let problem = if variable.is_some() {
                    "Unsupported data type of"
                } else {
                    "Unknown variable"
                };
                em.state.warn(format!(
                    "{problem} {target} in assign statement : {target}={expression}"
                ));
                self.declared.insert(target.to_string(), None);
            }
        }
    }

    // --- Handlers ---

    fn comment(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::Comment { text } = &s.kind else {
            return Ok(());
        };
        match text.strip_prefix("USR_CMD") {
            Some(raw) => em.write(SRC, raw.trim_start()),
            None if self.options.inline_form => self.write_folded(
                em,
                || format!(";{text};{FOLD_TAG},%CCOMMENT,%VNORMAL,%P 2:{text}"),
                &[],
            ),
            None => em.write(SRC, format!(";{text}")),
        }
        Ok(())
    }

    fn delay(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Delay { seconds } = s.kind {
            let time = general(seconds);
            self.write_folded(
                em,
                || format!("WAIT Time={time} sec;{FOLD_TAG},%CWAIT,%VWAIT,%P 3:{time}"),
                &[format!("WAIT SEC {time}")],
            );
        }
        Ok(())
    }

    fn halt(&mut self, em: &mut Emitter<'_>, _: &Statement) -> Result<(), PostError> {
        em.write(SRC, "HALT");
        Ok(())
    }

    fn ret(&mut self, em: &mut Emitter<'_>, _: &Statement) -> Result<(), PostError> {
        em.write(SRC, "RETURN");
        Ok(())
    }

    fn brk(&mut self, em: &mut Emitter<'_>, _: &Statement) -> Result<(), PostError> {
        em.write(SRC, "EXIT");
        Ok(())
    }

    fn call(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::Call { routine } = &s.kind {
            em.write(SRC, format!("{routine}()"));
        }
        Ok(())
    }

    fn branch(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::If(branch) = &s.kind else {
            return Ok(());
        };
        em.write(SRC, format!("IF {} THEN", self.expr.rewrite(&branch.condition)));
        emit_nested(self, em, &branch.then_scope)?;
        if !branch.else_ifs.is_empty() {
            em.state.info(format!(
                "Converting ELSEIF branches of `{}` to nested IF statements.",
                s.name
            ));
        }
        self.else_chain(em, &branch.else_ifs, &branch.else_scope)?;
        em.write(SRC, "ENDIF");
        Ok(())
    }

    /// KRL has no `ELSEIF`: each branch becomes an `IF` nested in the previous `ELSE`.
    fn else_chain(
        &mut self,
        em: &mut Emitter<'_>,
        else_ifs: &[ConditionalScope],
        else_scope: &[Statement],
    ) -> Result<(), PostError> {
        let Some((first, rest)) = else_ifs.split_first() else {
            if !else_scope.is_empty() {
                em.write(SRC, "ELSE");
                emit_nested(self, em, else_scope)?;
            }
            return Ok(());
        };
        em.write(SRC, "ELSE");
        let mut inner = em.indented();
        inner.write(SRC, format!("IF {} THEN", self.expr.rewrite(&first.condition)));
        emit_nested(self, &mut inner, &first.scope)?;
        self.else_chain(&mut inner, rest, else_scope)?;
        inner.write(SRC, "ENDIF");
        Ok(())
    }

    fn repeat(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::While(body) = &s.kind {
            em.write(SRC, format!("WHILE {}", self.expr.rewrite(&body.condition)));
            emit_nested(self, em, &body.scope)?;
            em.write(SRC, "ENDWHILE");
        }
        Ok(())
    }

    fn switch(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::SwitchCase(switch) = &s.kind else {
            return Ok(());
        };
        em.write(SRC, format!("SWITCH {}", self.expr.rewrite(&switch.condition)));
        {
            let mut cases = em.indented();
            for case in &switch.cases {
                if case.is_default() {
                    cases.write(SRC, "DEFAULT");
                } else {
                    cases.write(SRC, format!("CASE {}", self.expr.rewrite(&case.condition)));
                }
                emit_nested(self, &mut cases, &case.scope)?;
            }
        }
        em.write(SRC, "ENDSWITCH");
        Ok(())
    }

    fn assign(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let StatementKind::SetProperty { target, expression } = &s.kind else {
            return Ok(());
        };
        self.declare(em, target, expression);
        em.write(SRC, format!("{target}={}", self.expr.rewrite(expression)));
        Ok(())
    }

    fn set_output(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::SetDigitalOutput { port, value } = s.kind {
            let state = krl_bool(value);
            self.write_folded(
                em,
                || {
                    format!(
                        "OUT {port} '' State={state} ;{FOLD_TAG},%COUT,%VOUTX,\
                         %P 2:{port}, 3:, 5:{state}, 6:"
                    )
                },
                &[format!("$OUT[{port}]={state}")],
            );
        }
        Ok(())
    }

    fn wait_input(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        if let StatementKind::WaitDigitalInput { port, value } = s.kind {
            let not = if value { "" } else { "NOT " };
            self.write_folded(
                em,
                || {
                    format!(
                        "WAIT FOR ({not}IN {port} '');{FOLD_TAG},%CEXT_WAIT_FOR,\
                         %VEXT_WAIT_FOR,%P 2:, 4:{}, 5:$IN, 6:{port}, 7:, 9:",
                        not.trim_end()
                    )
                },
                &[format!("WAIT FOR ({not}$IN[{port}])")],
            );
        }
        Ok(())
    }

    fn define_frame(&mut self, em: &mut Emitter<'_>, s: &Statement) -> Result<(), PostError> {
        let (kind, define) = match &s.kind {
            StatementKind::DefineBase(define) => (FrameKind::Base, define),
            StatementKind::DefineTool(define) => (FrameKind::Tool, define),
            _ => return Ok(()),
        };
        let slots = match kind {
            FrameKind::Base => &self.bases,
            FrameKind::Tool => &self.tools,
        };
        let register = match slots.get(&define.frame) {
            Some(slot) => format!("{}[{slot}]", slots.label()),
            None => define.frame.clone(),
        };
        let value = frame_string(&absolute_definition(em, kind, define)?);
        if define.relative {
            em.write(SRC, format!("{register}={register}:{{{value}}}"));
        } else {
            em.write(SRC, format!("{register}={{{value}}}"));
        }
        // A new register value only takes effect once it is selected again.
        match kind {
            FrameKind::Base => em.state.modes.base.reset(),
            FrameKind::Tool => em.state.modes.tool.reset(),
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
            for motion in path_motions(s, path) {
                self.write_motion(em, s, &motion, false)?;
            }
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
        let base_name = m.base.as_deref().unwrap_or(NULL_FRAME);
        let tool_name = m.tool.as_deref().unwrap_or(NULL_FRAME);

        let (base_key, tool_key, ipo, target) = match Self::roles(em, base_name, tool_name) {
            FrameRoles::Standard => (base_name, tool_name, "#BASE", m.target),
            FrameRoles::ExternalTcp => (tool_name, base_name, "#TCP", m.target.inverse()),
            FrameRoles::Unsupported(reason) => {
                return Err(PostError::UnsupportedGeometry {
                    statement: s.name.clone(),
                    reason,
                });
            }
        };
        let unmapped = |kind, frame: &str| PostError::UnmappedFrame {
            statement: s.name.clone(),
            kind,
            frame: frame.to_string(),
        };
        let baseno = self
            .bases
            .get(base_key)
            .ok_or_else(|| unmapped(FrameKind::Base, base_key))?;
        let toolno = self
            .tools
            .get(tool_key)
            .ok_or_else(|| unmapped(FrameKind::Tool, tool_key))?;

        let name = em.state.names.allocate(&m.position_name)?;
        let e6pos = format!("X{name}");
        em.write(
            POSITIONS,
            format!(
                "DECL E6POS {e6pos}={{{},S {},T {},{}}}",
                frame_string(&target),
                status(m.configuration),
                turn(&m.joints),
                external_axes(&m.external_joints)
            ),
        );

        let registers = Registers {
            baseno,
            toolno,
            ipo,
            external: ipo == "#TCP",
        };
        if self.options.inline_form {
            self.write_inline_motion(em, &name, m, joint, &registers);
        } else {
            self.write_plain_motion(em, &e6pos, m, joint, &registers);
        }
        Ok(())
    }

    /// `$TOOL`, `$BASE` and friends set directly, each only when it changes.
    fn write_plain_motion(
        &self,
        em: &mut Emitter<'_>,
        e6pos: &str,
        m: &Motion,
        joint: bool,
        registers: &Registers,
    ) {
        let Registers {
            baseno,
            toolno,
            ipo,
            ..
        } = *registers;
        let tool = if toolno == 0 {
            "$TOOL=$NULLFRAME".to_string()
        } else {
            format!("$TOOL=TOOL_DATA[{toolno}]")
        };
        let load = if toolno == 0 {
            vec![
                "$LOAD.M=$DEF_L_M".to_string(),
                "$LOAD.CM=$DEF_L_CM".to_string(),
                "$LOAD.J=$DEF_L_J".to_string(),
            ]
        } else {
            vec![format!("$LOAD=LOAD_DATA[{toolno}]")]
        };
        let base = if baseno == 0 {
            "$BASE=$WORLD".to_string()
        } else {
            format!("$BASE=BASE_DATA[{baseno}]")
        };
        let ipo = format!("$IPO_MODE={ipo}");
        let speed = if joint {
            format!("$VEL_AXIS[1]={}", fixed(m.joint_speed * 100.0, 1))
        } else {
            format!("$VEL.CP={}", fixed(m.speed / 1000.0, 2))
        };
        let blended = m.accuracy.is_blended();
        let apo = format!("$APO.CDIS={}", fixed(m.accuracy.value, 1));
        let command = if joint { "PTP" } else { "LIN" };

        if self.options.spline_motions {
            let mut params = vec![speed, tool, base, ipo];
            params.extend(load);
            if blended {
                params.push(format!("{apo} C_SPL"));
            }
            em.write(SRC, format!("S{command} {e6pos} WITH {}", params.join(", ")));
            return;
        }

        let modes = &mut em.state.modes;
        let mut lines = Vec::new();
        if modes.first("bwdstart") {
            lines.push("$BWDSTART=FALSE".to_string());
        }
        if modes.tool.update(tool.clone()) {
            lines.push(tool);
            lines.extend(load);
        }
        if modes.base.update(base.clone()) {
            lines.push(base);
        }
        if modes.interpolation.update(ipo.clone()) {
            lines.push(ipo);
        }
        let speed_changed = if joint {
            modes.joint_speed.update(speed.clone())
        } else {
            modes.cartesian_speed.update(speed.clone())
        };
        if speed_changed {
            lines.push(speed);
        }
        if blended && modes.accuracy.update(apo.clone()) {
            lines.push(apo);
        }
        for line in lines {
            em.write(SRC, line);
        }
        let approx = if blended { " C_DIS" } else { "" };
        em.write(SRC, format!("{command} {e6pos}{approx}"));
    }

    /// A motion fold reading its parameters from `FDAT` plus `PDAT` (joint)
    /// or `LDAT` (linear) records named after the position.
    fn write_inline_motion(
        &self,
        em: &mut Emitter<'_>,
        name: &str,
        m: &Motion,
        joint: bool,
        registers: &Registers,
    ) {
        let Registers {
            baseno,
            toolno,
            ipo,
            external,
        } = *registers;
        let (e6pos, fdat, pdat, ldat) = (
            format!("X{name}"),
            format!("F{name}"),
            format!("P{name}"),
            format!("L{name}"),
        );
        let blended = m.accuracy.is_blended();
        let spline = self.options.spline_motions;

        em.write(
            POSITIONS,
            format!(
                "DECL FDAT {fdat}={{TOOL_NO {toolno},BASE_NO {baseno},IPO_FRAME {ipo},\
                 POINT2[] \" \",TQ_STATE FALSE}}"
            ),
        );
        let (command, velocity, motion_data) = if joint {
            let velocity = m.joint_speed * 100.0;
            em.write(
                POSITIONS,
                format!(
                    "DECL PDAT {pdat}={{VEL {},ACC 100.000,APO_DIST {},GEAR_JERK 100.000,\
                     EXAX_IGN 0}}",
                    fixed(velocity, 3),
                    fixed(m.accuracy.value, 3)
                ),
            );
            ("PTP", velocity, &pdat)
        } else {
            let velocity = m.speed / 1000.0;
            let acc = fixed(acceleration_percent(m, em.robot().max_cartesian_accel), 3);
            em.write(
                POSITIONS,
                format!(
                    "DECL LDAT {ldat}={{VEL {},ACC {acc},APO_DIST {},APO_FAC 50.0000,\
                     AXIS_VEL 100.000,AXIS_ACC {acc},ORI_TYP #VAR,CIRC_TYP #BASE,\
                     JERK_FAC 50.0000,GEAR_JERK 50.0000,EXAX_IGN 0}}",
                    fixed(velocity, 5),
                    fixed(m.accuracy.value, 3)
                ),
            );
            ("LIN", velocity, &ldat)
        };

        let approx = match (blended, spline) {
            (false, _) => "",
            (true, true) => "C_SPL",
            (true, false) => "C_DIS",
        };
        let (form, unit) = if joint { ("PTP", "%") } else { ("LIN", "m/s") };
        let header = {
            let command = if spline {
                format!("S{command}")
            } else {
                command.to_string()
            };
            let words = [
                command.clone(),
                name.to_string(),
                if blended { "CONT" } else { "" }.to_string(),
                format!("Vel={} {unit}", general(velocity)),
                motion_data.clone(),
                format!("Tool[{toolno}]"),
                format!("Base[{baseno}]"),
                if external { "extTCP" } else { "" }.to_string(),
            ];
            let words: Vec<_> = words.into_iter().filter(|w| !w.is_empty()).collect();
            let (group, variant) = if spline {
                ("%CSPLINE", format!("%V{command}_SB,%P 1:{command}_SB"))
            } else {
                ("%CMOVE", format!("%V{form},%P 1:{form}"))
            };
            format!(
                "{};{FOLD_TAG},{group},{variant}, 2:{name}, 3:{approx}, 5:{}, 7:{motion_data}",
                words.join(" "),
                general(velocity)
            )
        };

        let mut lines = Vec::new();
        if spline {
            let mut params = Vec::new();
            if joint {
                params.push(format!("$VEL_AXIS[1]=SVEL_JOINT({})", fixed(velocity, 0)));
            } else {
                params.push(format!("$VEL=SVEL_CP({}, ,{ldat})", fixed(velocity, 2)));
            }
            params.push(format!("$TOOL=STOOL2({fdat})"));
            params.push(format!("$BASE=SBASE({fdat}.BASE_NO)"));
            params.push(format!("$IPO_MODE=SIPO_MODE({fdat}.IPO_FRAME)"));
            params.push(format!("$LOAD=SLOAD({fdat}.TOOL_NO)"));
            if joint {
                params.push(format!("$ACC_AXIS[1]=SACC_JOINT({pdat})"));
                params.push(format!("$APO=SAPO_PTP({pdat})"));
                params.push(format!("$GEAR_JERK[1]=SGEAR_JERK({pdat})"));
            } else {
                params.push(format!("$ACC=SACC_CP({ldat})"));
                params.push(format!("$APO=SAPO({ldat})"));
                params.push(format!("$JERK=SJERK({ldat})"));
            }
            let tail = if blended { " C_SPL" } else { "" };
            lines.push(format!("S{command} {e6pos} WITH {}{tail}", params.join(", ")));
        } else {
            if em.state.modes.first("bwdstart") {
                lines.push("$BWDSTART=FALSE".to_string());
            }
            lines.push(format!("FDAT_ACT={fdat}"));
            if joint {
                lines.push(format!("PDAT_ACT={pdat}"));
                lines.push(format!("BAS(#PTP_PARAMS,{})", fixed(velocity, 0)));
            } else {
                lines.push(format!("LDAT_ACT={ldat}"));
                lines.push(format!("BAS(#CP_PARAMS,{})", fixed(velocity, 2)));
            }
            let tail = if blended { " C_DIS" } else { "" };
            lines.push(format!("{command} {e6pos}{tail}"));
        }
        self.write_folded(em, || header, &lines);
    }
}

/// Register numbers and interpolation frame selected for one motion.
#[derive(Clone, Copy, Debug)]
struct Registers {
    baseno: u32,
    toolno: u32,
    ipo: &'static str,
    external: bool,
}

/// Cartesian acceleration as a percentage of the robot's limit, 100 when the
/// motion uses the controller default.
fn acceleration_percent(m: &Motion, max_cartesian_accel: f64) -> f64 {
    m.acceleration
        .map(|a| a / max_cartesian_accel * 100.0)
        .filter(|pct| pct.is_finite())
        .unwrap_or(100.0)
}

impl Dialect for Krl {
    const MANUFACTURER: &'static str = "KUKA";
    const EXTENSION: &'static str = "src";

    fn handlers(&self) -> &HandlerTable<Self> {
        &self.handlers
    }

    fn layout(&self) -> Vec<BufferSpec> {
        vec![
            BufferSpec::scoped(SRC),
            BufferSpec::fixed(DAT_HEADER, 0),
            BufferSpec::fixed(DECLARATIONS, 1),
            BufferSpec::fixed(POSITIONS, 1),
            BufferSpec::fixed(DAT_FOOTER, 0),
        ]
    }

    fn reset(&mut self) {
        self.bases = SlotMap::new("BASE_DATA", self.options.base_slots);
        self.tools = SlotMap::new("TOOL_DATA", self.options.tool_slots);
        self.external_pairs.clear();
        self.declared.clear();
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
        self.map_frames(em);

        let unit = em.unit_name.clone();
        em.write(DAT_HEADER, format!("DEFDAT {unit}"));

        em.begin_routine(&program.main);
        self.write_routine(em, &unit, &program.main.statements, true)?;
        for routine in &program.routines {
            em.state.blank(SRC);
            em.begin_routine(routine);
            self.write_routine(em, &routine.name, &routine.statements, false)?;
        }

        em.write(DAT_FOOTER, "ENDDAT");
        Ok(())
    }

    fn files(&self, state: &EmissionState, target: &Path) -> Vec<OutputFile> {
        vec![
            OutputFile {
                path: sibling(target, "dat"),
                contents: state.concat(&[DAT_HEADER, DECLARATIONS, POSITIONS, DAT_FOOTER]),
            },
            OutputFile {
                path: sibling(target, Self::EXTENSION),
                contents: state.concat(&[SRC]),
            },
        ]
    }
}

fn krl_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// `X ..,Y ..,Z ..,A ..,B ..,C ..` with millimetres and ZYX degrees.
pub fn frame_string(transform: &DAffine3) -> String {
    let pose = Pose::from_transform(transform);
    let abc = pose.abc_degrees();
    format!(
        "X {},Y {},Z {},A {},B {},C {}",
        fixed(pose.position.x, 3),
        fixed(pose.position.y, 3),
        fixed(pose.position.z, 3),
        fixed(abc.x, 4),
        fixed(abc.y, 4),
        fixed(abc.z, 4)
    )
}

fn status(configuration: u8) -> u32 {
    STATUS_MAP
        .get(configuration as usize)
        .copied()
        .unwrap_or(0)
}

/// Sign bits of the first six joints.
fn turn(joints: &[f64]) -> u32 {
    if joints.len() < 6 {
        return 0;
    }
    joints
        .iter()
        .take(6)
        .enumerate()
        .filter(|(_, j)| **j < 0.0)
        .map(|(i, _)| 1 << i)
        .sum()
}

fn external_axes(values: &[f64]) -> String {
    (0..6)
        .map(|i| match values.get(i) {
            Some(v) => format!("E{} {}", i + 1, fixed(*v, 3)),
            None => format!("E{} 0", i + 1),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// The value a `DefineBase`/`DefineTool` writes, in the register's space.
fn absolute_definition(
    em: &Emitter<'_>,
    kind: FrameKind,
    define: &DefineFrame,
) -> Result<DAffine3, PostError> {
    let Some(node) = define.node.filter(|_| !define.relative) else {
        return Ok(define.position);
    };
    let world = em
        .cell
        .node(node)
        .map(|n| n.world)
        .ok_or(PostError::UnknownNode(node))?;
    let reference = match kind {
        FrameKind::Base => em.robot().world,
        FrameKind::Tool => em
            .cell
            .node(em.robot().flange)
            .map(|n| n.world)
            .ok_or(PostError::UnknownNode(em.robot().flange))?,
    };
    Ok(reference.inverse() * world * define.position)
}
