//! The statement tree a dialect translates.
//!
//! A [`Program`] owns its routines and the robot that runs them. Statements
//! nest through [`Scope`]s and never refer back to their parents.

use crate::cell::Robot;
use crate::error::PostError;
use glam::DAffine3;
use serde::{Deserialize, Serialize};

/// An ordered sequence of statements owned by a routine or a parent statement.
pub type Scope = Vec<Statement>;

/// The complete, engine-agnostic definition of a robot program.
///
/// This structure is read-only input for every dialect. It holds the entry
/// routine, the callable subroutines and the robot that executes them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    /// The entry point routine.
    pub main: Routine,

    /// Callable subroutines, translated in this order after `main`.
    pub routines: Vec<Routine>,

    /// The robot executing the program, including its base and tool frames.
    pub robot: Robot,

    /// Component-level variables that assignments may target.
    pub globals: Vec<Variable>,
}

impl Program {
    /// Creates a program with no subroutines and no globals.
    pub fn new(main: Routine, robot: Robot) -> Self {
        Self {
            main,
            routines: Vec::new(),
            robot,
            globals: Vec::new(),
        }
    }

    /// Appends a subroutine after the ones already added.
    pub fn add_routine(&mut self, routine: Routine) {
        self.routines.push(routine);
    }

    /// Main routine first, then subroutines.
    pub fn all_routines(&self) -> impl Iterator<Item = &Routine> {
        std::iter::once(&self.main).chain(self.routines.iter())
    }

    /// Looks up `main` or a subroutine by name.
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.all_routines().find(|r| r.name == name)
    }

    /// Looks up a component-level variable.
    pub fn global(&self, name: &str) -> Option<&Variable> {
        self.globals.iter().find(|v| v.name == name)
    }

    /// Checks that every call targets a routine of this program.
    pub fn validate(&self) -> Result<(), PostError> {
        for routine in self.all_routines() {
            for statement in crate::dispatch::flatten(&routine.statements, Default::default()) {
                if let StatementKind::Call { routine: callee } = &statement.kind
                    && self.routine(callee).is_none()
                {
                    return Err(PostError::UnknownRoutine {
                        caller: routine.name.clone(),
                        callee: callee.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A named scope with its own typed variables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub statements: Scope,
    pub variables: Vec<Variable>,
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a statement to the routine body.
    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    /// Looks up a variable local to this routine.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A typed variable with its initial value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

/// A single node of the statement tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Statement {
    /// Host-assigned statement name, used as a seed for generated names.
    pub name: String,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(name: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn statement_type(&self) -> StatementType {
        self.kind.statement_type()
    }

    /// Base and tool names referenced by a motion statement.
    ///
    /// Returns `None` for statements that do not move the robot.
    pub fn motion_frames(&self) -> Option<(Option<&str>, Option<&str>)> {
        match &self.kind {
            StatementKind::LinearMotion(m) | StatementKind::JointMotion(m) => {
                Some((m.base.as_deref(), m.tool.as_deref()))
            }
            StatementKind::PathMotion(p) => Some((p.base.as_deref(), p.tool.as_deref())),
            _ => None,
        }
    }
}

/// Kind-specific statement payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StatementKind {
    // --- Logic ---
    Comment { text: String },
    /// Wait for a number of seconds.
    Delay { seconds: f64 },
    Halt,
    Return,
    Break,
    Continue,
    Call { routine: String },
    If(IfStatement),
    While(WhileStatement),
    SwitchCase(SwitchStatement),
    /// Assign the result of an expression to a routine or program variable.
    SetProperty { target: String, expression: String },
    Print { message: String },

    // --- I/O ---
    SetDigitalOutput { port: u32, value: bool },
    WaitDigitalInput { port: u32, value: bool },

    // --- Frames ---
    DefineBase(DefineFrame),
    DefineTool(DefineFrame),

    // --- Motion ---
    LinearMotion(Motion),
    JointMotion(Motion),
    /// A dense schema of linearly interpolated points.
    PathMotion(PathMotion),
}

impl StatementKind {
    pub fn statement_type(&self) -> StatementType {
        match self {
            StatementKind::Comment { .. } => StatementType::Comment,
            StatementKind::Delay { .. } => StatementType::Delay,
            StatementKind::Halt => StatementType::Halt,
            StatementKind::Return => StatementType::Return,
            StatementKind::Break => StatementType::Break,
            StatementKind::Continue => StatementType::Continue,
            StatementKind::Call { .. } => StatementType::Call,
            StatementKind::If(_) => StatementType::If,
            StatementKind::While(_) => StatementType::While,
            StatementKind::SwitchCase(_) => StatementType::SwitchCase,
            StatementKind::SetProperty { .. } => StatementType::SetProperty,
            StatementKind::Print { .. } => StatementType::Print,
            StatementKind::SetDigitalOutput { .. } => StatementType::SetDigitalOutput,
            StatementKind::WaitDigitalInput { .. } => StatementType::WaitDigitalInput,
            StatementKind::DefineBase(_) => StatementType::DefineBase,
            StatementKind::DefineTool(_) => StatementType::DefineTool,
            StatementKind::LinearMotion(_) => StatementType::LinearMotion,
            StatementKind::JointMotion(_) => StatementType::JointMotion,
            StatementKind::PathMotion(_) => StatementType::PathMotion,
        }
    }
}

/// Field-less discriminant of [`StatementKind`], used to index handler tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementType {
    Comment,
    Delay,
    Halt,
    Return,
    Break,
    Continue,
    Call,
    If,
    While,
    SwitchCase,
    SetProperty,
    Print,
    SetDigitalOutput,
    WaitDigitalInput,
    DefineBase,
    DefineTool,
    LinearMotion,
    JointMotion,
    PathMotion,
}

impl StatementType {
    pub const COUNT: usize = 19;

    pub const ALL: [StatementType; Self::COUNT] = [
        StatementType::Comment,
        StatementType::Delay,
        StatementType::Halt,
        StatementType::Return,
        StatementType::Break,
        StatementType::Continue,
        StatementType::Call,
        StatementType::If,
        StatementType::While,
        StatementType::SwitchCase,
        StatementType::SetProperty,
        StatementType::Print,
        StatementType::SetDigitalOutput,
        StatementType::WaitDigitalInput,
        StatementType::DefineBase,
        StatementType::DefineTool,
        StatementType::LinearMotion,
        StatementType::JointMotion,
        StatementType::PathMotion,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: String,
    pub then_scope: Scope,
    pub else_ifs: Vec<ConditionalScope>,
    pub else_scope: Scope,
}

/// A condition together with the scope it guards (`ElseIf` branches, switch cases).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConditionalScope {
    pub condition: String,
    pub scope: Scope,
}

impl ConditionalScope {
    pub fn new(condition: impl Into<String>, scope: Scope) -> Self {
        Self {
            condition: condition.into(),
            scope,
        }
    }

    /// A switch case whose condition is the `default` keyword.
    pub fn is_default(&self) -> bool {
        self.condition
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .eq_ignore_ascii_case("default")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WhileStatement {
    pub condition: String,
    pub scope: Scope,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SwitchStatement {
    pub condition: String,
    pub cases: Vec<ConditionalScope>,
}

/// Redefinition of a base or tool frame at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefineFrame {
    pub frame: String,
    pub position: DAffine3,
    /// Apply `position` on top of the current frame value.
    pub relative: bool,
    /// Node the absolute position is expressed in, if any.
    pub node: Option<crate::cell::NodeId>,
}

/// How a motion may round its path near the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyMethod {
    /// Blend within a distance (mm) of the target.
    #[default]
    Distance,
    Time,
    Velocity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub method: AccuracyMethod,
    pub value: f64,
}

impl Accuracy {
    pub fn distance(value: f64) -> Self {
        Self {
            method: AccuracyMethod::Distance,
            value,
        }
    }

    /// A distance blend with a positive radius.
    pub fn is_blended(&self) -> bool {
        self.method == AccuracyMethod::Distance && self.value > 0.0
    }
}

/// A single point-to-point or linear motion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Motion {
    /// Declared position name, used as the seed for the emitted position symbol.
    pub position_name: String,

    /// Target TCP pose in the base frame, millimetres.
    pub target: DAffine3,

    pub base: Option<String>,
    pub tool: Option<String>,

    /// Cartesian speed in mm/s.
    pub speed: f64,

    /// Fraction of maximum joint speed, `(0, 1]`.
    pub joint_speed: f64,

    /// Cartesian acceleration in mm/s², controller default when `None`.
    pub acceleration: Option<f64>,

    pub accuracy: Accuracy,

    /// Robot joint values in degrees.
    pub joints: Vec<f64>,

    /// External axis values (degrees or millimetres).
    pub external_joints: Vec<f64>,

    /// Controller-specific configuration (posture) index.
    pub configuration: u8,
}

impl Motion {
    pub fn new(position_name: impl Into<String>, target: DAffine3) -> Self {
        Self {
            position_name: position_name.into(),
            target,
            base: None,
            tool: None,
            speed: 250.0,
            joint_speed: 1.0,
            acceleration: None,
            accuracy: Accuracy::default(),
            joints: Vec::new(),
            external_joints: Vec::new(),
            configuration: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PathMotion {
    pub base: Option<String>,
    pub tool: Option<String>,
    pub points: Vec<PathPoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathPoint {
    pub target: DAffine3,
    pub speed: f64,
    pub accuracy: Accuracy,
    pub acceleration: Option<f64>,
    pub external_joints: Vec<f64>,
}

impl PathPoint {
    pub fn new(target: DAffine3, speed: f64) -> Self {
        Self {
            target,
            speed,
            accuracy: Accuracy::default(),
            acceleration: None,
            external_joints: Vec::new(),
        }
    }

    /// Expands the point into a linear motion using the path's frames.
    pub fn to_motion(&self, position_name: String, path: &PathMotion) -> Motion {
        Motion {
            base: path.base.clone(),
            tool: path.tool.clone(),
            speed: self.speed,
            acceleration: self.acceleration,
            accuracy: self.accuracy,
            external_joints: self.external_joints.clone(),
            ..Motion::new(position_name, self.target)
        }
    }
}
