#![allow(dead_code)]

use glam::{DAffine3, DVec3};
use robot_post::frame::transform_from_xyzwpr;
use robot_post::{Cell, Frame, Motion, Node, Program, Robot, Routine, Statement, StatementKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ROBOT_BASE: u32 = 1;
pub const FLANGE: u32 = 2;
pub const TABLE: u32 = 3;

/// A fresh directory under the system temp dir.
pub fn out_dir(tag: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("robot-post-{tag}-{}-{n}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

/// Robot at the cell origin, flange at (800, 0, 1200), a table beside it.
pub fn cell() -> Cell {
    let mut cell = Cell::new();
    cell.add_node(ROBOT_BASE, Node::new("RobotBase", None, DAffine3::IDENTITY));
    cell.add_node(
        FLANGE,
        Node::new(
            "Flange",
            Some(ROBOT_BASE),
            DAffine3::from_translation(DVec3::new(800.0, 0.0, 1200.0)),
        ),
    );
    cell.add_node(
        TABLE,
        Node::new(
            "Table",
            None,
            DAffine3::from_translation(DVec3::new(0.0, 1500.0, 0.0)),
        ),
    );
    cell
}

/// A robot with a flange-mounted part and a table-mounted spindle.
pub fn robot() -> Robot {
    let mut robot = Robot::new("KR6", DAffine3::IDENTITY, FLANGE);
    robot.bases.push(Frame::attached("Table", TABLE, DAffine3::IDENTITY));
    robot.bases.push(Frame::attached("Part", FLANGE, DAffine3::IDENTITY));
    robot
        .tools
        .push(Frame::attached("Gripper", FLANGE, DAffine3::from_translation(DVec3::Z * 150.0)));
    robot.tools.push(Frame::attached("Spindle", TABLE, DAffine3::IDENTITY));
    robot
}

pub fn program(statements: Vec<Statement>) -> Program {
    let mut main = Routine::new("Main");
    main.statements = statements;
    Program::new(main, robot())
}

pub fn linear(name: &str, position: &str, x: f64, z: f64, speed: f64) -> Statement {
    let motion = Motion {
        speed,
        ..Motion::new(position, transform_from_xyzwpr(x, 0.0, z, 0.0, 0.0, 0.0))
    };
    Statement::new(name, StatementKind::LinearMotion(motion))
}

pub fn linear_with(name: &str, motion: Motion) -> Statement {
    Statement::new(name, StatementKind::LinearMotion(motion))
}

pub fn comment(text: &str) -> Statement {
    Statement::new(
        "Comment",
        StatementKind::Comment {
            text: text.to_string(),
        },
    )
}
