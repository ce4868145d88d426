//! The kinematic cell a program runs in.
//!
//! Nodes carry their world transform as supplied by the host. The engine only
//! walks the parent chain to find out what a frame is attached to; it never
//! computes kinematics itself.

use glam::DAffine3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A unique identifier for a node in the cell hierarchy.
pub type NodeId = u32;

/// Index into [`Cell::positioners`].
pub type PositionerId = u16;

/// The kinematic hierarchy surrounding the robot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cell {
    /// All nodes in the cell, indexed by their unique ID.
    pub nodes: HashMap<NodeId, Node>,

    /// Servo-controlled devices other than the robot (turntables, tracks).
    pub positioners: Vec<Positioner>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, node: Node) {
        self.nodes.insert(id, node);
    }

    pub fn add_positioner(&mut self, positioner: Positioner) -> PositionerId {
        self.positioners.push(positioner);
        (self.positioners.len() - 1) as PositionerId
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Iterates `id` and then each of its ancestors up to the root.
    ///
    /// Stops at the first missing parent. A malformed hierarchy with a cycle
    /// is cut off after visiting every node once.
    pub fn lineage(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.nodes.contains_key(&id).then_some(id);
        let mut budget = self.nodes.len();
        std::iter::from_fn(move || {
            let current = next?;
            if budget == 0 {
                return None;
            }
            budget -= 1;
            next = self
                .nodes
                .get(&current)
                .and_then(|n| n.parent)
                .filter(|p| self.nodes.contains_key(p));
            Some(current)
        })
    }

    /// Returns true when `id` is `ancestor` or sits somewhere below it.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.lineage(id).any(|n| n == ancestor)
    }

    /// The nearest positioner that owns `id` or one of its ancestors.
    pub fn positioner_of(&self, id: NodeId) -> Option<(PositionerId, &Positioner)> {
        self.lineage(id)
            .filter_map(|n| self.nodes.get(&n).and_then(|node| node.positioner))
            .find_map(|pid| self.positioners.get(pid as usize).map(|p| (pid, p)))
    }
}

/// A single node of the cell hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    /// The parent node, `None` for nodes hanging off the world.
    pub parent: Option<NodeId>,

    /// World transform of this node in the simulation.
    pub world: DAffine3,

    /// Set on the root node of a positioner's moving chain.
    pub positioner: Option<PositionerId>,
}

impl Node {
    pub fn new(name: impl Into<String>, parent: Option<NodeId>, world: DAffine3) -> Self {
        Self {
            name: name.into(),
            parent,
            world,
            positioner: None,
        }
    }
}

/// A workpiece positioner driven by its own servo controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Positioner {
    pub name: String,
    /// The node that workpieces are mounted on.
    pub flange: NodeId,
}

/// Whether a frame is a base (user frame) or a tool (TCP).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Base,
    Tool,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Base => write!(f, "base"),
            FrameKind::Tool => write!(f, "tool"),
        }
    }
}

/// A named coordinate frame.
///
/// The transform is relative to the attachment node when there is one.
/// Without a node it is already in the frame's target space (robot world for
/// bases, robot flange for tools).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub node: Option<NodeId>,
    pub transform: DAffine3,
}

impl Frame {
    pub fn new(name: impl Into<String>, transform: DAffine3) -> Self {
        Self {
            name: name.into(),
            node: None,
            transform,
        }
    }

    pub fn attached(name: impl Into<String>, node: NodeId, transform: DAffine3) -> Self {
        Self {
            name: name.into(),
            node: Some(node),
            transform,
        }
    }
}

/// The robot executing the program.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Robot {
    pub name: String,

    /// Robot world (base mounting) frame expressed in cell world.
    pub world: DAffine3,

    /// The mounting plate node tools attach to.
    pub flange: NodeId,

    pub bases: Vec<Frame>,
    pub tools: Vec<Frame>,

    /// Fastest joint speed in degrees per second, used for joint-speed factors.
    pub max_joint_speed: f64,

    /// Cartesian acceleration limit in mm/s², used for acceleration percentages.
    pub max_cartesian_accel: f64,
}

impl Robot {
    pub fn new(name: impl Into<String>, world: DAffine3, flange: NodeId) -> Self {
        Self {
            name: name.into(),
            world,
            flange,
            bases: Vec::new(),
            tools: Vec::new(),
            max_joint_speed: 180.0,
            max_cartesian_accel: 10_000.0,
        }
    }

    pub fn base(&self, name: &str) -> Option<&Frame> {
        self.bases.iter().find(|b| b.name == name)
    }

    pub fn tool(&self, name: &str) -> Option<&Frame> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn frame(&self, kind: FrameKind, name: &str) -> Option<&Frame> {
        match kind {
            FrameKind::Base => self.base(name),
            FrameKind::Tool => self.tool(name),
        }
    }
}
