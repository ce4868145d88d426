//! Resolution of base and tool frames into the spaces a controller expects.
//!
//! Bases resolve to robot world, tools to the robot flange. Both branch on what
//! the frame's node is attached to: nothing, the robot flange, a positioner or
//! the static cell. [`FrameResolver::frame_roles`] then tells a dialect whether
//! a base/tool pair is an ordinary pair, an external TCP pair (stationary tool,
//! moving workpiece) or an arrangement that cannot be expressed at all.

use crate::cell::{Cell, Frame, FrameKind, NodeId, PositionerId, Robot};
use crate::error::PostError;
use glam::{DAffine3, DQuat, DVec3, EulerRot};

/// What a frame's node hangs off in the cell hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// No node: the stored transform is used as is.
    Detached,
    /// The node sits on the robot flange and moves with the robot.
    Flange,
    /// The node is carried by a positioner.
    Positioner(PositionerId),
    /// The node is fixed in the cell.
    Stationary,
}

/// A frame transform in its controller space together with its attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedFrame {
    pub transform: DAffine3,
    pub attachment: Attachment,
}

/// How a motion's base and tool relate to the robot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameRoles {
    /// The robot carries the tool, the base is fixed or on a positioner.
    Standard,
    /// The tool is stationary and the robot carries the workpiece.
    ///
    /// Dialects exchange the frames' register roles and invert the target pose.
    ExternalTcp,
    /// Neither role assignment is geometrically correct.
    Unsupported(String),
}

/// Resolves frames of one robot against its cell.
#[derive(Clone, Copy, Debug)]
pub struct FrameResolver<'a> {
    cell: &'a Cell,
    robot: &'a Robot,
}

impl<'a> FrameResolver<'a> {
    pub fn new(cell: &'a Cell, robot: &'a Robot) -> Self {
        Self { cell, robot }
    }

    pub fn robot(&self) -> &'a Robot {
        self.robot
    }

    fn node_world(&self, id: NodeId) -> Result<DAffine3, PostError> {
        self.cell
            .node(id)
            .map(|n| n.world)
            .ok_or(PostError::UnknownNode(id))
    }

    /// Classifies where `frame` is attached.
    pub fn attachment(&self, frame: &Frame) -> Attachment {
        let Some(node) = frame.node else {
            return Attachment::Detached;
        };
        if self.cell.is_within(node, self.robot.flange) {
            Attachment::Flange
        } else if let Some((pid, _)) = self.cell.positioner_of(node) {
            Attachment::Positioner(pid)
        } else {
            Attachment::Stationary
        }
    }

    /// Looks up a named frame on the robot.
    pub fn lookup(&self, kind: FrameKind, name: &str) -> Result<&'a Frame, PostError> {
        self.robot
            .frame(kind, name)
            .ok_or_else(|| PostError::UnknownFrame {
                kind,
                name: name.to_string(),
                robot: self.robot.name.clone(),
            })
    }

    /// Transform of `base` relative to robot world.
    pub fn resolve_base(&self, base: &Frame) -> Result<ResolvedFrame, PostError> {
        let attachment = self.attachment(base);
        let transform = match (attachment, base.node) {
            (Attachment::Detached, _) | (_, None) => base.transform,
            (Attachment::Flange, Some(node)) => {
                let flange = self.node_world(self.robot.flange)?;
                flange.inverse() * self.node_world(node)? * base.transform
            }
            (Attachment::Positioner(pid), Some(node)) => {
                let reference = match self.cell.positioners.get(pid as usize) {
                    Some(positioner) => self.node_world(positioner.flange)?,
                    None => self.robot.world,
                };
                reference.inverse() * self.node_world(node)? * base.transform
            }
            (Attachment::Stationary, Some(node)) => {
                self.robot.world.inverse() * self.node_world(node)? * base.transform
            }
        };
        Ok(ResolvedFrame {
            transform,
            attachment,
        })
    }

    /// Transform of `tool` relative to the robot flange.
    ///
    /// A stationary tool resolves relative to robot world instead, which is
    /// the value external TCP registers hold.
    pub fn resolve_tool(&self, tool: &Frame) -> Result<ResolvedFrame, PostError> {
        let attachment = self.attachment(tool);
        let transform = match (attachment, tool.node) {
            (Attachment::Detached, _) | (_, None) => tool.transform,
            (Attachment::Flange, Some(node)) => {
                let flange = self.node_world(self.robot.flange)?;
                flange.inverse() * self.node_world(node)? * tool.transform
            }
            (_, Some(node)) => {
                self.robot.world.inverse() * self.node_world(node)? * tool.transform
            }
        };
        Ok(ResolvedFrame {
            transform,
            attachment,
        })
    }

    /// Resolves a frame by kind.
    pub fn resolve(&self, kind: FrameKind, frame: &Frame) -> Result<ResolvedFrame, PostError> {
        match kind {
            FrameKind::Base => self.resolve_base(frame),
            FrameKind::Tool => self.resolve_tool(frame),
        }
    }

    /// Classifies a base/tool pair. `None` stands for the null frame.
    ///
    /// A missing or detached tool counts as carried by the robot. A detached
    /// base counts as carried by the robot only when the tool is stationary.
    pub fn frame_roles(&self, base: Option<&Frame>, tool: Option<&Frame>) -> FrameRoles {
        let tool_on_robot = tool.is_none_or(|t| {
            matches!(self.attachment(t), Attachment::Detached | Attachment::Flange)
        });
        let base_attachment = base.map(|b| self.attachment(b));
        let base_on_robot = base_attachment == Some(Attachment::Flange);

        match (tool_on_robot, base_on_robot) {
            (true, false) => FrameRoles::Standard,
            (true, true) => FrameRoles::Unsupported(
                "the robot carries both the base and the tool".to_string(),
            ),
            (false, _) => match base_attachment {
                None | Some(Attachment::Detached) | Some(Attachment::Flange) => {
                    FrameRoles::ExternalTcp
                }
                Some(_) => FrameRoles::Unsupported(
                    "a stationary tool cannot reach a base that the robot does not carry"
                        .to_string(),
                ),
            },
        }
    }
}

/// Builds a transform from a position and `W,P,R` angles in degrees.
///
/// The rotation is `Rz(r) * Ry(p) * Rx(w)`, the convention used by `A,B,C`
/// (with `A = r`, `B = p`, `C = w`) as well.
pub fn transform_from_xyzwpr(x: f64, y: f64, z: f64, w: f64, p: f64, r: f64) -> DAffine3 {
    let rotation = DQuat::from_euler(EulerRot::ZYX, r.to_radians(), p.to_radians(), w.to_radians());
    DAffine3::from_rotation_translation(rotation, DVec3::new(x, y, z))
}

/// A rigid transform split into position and orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Pose {
    pub fn from_transform(transform: &DAffine3) -> Self {
        let (_, rotation, position) = transform.to_scale_rotation_translation();
        // q and -q are the same rotation; keep w >= 0 so printed values are stable.
        let rotation = if rotation.w < 0.0 { -rotation } else { rotation };
        Self { position, rotation }
    }

    /// `(W, P, R)` in degrees: rotations about X, Y and Z.
    pub fn wpr_degrees(&self) -> DVec3 {
        let (rz, ry, rx) = self.rotation.to_euler(EulerRot::ZYX);
        DVec3::new(rx.to_degrees(), ry.to_degrees(), rz.to_degrees())
    }

    /// `(A, B, C)` in degrees: rotations about Z, Y and X.
    pub fn abc_degrees(&self) -> DVec3 {
        let wpr = self.wpr_degrees();
        DVec3::new(wpr.z, wpr.y, wpr.x)
    }

    /// Rotation vector: unit axis scaled by the angle in radians.
    pub fn rotation_vector(&self) -> DVec3 {
        let (axis, angle) = self.rotation.to_axis_angle();
        if angle.abs() < 1e-12 {
            DVec3::ZERO
        } else {
            axis * angle
        }
    }
}
