//! # robot-post
//!
//! A post-processing layer that renders robot programs into controller languages.
//!
//! It decouples the *Program* (a statement tree recorded against a kinematic cell) from
//! the *Controller* (KUKA KRL, ABB RAPID, Universal Robots URScript), producing plain text
//! files that can be loaded onto the robot or inspected by offline tooling.
//!
//! ```no_run
//! use robot_post::{Cell, DialectKind, PostConfig, Program, Robot, Routine, post_process};
//! use glam::DAffine3;
//! use std::path::Path;
//!
//! let cell = Cell::new();
//! let robot = Robot::new("KR6", DAffine3::IDENTITY, 0);
//! let program = Program::new(Routine::new("Main"), robot);
//! let result = post_process(
//!     DialectKind::Krl,
//!     &cell,
//!     &program,
//!     Path::new("out/Main.src"),
//!     &PostConfig::default(),
//! );
//! assert!(result.success);
//! ```

pub mod cell;
pub mod config;
pub mod dialect;
pub mod dispatch;
pub mod emission;
pub mod error;
pub mod expr;
pub mod format;
pub mod frame;
pub mod names;
pub mod program;
pub mod slots;
pub mod translate;

pub use cell::{Cell, Frame, FrameKind, Node, NodeId, Positioner, PositionerId, Robot};
pub use config::{
    InputMapping, KrlOptions, OutputMapping, PostConfig, RapidOptions, UrScriptOptions,
};
pub use dialect::{Dialect, Krl, OutputFile, Rapid, UrScript};
pub use dispatch::{Handler, HandlerTable};
pub use emission::{EmissionState, Emitter};
pub use error::{Diagnostic, PostError, Severity};
pub use frame::{FrameResolver, FrameRoles, Pose};
pub use names::NameAllocator;
pub use program::*;
pub use translate::{DialectKind, Translation, post_process, translate};
