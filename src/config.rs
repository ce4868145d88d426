//! Post-processor options.
//!
//! Every field has a default, so a host can deserialize a partial document
//! and leave the rest alone.

use serde::{Deserialize, Serialize};

/// Options shared by all dialects plus one section per dialect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    /// Text inserted once per nesting level.
    pub indent: String,

    /// How many candidates the name allocator tries before failing.
    pub name_attempt_limit: usize,

    pub krl: KrlOptions,
    pub rapid: RapidOptions,
    pub urscript: UrScriptOptions,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            name_attempt_limit: crate::names::DEFAULT_ATTEMPT_LIMIT,
            krl: KrlOptions::default(),
            rapid: RapidOptions::default(),
            urscript: UrScriptOptions::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrlOptions {
    /// Emit `SLIN`/`SPTP` with inline parameters instead of `LIN`/`PTP`.
    pub spline_motions: bool,

    /// Wrap commands in `;FOLD` blocks and drive motions from
    /// `FDAT`/`PDAT`/`LDAT` records, as the teach pendant writes them.
    pub inline_form: bool,

    /// Write `BASE_DATA`/`TOOL_DATA` assignments commented out.
    pub comment_out_frames: bool,

    /// Size of the `BASE_DATA` array.
    pub base_slots: u32,

    /// Size of the `TOOL_DATA` array.
    pub tool_slots: u32,
}

impl Default for KrlOptions {
    fn default() -> Self {
        Self {
            spline_motions: false,
            inline_form: false,
            comment_out_frames: false,
            base_slots: 32,
            tool_slots: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapidOptions {
    /// Write an `EIO.cfg` declaring the digital signals the program uses.
    pub signal_config: bool,
}

impl Default for RapidOptions {
    fn default() -> Self {
        Self {
            signal_config: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrScriptOptions {
    /// Emit `set_tcp` whenever the active tool changes.
    pub set_tcp: bool,

    /// Pass `a=` to motion commands. Without it the controller default applies.
    pub use_acceleration: bool,

    /// Tool acceleration for `movel`, m/s².
    pub acceleration: f64,

    /// Joint acceleration for `movej`, rad/s².
    pub joint_acceleration: f64,

    /// Send linear motions that carry joint values as joint lists.
    pub movel_as_joints: bool,

    /// Blend path points with `movep` instead of `movel`.
    pub movep_paths: bool,

    pub input_mapping: InputMapping,
    pub output_mapping: OutputMapping,

    /// Polling period of input waits, seconds.
    pub input_poll: f64,
}

impl Default for UrScriptOptions {
    fn default() -> Self {
        Self {
            set_tcp: true,
            use_acceleration: true,
            acceleration: 1.2,
            joint_acceleration: 1.4,
            movel_as_joints: false,
            movep_paths: false,
            input_mapping: InputMapping::default(),
            output_mapping: OutputMapping::default(),
            input_poll: 0.05,
        }
    }
}

/// Which controller inputs `WaitDigitalInput` ports refer to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMapping {
    #[default]
    Standard,
    Configurable,
    Tool,
    BooleanRegister,
    Euromap,
}

impl InputMapping {
    /// URScript function reading one port.
    pub fn function(self) -> &'static str {
        match self {
            InputMapping::Standard => "get_standard_digital_in",
            InputMapping::Configurable => "get_configurable_digital_in",
            InputMapping::Tool => "get_tool_digital_in",
            InputMapping::BooleanRegister => "read_input_boolean_register",
            InputMapping::Euromap => "get_euromap_input",
        }
    }
}

/// Which controller outputs `SetDigitalOutput` ports refer to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMapping {
    #[default]
    Standard,
    Configurable,
    Tool,
    BooleanRegister,
    Euromap,
}

impl OutputMapping {
    /// URScript function writing one port.
    pub fn function(self) -> &'static str {
        match self {
            OutputMapping::Standard => "set_standard_digital_out",
            OutputMapping::Configurable => "set_configurable_digital_out",
            OutputMapping::Tool => "set_tool_digital_out",
            OutputMapping::BooleanRegister => "write_output_boolean_register",
            OutputMapping::Euromap => "set_euromap_output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_keep_defaults() {
        let options: UrScriptOptions = serde_json::from_str(r#"{"input_mapping": "tool"}"#)
            .unwrap();
        assert_eq!(options.input_mapping, InputMapping::Tool);
        assert_eq!(options.output_mapping, OutputMapping::Standard);
        assert!(options.set_tcp);
    }
}
