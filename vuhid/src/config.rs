// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use regex::Regex;

use crate::error::{Result, VuhidError};

pub const UHID_PATH: &str = "/dev/uhid";
pub const INPUT_DIR: &str = "/dev/input";
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const EVDEV_NODE_PATTERN: &str = r"^event\d+$";

/// What happens to the report descriptor before it is handed to the kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "kebab-case")]
pub enum DescriptorPolicy {
    #[default]
    /// Default: remap joystick/gamepad usages, keep going on a malformed descriptor
    Lenient,
    /// Remap usages and refuse malformed descriptors
    Strict,
    /// Hand the descriptor to the kernel as is
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub uhid_path: PathBuf,
    pub input_dir: PathBuf,
    pub discovery_timeout: Duration,
    /// Only entries of `input_dir` matching this are queried for their uniq.
    pub node_pattern: Regex,
    pub descriptor_policy: DescriptorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uhid_path: PathBuf::from(UHID_PATH),
            input_dir: PathBuf::from(INPUT_DIR),
            discovery_timeout: DISCOVERY_TIMEOUT,
            node_pattern: Regex::new(EVDEV_NODE_PATTERN).expect("static pattern compiles"),
            descriptor_policy: DescriptorPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_node_pattern(mut self, pattern: &str) -> Result<Self> {
        self.node_pattern = Regex::new(pattern)
            .map_err(|e| VuhidError::InvalidArgument(format!("node pattern: {e}")))?;
        Ok(self)
    }
}
