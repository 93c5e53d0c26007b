// SPDX-License-Identifier: MIT
// vuhid: mirror physical HID devices as virtual devices on /dev/uhid
//
// - Registers a device with the uhid driver, rewriting joystick/gamepad usages.
// - Finds the input node the kernel creates for it by its uniq string.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod event;
pub mod identity;
pub mod registry;
pub mod session;

pub use config::{Config, DescriptorPolicy};
pub use descriptor::{rewrite_usages, DescriptorError};
pub use discovery::DiscoveryTag;
pub use error::{Result, VuhidError};
pub use identity::DeviceIdentity;
pub use registry::{Registry, SessionId};
pub use session::{OutputReport, Session};
