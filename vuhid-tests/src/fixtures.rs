// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use vuhid::DeviceIdentity;

/// Two-button gamepad with X/Y axes, 3 byte input report (buttons, x, y).
pub const GAMEPAD_DESCRIPTOR: [u8; 43] = [
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Game Pad)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (1)
    0x29, 0x02, //   Usage Maximum (2)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Var, Abs)
    0x95, 0x06, //   Report Count (6)
    0x81, 0x03, //   Input (Const)
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x15, 0x81, //   Logical Minimum (-127)
    0x25, 0x7F, //   Logical Maximum (127)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Var, Abs)
    0xC0, // End Collection
];

pub fn gamepad() -> DeviceIdentity {
    DeviceIdentity {
        vendor_id: 0x1209,
        product_id: 0x0001,
        version: 0x0111,
        country_code: 0,
        manufacturer: Some("vuhid".to_string()),
        product: Some("Test Gamepad".to_string()),
        descriptor: GAMEPAD_DESCRIPTOR.to_vec(),
    }
}
