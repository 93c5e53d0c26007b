// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Report descriptor item walker.
//!
//! Short items are `header [payload]` where the header packs
//! `bTag:4 | bType:2 | bSize:2`; a header with `bTag == 0xF` starts a long item
//! `header bDataSize bLongItemTag [payload]`. See HID 1.11, section 6.2.2.

use std::ops::Range;

use log::{debug, warn};
use thiserror::Error;

pub const USAGE_JOYSTICK: u8 = 0x04;
pub const USAGE_GAMEPAD: u8 = 0x05;
pub const USAGE_MULTI_AXIS_CONTROLLER: u8 = 0x08;

const LONG_ITEM_TAG: u8 = 0x0F;
const LONG_ITEM_HEADER_LEN: usize = 3;
const SHORT_PAYLOAD_SIZES: [usize; 4] = [0, 1, 2, 4];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("item at offset {offset} needs {needed} bytes but only {available} are left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Main,
    Global,
    Local,
    Reserved,
}

impl From<u8> for ItemType {
    fn from(b_type: u8) -> Self {
        match b_type & 0x03 {
            0 => ItemType::Main,
            1 => ItemType::Global,
            2 => ItemType::Local,
            _ => ItemType::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Short { item_type: ItemType, tag: u8 },
    Long { tag: u8 },
}

/// One item of a report descriptor, located by offsets into the walked buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub offset: usize,
    pub kind: ItemKind,
    pub header_len: usize,
    pub payload_len: usize,
}

impl Item {
    pub fn payload_range(&self) -> Range<usize> {
        let start = self.offset + self.header_len;
        start..start + self.payload_len
    }

    pub fn end(&self) -> usize {
        self.offset + self.header_len + self.payload_len
    }

    fn is_local_byte(&self) -> bool {
        matches!(
            self.kind,
            ItemKind::Short {
                item_type: ItemType::Local,
                ..
            }
        ) && self.payload_len == 1
    }
}

/// Decodes the item starting at `offset`, checking that header and payload fit in `buf`.
pub fn parse_item(buf: &[u8], offset: usize) -> Result<Item, DescriptorError> {
    let available = buf.len().saturating_sub(offset);
    let truncated = |needed| DescriptorError::Truncated {
        offset,
        needed,
        available,
    };

    let header = *buf.get(offset).ok_or_else(|| truncated(1))?;
    let b_tag = header >> 4;

    let (kind, header_len, payload_len) = if b_tag == LONG_ITEM_TAG {
        if available < LONG_ITEM_HEADER_LEN {
            return Err(truncated(LONG_ITEM_HEADER_LEN));
        }
        let payload_len = usize::from(buf[offset + 1]);
        let tag = buf[offset + 2];
        (ItemKind::Long { tag }, LONG_ITEM_HEADER_LEN, payload_len)
    } else {
        let payload_len = SHORT_PAYLOAD_SIZES[usize::from(header & 0x03)];
        let item_type = ItemType::from(header >> 2);
        (ItemKind::Short { item_type, tag: b_tag }, 1, payload_len)
    };

    if header_len + payload_len > available {
        return Err(truncated(header_len + payload_len));
    }

    Ok(Item {
        offset,
        kind,
        header_len,
        payload_len,
    })
}

/// Lazy walk over the items of a descriptor. Yields at most one error, then stops.
pub struct Items<'a> {
    buf: &'a [u8],
    cursor: usize,
    failed: bool,
}

impl<'a> Items<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Items<'a> {
    type Item = Result<Item, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.buf.len() {
            return None;
        }
        match parse_item(self.buf, self.cursor) {
            Ok(item) => {
                self.cursor = item.end();
                Some(Ok(item))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Changes joystick and gamepad usages into the multi-axis controller usage.
/// This prevents the kernel from applying deadzones to the virtual device.
///
/// Returns the number of patched bytes. On a truncated item the walk stops and
/// everything before it stays patched.
pub fn rewrite_usages(buf: &mut [u8]) -> Result<usize, DescriptorError> {
    let mut usages = Vec::new();
    let mut failure = None;

    for item in Items::new(buf) {
        match item {
            Ok(item) if item.is_local_byte() => {
                let pos = item.payload_range().start;
                if matches!(buf[pos], USAGE_JOYSTICK | USAGE_GAMEPAD) {
                    usages.push((item.offset, pos));
                }
            }
            Ok(_) => {}
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    for &(offset, pos) in &usages {
        debug!(
            "offset {}: usage {:#04x} -> {:#04x}",
            offset, buf[pos], USAGE_MULTI_AXIS_CONTROLLER
        );
        buf[pos] = USAGE_MULTI_AXIS_CONTROLLER;
    }

    match failure {
        Some(e) => {
            warn!("invalid report descriptor: {e} ({} usages patched before)", usages.len());
            Err(e)
        }
        None => Ok(usages.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A trimmed gamepad descriptor: two collections, buttons and two axes.
    const GAMEPAD: [u8; 43] = [
        0x05, 0x01, // Usage Page (Generic Desktop)
        0x09, 0x05, // Usage (Gamepad)
        0xA1, 0x01, // Collection (Application)
        0x09, 0x04, //   Usage (Joystick)
        0xA1, 0x00, //   Collection (Physical)
        0x05, 0x09, //     Usage Page (Button)
        0x19, 0x01, //     Usage Minimum (1)
        0x29, 0x08, //     Usage Maximum (8)
        0x15, 0x00, //     Logical Minimum (0)
        0x25, 0x01, //     Logical Maximum (1)
        0x75, 0x01, //     Report Size (1)
        0x95, 0x08, //     Report Count (8)
        0x81, 0x02, //     Input (Data,Var,Abs)
        0x05, 0x01, //     Usage Page (Generic Desktop)
        0x09, 0x30, //     Usage (X)
        0x09, 0x31, //     Usage (Y)
        0x26, 0xFF, 0x00, // Logical Maximum (255)
        0x75, 0x08, //     Report Size (8)
        0x95, 0x02, //     Report Count (2)
        0x81, 0x02, //     Input (Data,Var,Abs)
        0xC0, //   End Collection
        0xC0, // End Collection
    ];

    #[test]
    fn gamepad_usage_is_remapped() {
        let mut rdesc = [0x05, 0x01, 0x09, 0x05, 0xC0];
        assert_eq!(rewrite_usages(&mut rdesc), Ok(1));
        assert_eq!(rdesc, [0x05, 0x01, 0x09, 0x08, 0xC0]);
    }

    #[test]
    fn item_ending_at_the_buffer_end_is_complete() {
        let mut rdesc = [0x09, 0x05];
        assert_eq!(rewrite_usages(&mut rdesc), Ok(1));
        assert_eq!(rdesc, [0x09, 0x08]);

        let item = parse_item(&rdesc, 0).unwrap();
        assert_eq!(item.end(), rdesc.len());

        // one byte short of the same item
        assert_eq!(
            parse_item(&rdesc[..1], 0),
            Err(DescriptorError::Truncated {
                offset: 0,
                needed: 2,
                available: 1
            })
        );
    }

    #[test]
    fn only_local_one_byte_usages_change() {
        let mut rdesc = GAMEPAD;
        assert_eq!(rewrite_usages(&mut rdesc), Ok(2));

        let changed: Vec<usize> = GAMEPAD
            .iter()
            .zip(rdesc.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(changed, vec![3, 7]);
        assert_eq!(rdesc[3], USAGE_MULTI_AXIS_CONTROLLER);
        assert_eq!(rdesc[7], USAGE_MULTI_AXIS_CONTROLLER);
        // Usage Page (Generic Desktop) is global and Input is main; untouched.
        assert_eq!(rdesc[0..2], [0x05, 0x01]);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let mut once = GAMEPAD;
        rewrite_usages(&mut once).unwrap();
        let mut twice = once;
        assert_eq!(rewrite_usages(&mut twice), Ok(0));
        assert_eq!(once, twice);
    }

    #[test]
    fn global_and_wide_items_with_usage_values_are_ignored() {
        // Usage Page (0x05) as global, Usage with a 2-byte payload, Logical Max 5.
        let mut rdesc = [0x05, 0x05, 0x0A, 0x05, 0x00, 0x25, 0x04];
        let before = rdesc;
        assert_eq!(rewrite_usages(&mut rdesc), Ok(0));
        assert_eq!(rdesc, before);
    }

    #[test]
    fn truncated_tail_stops_the_walk() {
        // Usage (Joystick), then a Logical Maximum claiming 4 bytes with only 2 present.
        let mut rdesc = [0x09, 0x04, 0x27, 0xFF, 0xFF];
        let err = rewrite_usages(&mut rdesc).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::Truncated {
                offset: 2,
                needed: 5,
                available: 3
            }
        );
        assert_eq!(rdesc, [0x09, 0x08, 0x27, 0xFF, 0xFF]);
    }

    #[test]
    fn bytes_after_a_truncated_item_are_never_touched() {
        // Long item declaring 200 bytes of payload; what follows looks like a gamepad usage.
        let mut rdesc = [0xFE, 200, 0x10, 0x09, 0x05];
        assert!(rewrite_usages(&mut rdesc).is_err());
        assert_eq!(rdesc, [0xFE, 200, 0x10, 0x09, 0x05]);
    }

    #[test]
    fn long_items_are_skipped_as_a_whole() {
        // The long item payload contains 0x09 0x05, which must not be read as a usage.
        let mut rdesc = [0xFE, 0x02, 0x42, 0x09, 0x05, 0x09, 0x04];
        assert_eq!(rewrite_usages(&mut rdesc), Ok(1));
        assert_eq!(rdesc, [0xFE, 0x02, 0x42, 0x09, 0x05, 0x09, 0x08]);

        let items: Vec<Item> = Items::new(&rdesc).map(Result::unwrap).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, ItemKind::Long { tag: 0x42 });
        assert_eq!(items[0].payload_range(), 3..5);
    }

    #[test]
    fn short_long_item_header_is_reported() {
        let rdesc = [0x09, 0x30, 0xFE, 0x01];
        let mut items = Items::new(&rdesc);
        assert!(items.next().unwrap().is_ok());
        assert_eq!(
            items.next(),
            Some(Err(DescriptorError::Truncated {
                offset: 2,
                needed: 3,
                available: 2
            }))
        );
        assert_eq!(items.next(), None);
    }

    #[test]
    fn items_decode_types_and_tags() {
        let items: Vec<Item> = Items::new(&GAMEPAD[..6]).map(Result::unwrap).collect();
        assert_eq!(
            items.iter().map(|i| i.kind).collect::<Vec<_>>(),
            vec![
                ItemKind::Short {
                    item_type: ItemType::Global,
                    tag: 0x0
                },
                ItemKind::Short {
                    item_type: ItemType::Local,
                    tag: 0x0
                },
                ItemKind::Short {
                    item_type: ItemType::Main,
                    tag: 0xA
                },
            ]
        );
    }

    #[test]
    fn empty_descriptor_has_no_items() {
        let mut rdesc: [u8; 0] = [];
        assert_eq!(rewrite_usages(&mut rdesc), Ok(0));
        assert_eq!(Items::new(&rdesc).count(), 0);
    }
}
