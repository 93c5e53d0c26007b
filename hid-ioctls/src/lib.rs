// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use libc::c_int;

use nix::sys::ioctl::ioctl_num_type;
use nix::{ioctl_read, ioctl_read_buf, request_code_read};

/// Largest report descriptor the kernel hands out (HID_MAX_DESCRIPTOR_SIZE).
pub const HID_MAX_DESCRIPTOR_SIZE: usize = 4096;

/// Buffer size used for the evdev name and uniq queries.
pub const EVDEV_STRING_LEN: usize = 64;

// see include/uapi/linux/hidraw.h
#[repr(C)]
#[derive(Clone)]
pub struct hidraw_report_descriptor {
    pub size: u32,
    pub value: [u8; HID_MAX_DESCRIPTOR_SIZE],
}

impl Default for hidraw_report_descriptor {
    fn default() -> Self {
        Self {
            size: 0,
            value: [0; HID_MAX_DESCRIPTOR_SIZE],
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct hidraw_devinfo {
    pub bustype: u32,
    pub vendor: i16,
    pub product: i16,
}

// The string ioctls are variable length; the size is part of the request code.
pub const EVIOCGNAME_WITHOUT_SIZE: ioctl_num_type = request_code_read!(b'E', 0x06, 0);
pub const EVIOCGUNIQ_WITHOUT_SIZE: ioctl_num_type = request_code_read!(b'E', 0x08, 0);

pub const HIDIOCGRDESCSIZE: ioctl_num_type =
    request_code_read!(b'H', 0x01, ::std::mem::size_of::<c_int>());
pub const HIDIOCGRDESC: ioctl_num_type =
    request_code_read!(b'H', 0x02, ::std::mem::size_of::<hidraw_report_descriptor>());
pub const HIDIOCGRAWINFO: ioctl_num_type =
    request_code_read!(b'H', 0x03, ::std::mem::size_of::<hidraw_devinfo>());
pub const HIDIOCGRAWNAME_WITHOUT_SIZE: ioctl_num_type = request_code_read!(b'H', 0x04, 0);
pub const HIDIOCGRAWPHYS_WITHOUT_SIZE: ioctl_num_type = request_code_read!(b'H', 0x05, 0);
pub const HIDIOCGRAWUNIQ_WITHOUT_SIZE: ioctl_num_type = request_code_read!(b'H', 0x08, 0);

ioctl_read_buf! { eviocgname, b'E', 0x06, u8 }
ioctl_read_buf! { eviocguniq, b'E', 0x08, u8 }

ioctl_read! { hidiocgrdescsize, b'H', 0x01, c_int }
ioctl_read! { hidiocgrdesc, b'H', 0x02, hidraw_report_descriptor }
ioctl_read! { hidiocgrawinfo, b'H', 0x03, hidraw_devinfo }
ioctl_read_buf! { hidiocgrawname, b'H', 0x04, u8 }
ioctl_read_buf! { hidiocgrawphys, b'H', 0x05, u8 }
ioctl_read_buf! { hidiocgrawuniq, b'H', 0x08, u8 }

/// Turns a NUL-padded buffer filled by one of the string ioctls into a `String`.
pub fn string_from_ioctl_buf(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
