// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use hid_ioctls::{eviocgname, eviocguniq, string_from_ioctl_buf, EVDEV_STRING_LEN};

pub fn open(node: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(node)
}

pub fn name(evdev: &File) -> io::Result<String> {
    let mut buf = [0u8; 256];
    unsafe { eviocgname(evdev.as_raw_fd(), &mut buf) }?;
    Ok(string_from_ioctl_buf(&buf))
}

pub fn uniq(evdev: &File) -> io::Result<String> {
    let mut buf = [0u8; EVDEV_STRING_LEN];
    unsafe { eviocguniq(evdev.as_raw_fd(), &mut buf) }?;
    Ok(string_from_ioctl_buf(&buf))
}
