// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Byte-exact encoding of `struct uhid_event` from include/uapi/linux/uhid.h.
//!
//! The struct is packed: a `u32` type followed by the largest union member
//! (`uhid_create2_req`). All integers are in native byte order.

use hid_ioctls::HID_MAX_DESCRIPTOR_SIZE;

pub const UHID_DATA_MAX: usize = 4096;

pub const UHID_NAME_LEN: usize = 128;
pub const UHID_PHYS_LEN: usize = 64;
pub const UHID_UNIQ_LEN: usize = 64;

const CREATE2_LEN: usize = UHID_NAME_LEN + UHID_PHYS_LEN + UHID_UNIQ_LEN + 2 + 2 + 4 * 4
    + HID_MAX_DESCRIPTOR_SIZE;
pub const UHID_EVENT_SIZE: usize = 4 + CREATE2_LEN;

// enum uhid_event_type
pub const UHID_DESTROY: u32 = 1;
pub const UHID_START: u32 = 2;
pub const UHID_STOP: u32 = 3;
pub const UHID_OPEN: u32 = 4;
pub const UHID_CLOSE: u32 = 5;
pub const UHID_OUTPUT: u32 = 6;
pub const UHID_OUTPUT_EV: u32 = 7;
pub const UHID_GET_REPORT: u32 = 9;
pub const UHID_GET_REPORT_REPLY: u32 = 10;
pub const UHID_CREATE2: u32 = 11;
pub const UHID_INPUT2: u32 = 12;
pub const UHID_SET_REPORT: u32 = 13;
pub const UHID_SET_REPORT_REPLY: u32 = 14;

/// Bus id that keeps the kernel from binding a device specific driver.
pub const BUS_VIRTUAL: u16 = 0x06;

// payload offsets, relative to the start of the record
const PAYLOAD: usize = 4;
const CREATE_NAME: usize = PAYLOAD;
const CREATE_PHYS: usize = CREATE_NAME + UHID_NAME_LEN;
const CREATE_UNIQ: usize = CREATE_PHYS + UHID_PHYS_LEN;
const CREATE_RD_SIZE: usize = CREATE_UNIQ + UHID_UNIQ_LEN;
const CREATE_BUS: usize = CREATE_RD_SIZE + 2;
const CREATE_VENDOR: usize = CREATE_BUS + 2;
const CREATE_PRODUCT: usize = CREATE_VENDOR + 4;
const CREATE_VERSION: usize = CREATE_PRODUCT + 4;
const CREATE_COUNTRY: usize = CREATE_VERSION + 4;
const CREATE_RD_DATA: usize = CREATE_COUNTRY + 4;
const OUTPUT_SIZE: usize = PAYLOAD + UHID_DATA_MAX;
const OUTPUT_RTYPE: usize = OUTPUT_SIZE + 2;
const REPORT_DATA: usize = PAYLOAD + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Feature,
    Output,
    Input,
    Unknown(u8),
}

impl From<u8> for ReportType {
    fn from(rtype: u8) -> Self {
        // enum uhid_report_type
        match rtype {
            0 => ReportType::Feature,
            1 => ReportType::Output,
            2 => ReportType::Input,
            other => ReportType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub phys: String,
    pub uniq: String,
    pub bus: u16,
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
    pub country: u32,
    pub rd_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UhidEvent {
    Create2(CreateRequest),
    Destroy,
    Start { dev_flags: u64 },
    Stop,
    Open,
    Close,
    Output { data: Vec<u8>, rtype: ReportType },
    OutputEv { type_: u16, code: u16, value: i32 },
    GetReport { id: u32, rnum: u8, rtype: ReportType },
    GetReportReply { id: u32, err: u16, data: Vec<u8> },
    Input2 { data: Vec<u8> },
    SetReport { id: u32, rnum: u8, rtype: ReportType, data: Vec<u8> },
    SetReportReply { id: u32, err: u16 },
    Unknown(u32),
}

impl UhidEvent {
    pub fn event_type(&self) -> u32 {
        match self {
            UhidEvent::Create2(_) => UHID_CREATE2,
            UhidEvent::Destroy => UHID_DESTROY,
            UhidEvent::Start { .. } => UHID_START,
            UhidEvent::Stop => UHID_STOP,
            UhidEvent::Open => UHID_OPEN,
            UhidEvent::Close => UHID_CLOSE,
            UhidEvent::Output { .. } => UHID_OUTPUT,
            UhidEvent::OutputEv { .. } => UHID_OUTPUT_EV,
            UhidEvent::GetReport { .. } => UHID_GET_REPORT,
            UhidEvent::GetReportReply { .. } => UHID_GET_REPORT_REPLY,
            UhidEvent::Input2 { .. } => UHID_INPUT2,
            UhidEvent::SetReport { .. } => UHID_SET_REPORT,
            UhidEvent::SetReportReply { .. } => UHID_SET_REPORT_REPLY,
            UhidEvent::Unknown(event_type) => *event_type,
        }
    }

    /// Serializes the event into a full `UHID_EVENT_SIZE` record.
    /// Strings and data buffers longer than their field are cut.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; UHID_EVENT_SIZE];
        put_u32(&mut buf, 0, self.event_type());

        match self {
            UhidEvent::Create2(create) => {
                put_str(&mut buf[CREATE_NAME..CREATE_PHYS], &create.name);
                put_str(&mut buf[CREATE_PHYS..CREATE_UNIQ], &create.phys);
                put_str(&mut buf[CREATE_UNIQ..CREATE_RD_SIZE], &create.uniq);
                let rd_size = put_data(&mut buf[CREATE_RD_DATA..], &create.rd_data);
                put_u16(&mut buf, CREATE_RD_SIZE, rd_size);
                put_u16(&mut buf, CREATE_BUS, create.bus);
                put_u32(&mut buf, CREATE_VENDOR, create.vendor);
                put_u32(&mut buf, CREATE_PRODUCT, create.product);
                put_u32(&mut buf, CREATE_VERSION, create.version);
                put_u32(&mut buf, CREATE_COUNTRY, create.country);
            }
            UhidEvent::Start { dev_flags } => {
                buf[PAYLOAD..PAYLOAD + 8].copy_from_slice(&dev_flags.to_ne_bytes());
            }
            UhidEvent::Output { data, rtype } => {
                let size = put_data(&mut buf[PAYLOAD..OUTPUT_SIZE], data);
                put_u16(&mut buf, OUTPUT_SIZE, size);
                buf[OUTPUT_RTYPE] = rtype_to_u8(*rtype);
            }
            UhidEvent::OutputEv { type_, code, value } => {
                put_u16(&mut buf, PAYLOAD, *type_);
                put_u16(&mut buf, PAYLOAD + 2, *code);
                buf[PAYLOAD + 4..PAYLOAD + 8].copy_from_slice(&value.to_ne_bytes());
            }
            UhidEvent::GetReport { id, rnum, rtype } => {
                put_u32(&mut buf, PAYLOAD, *id);
                buf[PAYLOAD + 4] = *rnum;
                buf[PAYLOAD + 5] = rtype_to_u8(*rtype);
            }
            UhidEvent::GetReportReply { id, err, data } => {
                put_u32(&mut buf, PAYLOAD, *id);
                put_u16(&mut buf, PAYLOAD + 4, *err);
                let size = put_data(&mut buf[REPORT_DATA..REPORT_DATA + UHID_DATA_MAX], data);
                put_u16(&mut buf, PAYLOAD + 6, size);
            }
            UhidEvent::Input2 { data } => {
                let size = put_data(&mut buf[PAYLOAD + 2..PAYLOAD + 2 + UHID_DATA_MAX], data);
                put_u16(&mut buf, PAYLOAD, size);
            }
            UhidEvent::SetReport {
                id,
                rnum,
                rtype,
                data,
            } => {
                put_u32(&mut buf, PAYLOAD, *id);
                buf[PAYLOAD + 4] = *rnum;
                buf[PAYLOAD + 5] = rtype_to_u8(*rtype);
                let size = put_data(&mut buf[REPORT_DATA..REPORT_DATA + UHID_DATA_MAX], data);
                put_u16(&mut buf, PAYLOAD + 6, size);
            }
            UhidEvent::SetReportReply { id, err } => {
                put_u32(&mut buf, PAYLOAD, *id);
                put_u16(&mut buf, PAYLOAD + 4, *err);
            }
            UhidEvent::Destroy
            | UhidEvent::Stop
            | UhidEvent::Open
            | UhidEvent::Close
            | UhidEvent::Unknown(_) => {}
        }

        buf
    }

    /// Parses a record read from the uhid device. Missing trailing bytes are read as zero,
    /// sizes are clamped to the data field.
    pub fn decode(record: &[u8]) -> Option<UhidEvent> {
        if record.len() < PAYLOAD {
            return None;
        }
        let mut buf = vec![0u8; UHID_EVENT_SIZE];
        let len = record.len().min(UHID_EVENT_SIZE);
        buf[..len].copy_from_slice(&record[..len]);

        let event = match get_u32(&buf, 0) {
            UHID_CREATE2 => {
                let rd_size = usize::from(get_u16(&buf, CREATE_RD_SIZE)).min(HID_MAX_DESCRIPTOR_SIZE);
                UhidEvent::Create2(CreateRequest {
                    name: get_str(&buf[CREATE_NAME..CREATE_PHYS]),
                    phys: get_str(&buf[CREATE_PHYS..CREATE_UNIQ]),
                    uniq: get_str(&buf[CREATE_UNIQ..CREATE_RD_SIZE]),
                    bus: get_u16(&buf, CREATE_BUS),
                    vendor: get_u32(&buf, CREATE_VENDOR),
                    product: get_u32(&buf, CREATE_PRODUCT),
                    version: get_u32(&buf, CREATE_VERSION),
                    country: get_u32(&buf, CREATE_COUNTRY),
                    rd_data: buf[CREATE_RD_DATA..CREATE_RD_DATA + rd_size].to_vec(),
                })
            }
            UHID_DESTROY => UhidEvent::Destroy,
            UHID_START => {
                let mut flags = [0u8; 8];
                flags.copy_from_slice(&buf[PAYLOAD..PAYLOAD + 8]);
                UhidEvent::Start {
                    dev_flags: u64::from_ne_bytes(flags),
                }
            }
            UHID_STOP => UhidEvent::Stop,
            UHID_OPEN => UhidEvent::Open,
            UHID_CLOSE => UhidEvent::Close,
            UHID_OUTPUT => {
                let size = usize::from(get_u16(&buf, OUTPUT_SIZE)).min(UHID_DATA_MAX);
                UhidEvent::Output {
                    data: buf[PAYLOAD..PAYLOAD + size].to_vec(),
                    rtype: ReportType::from(buf[OUTPUT_RTYPE]),
                }
            }
            UHID_OUTPUT_EV => UhidEvent::OutputEv {
                type_: get_u16(&buf, PAYLOAD),
                code: get_u16(&buf, PAYLOAD + 2),
                value: get_u32(&buf, PAYLOAD + 4) as i32,
            },
            UHID_GET_REPORT => UhidEvent::GetReport {
                id: get_u32(&buf, PAYLOAD),
                rnum: buf[PAYLOAD + 4],
                rtype: ReportType::from(buf[PAYLOAD + 5]),
            },
            UHID_GET_REPORT_REPLY => {
                let size = usize::from(get_u16(&buf, PAYLOAD + 6)).min(UHID_DATA_MAX);
                UhidEvent::GetReportReply {
                    id: get_u32(&buf, PAYLOAD),
                    err: get_u16(&buf, PAYLOAD + 4),
                    data: buf[REPORT_DATA..REPORT_DATA + size].to_vec(),
                }
            }
            UHID_INPUT2 => {
                let size = usize::from(get_u16(&buf, PAYLOAD)).min(UHID_DATA_MAX);
                UhidEvent::Input2 {
                    data: buf[PAYLOAD + 2..PAYLOAD + 2 + size].to_vec(),
                }
            }
            UHID_SET_REPORT => {
                let size = usize::from(get_u16(&buf, PAYLOAD + 6)).min(UHID_DATA_MAX);
                UhidEvent::SetReport {
                    id: get_u32(&buf, PAYLOAD),
                    rnum: buf[PAYLOAD + 4],
                    rtype: ReportType::from(buf[PAYLOAD + 5]),
                    data: buf[REPORT_DATA..REPORT_DATA + size].to_vec(),
                }
            }
            UHID_SET_REPORT_REPLY => UhidEvent::SetReportReply {
                id: get_u32(&buf, PAYLOAD),
                err: get_u16(&buf, PAYLOAD + 4),
            },
            other => UhidEvent::Unknown(other),
        };
        Some(event)
    }
}

fn rtype_to_u8(rtype: ReportType) -> u8 {
    match rtype {
        ReportType::Feature => 0,
        ReportType::Output => 1,
        ReportType::Input => 2,
        ReportType::Unknown(other) => other,
    }
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_ne_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([buf[at], buf[at + 1]])
}

fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

// leaves room for the terminating NUL
fn put_str(field: &mut [u8], value: &str) {
    let len = value.len().min(field.len() - 1);
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
}

fn get_str(field: &[u8]) -> String {
    hid_ioctls::string_from_ioctl_buf(field)
}

fn put_data(field: &mut [u8], data: &[u8]) -> u16 {
    let len = data.len().min(field.len());
    field[..len].copy_from_slice(&data[..len]);
    len as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_matches_the_packed_kernel_struct() {
        assert_eq!(UHID_EVENT_SIZE, 4376);
    }

    #[test]
    fn create2_fields_land_at_kernel_offsets() {
        let event = UhidEvent::Create2(CreateRequest {
            name: "Acme Pad".to_string(),
            phys: String::new(),
            uniq: "VUHID 42 0x1".to_string(),
            bus: BUS_VIRTUAL,
            vendor: 0x046d,
            product: 0xc21d,
            version: 0x0111,
            country: 0,
            rd_data: vec![0x05, 0x01, 0x09, 0x08, 0xC0],
        });
        let buf = event.encode();

        assert_eq!(buf.len(), UHID_EVENT_SIZE);
        assert_eq!(get_u32(&buf, 0), UHID_CREATE2);
        assert_eq!(&buf[4..12], b"Acme Pad");
        assert_eq!(buf[12], 0);
        assert_eq!(&buf[196..208], b"VUHID 42 0x1");
        assert_eq!(get_u16(&buf, 260), 5);
        assert_eq!(get_u16(&buf, 262), 0x06);
        assert_eq!(get_u32(&buf, 264), 0x046d);
        assert_eq!(get_u32(&buf, 268), 0xc21d);
        assert_eq!(get_u32(&buf, 272), 0x0111);
        assert_eq!(&buf[280..285], &[0x05, 0x01, 0x09, 0x08, 0xC0]);

        assert_eq!(UhidEvent::decode(&buf), Some(event));
    }

    #[test]
    fn overlong_strings_keep_their_nul_terminator() {
        let create = CreateRequest {
            name: "n".repeat(300),
            phys: String::new(),
            uniq: "u".repeat(100),
            bus: BUS_VIRTUAL,
            vendor: 0,
            product: 0,
            version: 0,
            country: 0,
            rd_data: vec![0xC0],
        };
        let buf = UhidEvent::Create2(create).encode();
        assert_eq!(buf[CREATE_PHYS - 1], 0);
        assert_eq!(buf[CREATE_RD_SIZE - 1], 0);

        match UhidEvent::decode(&buf) {
            Some(UhidEvent::Create2(decoded)) => {
                assert_eq!(decoded.name.len(), UHID_NAME_LEN - 1);
                assert_eq!(decoded.uniq.len(), UHID_UNIQ_LEN - 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn input2_carries_size_and_data() {
        let buf = UhidEvent::Input2 {
            data: vec![1, 2, 3],
        }
        .encode();
        assert_eq!(get_u32(&buf, 0), UHID_INPUT2);
        assert_eq!(get_u16(&buf, 4), 3);
        assert_eq!(&buf[6..9], &[1, 2, 3]);
    }

    #[test]
    fn kernel_events_decode() {
        let mut open = vec![0u8; UHID_EVENT_SIZE];
        put_u32(&mut open, 0, UHID_OPEN);
        assert_eq!(UhidEvent::decode(&open), Some(UhidEvent::Open));

        let mut output = vec![0u8; UHID_EVENT_SIZE];
        put_u32(&mut output, 0, UHID_OUTPUT);
        output[4..6].copy_from_slice(&[0x01, 0x7f]);
        put_u16(&mut output, OUTPUT_SIZE, 2);
        output[OUTPUT_RTYPE] = 1;
        assert_eq!(
            UhidEvent::decode(&output),
            Some(UhidEvent::Output {
                data: vec![0x01, 0x7f],
                rtype: ReportType::Output
            })
        );

        let mut get_report = vec![0u8; UHID_EVENT_SIZE];
        put_u32(&mut get_report, 0, UHID_GET_REPORT);
        put_u32(&mut get_report, 4, 77);
        get_report[8] = 3;
        assert_eq!(
            UhidEvent::decode(&get_report),
            Some(UhidEvent::GetReport {
                id: 77,
                rnum: 3,
                rtype: ReportType::Feature
            })
        );
    }

    #[test]
    fn short_and_unknown_records() {
        assert_eq!(UhidEvent::decode(&[0, 0]), None);
        assert_eq!(
            UhidEvent::decode(&99u32.to_ne_bytes()),
            Some(UhidEvent::Unknown(99))
        );
        // a bare type is enough for events without payload
        assert_eq!(
            UhidEvent::decode(&UHID_CLOSE.to_ne_bytes()),
            Some(UhidEvent::Close)
        );
    }
}
