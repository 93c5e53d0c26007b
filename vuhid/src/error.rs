// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::descriptor::DescriptorError;

#[derive(Debug, Error)]
pub enum VuhidError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} is unavailable")]
    ResourceUnavailable {
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("short write to uhid: {written} of {expected} bytes")]
    ProtocolViolation { written: usize, expected: usize },

    #[error("malformed report descriptor")]
    MalformedDescriptor(#[from] DescriptorError),

    #[error("no input node reported uniq {tag:?} within {waited:?}")]
    Timeout { tag: String, waited: Duration },

    #[error("payload of {len} bytes exceeds the uhid maximum of {max}")]
    OversizePayload { len: usize, max: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl VuhidError {
    pub(crate) fn unavailable(what: impl Into<String>, source: io::Error) -> Self {
        VuhidError::ResourceUnavailable {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VuhidError>;
