// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};

use log::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::identity::DeviceIdentity;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Owns every live session of the process. Whatever is still registered
/// when the registry goes away is destroyed.
#[derive(Debug)]
pub struct Registry<D: Read + Write = File> {
    sessions: HashMap<SessionId, Session<D>>,
    next_id: u64,
}

impl<D: Read + Write> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry<File> {
    pub fn create(
        &mut self,
        identity: &mut DeviceIdentity,
        correlation: u64,
        config: &Config,
    ) -> Result<SessionId> {
        let session = Session::create(identity, correlation, config)?;
        Ok(self.insert(session))
    }
}

impl<D: Read + Write> Registry<D> {
    pub fn new() -> Self {
        Registry {
            sessions: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn insert(&mut self, session: Session<D>) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        debug!("{}: {:?}", id, session);
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session<D>> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<D>> {
        self.sessions.get_mut(&id)
    }

    /// Takes a session out without destroying it.
    pub fn remove(&mut self, id: SessionId) -> Option<Session<D>> {
        self.sessions.remove(&id)
    }

    /// Destroys one session. Returns false if `id` is not registered.
    pub fn close(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        info!("destroying {} virtual device(s)", self.sessions.len());
        for (_, session) in self.sessions.drain() {
            session.close();
        }
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<D: Read + Write> Drop for Registry<D> {
    fn drop(&mut self) {
        self.close_all();
    }
}
