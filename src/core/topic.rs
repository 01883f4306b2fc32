//! Topic registry shared by the log writer and reader.
//!
//! Data records carry a compact topic id in the header's `type_id`. The first
//! time a topic is written, the writer emits a declaration record
//! (`TOPIC_TYPE_ID`) whose payload binds the id to the name:
//!
//! ```text
//! [topic_id: u16 LE][name: UTF-8 bytes]
//! ```
//!
//! Ids are assigned densely from 0 in declaration order, so the reader can
//! rebuild the same table while it scans.

use std::collections::HashMap;

use crate::core::header::MAX_TOPIC_ID;
use crate::core::{Error, Result};

const ID_LEN: usize = 2;

#[derive(Debug, Default, Clone)]
pub struct TopicTable {
    names: Vec<String>,
    ids: HashMap<String, u16>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: u16) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Assign the next id to `name`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidTopic`: empty name or name already registered
    /// - `Error::TooManyTopics`: the id space is exhausted
    pub fn register(&mut self, name: &str) -> Result<u16> {
        if name.is_empty() || self.ids.contains_key(name) {
            return Err(Error::InvalidTopic(name.to_string()));
        }
        let id = u16::try_from(self.names.len())
            .ok()
            .filter(|id| *id <= MAX_TOPIC_ID)
            .ok_or(Error::TooManyTopics)?;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Apply a declaration read back from a log.
    pub fn declare(&mut self, id: u16, name: &str) -> Result<()> {
        match self.name(id) {
            Some(existing) if existing == name => return Ok(()),
            Some(_) => return Err(Error::Corrupt("topic id redeclared")),
            None => {}
        }
        if id as usize != self.names.len() {
            return Err(Error::Corrupt("topic id out of order"));
        }
        self.register(name)
            .map_err(|_| Error::Corrupt("invalid topic declaration"))?;
        Ok(())
    }
}

pub fn encode_declaration(id: u16, name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ID_LEN + name.len());
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf
}

pub fn decode_declaration(payload: &[u8]) -> Result<(u16, &str)> {
    if payload.len() <= ID_LEN {
        return Err(Error::Corrupt("topic declaration too short"));
    }
    let id = u16::from_le_bytes([payload[0], payload[1]]);
    let name = std::str::from_utf8(&payload[ID_LEN..])
        .map_err(|_| Error::Corrupt("topic name is not utf-8"))?;
    Ok((id, name))
}
