//! Save/Load of the overseer's own memory.
//!
//! Only state the core owns is written: the task registry, the production
//! queues and the tick counter. The world itself belongs to the snapshot's
//! storage and is not part of the save.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use overseer_logic::production::ProductionQueue;
use overseer_logic::resources::ColonyId;
use overseer_logic::task::TaskRegistry;

/// Version number for save file format (increment when format changes)
const SAVE_VERSION: u32 = 1;

/// State written in tick N and read back in tick N+1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreMemory {
    pub tick: u64,
    pub registry: TaskRegistry,
    pub queues: BTreeMap<ColonyId, ProductionQueue>,
}

#[derive(Serialize, Deserialize)]
struct SaveData {
    version: u32,
    memory: CoreMemory,
}

pub fn save_memory<W: Write>(writer: W, memory: &CoreMemory) -> Result<(), SaveError> {
    let data = SaveData {
        version: SAVE_VERSION,
        memory: memory.clone(),
    };
    bincode::serialize_into(writer, &data)?;
    Ok(())
}

pub fn load_memory<R: Read>(reader: R) -> Result<CoreMemory, SaveError> {
    let data: SaveData = bincode::deserialize_from(reader)?;
    if data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: data.version,
        });
    }
    Ok(data.memory)
}

/// Errors that can occur during save/load
#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Bincode(Box<bincode::ErrorKind>),
    VersionMismatch { expected: u32, found: u32 },
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for SaveError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SaveError::Bincode(e)
    }
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "IO error: {}", e),
            SaveError::Bincode(e) => write!(f, "Serialization error: {}", e),
            SaveError::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Save version mismatch: expected {}, found {}",
                    expected, found
                )
            }
        }
    }
}

impl std::error::Error for SaveError {}
