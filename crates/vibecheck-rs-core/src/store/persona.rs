use super::StoreError;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use vibecheck_rs_embed::fnv1a_hash;
use vibecheck_rs_protocol::Persona;

/// Stable display colour for a persona, `#rrggbb`.
pub fn color_tag_for(persona_id: &str) -> String {
    format!("#{:06x}", fnv1a_hash(persona_id.as_bytes()) & 0x00ff_ffff)
}

/// Store of indexed personas keyed by id.
pub trait PersonaStore: Send + Sync {
    /// Insert or replace a persona.
    fn save(&self, persona: &Persona) -> Result<(), StoreError>;
    fn get(&self, persona_id: &str) -> Result<Option<Persona>, StoreError>;
    /// All personas, sorted by id.
    fn list(&self) -> Result<Vec<Persona>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPersonaStore {
    personas: RwLock<BTreeMap<String, Persona>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersonaStore for InMemoryPersonaStore {
    fn save(&self, persona: &Persona) -> Result<(), StoreError> {
        self.personas
            .write()
            .insert(persona.id.clone(), persona.clone());
        Ok(())
    }

    fn get(&self, persona_id: &str) -> Result<Option<Persona>, StoreError> {
        Ok(self.personas.read().get(persona_id).cloned())
    }

    fn list(&self) -> Result<Vec<Persona>, StoreError> {
        Ok(self.personas.read().values().cloned().collect())
    }
}

/// One pretty-printed JSON file per persona.
#[derive(Debug)]
pub struct JsonPersonaStore {
    root: PathBuf,
}

impl JsonPersonaStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized persona store (root={})", root.display());
        Ok(Self { root })
    }

    fn persona_path(&self, persona_id: &str) -> PathBuf {
        self.root.join(format!("{persona_id}.json"))
    }
}

impl PersonaStore for JsonPersonaStore {
    fn save(&self, persona: &Persona) -> Result<(), StoreError> {
        let path = self.persona_path(&persona.id);
        let temp_path = self.root.join(format!(".{}.json.tmp", persona.id));
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            serde_json::to_writer_pretty(&mut file, persona)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        debug!(
            "saved persona (persona_id={}, windows={})",
            persona.id,
            persona.windows.len()
        );
        Ok(())
    }

    fn get(&self, persona_id: &str) -> Result<Option<Persona>, StoreError> {
        let path = self.persona_path(persona_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn list(&self) -> Result<Vec<Persona>, StoreError> {
        let mut personas = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(persona_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if persona_id.starts_with('.') {
                continue;
            }
            match self.get(persona_id) {
                Ok(Some(persona)) => personas.push(persona),
                Ok(None) => {}
                Err(err) => warn!(
                    "skipping unreadable persona (path={}, err={})",
                    path.display(),
                    err
                ),
            }
        }
        personas.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(personas)
    }
}
