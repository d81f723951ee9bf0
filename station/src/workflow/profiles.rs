use anyhow::Context;
use rmtscore::prelude::{Converter, TransducerKind};
use std::fs;
use std::path::{Path, PathBuf};

/// Ordered, named transducer converters persisted as a YAML list.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    profiles: Vec<Converter>,
}

impl ProfileStore {
    /// Reads the store at `path`; a missing file is an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let profiles = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("reading profile store {}", path.display()))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing profile store {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self { path, profiles })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let contents = serde_yaml::to_string(&self.profiles).context("serializing profiles")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("writing profile store {}", self.path.display()))
    }

    pub fn profiles(&self) -> &[Converter] {
        &self.profiles
    }

    pub fn by_kind(&self, kind: TransducerKind) -> impl Iterator<Item = &Converter> {
        self.profiles.iter().filter(move |c| c.kind == kind)
    }

    pub fn get(&self, name: &str) -> Option<&Converter> {
        self.profiles.iter().find(|c| c.name == name)
    }

    /// Looks up `name` and checks it is the expected kind of transducer.
    pub fn require(&self, name: &str, kind: TransducerKind) -> anyhow::Result<Converter> {
        let converter = self
            .get(name)
            .with_context(|| format!("no transducer profile named {}", name))?;
        if converter.kind != kind {
            anyhow::bail!("profile {} is a {}, not a {}", name, converter.kind.label(), kind.label());
        }
        Ok(converter.clone())
    }

    /// Replaces a same-named profile in place, otherwise appends.
    pub fn upsert(&mut self, converter: Converter) {
        match self.profiles.iter_mut().find(|c| c.name == converter.name) {
            Some(existing) => *existing = converter,
            None => self.profiles.push(converter),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Converter> {
        let index = self.profiles.iter().position(|c| c.name == name)?;
        Some(self.profiles.remove(index))
    }
}
