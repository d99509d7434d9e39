use crate::error::SyncError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Raw access-point terms recorded for one resource, replayed by the linker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPoints {
    pub subject: Vec<String>,
    pub place: Vec<String>,
    pub name: Vec<String>,
    #[serde(deserialize_with = "creator_list::deserialize")]
    pub creator: Vec<String>,
}

impl AccessPoints {
    pub fn is_empty(&self) -> bool {
        self.subject.is_empty()
            && self.place.is_empty()
            && self.name.is_empty()
            && self.creator.is_empty()
    }
}

/// Durable progress record for a resumable run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    #[serde(alias = "offset")]
    pub skip: u64,
    pub page_limit: u64,
    pub total: Option<u64>,
    pub processed: u64,
    #[serde(with = "term_set")]
    pub unique_subjects: BTreeSet<String>,
    #[serde(with = "term_set")]
    pub unique_places: BTreeSet<String>,
    #[serde(with = "term_set")]
    pub unique_names: BTreeSet<String>,
    pub access_points: BTreeMap<String, AccessPoints>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            skip: 0,
            page_limit: 30,
            total: None,
            processed: 0,
            unique_subjects: BTreeSet::new(),
            unique_places: BTreeSet::new(),
            unique_names: BTreeSet::new(),
            access_points: BTreeMap::new(),
        }
    }
}

impl Checkpoint {
    pub fn is_pristine(&self) -> bool {
        *self
            == Self {
                page_limit: self.page_limit,
                ..Self::default()
            }
    }

    /// Store one resource's associations and fold its terms into the unique sets.
    ///
    /// Creators are agents on the target side, so they join the name set.
    pub fn record_access_points(&mut self, id_0: &str, points: AccessPoints) {
        self.unique_subjects.extend(points.subject.iter().cloned());
        self.unique_places.extend(points.place.iter().cloned());
        self.unique_names.extend(points.name.iter().cloned());
        self.unique_names.extend(points.creator.iter().cloned());
        self.access_points.insert(id_0.to_string(), points);
    }
}

/// Term sets persist as sorted lists and load back as sets.
///
/// Duplicates in a hand-edited file collapse on load and `null` reads as empty.
mod term_set {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeSet;

    pub fn serialize<S: Serializer>(set: &BTreeSet<String>, ser: S) -> Result<S::Ok, S::Error> {
        set.iter().collect::<Vec<_>>().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<BTreeSet<String>, D::Error> {
        let items = Option::<Vec<String>>::deserialize(de)?;
        Ok(items.unwrap_or_default().into_iter().collect())
    }
}

/// Creators saved by older runs may be authority objects rather than names.
mod creator_list {
    use crate::sync::util::creator_name;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
        let items = Option::<Vec<Value>>::deserialize(de)?;
        Ok(items.unwrap_or_default().iter().filter_map(creator_name).collect())
    }
}

pub fn load(file: &Path) -> Result<Checkpoint> {
    if !file.exists() {
        return Ok(Checkpoint::default());
    }

    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: Checkpoint = serde_json::from_str(&raw)
        .map_err(|err| SyncError::StateCorrupt(format!("{}: {err}", file.display())))?;
    Ok(parsed)
}

/// Persist through a temp file in the same directory so an interrupted write
/// never leaves a truncated checkpoint behind.
pub fn save(file: &Path, state: &Checkpoint) -> Result<()> {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let data = serde_json::to_string_pretty(state)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage checkpoint in {}", parent.display()))?;
    tmp.write_all(data.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(file)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(())
}

pub fn reset(file: &Path, page_limit: u64) -> Result<Checkpoint> {
    let fresh = Checkpoint {
        page_limit,
        ..Checkpoint::default()
    };
    save(file, &fresh)?;
    Ok(fresh)
}
