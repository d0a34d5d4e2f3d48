use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::db::Dataset;
use crate::gateway::{Gateway, ReadTier, SyncReport};
use crate::model::DataOrigin;

const BUILTIN_CATALOG: &[&str] = &[
    "Communication and Language: Listening, attention and understanding",
    "Communication and Language: Speaking",
    "Personal, Social and Emotional Development: Self-regulation",
    "Personal, Social and Emotional Development: Building relationships",
    "Physical Development: Gross motor skills",
    "Physical Development: Fine motor skills",
    "Expressive Arts and Design: Being imaginative and expressive",
    "Expressive Arts and Design: Creating with materials",
    "Music: Pulse and rhythm",
    "Music: Pitch and singing",
    "Music: Dynamics and tempo",
    "Music: Listening and responding",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagArea {
    pub area: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCatalog {
    pub class_id: String,
    pub origin: DataOrigin,
    pub tags: Vec<String>,
    pub structured: Vec<TagArea>,
}

impl TagCatalog {
    fn new(class_id: &str, origin: DataOrigin, tags: Vec<String>) -> Self {
        let structured = structure(&tags);
        TagCatalog {
            class_id: class_id.to_string(),
            origin,
            tags,
            structured,
        }
    }
}

pub fn builtin_catalog() -> Vec<String> {
    BUILTIN_CATALOG.iter().map(|s| s.to_string()).collect()
}

/// Groups `"Area: Detail"` strings by area, splitting on the first colon and
/// keeping first-seen order of areas and details. A string without a colon
/// becomes an area with no details.
pub fn structure(tags: &[String]) -> Vec<TagArea> {
    let mut out: Vec<TagArea> = Vec::new();
    for tag in tags {
        let (area, detail) = match tag.split_once(':') {
            Some((a, d)) => (a.trim(), Some(d.trim())),
            None => (tag.trim(), None),
        };
        if area.is_empty() {
            continue;
        }
        let idx = match out.iter().position(|a| a.area == area) {
            Some(i) => i,
            None => {
                out.push(TagArea {
                    area: area.to_string(),
                    details: Vec::new(),
                });
                out.len() - 1
            }
        };
        if let Some(d) = detail.filter(|d| !d.is_empty()) {
            out[idx].details.push(d.to_string());
        }
    }
    out
}

pub fn flatten(areas: &[TagArea]) -> Vec<String> {
    let mut out = Vec::new();
    for a in areas {
        if a.details.is_empty() {
            out.push(a.area.clone());
        }
        for d in &a.details {
            out.push(format!("{}: {}", a.area, d));
        }
    }
    out
}

/// Per-class curriculum tag catalog, persisted through the gateway in flat
/// and structured form.
pub struct TagStore {
    gateway: Arc<Gateway>,
    active: Mutex<Option<TagCatalog>>,
}

impl TagStore {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            active: Mutex::new(None),
        }
    }

    pub async fn load(&self, class_id: &str) -> TagCatalog {
        let catalog = match self
            .gateway
            .read::<Vec<String>>(class_id, Dataset::CurriculumTags)
            .await
        {
            Some(read) if read.tier == ReadTier::Remote && read.value.is_empty() => {
                // An empty remote catalog is no data.
                match self
                    .gateway
                    .read_local::<Vec<String>>(class_id, Dataset::CurriculumTags)
                {
                    Some(local) => TagCatalog::new(class_id, DataOrigin::Local, local),
                    None => TagCatalog::new(class_id, DataOrigin::Bootstrap, builtin_catalog()),
                }
            }
            Some(read) => {
                let origin = match read.tier {
                    ReadTier::Remote => DataOrigin::Remote,
                    ReadTier::Local => DataOrigin::Local,
                };
                TagCatalog::new(class_id, origin, read.value)
            }
            None => TagCatalog::new(class_id, DataOrigin::Bootstrap, builtin_catalog()),
        };
        info!(class_id, origin = ?catalog.origin, tags = catalog.tags.len(), "curriculum tags loaded");
        if let Ok(mut active) = self.active.lock() {
            *active = Some(catalog.clone());
        }
        catalog
    }

    fn cached(&self, class_id: &str) -> Option<TagCatalog> {
        self.active
            .lock()
            .ok()?
            .as_ref()
            .filter(|c| c.class_id == class_id)
            .cloned()
    }

    async fn current(&self, class_id: &str) -> TagCatalog {
        match self.cached(class_id) {
            Some(c) => c,
            None => self.load(class_id).await,
        }
    }

    pub async fn add(&self, class_id: &str, tag: &str) -> anyhow::Result<(TagCatalog, Vec<SyncReport>)> {
        let tag = tag.trim().to_string();
        let mut tags = self.current(class_id).await.tags;
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
        self.save(class_id, tags).await
    }

    pub async fn remove(&self, class_id: &str, tag: &str) -> anyhow::Result<(TagCatalog, Vec<SyncReport>)> {
        let tag = tag.trim();
        let mut tags = self.current(class_id).await.tags;
        tags.retain(|t| t != tag);
        self.save(class_id, tags).await
    }

    async fn save(&self, class_id: &str, tags: Vec<String>) -> anyhow::Result<(TagCatalog, Vec<SyncReport>)> {
        let catalog = TagCatalog::new(class_id, DataOrigin::Local, tags);
        let flat = self
            .gateway
            .write(class_id, Dataset::CurriculumTags, &catalog.tags)
            .await?;
        let structured = self
            .gateway
            .write(class_id, Dataset::CurriculumTagsStructured, &catalog.structured)
            .await?;
        info!(class_id, tags = catalog.tags.len(), "curriculum tag catalog saved");
        if let Ok(mut active) = self.active.lock() {
            *active = Some(catalog.clone());
        }
        Ok((
            catalog,
            vec![
                flat.report(Dataset::CurriculumTags),
                structured.report(Dataset::CurriculumTagsStructured),
            ],
        ))
    }
}
