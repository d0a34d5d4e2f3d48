//! The aggregation engine: loads a class's base dataset through the
//! persistence gateway, overlays locally authored plans, and owns the merged
//! read model that consumers see as immutable snapshots.
//!
//! Loads are generation-stamped. Each call to [`LessonEngine::load`] takes
//! the next generation number, and a finishing load is applied only if no
//! later load has started, so the most recently requested class always wins
//! regardless of completion order.

use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bootstrap;
use crate::convert::{merge_key, plan_to_lesson_data};
use crate::db::{self, Dataset, PendingSync};
use crate::gateway::{Gateway, ReadTier, SyncReport};
use crate::model::{
    sort_lesson_ids, Activity, DataOrigin, LessonData, LessonSource, MergedLesson, MergedView,
    ParsedDataset,
};
use crate::ordering;
use crate::parser;
use crate::plan::{LessonPlan, PlanEdit, PlanEditError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no class is active; load a class first")]
    NoActiveClass,
    #[error("unknown lesson {0}")]
    UnknownLesson(String),
    #[error("unknown plan {0}")]
    UnknownPlan(String),
    #[error(transparent)]
    InvalidEdit(#[from] PlanEditError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub phase: Phase,
    pub class_id: Option<String>,
    pub view: Option<Arc<MergedView>>,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub view: Arc<MergedView>,
    /// False when a later load started before this one finished.
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub lesson_count: usize,
    pub placeholder: bool,
    pub sync: SyncReport,
    pub view: Arc<MergedView>,
}

struct EngineState {
    class_id: Option<String>,
    phase: Phase,
    base: Arc<ParsedDataset>,
    view: Option<Arc<MergedView>>,
}

pub struct LessonEngine {
    gateway: Arc<Gateway>,
    bootstrap_dir: Option<PathBuf>,
    generation: AtomicU64,
    state: Mutex<EngineState>,
}

/// Overlays plan-derived lessons onto the base dataset. Plans win on id collision.
pub fn merge(
    class_id: &str,
    generation: u64,
    origin: DataOrigin,
    base: &ParsedDataset,
    plans: &[LessonPlan],
) -> MergedView {
    let mut lessons: HashMap<String, MergedLesson> = base
        .lesson_data
        .iter()
        .map(|(id, data)| {
            (
                id.clone(),
                MergedLesson {
                    source: LessonSource::Base,
                    data: data.clone(),
                },
            )
        })
        .collect();

    let mut plan_keys: Vec<String> = Vec::with_capacity(plans.len());
    for plan in plans {
        let key = merge_key(plan);
        lessons.insert(
            key.clone(),
            MergedLesson {
                source: LessonSource::Plan {
                    plan_id: plan.id.clone(),
                },
                data: plan_to_lesson_data(plan),
            },
        );
        if !plan_keys.contains(&key) {
            plan_keys.push(key);
        }
    }

    let mut lesson_ids = sort_lesson_ids(base.lesson_ids.iter().chain(plan_keys.iter()));
    // Plans without a base linkage are keyed by their own id and go last.
    for key in plan_keys {
        if !lesson_ids.contains(&key) {
            lesson_ids.push(key);
        }
    }

    let categories = ordering::order_categories(
        lessons
            .values()
            .flat_map(|l| l.data.category_order.iter().map(String::as_str)),
    );

    MergedView {
        class_id: class_id.to_string(),
        generation,
        origin,
        lessons,
        lesson_ids,
        categories,
    }
}

/// Rebuilds every lesson from its activities so grouping and ordering agree,
/// whatever shape the stored document had.
fn normalize_dataset(dataset: ParsedDataset) -> ParsedDataset {
    let lesson_data: HashMap<String, LessonData> = dataset
        .lesson_data
        .into_iter()
        .map(|(id, data)| {
            let title = data.user_title();
            let tags = data.curriculum_tags.clone();
            let activities: Vec<_> = data.grouped.into_values().flatten().collect();
            (id, LessonData::from_activities(activities, title, tags))
        })
        .collect();
    let lesson_ids = sort_lesson_ids(lesson_data.keys());
    let categories = ordering::order_categories(
        lesson_data
            .values()
            .flat_map(|d| d.category_order.iter().map(String::as_str)),
    );
    ParsedDataset {
        lesson_data,
        lesson_ids,
        categories,
    }
}

impl LessonEngine {
    pub fn new(gateway: Arc<Gateway>, bootstrap_dir: Option<PathBuf>) -> Self {
        Self {
            gateway,
            bootstrap_dir,
            generation: AtomicU64::new(0),
            state: Mutex::new(EngineState {
                class_id: None,
                phase: Phase::Ready,
                base: Arc::new(ParsedDataset::default()),
                view: None,
            }),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.state
            .lock()
            .map_err(|_| EngineError::Storage(anyhow!("engine state lock poisoned")))
    }

    pub fn snapshot(&self) -> Snapshot {
        match self.state.lock() {
            Ok(st) => Snapshot {
                phase: st.phase,
                class_id: st.class_id.clone(),
                view: st.view.clone(),
            },
            Err(_) => Snapshot {
                phase: Phase::Loading,
                class_id: None,
                view: None,
            },
        }
    }

    pub fn active_class(&self) -> Option<String> {
        self.state.lock().ok().and_then(|st| st.class_id.clone())
    }

    fn require_class(&self) -> Result<String, EngineError> {
        self.active_class().ok_or(EngineError::NoActiveClass)
    }

    async fn load_base(&self, class_id: &str) -> (ParsedDataset, DataOrigin) {
        if let Some(read) = self.gateway.read::<ParsedDataset>(class_id, Dataset::Lessons).await {
            let dataset = normalize_dataset(read.value);
            if !dataset.lesson_data.is_empty() {
                let origin = match read.tier {
                    ReadTier::Remote => DataOrigin::Remote,
                    ReadTier::Local => DataOrigin::Local,
                };
                return (dataset, origin);
            }
            if read.tier == ReadTier::Remote {
                debug!(class_id, "remote lesson dataset is empty; trying local tier");
                if let Some(local) = self
                    .gateway
                    .read_local::<ParsedDataset>(class_id, Dataset::Lessons)
                    .map(normalize_dataset)
                    .filter(|d| !d.lesson_data.is_empty())
                {
                    return (local, DataOrigin::Local);
                }
            }
        }

        if let Some(dataset) = bootstrap::bootstrap_dataset(class_id, self.bootstrap_dir.as_deref()) {
            info!(class_id, "no stored lesson data; using bootstrap dataset");
            return (dataset, DataOrigin::Bootstrap);
        }

        warn!(class_id, "no lesson data in any tier; using placeholder lesson");
        (
            ParsedDataset::placeholder(&format!(
                "No lesson data could be loaded for class {class_id}. \
                 The remote store and local cache were empty and no sample data exists for this class."
            )),
            DataOrigin::Placeholder,
        )
    }

    fn local_plans(&self, class_id: &str) -> Vec<LessonPlan> {
        match self.gateway.with_local(|c| db::plans_for_class(c, class_id)) {
            Ok(plans) => plans,
            Err(e) => {
                warn!(class_id, error = %e, "failed to read lesson plans; merging base data only");
                Vec::new()
            }
        }
    }

    /// Fetches base data and plans for `class_id` and publishes the merged view.
    pub async fn load(&self, class_id: &str) -> Loaded {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut st) = self.state.lock() {
            st.class_id = Some(class_id.to_string());
            st.phase = Phase::Loading;
        }
        debug!(class_id, generation, "load started");

        let (base, origin) = self.load_base(class_id).await;
        let plans = self.local_plans(class_id);
        let view = Arc::new(merge(class_id, generation, origin, &base, &plans));

        let applied = match self.state.lock() {
            Ok(mut st) if self.generation.load(Ordering::SeqCst) == generation => {
                st.phase = Phase::Ready;
                st.base = Arc::new(base);
                st.view = Some(view.clone());
                true
            }
            _ => false,
        };

        if applied {
            info!(
                class_id,
                generation,
                origin = ?origin,
                lessons = view.lesson_ids.len(),
                plans = plans.len(),
                "lesson data ready"
            );
        } else {
            debug!(class_id, generation, "load superseded by a later request");
        }
        Loaded { view, applied }
    }

    async fn refresh(&self) {
        if let Some(class_id) = self.active_class() {
            self.load(&class_id).await;
        }
    }

    /// Replaces the active class's base dataset with freshly imported rows.
    pub async fn import(&self, rows: &[Vec<String>]) -> Result<ImportOutcome, EngineError> {
        let class_id = self.require_class()?;
        let (dataset, placeholder) = match parser::parse_rows(rows) {
            Ok(d) => (d, false),
            Err(e) => {
                warn!(class_id, error = %e, "import produced no lessons; storing placeholder");
                (ParsedDataset::placeholder(&format!("Import failed: {e}")), true)
            }
        };
        let lesson_count = dataset.lesson_data.len();
        let activities: usize = dataset.lesson_data.values().map(LessonData::activity_count).sum();
        let outcome = self.gateway.write(&class_id, Dataset::Lessons, &dataset).await?;
        info!(
            class_id,
            lesson_count,
            activities,
            synced = outcome.remote.is_ok(),
            "lesson data imported"
        );

        let loaded = self.load(&class_id).await;
        Ok(ImportOutcome {
            lesson_count,
            placeholder,
            sync: outcome.report(Dataset::Lessons),
            view: loaded.view,
        })
    }

    fn lesson_source(&self, lesson_id: &str) -> Result<(String, LessonSource), EngineError> {
        let st = self.lock()?;
        let class_id = st.class_id.clone().ok_or(EngineError::NoActiveClass)?;
        let source = st
            .view
            .as_ref()
            .filter(|v| v.class_id == class_id)
            .and_then(|v| v.lesson(lesson_id))
            .map(|l| l.source.clone())
            .ok_or_else(|| EngineError::UnknownLesson(lesson_id.to_string()))?;
        Ok((class_id, source))
    }

    /// Swaps one lesson in the published view without a full reload.
    fn publish_lesson(
        &self,
        st: &mut EngineState,
        lesson_id: &str,
        lesson: MergedLesson,
    ) {
        if let Some(view) = st.view.as_ref() {
            let mut next = (**view).clone();
            next.lessons.insert(lesson_id.to_string(), lesson);
            st.view = Some(Arc::new(next));
        }
    }

    /// Applies `f` to a base lesson, publishes it, then writes the base
    /// dataset through the gateway.
    async fn update_base_lesson(
        &self,
        lesson_id: &str,
        f: impl FnOnce(&LessonData) -> LessonData,
    ) -> Result<(LessonData, SyncReport), EngineError> {
        let (class_id, base, updated) = {
            let mut st = self.lock()?;
            let class_id = st.class_id.clone().ok_or(EngineError::NoActiveClass)?;
            let mut base = (*st.base).clone();
            let current = base
                .lesson_data
                .get(lesson_id)
                .ok_or_else(|| EngineError::UnknownLesson(lesson_id.to_string()))?;
            let updated = f(current);
            base.lesson_data.insert(lesson_id.to_string(), updated.clone());
            let base = Arc::new(base);
            st.base = base.clone();
            self.publish_lesson(
                &mut st,
                lesson_id,
                MergedLesson {
                    source: LessonSource::Base,
                    data: updated.clone(),
                },
            );
            (class_id, base, updated)
        };
        let outcome = self
            .gateway
            .write(&class_id, Dataset::Lessons, base.as_ref())
            .await?;
        Ok((updated, outcome.report(Dataset::Lessons)))
    }

    /// Applies `f` to a stored plan, persists it, and republishes its lesson.
    fn update_plan_lesson(
        &self,
        lesson_id: &str,
        plan_id: &str,
        f: impl FnOnce(&mut LessonPlan),
    ) -> Result<LessonData, EngineError> {
        let mut plan = self
            .gateway
            .with_local(|c| db::plan_get(c, plan_id))?
            .ok_or_else(|| EngineError::UnknownPlan(plan_id.to_string()))?;
        f(&mut plan);
        plan.updated_at = Utc::now();
        self.gateway.with_local(|c| db::plan_upsert(c, &plan))?;

        let data = plan_to_lesson_data(&plan);
        let mut st = self.lock()?;
        self.publish_lesson(
            &mut st,
            lesson_id,
            MergedLesson {
                source: LessonSource::Plan {
                    plan_id: plan.id.clone(),
                },
                data: data.clone(),
            },
        );
        Ok(data)
    }

    pub async fn set_curriculum_tag(
        &self,
        lesson_id: &str,
        tag: &str,
        change: TagChange,
    ) -> Result<LessonData, EngineError> {
        let tag = tag.trim().to_string();
        let apply = |tags: &mut Vec<String>| match change {
            TagChange::Add => {
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag.clone());
                }
            }
            TagChange::Remove => tags.retain(|t| *t != tag),
        };

        let (class_id, source) = self.lesson_source(lesson_id)?;
        let data = match source {
            LessonSource::Base => {
                let (data, report) = self
                    .update_base_lesson(lesson_id, |current| {
                        let mut next = current.clone();
                        apply(&mut next.curriculum_tags);
                        next
                    })
                    .await?;
                debug!(class_id, lesson_id, synced = report.synced, "base lesson tags saved");
                data
            }
            LessonSource::Plan { plan_id } => {
                self.update_plan_lesson(lesson_id, &plan_id, |plan| apply(&mut plan.curriculum_tags))?
            }
        };
        Ok(data)
    }

    /// Sets or clears (empty string) an explicit lesson title.
    pub async fn set_title(&self, lesson_id: &str, title: &str) -> Result<LessonData, EngineError> {
        let title = Some(title.trim().to_string()).filter(|t| !t.is_empty());
        let (class_id, source) = self.lesson_source(lesson_id)?;
        let data = match source {
            LessonSource::Plan { plan_id } => {
                self.update_plan_lesson(lesson_id, &plan_id, |plan| plan.title = title.clone())?
            }
            LessonSource::Base => {
                let (data, report) = self
                    .update_base_lesson(lesson_id, |current| {
                        let activities: Vec<_> = current.activities().cloned().collect();
                        LessonData::from_activities(
                            activities,
                            title.clone(),
                            current.curriculum_tags.clone(),
                        )
                    })
                    .await?;
                debug!(class_id, lesson_id, synced = report.synced, "base lesson title saved");
                data
            }
        };
        info!(class_id, lesson_id, title = ?data.title, "lesson title updated");
        Ok(data)
    }

    /// Distinct activities of the current view, one per `(name, category)`,
    /// in lesson order.
    pub fn activity_library(&self) -> Result<Vec<Activity>, EngineError> {
        let st = self.lock()?;
        let view = st.view.as_ref().ok_or(EngineError::NoActiveClass)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for lesson_id in &view.lesson_ids {
            let Some(lesson) = view.lesson(lesson_id) else {
                continue;
            };
            for activity in lesson.data.activities() {
                let (name, category) = activity.identity();
                if seen.insert((name.to_string(), category.to_string())) {
                    out.push(Activity {
                        instance_id: None,
                        ..activity.clone()
                    });
                }
            }
        }
        Ok(out)
    }

    pub fn list_plans(&self, class_id: Option<&str>) -> Result<Vec<LessonPlan>, EngineError> {
        let plans = match class_id {
            Some(c) => self.gateway.with_local(|conn| db::plans_for_class(conn, c))?,
            None => self.gateway.with_local(db::plans_all)?,
        };
        Ok(plans)
    }

    pub fn get_plan(&self, plan_id: &str) -> Result<LessonPlan, EngineError> {
        self.gateway
            .with_local(|c| db::plan_get(c, plan_id))?
            .ok_or_else(|| EngineError::UnknownPlan(plan_id.to_string()))
    }

    fn store_plan(&self, mut plan: LessonPlan) -> Result<LessonPlan, EngineError> {
        plan.normalize();
        plan.class_name = plan.class_name.trim().to_string();
        if plan.class_name.is_empty() {
            plan.class_name = self.require_class()?;
        }
        let now = Utc::now();
        match self.gateway.with_local(|c| db::plan_get(c, &plan.id))? {
            Some(existing) => plan.created_at = existing.created_at,
            None => plan.created_at = now,
        }
        plan.updated_at = now;
        let inserted = self.gateway.with_local(|c| db::plan_upsert(c, &plan))?;
        info!(
            plan_id = %plan.id,
            class_name = %plan.class_name,
            inserted,
            "lesson plan saved"
        );
        Ok(plan)
    }

    /// Upserts a plan by id and reloads the merged view.
    pub async fn save_plan(&self, plan: LessonPlan) -> Result<LessonPlan, EngineError> {
        let plan = self.store_plan(plan)?;
        self.refresh().await;
        Ok(plan)
    }

    pub async fn delete_plan(&self, plan_id: &str) -> Result<bool, EngineError> {
        let deleted = self.gateway.with_local(|c| db::plan_delete(c, plan_id))?;
        if deleted {
            info!(plan_id, "lesson plan deleted");
        }
        self.refresh().await;
        Ok(deleted)
    }

    /// Starts a draft plan from a lesson in the current view.
    pub async fn create_plan_from_lesson(
        &self,
        lesson_id: &str,
        date: NaiveDate,
    ) -> Result<LessonPlan, EngineError> {
        let (class_id, lesson) = {
            let st = self.lock()?;
            let class_id = st.class_id.clone().ok_or(EngineError::NoActiveClass)?;
            let lesson = st
                .view
                .as_ref()
                .and_then(|v| v.lesson(lesson_id))
                .map(|l| l.data.clone())
                .ok_or_else(|| EngineError::UnknownLesson(lesson_id.to_string()))?;
            (class_id, lesson)
        };
        let plan = LessonPlan::from_lesson(&class_id, lesson_id, &lesson, date);
        self.save_plan(plan).await
    }

    pub async fn edit_plan(&self, plan_id: &str, edit: PlanEdit) -> Result<LessonPlan, EngineError> {
        let mut plan = self.get_plan(plan_id)?;
        plan.apply(edit)?;
        self.save_plan(plan).await
    }

    pub fn pending_sync(&self, class_id: &str) -> Result<Vec<PendingSync>, EngineError> {
        Ok(self.gateway.pending(class_id)?)
    }

    pub async fn flush_sync(&self, class_id: &str) -> Result<Vec<SyncReport>, EngineError> {
        Ok(self.gateway.flush(class_id).await?)
    }
}
