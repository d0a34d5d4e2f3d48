use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::ordering;

/// One teachable unit. Identity for deduplication is `(activity_name, category)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Activity {
    pub activity_name: String,
    pub description: String,
    pub time: u32,
    pub video_link: Option<String>,
    pub music_link: Option<String>,
    pub backing_link: Option<String>,
    pub resource_link: Option<String>,
    pub vocals_link: Option<String>,
    pub image_link: Option<String>,
    pub category: String,
    pub level: String,
    pub unit_name: Option<String>,
    pub lesson_number: String,
    pub curriculum_tags: Vec<String>,
    /// Set when the activity is copied into a plan so duplicates stay addressable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,
}

impl Activity {
    pub fn identity(&self) -> (&str, &str) {
        (&self.activity_name, &self.category)
    }

    /// Copy-on-add: a fresh instance for insertion into a plan.
    pub fn instance_copy(&self) -> Activity {
        Activity {
            instance_id: Some(Uuid::new_v4()),
            ..self.clone()
        }
    }
}

/// Read model for one lesson id. Only built through [`LessonData::from_activities`],
/// which keeps `grouped` keys and `category_order` in one-to-one correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonData {
    pub grouped: BTreeMap<String, Vec<Activity>>,
    pub category_order: Vec<String>,
    pub total_time: u32,
    /// Display title: the user-set one, else synthesized from `category_order`.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_title: Option<String>,
    #[serde(default)]
    pub curriculum_tags: Vec<String>,
}

impl LessonData {
    pub fn from_activities<I>(activities: I, title: Option<String>, tags: Vec<String>) -> Self
    where
        I: IntoIterator<Item = Activity>,
    {
        let mut grouped: BTreeMap<String, Vec<Activity>> = BTreeMap::new();
        let mut total_time = 0u32;
        for activity in activities {
            total_time = total_time.saturating_add(activity.time);
            grouped
                .entry(activity.category.clone())
                .or_default()
                .push(activity);
        }
        let category_order = ordering::order_categories(grouped.keys().map(String::as_str));
        let explicit_title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let title = explicit_title
            .clone()
            .or_else(|| Some(ordering::synthesize_title(&category_order)));
        LessonData {
            grouped,
            category_order,
            total_time,
            title,
            explicit_title,
            curriculum_tags: tags,
        }
    }

    /// The title a user set, if any. Documents that only carry `title` count it
    /// as set when it differs from what the synthesizer gives for their stored
    /// `category_order`.
    pub fn user_title(&self) -> Option<String> {
        if self.explicit_title.is_some() {
            return self.explicit_title.clone();
        }
        self.title
            .clone()
            .filter(|t| *t != ordering::synthesize_title(&self.category_order))
    }

    /// Activities in display order: by category ordering, then insertion order.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.category_order
            .iter()
            .filter_map(|c| self.grouped.get(c))
            .flat_map(|v| v.iter())
    }

    pub fn activity_count(&self) -> usize {
        self.grouped.values().map(Vec::len).sum()
    }
}

/// Output of the record parser and the persisted base-dataset structure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDataset {
    pub lesson_data: HashMap<String, LessonData>,
    pub lesson_ids: Vec<String>,
    pub categories: Vec<String>,
}

impl ParsedDataset {
    /// Single-lesson dataset whose only activity describes why nothing else loaded.
    pub fn placeholder(message: &str) -> Self {
        let activity = Activity {
            activity_name: "No lesson data".to_string(),
            description: message.to_string(),
            category: "Welcome".to_string(),
            level: "All".to_string(),
            lesson_number: "1".to_string(),
            ..Activity::default()
        };
        let data = LessonData::from_activities([activity], None, Vec::new());
        let categories = data.category_order.clone();
        let mut lesson_data = HashMap::new();
        lesson_data.insert("1".to_string(), data);
        ParsedDataset {
            lesson_data,
            lesson_ids: vec!["1".to_string()],
            categories,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Draft,
    Planned,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn parse(s: &str) -> Option<PlanStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(PlanStatus::Draft),
            "planned" => Some(PlanStatus::Planned),
            "completed" => Some(PlanStatus::Completed),
            "cancelled" | "canceled" => Some(PlanStatus::Cancelled),
            _ => None,
        }
    }
}

/// Where a merged lesson physically lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LessonSource {
    Base,
    #[serde(rename_all = "camelCase")]
    Plan { plan_id: String },
}

/// Which tier supplied a class's base dataset on the last load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Remote,
    Local,
    Bootstrap,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedLesson {
    pub source: LessonSource,
    pub data: LessonData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedView {
    pub class_id: String,
    pub generation: u64,
    pub origin: DataOrigin,
    pub lessons: HashMap<String, MergedLesson>,
    pub lesson_ids: Vec<String>,
    pub categories: Vec<String>,
}

impl MergedView {
    pub fn lesson(&self, lesson_id: &str) -> Option<&MergedLesson> {
        self.lessons.get(lesson_id)
    }
}

/// Numeric ordering of lesson ids; ids that are not integers are dropped.
pub fn sort_lesson_ids<'a, I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut numbered: Vec<(i64, &String)> = Vec::new();
    for id in ids {
        if let Ok(n) = id.trim().parse::<i64>() {
            if !numbered.iter().any(|(_, seen)| *seen == id) {
                numbered.push((n, id));
            }
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, id)| id.clone()).collect()
}
