use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Activity, LessonData, PlanStatus};

/// A user-authored lesson, persisted independently of the base dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub id: String,
    pub date: NaiveDate,
    pub week: u32,
    pub class_name: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub unit_name: Option<String>,
    /// Base lesson this plan shadows in the merged view.
    #[serde(default)]
    pub lesson_number: Option<String>,
    #[serde(default)]
    pub curriculum_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanEditError {
    #[error("activity index {index} out of range (plan has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Edits the engine applies to a stored plan.
#[derive(Debug, Clone)]
pub enum PlanEdit {
    AddActivity(Activity),
    RemoveActivity(usize),
    MoveActivity { from: usize, to: usize },
    SetNotes(String),
    SetStatus(PlanStatus),
    SetDate(NaiveDate),
}

pub fn week_of(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

impl LessonPlan {
    pub fn new(class_name: &str, date: NaiveDate) -> Self {
        let now = Utc::now();
        LessonPlan {
            id: Uuid::new_v4().to_string(),
            date,
            week: week_of(date),
            class_name: class_name.to_string(),
            activities: Vec::new(),
            duration: 0,
            notes: String::new(),
            status: PlanStatus::Draft,
            title: None,
            term: None,
            unit_id: None,
            unit_name: None,
            lesson_number: None,
            curriculum_tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seeds a draft from an existing lesson; activities are copied in display order.
    pub fn from_lesson(class_name: &str, lesson_id: &str, lesson: &LessonData, date: NaiveDate) -> Self {
        let mut plan = LessonPlan::new(class_name, date);
        plan.lesson_number = Some(lesson_id.to_string());
        plan.title = lesson.user_title();
        plan.curriculum_tags = lesson.curriculum_tags.clone();
        plan.unit_name = lesson.activities().find_map(|a| a.unit_name.clone());
        for activity in lesson.activities() {
            plan.add_activity(activity);
        }
        plan
    }

    pub fn add_activity(&mut self, activity: &Activity) {
        let copy = activity.instance_copy();
        self.duration = self.duration.saturating_add(copy.time);
        self.activities.push(copy);
        self.assert_duration();
    }

    pub fn remove_activity(&mut self, index: usize) -> Result<Activity, PlanEditError> {
        if index >= self.activities.len() {
            return Err(PlanEditError::IndexOutOfRange {
                index,
                len: self.activities.len(),
            });
        }
        let removed = self.activities.remove(index);
        self.duration = self.duration.saturating_sub(removed.time);
        self.assert_duration();
        Ok(removed)
    }

    pub fn move_activity(&mut self, from: usize, to: usize) -> Result<(), PlanEditError> {
        let len = self.activities.len();
        for index in [from, to] {
            if index >= len {
                return Err(PlanEditError::IndexOutOfRange { index, len });
            }
        }
        let item = self.activities.remove(from);
        self.activities.insert(to, item);
        self.assert_duration();
        Ok(())
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = date;
        self.week = week_of(date);
    }

    pub fn apply(&mut self, edit: PlanEdit) -> Result<(), PlanEditError> {
        match edit {
            PlanEdit::AddActivity(a) => self.add_activity(&a),
            PlanEdit::RemoveActivity(i) => {
                self.remove_activity(i)?;
            }
            PlanEdit::MoveActivity { from, to } => self.move_activity(from, to)?,
            PlanEdit::SetNotes(notes) => self.notes = notes,
            PlanEdit::SetStatus(status) => self.status = status,
            PlanEdit::SetDate(date) => self.set_date(date),
        }
        Ok(())
    }

    /// Restores derived fields on a plan that came from outside the engine.
    pub fn normalize(&mut self) {
        self.week = week_of(self.date);
        self.duration = self.activity_sum();
    }

    pub fn activity_sum(&self) -> u32 {
        self.activities
            .iter()
            .fold(0u32, |acc, a| acc.saturating_add(a.time))
    }

    /// Panics when the cumulative duration no longer matches the activities.
    pub fn assert_duration(&self) {
        assert_eq!(
            self.duration,
            self.activity_sum(),
            "plan {} duration drifted from its activities",
            self.id
        );
    }
}
