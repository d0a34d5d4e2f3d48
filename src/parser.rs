use std::collections::HashMap;
use thiserror::Error;

use crate::model::{sort_lesson_ids, Activity, LessonData, ParsedDataset};
use crate::ordering;

// Fixed spreadsheet column layout.
const COL_LESSON: usize = 0;
const COL_CATEGORY: usize = 1;
const COL_NAME: usize = 2;
const COL_DESCRIPTION: usize = 3;
const COL_LEVEL: usize = 4;
const COL_MINUTES: usize = 5;
const COL_VIDEO: usize = 6;
const COL_MUSIC: usize = 7;
const COL_BACKING: usize = 8;
const COL_RESOURCE: usize = 9;
const COL_UNIT: usize = 10;

const MIN_POPULATED_CELLS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no lesson rows found")]
    Empty,
    #[error("input is not tabular: {0}")]
    NotTabular(String),
}

/// Coerces JSON cell values (strings, numbers, booleans, nulls) into string rows.
/// A row that is not an array becomes an empty row, which [`parse_rows`] drops.
pub fn rows_from_json(value: &serde_json::Value) -> Result<Vec<Vec<String>>, ParseError> {
    let rows = value
        .as_array()
        .ok_or_else(|| ParseError::NotTabular("expected an array of rows".to_string()))?;
    Ok(rows
        .iter()
        .map(|row| match row.as_array() {
            Some(cells) => cells
                .iter()
                .map(|c| match c {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            None => Vec::new(),
        })
        .collect())
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or("")
}

fn opt_cell(row: &[String], idx: usize) -> Option<String> {
    Some(cell(row, idx).to_string()).filter(|s| !s.is_empty())
}

pub fn parse_minutes(raw: &str) -> u32 {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return u32::try_from(n).unwrap_or(0);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 => v.trunc() as u32,
        _ => 0,
    }
}

/// Builds the per-lesson read model from spreadsheet rows. The first row is a
/// header. Malformed rows are dropped silently.
pub fn parse_rows(rows: &[Vec<String>]) -> Result<ParsedDataset, ParseError> {
    if rows.len() < 2 {
        return Err(ParseError::Empty);
    }

    let mut current_lesson: Option<String> = None;
    let mut seen_order: Vec<String> = Vec::new();
    let mut by_lesson: HashMap<String, Vec<Activity>> = HashMap::new();

    for row in rows.iter().skip(1) {
        let populated = row.iter().filter(|c| !c.trim().is_empty()).count();
        if populated < MIN_POPULATED_CELLS {
            continue;
        }

        let lesson_cell = cell(row, COL_LESSON);
        let lesson_number = if lesson_cell.is_empty() {
            current_lesson.clone().unwrap_or_else(|| "1".to_string())
        } else {
            lesson_cell.to_string()
        };
        current_lesson = Some(lesson_number.clone());

        let category = cell(row, COL_CATEGORY);
        let activity_name = cell(row, COL_NAME);
        if category.is_empty() || activity_name.is_empty() {
            continue;
        }

        let activity = Activity {
            activity_name: activity_name.to_string(),
            description: cell(row, COL_DESCRIPTION).to_string(),
            time: parse_minutes(cell(row, COL_MINUTES)),
            video_link: opt_cell(row, COL_VIDEO),
            music_link: opt_cell(row, COL_MUSIC),
            backing_link: opt_cell(row, COL_BACKING),
            resource_link: opt_cell(row, COL_RESOURCE),
            vocals_link: None,
            image_link: None,
            category: category.to_string(),
            level: cell(row, COL_LEVEL).to_string(),
            unit_name: opt_cell(row, COL_UNIT),
            lesson_number: lesson_number.clone(),
            curriculum_tags: Vec::new(),
            instance_id: None,
        };

        if !by_lesson.contains_key(&lesson_number) {
            seen_order.push(lesson_number.clone());
        }
        by_lesson.entry(lesson_number).or_default().push(activity);
    }

    if by_lesson.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut lesson_data = HashMap::with_capacity(by_lesson.len());
    for (id, activities) in by_lesson {
        lesson_data.insert(id, LessonData::from_activities(activities, None, Vec::new()));
    }

    let lesson_ids = sort_lesson_ids(&seen_order);
    let categories = ordering::order_categories(
        lesson_data
            .values()
            .flat_map(|d| d.category_order.iter().map(String::as_str)),
    );

    Ok(ParsedDataset {
        lesson_data,
        lesson_ids,
        categories,
    })
}
