use crate::model::LessonData;
use crate::plan::LessonPlan;

/// Key a plan occupies in the merged lesson map.
pub fn merge_key(plan: &LessonPlan) -> String {
    plan.lesson_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&plan.id)
        .to_string()
}

/// Renders a plan in the same shape the record parser produces.
pub fn plan_to_lesson_data(plan: &LessonPlan) -> LessonData {
    LessonData::from_activities(
        plan.activities.iter().cloned(),
        plan.title.clone(),
        plan.curriculum_tags.clone(),
    )
}
