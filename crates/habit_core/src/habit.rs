use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar;
use crate::error::ValidationError;

pub type HabitId = Uuid;
pub type CategoryId = Uuid;

pub const DEFAULT_ICON: &str = "circle";
pub const DEFAULT_COLOR: &str = "blue";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: HabitId,
    pub title: String,
    pub icon: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<NaiveTime>,
}

impl Habit {
    pub fn builder(title: impl Into<String>) -> HabitBuilder {
        HabitBuilder::new(title.into())
    }

    /// Local calendar day the habit was created on.
    ///
    /// Days before this are "not applicable" for rate calculations.
    pub fn created_on(&self) -> NaiveDate {
        calendar::start_of_day(&self.created_at.with_timezone(&Local))
    }

    pub fn is_applicable_on(&self, day: NaiveDate) -> bool {
        day >= self.created_on()
    }

    pub fn rename(&mut self, title: &str) -> Result<(), ValidationError> {
        self.title = normalize_title(title)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(name: &str, color: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyCategoryName);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.into(),
        })
    }
}

pub struct HabitBuilder {
    id: Option<HabitId>,
    title: String,
    icon: Option<String>,
    color: Option<String>,
    created_at: Option<DateTime<Utc>>,
    category_id: Option<CategoryId>,
    reminder_time: Option<NaiveTime>,
}

impl HabitBuilder {
    fn new(title: String) -> Self {
        Self {
            id: None,
            title,
            icon: None,
            color: None,
            created_at: None,
            category_id: None,
            reminder_time: None,
        }
    }

    pub fn id(mut self, id: HabitId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Shorthand for a creation instant at local midnight of `day`.
    pub fn created_on(self, day: NaiveDate) -> Self {
        let instant = calendar::local_midnight(day, &Local)
            .map(|midnight| midnight.with_timezone(&Utc))
            .unwrap_or_else(|| day.and_time(NaiveTime::MIN).and_utc());
        self.created_at(instant)
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn reminder(mut self, time: NaiveTime) -> Self {
        self.reminder_time = Some(time);
        self
    }

    pub fn build(self) -> Result<Habit, ValidationError> {
        let title = normalize_title(&self.title)?;
        Ok(Habit {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            title,
            icon: non_blank_or(self.icon, DEFAULT_ICON),
            color: non_blank_or(self.color, DEFAULT_COLOR),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            category_id: self.category_id,
            reminder_time: self.reminder_time,
        })
    }
}

fn normalize_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

fn non_blank_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
