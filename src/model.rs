use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Experience bucket, using the job board's wire values so the same string
/// round-trips through the database and the search API untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Experience {
    NoExperience,
    Between1And3,
    Between3And6,
    MoreThan6,
}

impl Experience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Experience::NoExperience => "noExperience",
            Experience::Between1And3 => "between1And3",
            Experience::Between3And6 => "between3And6",
            Experience::MoreThan6 => "moreThan6",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "noExperience" => Some(Experience::NoExperience),
            "between1And3" => Some(Experience::Between1And3),
            "between3And6" => Some(Experience::Between3And6),
            "moreThan6" => Some(Experience::MoreThan6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    FullDay,
    Flexible,
    Remote,
}

impl Schedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schedule::FullDay => "fullDay",
            Schedule::Flexible => "flexible",
            Schedule::Remote => "remote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fullDay" => Some(Schedule::FullDay),
            "flexible" => Some(Schedule::Flexible),
            "remote" => Some(Schedule::Remote),
            _ => None,
        }
    }
}

/// Stored schedule set as a comma-joined string (the storage format).
pub fn schedules_to_str(schedules: &[Schedule]) -> String {
    schedules
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined schedule string, dropping anything unrecognized.
pub fn schedules_from_str(s: &str) -> Vec<Schedule> {
    s.split(',').filter_map(Schedule::parse).collect()
}

/// A saved user search: what to look for and where the last crawl stopped.
#[derive(Debug, Clone)]
pub struct JobSearch {
    pub id: i64,
    pub user_id: i64,
    pub search_text: String,
    pub region_id: Option<String>,
    pub experience: Experience,
    pub schedules: Vec<Schedule>,
    pub user_wish: String,
    /// Look-back window in days for the very first crawl; 0 means "since the
    /// search was created".
    pub initial_search_days: i64,
    /// Publish time of the most recently seen vacancy (the crawl checkpoint).
    pub last_seen_published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobSearch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: i64,
        search_text: impl Into<String>,
        region_id: Option<String>,
        experience: Experience,
        schedules: Vec<Schedule>,
        user_wish: impl Into<String>,
        initial_search_days: i64,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            search_text: search_text.into(),
            region_id,
            experience,
            schedules,
            user_wish: user_wish.into(),
            initial_search_days,
            last_seen_published_at: None,
            created_at: Utc::now(),
        }
    }
}

/// One vacancy as returned by the job board. Transient: fetched per cycle,
/// never persisted; only notification facts about it are.
#[derive(Debug, Clone)]
pub struct Vacancy {
    pub id: String,
    pub url: String,
    pub name: String,
    pub description: String,
    pub key_skills: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// A vacancy whose classification failed, queued for the next retry pass.
#[derive(Debug, Clone)]
pub struct FailedVacancy {
    pub search_id: i64,
    pub vacancy_id: String,
    pub error: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Internal pipeline message: one (search, vacancy) pair awaiting
/// classification by the worker pool.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub search: Arc<JobSearch>,
    pub vacancy: Vacancy,
}

/// Internal pipeline message: a classification attempt that failed, on its
/// way to the failed-vacancies ledger.
#[derive(Debug)]
pub struct AnalysisError {
    pub search_id: i64,
    pub vacancy_id: String,
    pub error: String,
}
