//! AI match classification: build a constrained prompt, parse the answer.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::clients::{GenerateError, TextGenerator};
use crate::model::{JobSearch, Vacancy};

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The model answered outside the allowed set. Indistinguishable from a
    /// one-off glitch, so callers queue it for retry like a transient error.
    #[error("unexpected answer {answer:?} for vacancy {url}")]
    UnexpectedAnswer { answer: String, url: String },
    #[error(transparent)]
    Generation(#[from] GenerateError),
}

/// Decides whether a vacancy matches the user's free-text wish.
#[async_trait]
pub trait MatchClassifier: Send + Sync {
    async fn matches(&self, search: &JobSearch, vacancy: &Vacancy) -> Result<bool, ClassifyError>;
}

pub struct AiMatchClassifier {
    generator: Arc<dyn TextGenerator>,
}

impl AiMatchClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn build_prompt(search: &JobSearch, vacancy: &Vacancy) -> String {
        let mut prompt = format!(
            "Название вакансии: {} Описание: {}",
            vacancy.name, vacancy.description
        );

        if !vacancy.key_skills.is_empty() {
            prompt.push_str(" Ключевые навыки: ");
            prompt.push_str(&vacancy.key_skills.join(", "));
        }

        prompt.push_str(" Пожелание к вакансии: ");
        prompt.push_str(&search.user_wish);
        prompt.push_str(
            " Ты фильтруешь вакансии на основе пожелания пользователя. \
             Соответствует ли вакансия его запросу? Тщательно проанализируй. \
             Можешь отвечать в качестве степени уверенности (по нарастающей) \
             только \"нет\", \"скорее нет\", \"скорее да\", \"да\"",
        );
        prompt
    }
}

/// The model occasionally wraps its verdict in markdown emphasis
/// ("**скорее нет**"), so asterisks are stripped before parsing.
fn parse_answer(raw: &str) -> Option<bool> {
    let answer = raw.to_lowercase().replace('*', "");
    let answer = answer.trim();

    if answer.starts_with("скорее да") || answer.starts_with("да") {
        Some(true)
    } else if answer.starts_with("скорее нет") || answer.starts_with("нет") {
        Some(false)
    } else {
        None
    }
}

#[async_trait]
impl MatchClassifier for AiMatchClassifier {
    async fn matches(&self, search: &JobSearch, vacancy: &Vacancy) -> Result<bool, ClassifyError> {
        let prompt = Self::build_prompt(search, vacancy);
        let answer = self.generator.generate(&prompt).await?;

        debug!(vacancy_url = %vacancy.url, %answer, "got classifier answer");

        parse_answer(&answer).ok_or_else(|| ClassifyError::UnexpectedAnswer {
            answer,
            url: vacancy.url.clone(),
        })
    }
}
