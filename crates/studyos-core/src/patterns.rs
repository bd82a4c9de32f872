//! Learning-pattern aggregation and study recommendations.
//!
//! Consumes the effectiveness rows appended on every session stop and keeps
//! one running aggregate per subject plus a global one. Aggregates update
//! incrementally; no full rescans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::energy::TimeOfDay;
use crate::error::Result;
use crate::session::SessionEffectiveness;
use crate::store::Store;

/// Minimum samples before a pattern yields recommendations.
pub const MIN_SAMPLES: u32 = 5;

/// Suggested session lengths are clamped into this range (minutes).
pub const DURATION_CLAMP: (u16, u16) = (25, 120);

/// Per-time-of-day focus accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TodAccum {
    pub focus_sum: f64,
    pub count: u32,
}

impl TodAccum {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.focus_sum / self.count as f64)
    }
}

/// Running aggregate of study effectiveness, keyed by subject (or global).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPattern {
    /// `None` is the global pattern.
    pub subject_code: Option<String>,
    pub avg_duration_mins: f64,
    pub best_study_time: TimeOfDay,
    pub effectiveness_score: f64,
    pub samples_count: u32,
    /// Focus accumulators keyed by time-of-day name.
    pub tod_stats: BTreeMap<String, TodAccum>,
}

impl LearningPattern {
    pub fn empty(subject_code: Option<String>) -> Self {
        Self {
            subject_code,
            avg_duration_mins: 0.0,
            best_study_time: TimeOfDay::Morning,
            effectiveness_score: 0.0,
            samples_count: 0,
            tod_stats: BTreeMap::new(),
        }
    }

    /// Fold one effectiveness record into the running averages.
    pub fn ingest(&mut self, eff: &SessionEffectiveness) {
        let n = self.samples_count as f64;
        self.avg_duration_mins =
            (self.avg_duration_mins * n + eff.duration_mins as f64) / (n + 1.0);
        self.effectiveness_score = (self.effectiveness_score * n + eff.focus_score) / (n + 1.0);
        self.samples_count += 1;

        let accum = self
            .tod_stats
            .entry(eff.time_of_day.as_str().to_string())
            .or_default();
        accum.focus_sum += eff.focus_score;
        accum.count += 1;

        self.best_study_time = self.argmax_tod();
    }

    /// Time-of-day with the highest mean focus; chronological order breaks
    /// ties so repeated runs stay stable.
    fn argmax_tod(&self) -> TimeOfDay {
        let mut best = TimeOfDay::Morning;
        let mut best_mean = f64::MIN;
        for tod in TimeOfDay::ALL {
            if let Some(mean) = self.tod_stats.get(tod.as_str()).and_then(|a| a.mean()) {
                if mean > best_mean {
                    best_mean = mean;
                    best = tod;
                }
            }
        }
        best
    }

    /// Suggested session length, clamped to a sane study range. `None`
    /// until enough samples exist.
    pub fn suggested_duration(&self) -> Option<u16> {
        if self.samples_count < MIN_SAMPLES {
            return None;
        }
        let (lo, hi) = DURATION_CLAMP;
        Some((self.avg_duration_mins.round() as u16).clamp(lo, hi))
    }

    /// Best time of day to study. `None` until enough samples exist.
    pub fn optimal_time(&self) -> Option<TimeOfDay> {
        (self.samples_count >= MIN_SAMPLES).then_some(self.best_study_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Timing,
    Duration,
    Break,
    SubjectOrder,
}

/// One actionable study recommendation with its rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub subject_code: Option<String>,
    pub text: String,
}

/// Context for a recommendation request.
#[derive(Debug, Clone, Default)]
pub struct RecommendContext {
    /// Restrict to one subject; `None` surveys everything.
    pub subject_code: Option<String>,
}

/// Reads pattern rows from the store and turns them into recommendations.
pub struct PatternAnalyzer<'a> {
    store: &'a Store,
}

impl<'a> PatternAnalyzer<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Fold a fresh effectiveness record into the subject's pattern and the
    /// global one.
    pub fn ingest(&self, eff: &SessionEffectiveness) -> Result<()> {
        let mut keys: Vec<Option<String>> = vec![None];
        if eff.subject_code.is_some() {
            keys.push(eff.subject_code.clone());
        }
        for key in keys {
            let mut pattern = self
                .store
                .learning_pattern(key.as_deref())?
                .unwrap_or_else(|| LearningPattern::empty(key.clone()));
            pattern.ingest(eff);
            self.store.upsert_learning_pattern(&pattern)?;
        }
        Ok(())
    }

    pub fn optimal_time(&self, subject_code: &str) -> Result<Option<TimeOfDay>> {
        Ok(self
            .store
            .learning_pattern(Some(subject_code))?
            .and_then(|p| p.optimal_time()))
    }

    pub fn suggested_duration(&self, subject_code: &str) -> Result<Option<u16>> {
        Ok(self
            .store
            .learning_pattern(Some(subject_code))?
            .and_then(|p| p.suggested_duration()))
    }

    /// Recommendations for the given context. Subjects without enough
    /// samples contribute nothing.
    pub fn recommendations(&self, context: &RecommendContext) -> Result<Vec<Recommendation>> {
        let patterns = match &context.subject_code {
            Some(code) => self
                .store
                .learning_pattern(Some(code))?
                .into_iter()
                .collect::<Vec<_>>(),
            None => self.store.subject_learning_patterns()?,
        };

        let mut recs = Vec::new();
        let mut ranked: Vec<&LearningPattern> = Vec::new();

        for pattern in &patterns {
            if pattern.samples_count < MIN_SAMPLES {
                continue;
            }
            ranked.push(pattern);
            let subject = pattern.subject_code.clone();
            let name = subject.as_deref().unwrap_or("your studies");
            if let Some(tod) = pattern.optimal_time() {
                recs.push(Recommendation {
                    kind: RecommendationKind::Timing,
                    subject_code: subject.clone(),
                    text: format!(
                        "Your focus on {name} peaks in the {}; schedule it there.",
                        tod.as_str().replace('_', " ")
                    ),
                });
            }
            if let Some(mins) = pattern.suggested_duration() {
                recs.push(Recommendation {
                    kind: RecommendationKind::Duration,
                    subject_code: subject.clone(),
                    text: format!("Sessions of about {mins} minutes work best for {name}."),
                });
            }
        }

        // Global pattern drives the break cadence suggestion.
        if let Some(global) = self.store.learning_pattern(None)? {
            if let Some(mins) = global.suggested_duration() {
                recs.push(Recommendation {
                    kind: RecommendationKind::Break,
                    subject_code: None,
                    text: format!("Plan a short break after roughly {mins} minutes of work."),
                });
            }
        }

        // With several measured subjects, put the weakest one at the peak.
        if ranked.len() >= 2 {
            ranked.sort_by(|a, b| {
                a.effectiveness_score
                    .partial_cmp(&b.effectiveness_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.subject_code.cmp(&b.subject_code))
            });
            if let Some(weakest) = ranked.first().and_then(|p| p.subject_code.clone()) {
                recs.push(Recommendation {
                    kind: RecommendationKind::SubjectOrder,
                    subject_code: Some(weakest.clone()),
                    text: format!(
                        "{weakest} has your lowest effectiveness; tackle it first while fresh."
                    ),
                });
            }
        }

        Ok(recs)
    }
}
