//! Наивный прогноз: среднее по последним аналогичным рейсам.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use itertools::Itertools;
use tracing::warn;

use crate::cases::{BucketProfile, Case, CaseId, CaseTable};
use crate::constants::{BUCKET_COUNT, DEFAULT_ANALOG_COUNT};

/// Прогноз по id в порядке возрастания id.
pub type Predictions = BTreeMap<CaseId, BucketProfile>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Сколько самых свежих объясняющих кейсов усреднять.
    pub analog_count: usize,
    pub clip_negatives: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analog_count: DEFAULT_ANALOG_COUNT,
            clip_negatives: true,
        }
    }
}

/// Счётчики, описывающие, как был собран прогноз.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForecastStats {
    pub targets: usize,
    pub with_history: usize,
    pub backfilled: usize,
    pub analogs_used: usize,
    /// Id, у которых есть только объясняющие кейсы.
    pub orphan_ids: usize,
    /// Аналоги, вылетевшие не раньше даты прогноза своей цели.
    pub late_analogs: usize,
    pub clipped_values: usize,
}

#[derive(Clone, Debug)]
pub struct Forecast {
    pub predictions: Predictions,
    pub stats: ForecastStats,
}

/// Аккумулятор среднего по одному бакету.
#[derive(Default, Clone, Copy)]
struct BucketAccumulator {
    sum: f64,
    count: u32,
}

impl BucketAccumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Ранги по убыванию `flight_date` (1 = самый свежий рейс).
///
/// Одинаковые даты получают средний ранг занимаемых позиций, кейсы без даты
/// ранга не получают.
pub fn rank_by_recency(cases: &[Case]) -> Vec<Option<f64>> {
    let mut order: Vec<(usize, NaiveDateTime)> = cases
        .iter()
        .enumerate()
        .filter_map(|(idx, case)| case.flight_date.map(|date| (idx, date)))
        .collect();
    order.sort_by(|left, right| right.1.cmp(&left.1));

    let mut ranks = vec![None; cases.len()];
    let mut position = 0usize;
    for (_, tied) in &order.iter().chunk_by(|(_, date)| *date) {
        let members = tied.map(|(idx, _)| *idx).collect_vec();
        let first = position + 1;
        let last = position + members.len();
        #[allow(clippy::cast_precision_loss)]
        let rank = (first + last) as f64 / 2.0;
        for idx in members {
            ranks[idx] = Some(rank);
        }
        position = last;
    }
    ranks
}

/// Оставляет кейсы с рангом не больше `analog_count`.
pub fn select_analogs(cases: &[Case], analog_count: usize) -> Vec<&Case> {
    #[allow(clippy::cast_precision_loss)]
    let cutoff = analog_count as f64;
    cases
        .iter()
        .zip(rank_by_recency(cases))
        .filter_map(|(case, rank)| rank.filter(|rank| *rank <= cutoff).map(|_| case))
        .collect()
}

/// Поэлементное среднее профилей; пустые ячейки пропускаются.
///
/// Возвращает `None`, если кейсов нет. Бакет без единого значения даёт 0.
pub fn average_profile(cases: &[&Case]) -> Option<BucketProfile> {
    if cases.is_empty() {
        return None;
    }
    let mut accumulators = [BucketAccumulator::default(); BUCKET_COUNT];
    for case in cases {
        for (acc, cell) in accumulators.iter_mut().zip(case.buckets) {
            if let Some(value) = cell {
                acc.add(value);
            }
        }
    }
    Some(accumulators.map(|acc| acc.mean().unwrap_or_default()))
}

/// Отрицательное число пассажиров невозможно: заменяем такие значения нулём.
/// Возвращает количество исправленных значений.
pub fn clip_negatives(predictions: &mut Predictions) -> usize {
    let mut clipped = 0;
    for value in predictions.values_mut().flat_map(|profile| profile.iter_mut()) {
        if *value < 0.0 {
            *value = 0.0;
            clipped += 1;
        }
    }
    clipped
}

/// Строит прогноз для каждого целевого кейса таблицы.
pub fn predict(table: &CaseTable, config: &PipelineConfig) -> Forecast {
    let mut stats = ForecastStats {
        targets: table.targets.len(),
        orphan_ids: table
            .explanatory
            .keys()
            .filter(|id| !table.targets.contains_key(*id))
            .count(),
        ..ForecastStats::default()
    };
    if stats.orphan_ids > 0 {
        warn!(
            orphan_ids = stats.orphan_ids,
            "Ignoring explanatory cases without a target case"
        );
    }

    let mut predictions = Predictions::new();
    for (id, target) in &table.targets {
        let history = table.explanatory.get(id).map_or(&[][..], Vec::as_slice);
        let analogs = select_analogs(history, config.analog_count);
        if let Some(cutoff) = target.prediction_date {
            stats.late_analogs += analogs
                .iter()
                .filter(|case| case.flight_date.is_some_and(|date| date >= cutoff))
                .count();
        }

        let profile = if let Some(profile) = average_profile(&analogs) {
            stats.with_history += 1;
            stats.analogs_used += analogs.len();
            profile
        } else {
            stats.backfilled += 1;
            [0.0; BUCKET_COUNT]
        };
        predictions.insert(id.clone(), profile);
    }

    if stats.late_analogs > 0 {
        warn!(
            late_analogs = stats.late_analogs,
            "Some analog flights are not earlier than the prediction date"
        );
    }
    if config.clip_negatives {
        stats.clipped_values = clip_negatives(&mut predictions);
    }
    Forecast { predictions, stats }
}
