//! Метрика качества: корень из среднеквадратичной ошибки.

use std::error::Error;

use chrono::NaiveDateTime;
use itertools::Itertools;

use crate::cases::{BucketProfile, CaseTable};
use crate::constants::BUCKET_COUNT;
use crate::model::{Forecast, ForecastStats, Predictions};

/// Результат оценки прогноза на размеченном наборе.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub rmse: f64,
    pub bucket_rmse: [f64; BUCKET_COUNT],
    pub mean_truth: BucketProfile,
    pub mean_forecast: BucketProfile,
    pub stats: ForecastStats,
    pub target_dates: Option<(NaiveDateTime, NaiveDateTime)>,
}

/// Сравнивает прогноз с истинными значениями целевых кейсов.
pub fn evaluate(table: &CaseTable, forecast: &Forecast) -> Result<Evaluation, Box<dyn Error>> {
    let truth = target_truth(table)?;
    Ok(Evaluation {
        rmse: rmse(&truth, &forecast.predictions)?,
        bucket_rmse: bucket_rmse(&truth, &forecast.predictions)?,
        mean_truth: mean_profile(&truth),
        mean_forecast: mean_profile(&forecast.predictions),
        stats: forecast.stats,
        target_dates: table.target_date_range(),
    })
}

/// Истинные профили целевых кейсов. Все бакеты должны быть заполнены.
pub fn target_truth(table: &CaseTable) -> Result<Predictions, Box<dyn Error>> {
    table
        .targets
        .iter()
        .map(|(id, case)| {
            case.complete_profile()
                .map(|profile| (id.clone(), profile))
                .ok_or_else(|| -> Box<dyn Error> {
                    format!("target case {id} has empty bucket values").into()
                })
        })
        .collect()
}

/// Проверяет, что таблицы совпадают по набору id, и возвращает пары строк.
fn aligned_rows<'a>(
    truth: &'a Predictions,
    predictions: &'a Predictions,
) -> Result<Vec<(&'a BucketProfile, &'a BucketProfile)>, Box<dyn Error>> {
    if truth.is_empty() {
        return Err("cannot score an empty table".into());
    }
    if truth.len() != predictions.len() {
        return Err(format!(
            "shape mismatch: {} truth rows vs {} prediction rows",
            truth.len(),
            predictions.len()
        )
        .into());
    }
    truth
        .iter()
        .zip_eq(predictions)
        .map(|((truth_id, truth_row), (pred_id, pred_row))| -> Result<_, Box<dyn Error>> {
            if truth_id == pred_id {
                Ok((truth_row, pred_row))
            } else {
                Err(format!("id mismatch: truth {truth_id} vs prediction {pred_id}").into())
            }
        })
        .collect()
}

/// RMSE по всем элементам: sqrt(mean((truth - pred)^2)).
pub fn rmse(truth: &Predictions, predictions: &Predictions) -> Result<f64, Box<dyn Error>> {
    let rows = aligned_rows(truth, predictions)?;
    let squared_sum: f64 = rows
        .iter()
        .flat_map(|(truth_row, pred_row)| truth_row.iter().zip(pred_row.iter()))
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let count = (rows.len() * BUCKET_COUNT) as f64;
    Ok((squared_sum / count).sqrt())
}

/// RMSE отдельно по каждому бакету.
pub fn bucket_rmse(
    truth: &Predictions,
    predictions: &Predictions,
) -> Result<[f64; BUCKET_COUNT], Box<dyn Error>> {
    let rows = aligned_rows(truth, predictions)?;
    let mut squared = [0.0; BUCKET_COUNT];
    for (truth_row, pred_row) in &rows {
        for ((acc, t), p) in squared.iter_mut().zip(truth_row.iter()).zip(pred_row.iter()) {
            *acc += (t - p).powi(2);
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let count = rows.len() as f64;
    Ok(squared.map(|sum| (sum / count).sqrt()))
}

/// Поэлементное среднее профилей таблицы (для графика отчёта).
pub fn mean_profile(table: &Predictions) -> BucketProfile {
    let mut sums = [0.0; BUCKET_COUNT];
    for row in table.values() {
        for (acc, value) in sums.iter_mut().zip(row) {
            *acc += value;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let count = table.len().max(1) as f64;
    sums.map(|sum| sum / count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::tests::{build_csv, uniform_values};
    use crate::cases::{CaseId, read_cases};
    use crate::model::{PipelineConfig, predict};

    fn table(rows: &[(&str, f64)]) -> Predictions {
        rows.iter()
            .map(|(id, value)| (CaseId::new(id), [*value; BUCKET_COUNT]))
            .collect()
    }

    #[test]
    fn identical_tables_score_zero() {
        let truth = table(&[("1", 1.0), ("2", 3.0)]);
        assert!(rmse(&truth, &truth.clone()).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn unit_offset_scores_one() {
        let truth = table(&[("1", 0.0)]);
        let pred = table(&[("1", 1.0)]);
        assert!((rmse(&truth, &pred).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rmse_is_symmetric() {
        let mut left = table(&[("1", 2.0), ("2", -1.0)]);
        let right = table(&[("1", 5.0), ("2", 0.5)]);
        if let Some(row) = left.get_mut(&CaseId::new("1")) {
            row[3] = 11.0;
        }
        let forward = rmse(&left, &right).unwrap();
        let backward = rmse(&right, &left).unwrap();
        assert!((forward - backward).abs() < 1e-12);
    }

    #[test]
    fn mixed_errors_average_over_all_cells() {
        let truth = table(&[("1", 0.0), ("2", 0.0)]);
        let mut pred = table(&[("1", 0.0), ("2", 0.0)]);
        if let Some(row) = pred.get_mut(&CaseId::new("2")) {
            row[0] = 34.0_f64.sqrt() * 2.0;
        }
        // Одна ошибка 4*34 на 34 ячейки → MSE = 4.
        assert!((rmse(&truth, &pred).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn mismatched_ids_are_rejected() {
        let truth = table(&[("1", 0.0), ("2", 0.0)]);
        let shorter = table(&[("1", 0.0)]);
        let renamed = table(&[("1", 0.0), ("3", 0.0)]);
        assert!(rmse(&truth, &shorter).is_err());
        assert!(rmse(&truth, &renamed).is_err());
        assert!(rmse(&Predictions::new(), &Predictions::new()).is_err());
    }

    #[test]
    fn per_bucket_errors() {
        let truth = table(&[("1", 0.0), ("2", 0.0)]);
        let mut pred = truth.clone();
        for row in pred.values_mut() {
            row[16] = 3.0;
        }
        let per_bucket = bucket_rmse(&truth, &pred).unwrap();
        assert!((per_bucket[16] - 3.0).abs() < 1e-12);
        assert!(per_bucket[..16].iter().all(|value| value.abs() < 1e-12));
    }

    #[test]
    fn mean_profile_averages_rows() {
        let profile = mean_profile(&table(&[("1", 2.0), ("2", 4.0)]));
        assert!(profile.iter().all(|value| (value - 3.0).abs() < 1e-12));
        assert_eq!(mean_profile(&Predictions::new()), [0.0; BUCKET_COUNT]);
    }

    #[test]
    fn evaluates_forecast_against_targets() {
        let (two, four, six) = (uniform_values(2.0), uniform_values(4.0), uniform_values(6.0));
        let csv = build_csv(&[
            ("1", "Target", "2019-06-08", four.as_str()),
            ("1", "Expl", "2019-06-01", two.as_str()),
            ("1", "Expl", "2019-05-25", six.as_str()),
            ("2", "Target", "2019-06-08", two.as_str()),
        ]);
        let table = read_cases(csv.as_bytes()).unwrap();
        let forecast = predict(&table, &PipelineConfig::default());
        let evaluation = evaluate(&table, &forecast).unwrap();

        // id 1 попадает точно, id 2 получает нули при истине 2.
        assert!((evaluation.rmse - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!(evaluation.mean_truth.iter().all(|v| (v - 3.0).abs() < 1e-12));
        assert!(evaluation.mean_forecast.iter().all(|v| (v - 2.0).abs() < 1e-12));
        assert_eq!(evaluation.stats.backfilled, 1);
        assert!(evaluation.target_dates.is_some());
    }

    #[test]
    fn unlabelled_targets_cannot_be_scored() {
        let empty = vec![""; BUCKET_COUNT].join(",");
        let csv = build_csv(&[("1", "Target", "2019-06-08", empty.as_str())]);
        let table = read_cases(csv.as_bytes()).unwrap();
        let err = target_truth(&table).unwrap_err();
        assert!(err.to_string().contains("empty bucket values"));
    }
}
