//! Чтение и запись CSV с прогнозом (файл сабмита).

use std::error::Error;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::cases::CaseId;
use crate::constants::{BUCKET_COLUMNS, BUCKET_COUNT, COLUMN_ID};
use crate::model::Predictions;

/// Число всегда с дробной частью: `2.0`, а не `2`.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

/// Пишет прогноз: колонка `id` и 17 бакетов, строки по возрастанию id.
pub fn write_submission<W: Write>(predictions: &Predictions, sink: W) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(std::iter::once(COLUMN_ID).chain(BUCKET_COLUMNS))?;
    for (id, profile) in predictions {
        writer.write_record(
            std::iter::once(id.to_string()).chain(profile.iter().copied().map(format_value)),
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Записывает прогноз в CSV, создавая директорию при необходимости.
pub fn write_submission_csv(
    predictions: &Predictions,
    output_path: &Path,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
    }
    let file = fs::File::create(output_path)
        .map_err(|err| format!("Failed to create CSV {}: {err}", output_path.display()))?;
    write_submission(predictions, BufWriter::new(file))
        .map_err(|err| format!("Failed to write CSV {}: {err}", output_path.display()))?;
    Ok(())
}

/// Читает прогноз в формате сабмита.
pub fn read_submission<R: Read>(source: R) -> Result<Predictions, Box<dyn Error>> {
    let mut reader = csv::Reader::from_reader(source);
    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| format!("missing column '{name}'"))
    };
    let id_column = find(COLUMN_ID)?;
    let mut bucket_columns = [0; BUCKET_COUNT];
    for (slot, name) in bucket_columns.iter_mut().zip(BUCKET_COLUMNS) {
        *slot = find(name)?;
    }

    let mut predictions = Predictions::new();
    for record in reader.records() {
        let record = record?;
        let id = CaseId::new(record.get(id_column).unwrap_or_default());
        let mut profile = [0.0; BUCKET_COUNT];
        for ((slot, &idx), column) in profile.iter_mut().zip(&bucket_columns).zip(BUCKET_COLUMNS) {
            let raw = record.get(idx).unwrap_or_default().trim();
            *slot = raw
                .parse::<f64>()
                .map_err(|err| format!("failed to parse {column} '{raw}' for id {id}: {err}"))?;
        }
        if predictions.insert(id.clone(), profile).is_some() {
            return Err(format!("duplicate prediction for id {id}").into());
        }
    }
    Ok(predictions)
}

pub fn read_submission_csv(input_path: &Path) -> Result<Predictions, Box<dyn Error>> {
    let file = fs::File::open(input_path)
        .map_err(|err| format!("Failed to open CSV {}: {err}", input_path.display()))?;
    let predictions = read_submission(std::io::BufReader::new(file))
        .map_err(|err| format!("Failed to read CSV {}: {err}", input_path.display()))?;
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Predictions {
        let mut predictions = Predictions::new();
        let mut profile = [0.0; BUCKET_COUNT];
        profile[0] = 1.25;
        profile[16] = 7.0;
        predictions.insert(CaseId::new("12"), profile);
        predictions.insert(CaseId::new("3"), [0.0; BUCKET_COUNT]);
        predictions
    }

    #[test]
    fn writes_header_and_sorted_rows() {
        let mut out = Vec::new();
        write_submission(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,num_pax_000_014_mins_before_sdt,"));
        assert!(lines[0].ends_with(",num_pax_240plus_mins_before_sdt"));
        assert!(lines[1].starts_with("3,0.0,"));
        assert!(lines[2].starts_with("12,1.25,"));
        assert!(lines[2].ends_with(",7.0"));
    }

    #[test]
    fn whole_numbers_keep_fraction() {
        assert_eq!(format_value(2.0), "2.0");
        assert_eq!(format_value(0.0), "0.0");
        assert_eq!(format_value(1.25), "1.25");
    }

    #[test]
    fn file_round_trip_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model_submission.csv");
        write_submission_csv(&sample(), &path).unwrap();
        assert_eq!(read_submission_csv(&path).unwrap(), sample());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let row = vec!["1"; BUCKET_COUNT].join(",");
        let csv = format!("id,{}\n5,{row}\n5,{row}\n", BUCKET_COLUMNS.join(","));
        let err = read_submission(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate prediction"));
    }

    #[test]
    fn rejects_missing_bucket_column() {
        let csv = "id,num_pax_000_014_mins_before_sdt\n1,2\n";
        assert!(read_submission(csv.as_bytes()).is_err());
    }
}
