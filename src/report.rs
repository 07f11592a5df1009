//! HTML-отчёт об оценке базового прогноза.

mod chart;
mod page;

use std::error::Error;
use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::score::Evaluation;

/// Подписи и параметры запуска, которые попадают в отчёт.
#[derive(Clone, Debug)]
pub struct ReportContext {
    pub source_name: String,
    pub analog_count: usize,
}

/// Рисует страницу с профилями и ошибками по бакетам и сохраняет её.
pub fn write_evaluation_report(
    evaluation: &Evaluation,
    context: &ReportContext,
    output_html: &Path,
    minify: bool,
) -> Result<(), Box<dyn Error>> {
    let plot = chart::build_profile_chart(evaluation);
    let page = page::render_report_page(&plot, evaluation, context, Utc::now());

    // Создаём директорию для HTML, если её ещё нет.
    if let Some(parent) = output_html.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    if minify {
        let mut cfg = minify_html::Cfg::new();
        cfg.minify_css = true;
        fs::write(output_html, minify_html::minify(page.as_bytes(), &cfg))?;
    } else {
        fs::write(output_html, page)?;
    }
    Ok(())
}
