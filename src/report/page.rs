//! Рендер HTML-страницы отчёта.

use chrono::{DateTime, Utc};
use maud::{DOCTYPE, PreEscaped, html};
use plotly::Plot;

use super::ReportContext;
use crate::constants::{BUCKET_LABELS, DATE_FORMAT};
use crate::score::Evaluation;

const PAGE_TITLE: &str = "Базовый прогноз явки пассажиров";
const PAGE_SUBTITLE: &str = "Среднее по последним аналогичным рейсам и ошибка по 15-минутным бакетам.";
const GENERATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M UTC";
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[allow(clippy::too_many_lines)]
pub(super) fn render_report_page(
    plot: &Plot,
    evaluation: &Evaluation,
    context: &ReportContext,
    generated_at: DateTime<Utc>,
) -> String {
    let plot_html = plot.to_inline_html(Some("profile-plot"));
    let generated_label = generated_at.format(GENERATED_AT_FORMAT).to_string();
    let stats = &evaluation.stats;
    let rmse_label = format!("{:.4}", evaluation.rmse);
    let coverage_label = format!("{} из {}", stats.with_history, stats.targets);
    let dates_label = evaluation.target_dates.map_or_else(
        || "нет дат".to_string(),
        |(first, last)| {
            format!(
                "{} — {}",
                first.format(DATE_FORMAT),
                last.format(DATE_FORMAT)
            )
        },
    );
    let rows = BUCKET_LABELS
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            (
                *label,
                format!("{:.2}", evaluation.mean_truth[idx]),
                format!("{:.2}", evaluation.mean_forecast[idx]),
                format!("{:.3}", evaluation.bucket_rmse[idx]),
            )
        })
        .collect::<Vec<_>>();

    let page = html! {
        (DOCTYPE)
        html lang="ru" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (PAGE_TITLE) }
                script src=(PLOTLY_CDN) {}
                style {
                    "
                    body { margin: 0; background: #fafafa; color: #222; font-family: \"PT Sans\", sans-serif; }
                    .page { max-width: 1100px; margin: 32px auto; padding: 0 20px; }
                    .title { font-size: 24px; margin: 0; }
                    .subtitle, .summary-label, .summary-sub, footer { color: #666; font-size: 12px; }
                    .summary { display: flex; flex-wrap: wrap; gap: 12px; margin: 16px 0; }
                    .summary-card, .card, .table-card { background: #fff; border: 1px solid #e3e3e3; border-radius: 8px; padding: 12px 16px; }
                    .summary-card { flex: 1 1 200px; }
                    .summary-value { font-size: 20px; font-weight: 600; }
                    .table-card { margin-top: 16px; }
                    table { width: 100%; border-collapse: collapse; font-size: 13px; }
                    th, td { text-align: right; padding: 4px 8px; border-bottom: 1px solid #eee; }
                    th:first-child, td:first-child { text-align: left; }
                    footer { margin-top: 20px; }
                    "
                }
            }
            body {
                main class="page" {
                    h1 class="title" { (PAGE_TITLE) }
                    p class="subtitle" { (PAGE_SUBTITLE) }
                    section class="summary" {
                        div class="summary-card" {
                            div class="summary-label" { "RMSE" }
                            div class="summary-value" { (rmse_label) }
                            div class="summary-sub" { (context.source_name) }
                        }
                        div class="summary-card" {
                            div class="summary-label" { "С историей" }
                            div class="summary-value" { (coverage_label) }
                            div class="summary-sub" {
                                "Аналогов: " (stats.analogs_used) " · не больше " (context.analog_count) " на рейс"
                            }
                        }
                        div class="summary-card" {
                            div class="summary-label" { "Нулевой прогноз" }
                            div class="summary-value" { (stats.backfilled) }
                            div class="summary-sub" { "Рейсы без исторических аналогов" }
                        }
                        div class="summary-card" {
                            div class="summary-label" { "Даты целевых рейсов" }
                            div class="summary-value" { (dates_label) }
                            div class="summary-sub" { "Обрезано отрицательных: " (stats.clipped_values) }
                        }
                    }
                    div class="card" {
                        (PreEscaped(plot_html))
                    }
                    section class="table-card" {
                        table {
                            thead {
                                tr {
                                    th { "Минут до вылета" }
                                    th { "Факт" }
                                    th { "Прогноз" }
                                    th { "RMSE" }
                                }
                            }
                            tbody {
                                @for (label, truth, forecast, error) in &rows {
                                    tr {
                                        td { (label) }
                                        td { (truth) }
                                        td { (forecast) }
                                        td { (error) }
                                    }
                                }
                            }
                        }
                    }
                    footer {
                        "Версия: " (APP_VERSION) " · Сгенерировано: " (generated_label)
                    }
                }
            }
        }
    };
    page.into_string()
}
