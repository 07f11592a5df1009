//! Plotly-график: средний профиль по бакетам и ошибка по бакетам.

use itertools::Itertools;
use plotly::color::{Rgb, Rgba};
use plotly::common::{Anchor, DashType, Font, Line, Marker, Mode, Orientation, Title};
use plotly::layout::{Axis, GridPattern, Layout, LayoutGrid, Legend, RowOrder};
use plotly::{Bar, Configuration, Plot, Scatter};

use crate::constants::BUCKET_LABELS;
use crate::score::Evaluation;

const AXIS_PROFILE_X: &str = "x1";
const AXIS_PROFILE_Y: &str = "y1";
const AXIS_ERROR_X: &str = "x2";
const AXIS_ERROR_Y: &str = "y2";
const LABEL_TRUTH: &str = "Факт (среднее)";
const LABEL_FORECAST: &str = "Прогноз (среднее)";
const LABEL_RMSE: &str = "RMSE бакета";
const UNIT_PASSENGERS: &str = "пассажиров";
const UNIT_MINUTES: &str = "минут до вылета";
const FONT_FAMILY: &str = "PT Sans, Arial, sans-serif";
const FONT_SIZE: usize = 12;
const LINE_WIDTH: f64 = 2.0;
const COLOR_TRUTH: (u8, u8, u8) = (47, 85, 151);
const COLOR_FORECAST: (u8, u8, u8) = (214, 110, 40);
const COLOR_ERROR_BAR: (u8, u8, u8, f64) = (214, 110, 40, 0.5);
const COLOR_GRID: (u8, u8, u8, f64) = (0, 0, 0, 0.1);

fn rgb(color: (u8, u8, u8)) -> Rgb {
    Rgb::new(color.0, color.1, color.2)
}

fn rgba(color: (u8, u8, u8, f64)) -> Rgba {
    Rgba::new(color.0, color.1, color.2, color.3)
}

fn axis(title: &str) -> Axis {
    Axis::new()
        .title(Title::with_text(title))
        .grid_color(rgba(COLOR_GRID))
        .show_line(true)
        .auto_margin(true)
}

/// Верхняя панель: средние профили факта и прогноза; нижняя: RMSE по бакетам.
pub(super) fn build_profile_chart(evaluation: &Evaluation) -> Plot {
    let labels = BUCKET_LABELS.iter().map(ToString::to_string).collect_vec();

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(labels.clone(), evaluation.mean_truth.to_vec())
            .mode(Mode::LinesMarkers)
            .line(Line::new().color(rgb(COLOR_TRUTH)).width(LINE_WIDTH))
            .name(LABEL_TRUTH)
            .x_axis(AXIS_PROFILE_X)
            .y_axis(AXIS_PROFILE_Y),
    );
    plot.add_trace(
        Scatter::new(labels.clone(), evaluation.mean_forecast.to_vec())
            .mode(Mode::LinesMarkers)
            .line(
                Line::new()
                    .color(rgb(COLOR_FORECAST))
                    .width(LINE_WIDTH)
                    .dash(DashType::Dash),
            )
            .name(LABEL_FORECAST)
            .x_axis(AXIS_PROFILE_X)
            .y_axis(AXIS_PROFILE_Y),
    );
    plot.add_trace(
        Bar::new(labels, evaluation.bucket_rmse.to_vec())
            .marker(Marker::new().color(rgba(COLOR_ERROR_BAR)))
            .name(LABEL_RMSE)
            .x_axis(AXIS_ERROR_X)
            .y_axis(AXIS_ERROR_Y),
    );

    let layout = Layout::new()
        .font(Font::new().family(FONT_FAMILY).size(FONT_SIZE))
        .auto_size(true)
        .grid(
            LayoutGrid::new()
                .rows(2)
                .columns(1)
                .pattern(GridPattern::Independent)
                .row_order(RowOrder::TopToBottom),
        )
        .legend(
            Legend::new()
                .orientation(Orientation::Horizontal)
                .x(0.5)
                .x_anchor(Anchor::Center)
                .y(1.02)
                .y_anchor(Anchor::Bottom),
        )
        .x_axis(Axis::new().show_tick_labels(false).grid_color(rgba(COLOR_GRID)))
        .y_axis(axis(UNIT_PASSENGERS))
        .x_axis2(axis(UNIT_MINUTES).matches("x"))
        .y_axis2(axis(LABEL_RMSE));

    plot.set_layout(layout);
    plot.set_configuration(Configuration::new().responsive(true));
    plot
}
