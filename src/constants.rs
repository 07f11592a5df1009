//! Общие константы: имена колонок входного CSV и форматирование.

/// Количество бакетов по 15 минут до вылета (последний открытый, «240+»).
pub const BUCKET_COUNT: usize = 17;

/// Колонки с числом пассажиров в порядке возрастания времени до вылета.
pub const BUCKET_COLUMNS: [&str; BUCKET_COUNT] = [
    "num_pax_000_014_mins_before_sdt",
    "num_pax_015_029_mins_before_sdt",
    "num_pax_030_044_mins_before_sdt",
    "num_pax_045_059_mins_before_sdt",
    "num_pax_060_074_mins_before_sdt",
    "num_pax_075_089_mins_before_sdt",
    "num_pax_090_104_mins_before_sdt",
    "num_pax_105_119_mins_before_sdt",
    "num_pax_120_134_mins_before_sdt",
    "num_pax_135_149_mins_before_sdt",
    "num_pax_150_164_mins_before_sdt",
    "num_pax_165_179_mins_before_sdt",
    "num_pax_180_194_mins_before_sdt",
    "num_pax_195_209_mins_before_sdt",
    "num_pax_210_224_mins_before_sdt",
    "num_pax_225_239_mins_before_sdt",
    "num_pax_240plus_mins_before_sdt",
];

/// Короткие подписи бакетов для графиков.
pub const BUCKET_LABELS: [&str; BUCKET_COUNT] = [
    "0-14", "15-29", "30-44", "45-59", "60-74", "75-89", "90-104", "105-119", "120-134",
    "135-149", "150-164", "165-179", "180-194", "195-209", "210-224", "225-239", "240+",
];

pub const COLUMN_ID: &str = "id";
pub const COLUMN_CASE_TYPE: &str = "cat_case_type";
pub const COLUMN_PREDICTION_DATE: &str = "dt_prediction_date";
pub const COLUMN_TARGET_DATE: &str = "dt_target_date";
pub const COLUMN_FLIGHT_DATE: &str = "dt_flight_date";

pub const CASE_TYPE_TARGET: &str = "Target";
pub const CASE_TYPE_EXPL: &str = "Expl";

pub const DEFAULT_ANALOG_COUNT: usize = 5;
pub const DATE_FORMAT: &str = "%Y-%m-%d";
