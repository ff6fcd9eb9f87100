use chrono::NaiveDate;
use file_analytics::IngestionError;
use file_analytics::ingestion::detect;
use file_analytics::normalize::{canonicalize_value, column_stats, normalize};
use file_analytics::types::{DataSet, PREVIEW_ROWS, Value};

#[test]
fn csv_fixture_normalizes_to_expected_record() {
    let bytes = std::fs::read("tests/fixtures/sales.csv").unwrap();
    let (_, ds) = detect(&bytes, ".csv").unwrap();
    let record = normalize(&ds).unwrap();

    assert_eq!(record.columns, vec!["date", "region", "amount", "units", "active"]);
    assert_eq!(record.row_count, 3);
    assert_eq!(record.preview.len(), 3);

    let keys: Vec<&str> = record.stats.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["amount", "units"]);
    assert_eq!(record.stats["units"].mean, 4.0);
    assert_eq!(record.stats["amount"].min, 10.5);
    assert_eq!(record.preview[2]["date"], Value::Utf8("2024-01-07 13:45:00".to_string()));
}

#[test]
fn preview_is_capped_but_row_count_is_not() {
    let mut body = String::from("n\n");
    for i in 0..250 {
        body.push_str(&format!("{i}\n"));
    }
    let (_, ds) = detect(body.as_bytes(), ".csv").unwrap();
    let record = normalize(&ds).unwrap();

    assert_eq!(record.row_count, 250);
    assert_eq!(record.preview.len(), PREVIEW_ROWS);
    assert_eq!(record.preview[99]["n"], Value::Int64(99));
    // Stats cover every row, not only the preview.
    assert_eq!(record.stats["n"].max, 249.0);
}

#[test]
fn stats_only_for_uniformly_numeric_columns() {
    let (_, ds) = detect(br#"[{"a":1,"b":"x","c":true},{"a":2.5,"b":3,"c":false}]"#, ".json").unwrap();
    let record = normalize(&ds).unwrap();
    assert!(record.stats.contains_key("a"));
    assert!(!record.stats.contains_key("b"));
    assert!(!record.stats.contains_key("c"));
}

#[test]
fn data_wrapper_and_nested_object_shapes() {
    let (_, ds) = detect(br#"{"data":[{"a":1},{"a":2}]}"#, ".json").unwrap();
    let record = normalize(&ds).unwrap();
    assert_eq!(record.columns, vec!["a"]);
    assert_eq!(record.row_count, 2);

    let (_, ds) = detect(br#"{"x":{"y":1}}"#, ".json").unwrap();
    let record = normalize(&ds).unwrap();
    assert_eq!(record.columns, vec!["x.y"]);
    assert_eq!(record.preview[0]["x.y"], Value::Int64(1));
}

#[test]
fn zero_column_dataset_is_a_normalization_error() {
    let (_, ds) = detect(b"[]", ".json").unwrap();
    let err = normalize(&ds).unwrap_err();
    assert!(matches!(err, IngestionError::Normalization { .. }));
}

#[test]
fn single_value_column_has_zero_std() {
    let stats = column_stats([Value::Int64(5), Value::Null].iter()).unwrap();
    assert_eq!((stats.mean, stats.min, stats.max, stats.std), (5.0, 5.0, 5.0, 0.0));
}

#[test]
fn sample_standard_deviation() {
    let values = [2, 4, 4, 4, 5, 5, 7, 9].map(Value::Int64);
    let stats = column_stats(values.iter()).unwrap();
    assert_eq!(stats.mean, 5.0);
    assert!((stats.std - 2.138_089_935).abs() < 1e-9, "{}", stats.std);
}

#[test]
fn timestamps_canonicalize_to_date_or_datetime_text() {
    let midnight = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let afternoon = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(15, 4, 5).unwrap();

    assert_eq!(canonicalize_value(Value::Timestamp(midnight)), Value::Utf8("2024-03-01".to_string()));
    assert_eq!(
        canonicalize_value(Value::List(vec![Value::Timestamp(afternoon), Value::Float64(f64::NAN)])),
        Value::List(vec![Value::Utf8("2024-03-01 15:04:05".to_string()), Value::Null])
    );
}

#[test]
fn normalized_preview_never_holds_timestamps() {
    let ts = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap().and_hms_opt(23, 59, 59).unwrap();
    let ds = DataSet::from_rows(
        vec!["when".to_string(), "n".to_string()],
        vec![vec![Value::Timestamp(ts), Value::Int64(1)]],
    );
    let record = normalize(&ds).unwrap();
    assert_eq!(record.preview[0]["when"], Value::Utf8("2023-12-31 23:59:59".to_string()));
    assert!(!record.stats.contains_key("when"));

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["preview"][0]["when"], "2023-12-31 23:59:59");
}
