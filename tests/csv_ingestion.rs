use file_analytics::IngestionError;
use file_analytics::ingestion::csv::{detect_csv, detect_csv_from_reader};
use file_analytics::types::{DataType, FileType, Value};
use rstest::rstest;

#[test]
fn detect_csv_fixture_infers_column_types() {
    let bytes = std::fs::read("tests/fixtures/sales.csv").unwrap();
    let ds = detect_csv(&bytes).unwrap();

    let names: Vec<&str> = ds.schema.field_names().collect();
    assert_eq!(names, vec!["date", "region", "amount", "units", "active"]);
    assert_eq!(ds.row_count(), 3);

    let types: Vec<DataType> = ds.schema.fields.iter().map(|f| f.data_type).collect();
    assert_eq!(
        types,
        vec![
            DataType::Utf8,
            DataType::Utf8,
            DataType::Float64,
            DataType::Int64,
            DataType::Bool,
        ]
    );
    assert_eq!(
        ds.rows[1],
        vec![
            Value::Utf8("2024-01-06".to_string()),
            Value::Utf8("south".to_string()),
            Value::Float64(20.0),
            Value::Null,
            Value::Bool(false),
        ]
    );
}

#[test]
fn date_looking_cells_stay_verbatim_text() {
    let ds = detect_csv(b"when\n2024-01-07 13:45:00\n05/01/2024\n").unwrap();
    assert_eq!(ds.rows[0][0], Value::Utf8("2024-01-07 13:45:00".to_string()));
    assert_eq!(ds.rows[1][0], Value::Utf8("05/01/2024".to_string()));
}

#[test]
fn detect_csv_from_reader_accepts_custom_delimiters() {
    let input = "id;name\n1;Ada\n2;Grace\n";
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(input.as_bytes());

    let ds = detect_csv_from_reader(&mut rdr).unwrap();
    assert_eq!(ds.rows[1], vec![Value::Int64(2), Value::Utf8("Grace".to_string())]);
}

#[test]
fn duplicate_and_blank_headers_are_renamed() {
    let ds = detect_csv(b"a,a,,b\n1,2,3,4\n").unwrap();
    let names: Vec<&str> = ds.schema.field_names().collect();
    assert_eq!(names, vec!["a", "a.1", "Unnamed: 2", "b"]);
}

#[test]
fn short_rows_are_padded_with_nulls() {
    let ds = detect_csv(b"a,b,c\n1,2\n").unwrap();
    assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Int64(2), Value::Null]);
}

#[test]
fn long_rows_are_rejected_with_line_number() {
    let err = detect_csv(b"a,b\n1,2\n3,4,5\n").unwrap_err();
    match err {
        IngestionError::Format { file_type, message } => {
            assert_eq!(file_type, FileType::Csv);
            assert_eq!(message, "expected 2 fields in line 3, saw 3");
        }
        other => panic!("expected Format error, got {other:?}"),
    }
}

#[test]
fn empty_input_has_no_columns() {
    let err = detect_csv(b"").unwrap_err();
    assert!(err.to_string().contains("no columns to parse from file"), "{err}");
}

#[test]
fn header_only_input_has_columns_and_no_rows() {
    let ds = detect_csv(b"x,y\n").unwrap();
    assert_eq!(ds.column_count(), 2);
    assert_eq!(ds.row_count(), 0);
    assert_eq!(ds.schema.fields[0].data_type, DataType::Null);
}

#[test]
fn utf8_bom_is_ignored() {
    let ds = detect_csv(b"\xEF\xBB\xBFid\n7\n").unwrap();
    assert_eq!(ds.schema.fields[0].name, "id");
    assert_eq!(ds.rows[0][0], Value::Int64(7));
}

#[rstest]
#[case("NA")]
#[case("N/A")]
#[case("null")]
#[case("NaN")]
#[case("")]
fn missing_value_tokens_become_null(#[case] token: &str) {
    let input = format!("n\n1\n{token}\n");
    let ds = detect_csv(input.as_bytes()).unwrap();
    assert_eq!(ds.rows[1][0], Value::Null);
    assert_eq!(ds.schema.fields[0].data_type, DataType::Int64);
}

#[rstest]
#[case("1\n2.5\n", DataType::Float64)]
#[case("1\n2\n", DataType::Int64)]
#[case("true\nFALSE\n", DataType::Bool)]
#[case("1\nyes\n", DataType::Utf8)]
fn column_types_are_inferred(#[case] body: &str, #[case] expected: DataType) {
    let input = format!("v\n{body}");
    let ds = detect_csv(input.as_bytes()).unwrap();
    assert_eq!(ds.schema.fields[0].data_type, expected);
}
