#![cfg(feature = "excel_test_writer")]

use file_analytics::ingestion::detect;
use file_analytics::ingestion::excel::detect_excel;
use file_analytics::normalize::normalize;
use file_analytics::types::{DataType, FileType, Value};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

fn sales_workbook() -> Vec<u8> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let datetime = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    ws.write_string(0, 0, "day").unwrap();
    ws.write_string(0, 1, "region").unwrap();
    ws.write_string(0, 2, "amount").unwrap();
    ws.write_string(0, 3, "units").unwrap();

    let jan5 = ExcelDateTime::from_ymd(2024, 1, 5).unwrap();
    ws.write_datetime_with_format(1, 0, &jan5, &date).unwrap();
    ws.write_string(1, 1, "north").unwrap();
    ws.write_number(1, 2, 10.5).unwrap();
    ws.write_number(1, 3, 3).unwrap();

    let jan6_afternoon = ExcelDateTime::from_ymd(2024, 1, 6).unwrap().and_hms(13, 45, 0).unwrap();
    ws.write_datetime_with_format(2, 0, &jan6_afternoon, &datetime).unwrap();
    ws.write_string(2, 1, "south").unwrap();
    ws.write_number(2, 2, 20).unwrap();
    ws.write_number(2, 3, 4).unwrap();

    wb.save_to_buffer().unwrap()
}

#[test]
fn first_sheet_is_read_with_header_row() {
    let ds = detect_excel(&sales_workbook()).unwrap();
    let names: Vec<&str> = ds.schema.field_names().collect();
    assert_eq!(names, vec!["day", "region", "amount", "units"]);
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[0][2], Value::Float64(10.5));
    assert_eq!(ds.rows[1][2], Value::Int64(20));
    assert_eq!(ds.schema.fields[3].data_type, DataType::Int64);
}

#[test]
fn date_cells_become_canonical_text() {
    let ds = detect_excel(&sales_workbook()).unwrap();
    assert_eq!(ds.rows[0][0], Value::Utf8("2024-01-05".to_string()));
    assert_eq!(ds.rows[1][0], Value::Utf8("2024-01-06 13:45:00".to_string()));
    assert_eq!(ds.schema.fields[0].data_type, DataType::Utf8);
}

#[test]
fn date_columns_get_no_stats() {
    let (file_type, ds) = detect(&sales_workbook(), ".xlsx").unwrap();
    assert_eq!(file_type, FileType::Excel);

    let record = normalize(&ds).unwrap();
    assert!(!record.stats.contains_key("day"));
    assert_eq!(record.stats["amount"].max, 20.0);
    assert_eq!(record.stats["units"].mean, 3.5);
}

#[test]
fn leading_blank_rows_are_skipped() {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(2, 0, "id").unwrap();
    ws.write_string(2, 1, "name").unwrap();
    ws.write_number(3, 0, 1).unwrap();
    ws.write_string(3, 1, "Ada").unwrap();
    let bytes = wb.save_to_buffer().unwrap();

    let ds = detect_excel(&bytes).unwrap();
    assert_eq!(ds.schema.fields[0].name, "id");
    assert_eq!(ds.rows, vec![vec![Value::Int64(1), Value::Utf8("Ada".to_string())]]);
}

#[test]
fn empty_sheet_is_a_format_error() {
    let mut wb = Workbook::new();
    wb.add_worksheet();
    let bytes = wb.save_to_buffer().unwrap();

    let err = detect_excel(&bytes).unwrap_err();
    assert!(err.to_string().starts_with("Excel processing error:"), "{err}");
}
