use std::fs::File;
use std::io::Write;

use flowenc_config::{PixelCalibrationRow, PixelScale, load_pixel_calibration_csv};
use rstest::rstest;
use tempfile::tempdir;

fn row(pixels: i64, mm: f64) -> PixelCalibrationRow {
    PixelCalibrationRow { pixels, mm }
}

#[rstest]
fn fits_exact_scale() {
    let s = PixelScale::from_rows(&[row(1000, 51.0), row(-2000, -102.0)]).unwrap();
    assert!((s.mm_per_pixel - 0.051).abs() < 1e-12);
    assert_eq!(s.rows_used, 2);
}

#[rstest]
fn rejects_single_row() {
    let err = PixelScale::from_rows(&[row(1000, 51.0)]).unwrap_err();
    assert!(format!("{err}").contains("at least two rows"));
}

#[rstest]
fn rejects_zero_pixels() {
    let err = PixelScale::from_rows(&[row(0, 1.0), row(10, 1.0)]).unwrap_err();
    assert!(format!("{err}").contains("zero pixels"));
}

#[rstest]
fn rejects_negative_scale() {
    let err = PixelScale::from_rows(&[row(100, -5.0), row(200, -10.0)]).unwrap_err();
    assert!(format!("{err}").contains("non-positive scale"));
}

#[rstest]
fn outlier_is_rejected_on_refit() {
    let mut rows: Vec<PixelCalibrationRow> = (1..=8).map(|i| row(i * 100, i as f64 * 5.0)).collect();
    // One bogus measurement far off the 0.05 mm/px line.
    rows.push(row(400, 60.0));
    let s = PixelScale::from_rows(&rows).unwrap();
    assert_eq!(s.rows_used, 8);
    assert!((s.mm_per_pixel - 0.05).abs() < 1e-9, "got {}", s.mm_per_pixel);
}

#[rstest]
fn loads_csv_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pixels.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "pixels,mm").unwrap();
    writeln!(f, "1000, 50.0").unwrap();
    writeln!(f, "2000, 100.0").unwrap();
    drop(f);
    let s = load_pixel_calibration_csv(&path).unwrap();
    assert!((s.mm_per_pixel - 0.05).abs() < 1e-12);
}

#[rstest]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "px,millimetres").unwrap();
    writeln!(f, "1000,50.0").unwrap();
    drop(f);
    let err = load_pixel_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("must have headers 'pixels,mm'"));
}

#[rstest]
fn reports_bad_row_number() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_row.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "pixels,mm").unwrap();
    writeln!(f, "1000,50.0").unwrap();
    writeln!(f, "abc,50.0").unwrap();
    drop(f);
    let err = load_pixel_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("invalid CSV row 3"));
}
