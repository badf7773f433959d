/// Exports of the derived event table: CSV, spreadsheet cells and plot images.

pub mod plot_image;
pub mod spreadsheet;
pub mod table;

use std::io;
use thiserror::Error;

/// Failures reading or writing an `.xlsx` workbook.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("Workbook part missing: {0}")]
    MissingPart(String),
    #[error("Invalid cell reference {0:?}")]
    InvalidCell(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),
}
