// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::error::{ReportError, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use std::io::{Cursor, Read};

/// The ECB quotes every rate against the euro, so EUR is the pivot currency.
pub const EUR: &str = "EUR";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One business day of reference rates, aligned with `RateTable::currencies`.
/// `None` marks a currency that was not quoted on that day (`N/A` upstream).
#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub date: NaiveDate,
    pub rates: Vec<Option<f64>>,
}

/// Units of each currency per 1 EUR, one row per date in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    currencies: Vec<String>,
    rows: Vec<RateRow>,
}

impl RateTable {
    /// Build a table, sorting rows by date and checking that every row
    /// carries one finite rate or gap per currency and that no date appears
    /// twice.
    pub fn new(currencies: Vec<String>, mut rows: Vec<RateRow>) -> Result<Self> {
        if currencies.is_empty() {
            return Err(ReportError::MalformedData(
                "expected a date column and at least one currency column".to_string(),
            ));
        }

        for (i, code) in currencies.iter().enumerate() {
            if currencies[..i].contains(code) {
                return Err(ReportError::MalformedData(format!(
                    "currency column {} appears twice",
                    code
                )));
            }
        }

        if let Some(row) = rows.iter().find(|r| r.rates.len() != currencies.len()) {
            return Err(ReportError::MalformedData(format!(
                "row {} has {} rates, expected {}",
                row.date,
                row.rates.len(),
                currencies.len()
            )));
        }

        for row in &rows {
            for (code, rate) in currencies.iter().zip(&row.rates) {
                if let Some(rate) = rate.filter(|r| !r.is_finite()) {
                    return Err(ReportError::MalformedData(format!(
                        "non-finite {} rate {} on {}",
                        code, rate, row.date
                    )));
                }
            }
        }

        rows.sort_by_key(|r| r.date);
        if let Some(pair) = rows.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(ReportError::MalformedData(format!(
                "date {} appears more than once",
                pair[0].date
            )));
        }

        Ok(Self { currencies, rows })
    }

    /// Parse the ECB CSV layout: `Date,USD,JPY,...,` with one row per day.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| ReportError::MalformedData(format!("unreadable header: {}", e)))?
            .clone();

        match headers.get(0) {
            Some(h) if h.eq_ignore_ascii_case("date") => {}
            other => {
                return Err(ReportError::MalformedData(format!(
                    "missing Date column (first header is {:?})",
                    other.unwrap_or("")
                )))
            }
        }

        // Drop trailing metadata columns such as the unnamed one produced by
        // the trailing comma on every ECB line.
        let mut currency_columns: Vec<&str> = headers.iter().skip(1).collect();
        while currency_columns
            .last()
            .map_or(false, |h| !is_currency_code(h))
        {
            currency_columns.pop();
        }

        if let Some(bad) = currency_columns.iter().find(|h| !is_currency_code(h)) {
            return Err(ReportError::MalformedData(format!(
                "column {:?} is not a currency code",
                bad
            )));
        }

        let currencies: Vec<String> = currency_columns.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();

        for record in csv_reader.records() {
            let record =
                record.map_err(|e| ReportError::MalformedData(format!("unreadable row: {}", e)))?;

            let date_str = record.get(0).unwrap_or("");
            if date_str.is_empty() && record.iter().all(str::is_empty) {
                continue;
            }
            let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|_| {
                ReportError::MalformedData(format!("invalid date {:?}", date_str))
            })?;

            let mut rates = Vec::with_capacity(currencies.len());
            for (i, code) in currencies.iter().enumerate() {
                let cell = record.get(i + 1).unwrap_or("");
                rates.push(parse_rate(cell).ok_or_else(|| {
                    ReportError::MalformedData(format!(
                        "non-numeric {} rate {:?} on {}",
                        code, cell, date
                    ))
                })?);
            }

            rows.push(RateRow { date, rates });
        }

        Self::new(currencies, rows)
    }

    /// Accept either the zipped ECB archive or a bare CSV payload.
    pub fn from_payload(bytes: &[u8]) -> Result<Self> {
        let csv = extract_csv(bytes)?;
        Self::from_csv_reader(csv.as_slice())
    }

    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    pub fn rows(&self) -> &[RateRow] {
        &self.rows
    }

    pub fn latest(&self) -> Option<&RateRow> {
        self.rows.last()
    }

    /// EUR is always available, either as a real column or as the implicit
    /// pivot with rate 1.
    pub fn has_currency(&self, code: &str) -> bool {
        code == EUR || self.column_index(code).is_some()
    }

    /// Rate of `code` per 1 EUR on `row`.
    pub fn rate(&self, row: &RateRow, code: &str) -> Option<f64> {
        match self.column_index(code) {
            Some(i) => row.rates.get(i).copied().flatten(),
            None if code == EUR => Some(1.0),
            None => None,
        }
    }

    fn column_index(&self, code: &str) -> Option<usize> {
        self.currencies.iter().position(|c| c == code)
    }
}

/// Pull the CSV out of a ZIP archive, or pass plain CSV straight through.
pub fn extract_csv(bytes: &[u8]) -> Result<Vec<u8>> {
    if !bytes.starts_with(b"PK\x03\x04") {
        return Ok(bytes.to_vec());
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ReportError::MalformedData(format!("unreadable archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ReportError::MalformedData(format!("unreadable archive entry: {}", e)))?;
        if entry.name().to_ascii_lowercase().ends_with(".csv") {
            let mut csv = Vec::new();
            entry.read_to_end(&mut csv)?;
            return Ok(csv);
        }
    }

    Err(ReportError::MalformedData(
        "archive contains no CSV file".to_string(),
    ))
}

fn is_currency_code(header: &str) -> bool {
    header.len() == 3 && header.bytes().all(|b| b.is_ascii_uppercase())
}

/// `Some(None)` for a missing quote, `None` for garbage.
fn parse_rate(cell: &str) -> Option<Option<f64>> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("N/A") {
        return Some(None);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|rate| rate.is_finite())
        .map(Some)
}
