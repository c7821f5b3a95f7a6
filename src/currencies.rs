// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::error::{ReportError, Result};
use crate::exchange_rates::{RateTable, EUR};
use chrono::{Days, Local, Months, NaiveDate};
use csv::Writer;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Day,
    Month,
    Year,
}

impl FromStr for WindowUnit {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(WindowUnit::Day),
            "month" | "months" => Ok(WindowUnit::Month),
            "year" | "years" => Ok(WindowUnit::Year),
            other => Err(ReportError::InvalidWindow(format!(
                "unknown unit {:?}, expected day, month or year",
                other
            ))),
        }
    }
}

impl fmt::Display for WindowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self {
            WindowUnit::Day => "day",
            WindowUnit::Month => "month",
            WindowUnit::Year => "year",
        };
        f.write_str(unit)
    }
}

/// Trailing span of calendar time ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub amount: i64,
    pub unit: WindowUnit,
}

impl Window {
    pub fn new(amount: i64, unit: WindowUnit) -> Self {
        Self { amount, unit }
    }

    /// First date inside the window. Month arithmetic clamps to the end of
    /// shorter months (31 Mar - 1 month = 28/29 Feb).
    pub fn start(&self, today: NaiveDate) -> Result<NaiveDate> {
        if self.amount <= 0 {
            return Err(ReportError::InvalidWindow(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        let amount = u32::try_from(self.amount).map_err(|_| {
            ReportError::InvalidWindow(format!("amount {} is too large", self.amount))
        })?;

        let start = match self.unit {
            WindowUnit::Day => today.checked_sub_days(Days::new(u64::from(amount))),
            WindowUnit::Month => today.checked_sub_months(Months::new(amount)),
            WindowUnit::Year => amount
                .checked_mul(12)
                .and_then(|months| today.checked_sub_months(Months::new(months))),
        };

        start.ok_or_else(|| {
            ReportError::InvalidWindow(format!("{} reaches before the calendar start", self))
        })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount == 1 {
            write!(f, "1 {}", self.unit)
        } else {
            write!(f, "{} {}s", self.amount, self.unit)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebaseRequest {
    pub base_currency: String,
    pub watched_currencies: Vec<String>,
    pub window: Window,
}

impl RebaseRequest {
    /// Codes are upper-cased and duplicate watched codes are dropped, keeping
    /// the first occurrence so chart names follow the configured order.
    pub fn new<S: AsRef<str>>(
        base_currency: &str,
        watched_currencies: &[S],
        window_amount: i64,
        window_unit: &str,
    ) -> Result<Self> {
        let unit = window_unit.parse::<WindowUnit>()?;

        let mut watched: Vec<String> = Vec::with_capacity(watched_currencies.len());
        for code in watched_currencies {
            let code = code.as_ref().trim().to_ascii_uppercase();
            if !watched.contains(&code) {
                watched.push(code);
            }
        }

        Ok(Self {
            base_currency: base_currency.trim().to_ascii_uppercase(),
            watched_currencies: watched,
            window: Window::new(window_amount, unit),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebasedRow {
    pub date: NaiveDate,
    pub rates: Vec<Option<f64>>,
}

/// Units of each watched currency per 1 unit of the base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RebasedTable {
    base_currency: String,
    currencies: Vec<String>,
    rows: Vec<RebasedRow>,
}

impl RebasedTable {
    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    pub fn rows(&self) -> &[RebasedRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Series for one watched currency, skipping days without a quote.
    pub fn series(&self, code: &str) -> Vec<(NaiveDate, f64)> {
        let Some(i) = self.currencies.iter().position(|c| c == code) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.rates[i].map(|rate| (row.date, rate)))
            .collect()
    }

    pub fn write_csv<W: Write>(&self, out: W) -> anyhow::Result<()> {
        let mut writer = Writer::from_writer(out);

        let mut header = vec!["Date".to_string()];
        header.extend(self.currencies.iter().cloned());
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.date.format("%Y-%m-%d").to_string()];
            record.extend(
                row.rates
                    .iter()
                    .map(|r| r.map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Rebase against the local calendar date.
pub fn rebase(table: &RateTable, request: &RebaseRequest) -> Result<RebasedTable> {
    rebase_on(table, request, Local::now().date_naive())
}

/// Express every watched rate per unit of `request.base_currency`, keeping
/// only rows within the trailing window that ends on `today`.
///
/// Both table columns are quoted per 1 EUR, so `table[c] / table[base]`
/// cancels the euro and yields units of `c` per unit of base. Rows are
/// windowed before dividing so quotes missing from old history outside the
/// window cannot fail the run.
pub fn rebase_on(
    table: &RateTable,
    request: &RebaseRequest,
    today: NaiveDate,
) -> Result<RebasedTable> {
    let base = request.base_currency.as_str();

    if !table.has_currency(base) {
        return Err(ReportError::UnknownCurrency(base.to_string()));
    }
    if let Some(missing) = request
        .watched_currencies
        .iter()
        .find(|c| !table.has_currency(c))
    {
        return Err(ReportError::UnknownCurrency(missing.clone()));
    }
    if request.watched_currencies.iter().any(|c| c == base) {
        return Err(ReportError::BaseCurrencyWatched(base.to_string()));
    }
    let window_start = request.window.start(today)?;

    let mut rows = Vec::new();
    for row in table
        .rows()
        .iter()
        .filter(|r| r.date >= window_start && r.date <= today)
    {
        let rates = if base == EUR {
            request
                .watched_currencies
                .iter()
                .map(|c| table.rate(row, c))
                .collect()
        } else {
            let base_rate = table.rate(row, base);
            let base_rate = match base_rate {
                Some(rate) if rate.is_finite() && rate != 0.0 => rate,
                Some(rate) => {
                    return Err(ReportError::InvalidBaseRate {
                        currency: base.to_string(),
                        date: row.date,
                        reason: format!("cannot divide by {}", rate),
                    })
                }
                None => {
                    return Err(ReportError::InvalidBaseRate {
                        currency: base.to_string(),
                        date: row.date,
                        reason: "no quote".to_string(),
                    })
                }
            };

            request
                .watched_currencies
                .iter()
                .map(|c| table.rate(row, c).map(|rate| rate / base_rate))
                .collect()
        };

        rows.push(RebasedRow {
            date: row.date,
            rates,
        });
    }

    Ok(RebasedTable {
        base_currency: base.to_string(),
        currencies: request.watched_currencies.clone(),
        rows,
    })
}
