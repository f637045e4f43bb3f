//! Derived views of the expense list: monthly totals for the chart, the
//! current month total, the CSV report and pt-BR formatting helpers.

use std::{fmt, io};

use api_types::{Amount, expense::Expense};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::ReportError;

const MONTHS_PT_BR: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// Calendar month, used as the chart bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of<Z: TimeZone>(date: &DateTime<Z>) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// `janeiro/2024`
impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .month
            .checked_sub(1)
            .and_then(|idx| MONTHS_PT_BR.get(idx as usize))
            .copied()
            .unwrap_or("?");
        write!(f, "{name}/{}", self.year)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthTotal {
    pub month: YearMonth,
    pub total: Amount,
}

/// Sums amounts per calendar month (in `tz`).
///
/// Buckets keep the order in which their month first appears in
/// `expenses`; for a date-descending list that is most recent first.
pub fn monthly_totals(expenses: &[Expense], tz: Tz) -> Vec<MonthTotal> {
    let mut buckets: Vec<MonthTotal> = Vec::new();
    for expense in expenses {
        let month = YearMonth::of(&expense.date.with_timezone(&tz));
        match buckets.iter_mut().find(|bucket| bucket.month == month) {
            Some(bucket) => bucket.total += expense.amount,
            None => buckets.push(MonthTotal {
                month,
                total: expense.amount,
            }),
        }
    }
    buckets
}

/// Total of the expenses dated in the same month as `now`.
pub fn month_total(expenses: &[Expense], now: &DateTime<Tz>) -> Amount {
    let current = YearMonth::of(now);
    expenses
        .iter()
        .filter(|expense| YearMonth::of(&expense.date.with_timezone(&now.timezone())) == current)
        .map(|expense| expense.amount)
        .sum()
}

/// `R$ 1.234,56`
pub fn format_brl(amount: Amount) -> String {
    let cents = amount.cents();
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let units = (abs / 100).to_string();

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (idx, digit) in units.chars().enumerate() {
        if idx > 0 && (units.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("{sign}R$ {grouped},{:02}", abs % 100)
}

/// `dd/MM/yyyy` in `tz`.
pub fn format_date(date: &DateTime<Utc>, tz: Tz) -> String {
    date.with_timezone(&tz).format("%d/%m/%Y").to_string()
}

/// `relatorio-gastos-MM-yyyy.csv`
pub fn report_file_name<Z: TimeZone>(now: &DateTime<Z>) -> String
where
    Z::Offset: fmt::Display,
{
    format!("relatorio-gastos-{}.csv", now.format("%m-%Y"))
}

#[derive(Serialize)]
struct ReportRow {
    #[serde(rename = "Data")]
    date: String,
    #[serde(rename = "Descrição")]
    description: String,
    #[serde(rename = "Valor")]
    amount: String,
}

/// Writes the CSV report, one row per expense in the given order.
pub fn write_csv<W: io::Write>(expenses: &[Expense], tz: Tz, out: W) -> Result<(), ReportError> {
    if expenses.is_empty() {
        return Err(ReportError::Empty);
    }

    let mut writer = csv::Writer::from_writer(out);
    for expense in expenses {
        writer.serialize(ReportRow {
            date: format_date(&expense.date, tz),
            description: expense.description.clone(),
            amount: expense.amount.to_string(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(expenses: &[Expense], tz: Tz) -> Result<Vec<u8>, ReportError> {
    let mut buf = Vec::new();
    write_csv(expenses, tz, &mut buf)?;
    Ok(buf)
}
