//! General-ledger transaction listing.
//!
//! The backend returns one row per voucher line; listings show one row per
//! voucher with debit and credit totals.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::auth::record::deserialize_string_or_number;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlTransaction {
    #[serde(default)]
    pub vcode: String,
    #[serde(default)]
    pub vname: String,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub vno: String,
    #[serde(default)]
    pub vdate: String,
    /// `"Y"` once the voucher is posted
    #[serde(default)]
    pub post: String,
    #[serde(default)]
    pub vdesc1: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub sno: String,
    #[serde(default)]
    pub amountdr: f64,
    #[serde(default)]
    pub amountcr: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GlTransactionsResponse {
    #[serde(default)]
    pub items: Vec<GlTransaction>,
}

impl GlTransaction {
    /// Identifies a voucher: voucher code plus voucher number
    pub fn voucher_key(&self) -> String {
        format!("{}-{}", self.vcode, self.vno)
    }

    pub fn is_posted(&self) -> bool {
        self.post == "Y"
    }

    fn matches(&self, needle: &str) -> bool {
        [
            self.vcode.as_str(),
            self.vname.as_str(),
            self.vno.as_str(),
            self.vdate.as_str(),
            self.vdesc1.as_deref().unwrap_or_default(),
            self.sno.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Collapse voucher lines into one row per voucher.
///
/// The first line of each voucher is kept and its debit and credit become
/// the voucher totals. Vouchers appear in the order first seen.
pub fn consolidate_vouchers(lines: Vec<GlTransaction>) -> Vec<GlTransaction> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut vouchers: Vec<GlTransaction> = Vec::new();

    for line in lines {
        let key = line.voucher_key();
        match index.get(&key).copied() {
            Some(pos) => {
                vouchers[pos].amountdr += line.amountdr;
                vouchers[pos].amountcr += line.amountcr;
            }
            None => {
                index.insert(key, vouchers.len());
                vouchers.push(line);
            }
        }
    }

    vouchers
}

/// Case-insensitive filter over the textual columns. Blank text keeps all rows.
pub fn search<'a>(rows: &'a [GlTransaction], text: &str) -> Vec<&'a GlTransaction> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return rows.iter().collect();
    }
    rows.iter().filter(|row| row.matches(&needle)).collect()
}

/// A voucher as shown in exports and printouts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "V Code")]
    pub vcode: String,
    #[serde(rename = "V Name")]
    pub vname: String,
    #[serde(rename = "V No")]
    pub vno: String,
    #[serde(rename = "V Date")]
    pub vdate: String,
    #[serde(rename = "Status")]
    pub status: &'static str,
    #[serde(rename = "V Desc")]
    pub vdesc: String,
    #[serde(rename = "S No")]
    pub sno: String,
    #[serde(rename = "Debit")]
    pub debit: String,
    #[serde(rename = "Credit")]
    pub credit: String,
}

impl From<&GlTransaction> for ExportRow {
    fn from(row: &GlTransaction) -> Self {
        ExportRow {
            vcode: row.vcode.clone(),
            vname: row.vname.clone(),
            vno: row.vno.clone(),
            vdate: format_voucher_date(&row.vdate),
            status: if row.is_posted() { "Posted" } else { "Unposted" },
            vdesc: row.vdesc1.clone().unwrap_or_default(),
            sno: row.sno.clone(),
            debit: amount_with_comma(row.amountdr),
            credit: amount_with_comma(row.amountcr),
        }
    }
}

/// Format an amount with thousands separators and two decimals
pub fn amount_with_comma(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}

/// Format a voucher date as `dd/mm/yyyy`, leaving unparseable input as-is
pub fn format_voucher_date(date: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return dt.format("%d/%m/%Y").to_string();
    }
    date.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| date.to_string())
}
