use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Report categories served by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Outstanding,
  Stock,
  Ledger,
  SalePurchase,
  Expiry,
  Template,
  PriceData,
}

impl EntityKind {
  pub const ALL: [EntityKind; 7] = [
    EntityKind::Outstanding,
    EntityKind::Stock,
    EntityKind::Ledger,
    EntityKind::SalePurchase,
    EntityKind::Expiry,
    EntityKind::Template,
    EntityKind::PriceData,
  ];

  /// Stable storage name; used in table rows and snapshot file names.
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityKind::Outstanding => "outstanding",
      EntityKind::Stock => "stock",
      EntityKind::Ledger => "ledger",
      EntityKind::SalePurchase => "sale_purchase",
      EntityKind::Expiry => "expiry",
      EntityKind::Template => "template",
      EntityKind::PriceData => "price_data",
    }
  }

  /// Path segment of the remote endpoint for this kind.
  pub fn endpoint(&self) -> &'static str {
    match self {
      EntityKind::Outstanding => "reports/outstanding",
      EntityKind::Stock => "reports/stock",
      EntityKind::Ledger => "reports/ledger",
      EntityKind::SalePurchase => "reports/sale-purchase",
      EntityKind::Expiry => "reports/expiry",
      EntityKind::Template => "reports/templates",
      EntityKind::PriceData => "reports/price-list",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EntityKind {
  type Err = KeyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    EntityKind::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| KeyError::UnknownKind(s.to_string()))
  }
}

/// Malformed partition keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
  #[error("invalid fiscal year '{0}', expected YYYY-YY (e.g. 2024-25)")]
  InvalidFiscalYear(String),

  #[error("user id must be a positive integer")]
  InvalidUserId,

  #[error("unknown report kind '{0}'")]
  UnknownKind(String),

  #[error("'{input}' matches several report kinds: {candidates}")]
  AmbiguousKind { input: String, candidates: String },
}

/// Accounting year partition key in the server's `YYYY-YY` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FiscalYear(String);

impl FiscalYear {
  pub fn parse(s: &str) -> Result<Self, KeyError> {
    let s = s.trim();
    let invalid = || KeyError::InvalidFiscalYear(s.to_string());

    let (start, end) = s.split_once('-').ok_or_else(invalid)?;
    let digits = |part: &str, len: usize| part.len() == len && part.chars().all(|c| c.is_ascii_digit());
    if !digits(start, 4) || !digits(end, 2) {
      return Err(invalid());
    }
    let start: u16 = start.parse().map_err(|_| invalid())?;
    let end: u16 = end.parse().map_err(|_| invalid())?;
    if (start + 1) % 100 != end {
      return Err(invalid());
    }

    Ok(Self(s.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for FiscalYear {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for FiscalYear {
  type Error = KeyError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<FiscalYear> for String {
  fn from(year: FiscalYear) -> Self {
    year.0
  }
}

/// Remote user identifier; always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(u64);

impl UserId {
  pub fn new(id: u64) -> Result<Self, KeyError> {
    if id == 0 {
      return Err(KeyError::InvalidUserId);
    }
    Ok(Self(id))
  }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ============================================================================
// Record kinds
// ============================================================================

/// Unpaid bill balance for a party
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outstanding {
  pub company_code: String,
  pub bill_no: String,
  pub party_code: String,
  pub party_name: String,
  pub bill_date: NaiveDate,
  pub due_date: Option<NaiveDate>,
  pub bill_amount: Decimal,
  pub pending_amount: Decimal,
}

/// Closing stock position for an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
  pub company_code: String,
  pub item_code: String,
  pub item_name: String,
  pub group_name: String,
  pub unit: String,
  pub quantity: Decimal,
  pub rate: Decimal,
  pub value: Decimal,
}

/// One ledger posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
  pub company_code: String,
  pub entry_id: String,
  pub ledger_name: String,
  pub voucher_no: String,
  pub voucher_date: NaiveDate,
  pub particulars: String,
  pub debit: Decimal,
  pub credit: Decimal,
  pub balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
  Sale,
  Purchase,
}

impl TradeDirection {
  fn as_str(&self) -> &'static str {
    match self {
      TradeDirection::Sale => "sale",
      TradeDirection::Purchase => "purchase",
    }
  }
}

/// Sale or purchase invoice total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePurchase {
  pub company_code: String,
  pub invoice_no: String,
  pub direction: TradeDirection,
  pub invoice_date: NaiveDate,
  pub party_name: String,
  pub taxable_amount: Decimal,
  pub tax_amount: Decimal,
  pub total_amount: Decimal,
}

/// Batch nearing or past its expiry date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expiry {
  pub company_code: String,
  pub item_code: String,
  pub batch_no: String,
  pub item_name: String,
  pub expiry_date: NaiveDate,
  pub quantity: Decimal,
}

/// Message template used by export collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
  pub company_code: String,
  pub template_id: String,
  pub name: String,
  pub body: String,
}

/// Price list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
  pub company_code: String,
  pub item_code: String,
  pub item_name: String,
  pub mrp: Decimal,
  pub rate: Decimal,
  pub discount_pct: Decimal,
}

/// A single report row of any kind.
///
/// Serialized as a flat object with a `kind` discriminator so snapshots do
/// not depend on any storage schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportRecord {
  Outstanding(Outstanding),
  Stock(Stock),
  Ledger(Ledger),
  SalePurchase(SalePurchase),
  Expiry(Expiry),
  Template(Template),
  PriceData(PriceData),
}

impl ReportRecord {
  /// Identifier unique within one kind and fiscal year.
  pub fn natural_id(&self) -> String {
    match self {
      ReportRecord::Outstanding(r) => r.bill_no.clone(),
      ReportRecord::Stock(r) => r.item_code.clone(),
      ReportRecord::Ledger(r) => r.entry_id.clone(),
      ReportRecord::SalePurchase(r) => format!("{}:{}", r.direction.as_str(), r.invoice_no),
      ReportRecord::Expiry(r) => format!("{}/{}", r.item_code, r.batch_no),
      ReportRecord::Template(r) => r.template_id.clone(),
      ReportRecord::PriceData(r) => r.item_code.clone(),
    }
  }

  /// Case-insensitive match against the record's text fields.
  pub fn matches_text(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let hit = |s: &str| s.to_lowercase().contains(&needle);
    match self {
      ReportRecord::Outstanding(r) => hit(&r.bill_no) || hit(&r.party_name) || hit(&r.party_code),
      ReportRecord::Stock(r) => hit(&r.item_code) || hit(&r.item_name) || hit(&r.group_name),
      ReportRecord::Ledger(r) => hit(&r.ledger_name) || hit(&r.voucher_no) || hit(&r.particulars),
      ReportRecord::SalePurchase(r) => hit(&r.invoice_no) || hit(&r.party_name),
      ReportRecord::Expiry(r) => hit(&r.item_code) || hit(&r.item_name) || hit(&r.batch_no),
      ReportRecord::Template(r) => hit(&r.name) || hit(&r.body),
      ReportRecord::PriceData(r) => hit(&r.item_code) || hit(&r.item_name),
    }
  }

  /// One-line rendering for list output.
  pub fn summary_line(&self) -> String {
    match self {
      ReportRecord::Outstanding(r) => format!(
        "{:<12} {:<30} {} pending {:.2}",
        r.bill_no,
        r.party_name,
        r.bill_date.format("%d-%m-%Y"),
        r.pending_amount
      ),
      ReportRecord::Stock(r) => format!(
        "{:<12} {:<30} {} {} @ {:.2}",
        r.item_code, r.item_name, r.quantity, r.unit, r.rate
      ),
      ReportRecord::Ledger(r) => format!(
        "{} {:<10} {:<24} Dr {:.2} Cr {:.2} Bal {:.2}",
        r.voucher_date.format("%d-%m-%Y"),
        r.voucher_no,
        r.ledger_name,
        r.debit,
        r.credit,
        r.balance
      ),
      ReportRecord::SalePurchase(r) => format!(
        "{:<8} {:<12} {:<30} {:.2}",
        r.direction.as_str(),
        r.invoice_no,
        r.party_name,
        r.total_amount
      ),
      ReportRecord::Expiry(r) => format!(
        "{:<12} {:<10} {:<30} expires {}",
        r.item_code,
        r.batch_no,
        r.item_name,
        r.expiry_date.format("%d-%m-%Y")
      ),
      ReportRecord::Template(r) => format!("{:<12} {}", r.template_id, r.name),
      ReportRecord::PriceData(r) => format!(
        "{:<12} {:<30} MRP {:.2} rate {:.2}",
        r.item_code, r.item_name, r.mrp, r.rate
      ),
    }
  }
}
