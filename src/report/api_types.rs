//! Serde-deserializable types matching the report API responses.
//!
//! The service sends most numeric and date fields as loosely formatted
//! strings. These wire types keep that shape; conversion into the typed
//! domain records happens here, so nothing past this module sees raw strings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::FetchError;

use super::types::{
  EntityKind, Expiry, Ledger, Outstanding, PriceData, ReportRecord, SalePurchase, Stock, Template,
  TradeDirection,
};

/// Response envelope shared by every report endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
  #[serde(default)]
  pub is_success: bool,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub data: Option<Vec<Value>>,
}

/// Accept a string, number, bool or null and keep it as a trimmed string.
fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(match value {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.trim().to_string(),
    Some(other) => other.to_string(),
  })
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOutstanding {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub bill_no: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub party_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub party_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub bill_date: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub due_date: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub bill_amount: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub pending_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStock {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub item_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub item_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub group_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub unit: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub quantity: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub rate: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLedger {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub entry_id: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub ledger_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub voucher_no: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub voucher_date: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub particulars: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub debit: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub credit: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSalePurchase {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub invoice_no: String,
  /// "S"/"SALE" or "P"/"PURCHASE"
  #[serde(default, deserialize_with = "loose_string")]
  pub txn_type: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub invoice_date: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub party_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub taxable_amount: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub tax_amount: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub total_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExpiry {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub item_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub batch_no: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub item_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub expiry_date: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub quantity: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTemplate {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub template_id: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPriceData {
  #[serde(default, deserialize_with = "loose_string")]
  pub company_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub item_code: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub item_name: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub mrp: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub rate: String,
  #[serde(default, deserialize_with = "loose_string")]
  pub discount_pct: String,
}

// ============================================================================
// Field parsing
// ============================================================================

/// Parse an amount like "1,250.50", "-30" or "". Blank means zero.
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal, String> {
  let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
  if cleaned.is_empty() {
    return Ok(Decimal::ZERO);
  }
  cleaned
    .parse::<Decimal>()
    .map_err(|_| format!("{} is not a number: '{}'", field, raw))
}

const DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d", "%d-%b-%Y"];

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, String> {
  // Some endpoints append a midnight time component
  let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
  DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
    .ok_or_else(|| format!("{} is not a date: '{}'", field, raw))
}

fn parse_optional_date(field: &str, raw: &str) -> Result<Option<NaiveDate>, String> {
  if raw.is_empty() {
    return Ok(None);
  }
  parse_date(field, raw).map(Some)
}

fn require(field: &str, raw: String) -> Result<String, String> {
  if raw.is_empty() {
    return Err(format!("{} is missing", field));
  }
  Ok(raw)
}

// ============================================================================
// Conversion into domain records
// ============================================================================

impl TryFrom<ApiOutstanding> for Outstanding {
  type Error = String;

  fn try_from(row: ApiOutstanding) -> Result<Self, Self::Error> {
    Ok(Outstanding {
      bill_date: parse_date("billDate", &row.bill_date)?,
      due_date: parse_optional_date("dueDate", &row.due_date)?,
      bill_amount: parse_amount("billAmount", &row.bill_amount)?,
      pending_amount: parse_amount("pendingAmount", &row.pending_amount)?,
      bill_no: require("billNo", row.bill_no)?,
      company_code: row.company_code,
      party_code: row.party_code,
      party_name: row.party_name,
    })
  }
}

impl TryFrom<ApiStock> for Stock {
  type Error = String;

  fn try_from(row: ApiStock) -> Result<Self, Self::Error> {
    Ok(Stock {
      quantity: parse_amount("quantity", &row.quantity)?,
      rate: parse_amount("rate", &row.rate)?,
      value: parse_amount("value", &row.value)?,
      item_code: require("itemCode", row.item_code)?,
      company_code: row.company_code,
      item_name: row.item_name,
      group_name: row.group_name,
      unit: row.unit,
    })
  }
}

impl TryFrom<ApiLedger> for Ledger {
  type Error = String;

  fn try_from(row: ApiLedger) -> Result<Self, Self::Error> {
    Ok(Ledger {
      voucher_date: parse_date("voucherDate", &row.voucher_date)?,
      debit: parse_amount("debit", &row.debit)?,
      credit: parse_amount("credit", &row.credit)?,
      balance: parse_amount("balance", &row.balance)?,
      entry_id: require("entryId", row.entry_id)?,
      company_code: row.company_code,
      ledger_name: row.ledger_name,
      voucher_no: row.voucher_no,
      particulars: row.particulars,
    })
  }
}

impl TryFrom<ApiSalePurchase> for SalePurchase {
  type Error = String;

  fn try_from(row: ApiSalePurchase) -> Result<Self, Self::Error> {
    let direction = match row.txn_type.to_uppercase().as_str() {
      "S" | "SALE" | "SALES" => TradeDirection::Sale,
      "P" | "PURCHASE" | "PURCHASES" => TradeDirection::Purchase,
      other => return Err(format!("txnType is not sale/purchase: '{}'", other)),
    };
    Ok(SalePurchase {
      direction,
      invoice_date: parse_date("invoiceDate", &row.invoice_date)?,
      taxable_amount: parse_amount("taxableAmount", &row.taxable_amount)?,
      tax_amount: parse_amount("taxAmount", &row.tax_amount)?,
      total_amount: parse_amount("totalAmount", &row.total_amount)?,
      invoice_no: require("invoiceNo", row.invoice_no)?,
      company_code: row.company_code,
      party_name: row.party_name,
    })
  }
}

impl TryFrom<ApiExpiry> for Expiry {
  type Error = String;

  fn try_from(row: ApiExpiry) -> Result<Self, Self::Error> {
    Ok(Expiry {
      expiry_date: parse_date("expiryDate", &row.expiry_date)?,
      quantity: parse_amount("quantity", &row.quantity)?,
      item_code: require("itemCode", row.item_code)?,
      batch_no: require("batchNo", row.batch_no)?,
      company_code: row.company_code,
      item_name: row.item_name,
    })
  }
}

impl TryFrom<ApiTemplate> for Template {
  type Error = String;

  fn try_from(row: ApiTemplate) -> Result<Self, Self::Error> {
    Ok(Template {
      template_id: require("templateId", row.template_id)?,
      company_code: row.company_code,
      name: row.name,
      body: row.body,
    })
  }
}

impl TryFrom<ApiPriceData> for PriceData {
  type Error = String;

  fn try_from(row: ApiPriceData) -> Result<Self, Self::Error> {
    Ok(PriceData {
      mrp: parse_amount("mrp", &row.mrp)?,
      rate: parse_amount("rate", &row.rate)?,
      discount_pct: parse_amount("discountPct", &row.discount_pct)?,
      item_code: require("itemCode", row.item_code)?,
      company_code: row.company_code,
      item_name: row.item_name,
    })
  }
}

fn convert_row<A, D>(value: Value) -> Result<D, String>
where
  A: DeserializeOwned,
  D: TryFrom<A, Error = String>,
{
  let api: A = serde_json::from_value(value).map_err(|e| e.to_string())?;
  D::try_from(api)
}

/// Convert one wire row of the given kind into a typed record.
pub fn convert_record(kind: EntityKind, value: Value) -> Result<ReportRecord, String> {
  Ok(match kind {
    EntityKind::Outstanding => ReportRecord::Outstanding(convert_row::<ApiOutstanding, _>(value)?),
    EntityKind::Stock => ReportRecord::Stock(convert_row::<ApiStock, _>(value)?),
    EntityKind::Ledger => ReportRecord::Ledger(convert_row::<ApiLedger, _>(value)?),
    EntityKind::SalePurchase => {
      ReportRecord::SalePurchase(convert_row::<ApiSalePurchase, _>(value)?)
    }
    EntityKind::Expiry => ReportRecord::Expiry(convert_row::<ApiExpiry, _>(value)?),
    EntityKind::Template => ReportRecord::Template(convert_row::<ApiTemplate, _>(value)?),
    EntityKind::PriceData => ReportRecord::PriceData(convert_row::<ApiPriceData, _>(value)?),
  })
}

/// Decode a full endpoint response.
///
/// `status` is the HTTP status of a 2xx transport result; a rejected envelope
/// is reported as a server error carrying that status. Any row that fails to
/// convert fails the whole collection.
pub fn decode_response(
  kind: EntityKind,
  status: u16,
  body: &[u8],
) -> Result<Vec<ReportRecord>, FetchError> {
  let envelope: ApiEnvelope = serde_json::from_slice(body)
    .map_err(|e| FetchError::MalformedResponse(format!("{} envelope: {}", kind, e)))?;

  if !envelope.is_success {
    let message = if envelope.message.is_empty() {
      "request was not successful".to_string()
    } else {
      envelope.message
    };
    return Err(FetchError::ServerError {
      code: status,
      message,
    });
  }

  envelope
    .data
    .unwrap_or_default()
    .into_iter()
    .enumerate()
    .map(|(i, row)| {
      convert_record(kind, row)
        .map_err(|e| FetchError::MalformedResponse(format!("{} row {}: {}", kind, i, e)))
    })
    .collect()
}
