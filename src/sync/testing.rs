//! Scripted remote source and record fixtures for sync tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::FetchError;
use crate::report::client::RemoteSource;
use crate::report::types::{EntityKind, FiscalYear, Outstanding, ReportRecord, Stock, UserId};

#[derive(Debug, Clone)]
pub enum MockResponse {
  Records(Vec<ReportRecord>),
  Fail(FetchError),
  /// Never answers; exercises the fetch timeout
  Hang,
}

#[derive(Debug, Default)]
pub struct MockRemote {
  responses: Mutex<HashMap<EntityKind, MockResponse>>,
  calls: Mutex<HashMap<EntityKind, usize>>,
  delay: Mutex<Option<Duration>>,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, kind: EntityKind, records: Vec<ReportRecord>) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(kind, MockResponse::Records(records));
  }

  pub fn fail(&self, kind: EntityKind, error: FetchError) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(kind, MockResponse::Fail(error));
  }

  pub fn hang(&self, kind: EntityKind) {
    self.responses.lock().unwrap().insert(kind, MockResponse::Hang);
  }

  /// Delay every answer by `delay`.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn calls(&self, kind: EntityKind) -> usize {
    self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().values().sum()
  }
}

#[async_trait]
impl RemoteSource for MockRemote {
  async fn fetch(
    &self,
    kind: EntityKind,
    _user: UserId,
    _year: &FiscalYear,
  ) -> Result<Vec<ReportRecord>, FetchError> {
    *self.calls.lock().unwrap().entry(kind).or_default() += 1;

    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let response = self.responses.lock().unwrap().get(&kind).cloned();
    match response {
      Some(MockResponse::Records(records)) => Ok(records),
      Some(MockResponse::Fail(error)) => Err(error),
      Some(MockResponse::Hang) => {
        std::future::pending::<()>().await;
        Ok(Vec::new())
      }
      None => Ok(Vec::new()),
    }
  }
}

pub fn year() -> FiscalYear {
  FiscalYear::parse("2024-25").unwrap()
}

pub fn user() -> UserId {
  UserId::new(42).unwrap()
}

pub fn outstanding(n: usize) -> Vec<ReportRecord> {
  (0..n)
    .map(|i| {
      ReportRecord::Outstanding(Outstanding {
        company_code: "ACME".into(),
        bill_no: format!("B{:04}", i),
        party_code: format!("P{:03}", i % 17),
        party_name: format!("Party {}", i % 17),
        bill_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
        bill_amount: Decimal::new(100_000 + i as i64, 2),
        pending_amount: Decimal::new(5_000, 2),
      })
    })
    .collect()
}

pub fn stock(n: usize) -> Vec<ReportRecord> {
  (0..n)
    .map(|i| {
      ReportRecord::Stock(Stock {
        company_code: "ACME".into(),
        item_code: format!("I{:04}", i),
        item_name: format!("Item {}", i),
        group_name: "General".into(),
        unit: "PCS".into(),
        quantity: Decimal::new(i as i64 + 1, 0),
        rate: Decimal::new(1_250, 2),
        value: Decimal::new((i as i64 + 1) * 1_250, 2),
      })
    })
    .collect()
}
