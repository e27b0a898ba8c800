//! Core traits for the local cache tiers.

use serde::{de::DeserializeOwned, Serialize};

use crate::report::types::ReportRecord;

/// Trait for rows that can be stored in a cache slot.
///
/// Both local tiers store rows as serialized JSON and only need the
/// natural id to enforce per-slot uniqueness.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Identifier unique within one slot (e.g., bill number, item code)
  fn natural_id(&self) -> String;
}

impl Cacheable for ReportRecord {
  fn natural_id(&self) -> String {
    ReportRecord::natural_id(self)
  }
}

/// Drop rows whose natural id already appeared earlier in the slice.
///
/// Returns the kept rows in original order and the number dropped.
pub fn dedupe_by_natural_id<T: Cacheable>(records: Vec<T>) -> (Vec<T>, usize) {
  let mut seen = std::collections::HashSet::with_capacity(records.len());
  let before = records.len();
  let kept: Vec<T> = records
    .into_iter()
    .filter(|r| seen.insert(r.natural_id()))
    .collect();
  let dropped = before - kept.len();
  (kept, dropped)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::report::types::Template;

  fn template(id: &str, name: &str) -> ReportRecord {
    ReportRecord::Template(Template {
      company_code: "ACME".into(),
      template_id: id.into(),
      name: name.into(),
      body: String::new(),
    })
  }

  #[test]
  fn test_dedupe_keeps_first_occurrence() {
    let records = vec![template("a", "first"), template("b", "b"), template("a", "second")];
    let (kept, dropped) = dedupe_by_natural_id(records);
    assert_eq!(dropped, 1);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0], template("a", "first"));
    assert_eq!(kept[1], template("b", "b"));
  }
}
