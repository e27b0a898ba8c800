//! Report kind names, aliases and lookup for command-line arguments

use super::types::{EntityKind, KeyError};

#[derive(Debug, Clone)]
pub struct KindEntry {
  pub kind: EntityKind,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

impl KindEntry {
  pub fn name(&self) -> &'static str {
    self.kind.as_str()
  }
}

/// All report kinds, in display order
pub const KINDS: &[KindEntry] = &[
  KindEntry {
    kind: EntityKind::Outstanding,
    aliases: &["o", "out", "os", "receivables"],
    description: "Outstanding bill balances",
  },
  KindEntry {
    kind: EntityKind::Stock,
    aliases: &["s", "inventory"],
    description: "Closing stock by item",
  },
  KindEntry {
    kind: EntityKind::Ledger,
    aliases: &["l", "led"],
    description: "Ledger postings",
  },
  KindEntry {
    kind: EntityKind::SalePurchase,
    aliases: &["sp", "sales", "purchases"],
    description: "Sale and purchase invoices",
  },
  KindEntry {
    kind: EntityKind::Expiry,
    aliases: &["e", "exp", "batches"],
    description: "Batches by expiry date",
  },
  KindEntry {
    kind: EntityKind::Template,
    aliases: &["t", "templates", "tpl"],
    description: "Message templates",
  },
  KindEntry {
    kind: EntityKind::PriceData,
    aliases: &["p", "price", "prices", "pricelist"],
    description: "Price list",
  },
];

/// Get matching kinds for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static KindEntry> {
  ranked(input).into_iter().map(|(entry, _)| entry).collect()
}

fn ranked(input: &str) -> Vec<(&'static KindEntry, u32)> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return KINDS.iter().map(|k| (k, u32::MAX)).collect();
  }

  let mut matches: Vec<(&KindEntry, u32)> = Vec::new();

  for entry in KINDS {
    let name = entry.name();

    // Exact match on name
    if name == input_lower {
      matches.push((entry, 0));
      continue;
    }

    // Exact match on alias
    if entry.aliases.contains(&input_lower.as_str()) {
      matches.push((entry, 1));
      continue;
    }

    // Prefix match on name
    if name.starts_with(&input_lower) {
      matches.push((entry, 2));
      continue;
    }

    // Prefix match on alias
    if entry.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((entry, 3));
      continue;
    }

    // Fuzzy match (contains)
    if name.contains(&input_lower) {
      matches.push((entry, 4));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);
  matches
}

/// Resolve user input to exactly one kind.
///
/// Exact names and aliases always win; looser matches must be unambiguous.
pub fn resolve_kind(input: &str) -> Result<EntityKind, KeyError> {
  let matches = ranked(input);
  let Some(&(best, best_priority)) = matches.first() else {
    return Err(KeyError::UnknownKind(input.to_string()));
  };

  if best_priority == u32::MAX {
    return Err(KeyError::UnknownKind(input.to_string()));
  }

  let tied: Vec<&str> = matches
    .iter()
    .filter(|(_, p)| *p == best_priority)
    .map(|(e, _)| e.name())
    .collect();

  if best_priority > 1 && tied.len() > 1 {
    return Err(KeyError::AmbiguousKind {
      input: input.to_string(),
      candidates: tied.join(", "),
    });
  }

  Ok(best.kind)
}

/// Parse a comma separated kind list, e.g. `out,stock,p`.
pub fn resolve_kind_list(input: &str) -> Result<Vec<EntityKind>, KeyError> {
  let mut kinds = Vec::new();
  for part in input.split(',').filter(|p| !p.trim().is_empty()) {
    let kind = resolve_kind(part)?;
    if !kinds.contains(&kind) {
      kinds.push(kind);
    }
  }
  Ok(kinds)
}
