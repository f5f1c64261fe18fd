// src/size_note.rs

//! Zamiana notatki rozmiarów ("2 small, 3 large") na rozbicie rozmiar → ilość i z powrotem.

use crate::models::{SizeBreakdown, SizeCount};

pub fn encode(breakdown: &[SizeCount]) -> String {
    breakdown
        .iter()
        .map(|entry| format!("{} {}", entry.count, entry.size_label))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Dekoduje pojedynczy napis rozdzielony przecinkami.
pub fn decode(note: &str) -> SizeBreakdown {
    decode_fragments(&[note])
}

/// Dekoduje tablicę fragmentów. Każdy fragment może sam zawierać przecinki.
/// Niepoprawne fragmenty są pomijane.
pub fn decode_fragments<S: AsRef<str>>(fragments: &[S]) -> SizeBreakdown {
    fragments
        .iter()
        .flat_map(|fragment| fragment.as_ref().split(','))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .filter_map(|fragment| {
            let parsed = parse_fragment(fragment);
            if parsed.is_none() {
                tracing::debug!("Pomijam niepoprawny fragment notatki: '{}'", fragment);
            }
            parsed
        })
        .collect()
}

// "12 extra large" -> (12, "extra large")
fn parse_fragment(fragment: &str) -> Option<SizeCount> {
    let digits_end = fragment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(fragment.len());
    if digits_end == 0 {
        return None;
    }
    let (digits, rest) = fragment.split_at(digits_end);
    // Liczba musi być oddzielona od etykiety białym znakiem.
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let count: u32 = digits.parse().ok()?;
    let label = rest.trim();
    if count == 0 || label.is_empty() {
        return None;
    }
    Some(SizeCount::new(label, count))
}

/// Normalizuje surową notatkę do tablicy fragmentów wysyłanej na serwer.
pub fn to_fragments(note: &str) -> Vec<String> {
    note.split(',')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Łączy dwa rozbicia, sumując ilości dla tych samych etykiet (kolejność pierwszego wystąpienia).
pub fn merge(base: &[SizeCount], extra: &[SizeCount]) -> SizeBreakdown {
    let mut merged: SizeBreakdown = base.to_vec();
    for entry in extra {
        match merged
            .iter_mut()
            .find(|existing| existing.size_label == entry.size_label)
        {
            Some(existing) => existing.count = existing.count.saturating_add(entry.count),
            None => merged.push(entry.clone()),
        }
    }
    merged
}

pub fn total(breakdown: &[SizeCount]) -> u32 {
    breakdown
        .iter()
        .fold(0u32, |total, entry| total.saturating_add(entry.count))
}
