// src/merge.rs

use indexmap::IndexMap;

use crate::models::CartLine;

/// Łączy koszyk gościa z koszykiem zalogowanego użytkownika.
///
/// Pozycje z serwera zostają bez zmian; z koszyka gościa przenoszone są tylko
/// produkty, których użytkownik jeszcze nie ma (przy konflikcie wygrywa serwer).
pub fn merge_guest_lines(server: &[CartLine], guest: &[CartLine]) -> Vec<CartLine> {
    let mut merged: IndexMap<String, CartLine> = server
        .iter()
        .map(|line| (line.product_id.clone(), line.clone()))
        .collect();

    for line in guest {
        if line.quantity == 0 || merged.contains_key(&line.product_id) {
            tracing::debug!(
                "Pomijam pozycję gościa {} przy scalaniu koszyka",
                line.product_id
            );
            continue;
        }
        merged.insert(line.product_id.clone(), line.clone());
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_lines_win_and_new_guest_lines_are_appended() {
        let server = vec![CartLine::new("A", 2), CartLine::new("B", 1)];
        let guest = vec![
            CartLine::new("B", 5),
            CartLine::new("C", 1),
            CartLine::new("D", 0),
        ];

        let merged = merge_guest_lines(&server, &guest);
        let summary: Vec<_> = merged
            .iter()
            .map(|line| (line.product_id.as_str(), line.quantity))
            .collect();
        assert_eq!(summary, vec![("A", 2), ("B", 1), ("C", 1)]);
    }

    #[test]
    fn empty_server_cart_takes_whole_guest_cart() {
        let guest = vec![CartLine::new("X", 3)];
        assert_eq!(merge_guest_lines(&[], &guest), guest);
    }
}
