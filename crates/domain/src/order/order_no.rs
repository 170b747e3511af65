//! Order number generation.

use chrono::Utc;
use common::OrderNo;
use rand::Rng;

/// Generates a date-coded order number: `YYMMDD` + 4 random digits + the
/// trailing 6 digits of the current millisecond timestamp.
///
/// The random block plus millisecond tail make collisions negligible under
/// realistic load, and the order store's unique key catches the residue;
/// callers retry on a key conflict.
pub fn generate_order_no() -> OrderNo {
    let now = Utc::now();
    let date = now.format("%y%m%d");
    let random: u32 = rand::thread_rng().gen_range(0..10_000);
    let millis = now.timestamp_millis();
    OrderNo::new(format!("{date}{random:04}{:06}", millis % 1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_expected_shape() {
        let no = generate_order_no();
        assert_eq!(no.as_str().len(), 16);
        assert!(no.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn starts_with_the_date_code() {
        let no = generate_order_no();
        let date = Utc::now().format("%y%m%d").to_string();
        assert!(no.as_str().starts_with(&date));
    }

    #[test]
    fn consecutive_numbers_differ() {
        // Not a uniqueness proof; the store's unique key is the real
        // guarantee. This only catches a degenerate generator.
        let a = generate_order_no();
        let b = generate_order_no();
        let c = generate_order_no();
        assert!(a != b || b != c);
    }
}
