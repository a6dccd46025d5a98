use rand::Rng;

pub const TICKET_NUMBER_LEN: usize = 8;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces ticket number candidates. Uniqueness is the caller's job.
pub trait TicketNumberSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniform draws from `A-Z0-9`, with replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTicketNumbers;

impl TicketNumberSource for RandomTicketNumbers {
    fn generate(&self) -> String {
        generate_ticket_number()
    }
}

pub fn generate_ticket_number() -> String {
    let mut rng = rand::thread_rng();
    (0..TICKET_NUMBER_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Whether `value` has the shape of a ticket number.
pub fn is_ticket_number(value: &str) -> bool {
    value.len() == TICKET_NUMBER_LEN
        && value.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_numbers_match_format() {
        for _ in 0..500 {
            let ticket = generate_ticket_number();
            assert!(is_ticket_number(&ticket), "bad ticket number {}", ticket);
        }
    }

    #[test]
    fn test_collisions_are_rare() {
        let drawn: HashSet<String> = (0..2000).map(|_| RandomTicketNumbers.generate()).collect();
        assert!(drawn.len() > 1990);
    }

    #[test]
    fn test_format_check() {
        assert!(is_ticket_number("AB12CD34"));
        assert!(!is_ticket_number("ab12cd34"));
        assert!(!is_ticket_number("AB12CD3"));
        assert!(!is_ticket_number("AB12-D34"));
    }
}
