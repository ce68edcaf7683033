//! Check-digit validation for CNPJ organization tax identifiers.

const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Strips every non-digit character
pub fn clean(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Returns whether `raw` carries a valid CNPJ once punctuation is removed.
///
/// Anything other than exactly 14 digits is invalid, as is a single digit
/// repeated 14 times even when its check digits happen to add up.
pub fn is_valid(raw: &str) -> bool {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 14 || digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12], &FIRST_WEIGHTS);
    let second = check_digit(&digits[..13], &SECOND_WEIGHTS);
    digits[12] == first && digits[13] == second
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}
