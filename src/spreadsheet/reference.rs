//! A1-style cell references. Rows and columns are 1-based throughout.

/// Converts a 1-based column index to its letters (1 → `A`, 27 → `AA`).
pub fn column_to_letters(column: u32) -> String {
    let mut column = column;
    let mut letters = Vec::new();
    while column > 0 {
        column -= 1;
        letters.push(b'A' + (column % 26) as u8);
        column /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Converts column letters (case-insensitive) to a 1-based index.
pub fn letters_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.chars().try_fold(0u32, |column, letter| {
        letter
            .is_ascii_alphabetic()
            .then(|| column * 26 + (letter.to_ascii_uppercase() as u32 - 'A' as u32 + 1))
    })
}

/// Formats `(row, column)` as an A1 reference.
pub fn to_reference(row: u32, column: u32) -> String {
    format!("{}{}", column_to_letters(column), row)
}

/// Parses an A1 reference such as `B12` or `$B$12` into `(row, column)`.
pub fn parse_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim();
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let letters = letters.trim_start_matches('$');
    let letters = letters.strip_suffix('$').unwrap_or(letters);
    let column = letters_to_column(letters)?;
    let row = digits.parse::<u32>().ok().filter(|row| *row > 0)?;
    Some((row, column))
}
