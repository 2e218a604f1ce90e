//! Spreadsheet-style letter labels for output columns

use super::model::MappingRule;

/// Letter label for a 0-based column index: 0 -> A, 25 -> Z, 26 -> AA
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Each output column of the rule paired with its letter label
pub fn lettered_columns(rule: &MappingRule) -> Vec<(String, &str)> {
    rule.output_columns
        .iter()
        .enumerate()
        .map(|(i, c)| (column_letter(i), c.as_str()))
        .collect()
}

/// Parse pasted catalog text, one column per line
///
/// Lines copied from a lettered listing carry an `A: ` style label, which is
/// dropped; the rest of the line is kept as written so a leading space in a
/// column name survives. Unlabelled lines are trimmed and blank lines skipped.
pub fn parse_column_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let line = line.trim();
            match line.split_once(": ") {
                Some((label, name)) if is_letter_label(label) => name.trim_end().to_string(),
                _ => line.to_string(),
            }
        })
        .collect()
}

fn is_letter_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_ascii_uppercase())
}
