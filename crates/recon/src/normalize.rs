//! Text normalization shared by header matching and key joining.

/// Lower-case and drop every character that is not an ASCII letter or digit.
///
/// `"Item #"` and `"ITEM_NUMBER"` normalize to `"item"` and `"itemnumber"`,
/// which lets header patterns match through punctuation and spacing drift.
pub fn normalize_header(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Business-key form: the first run of ASCII digits, or `""` when there is none.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect()
}
