/// Reduces a phone number or phone-derived session id to comparable digits.
/// A leading `+` is kept; anything after an `@` routing suffix or an extension marker is ignored.
pub fn normalize_phone_for_match(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }

    let mut digits = 0usize;
    for ch in trimmed.chars() {
        match ch {
            '0'..='9' => {
                out.push(ch);
                digits += 1;
            }
            '@' | 'x' | 'X' | '#' | ';' | ',' => break,
            _ => {}
        }
    }

    (digits > 0).then_some(out)
}
