//! Text normalization used by the resolver before trigram comparison:
//! lowercase, collapse all whitespace variants to a single space, strip
//! zero-width characters, trim.

const ZERO_WIDTH: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

pub fn normalize_for_matching(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;

    for ch in input.chars() {
        if ZERO_WIDTH.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        out.extend(ch.to_lowercase());
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_tabs_and_nbsp_and_newlines() {
        assert_eq!(
            normalize_for_matching("  North\tShore\u{00A0}Clinic\n"),
            "north shore clinic"
        );
    }

    #[test]
    fn strips_zero_width_characters() {
        assert_eq!(
            normalize_for_matching("North\u{200B}Shore"),
            "northshore"
        );
    }

    #[test]
    fn idempotent_on_already_normalized_input() {
        let s = "north shore clinic";
        assert_eq!(normalize_for_matching(s), s);
    }
}
