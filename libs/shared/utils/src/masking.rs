//! Field masking for log lines and error details that might otherwise leak
//! patient-identifying data.

pub fn mask_field(value: &str, mask_char: char, visible_chars: usize) -> String {
    let len = value.chars().count();
    if len <= visible_chars {
        return value.to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    let visible: String = chars[len - visible_chars..].iter().collect();
    let masked: String = mask_char.to_string().repeat(len - visible_chars);
    format!("{masked}{visible}")
}

pub fn mask_email(email: &str) -> String {
    match email.find('@') {
        Some(at_pos) => {
            let (local, domain) = email.split_at(at_pos);
            format!("{}{}", mask_field(local, '*', 2.min(local.len())), domain)
        }
        None => mask_field(email, '*', 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_email_local_part_only() {
        assert_eq!(mask_email("jane.doe@example.com"), "******oe@example.com");
    }

    #[test]
    fn masks_field_shorter_than_visible_unchanged() {
        assert_eq!(mask_field("ab", '*', 5), "ab");
    }
}
