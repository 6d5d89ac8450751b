//! Scrubs obvious PII out of tool results before they enter the transcript.
//!
//! Token-based rather than regex-based: each whitespace-delimited token is
//! checked after stripping surrounding punctuation, so formatting survives.

const CREDENTIAL_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "access_key",
    "authorization",
];

/// Replace emails, IPv4 addresses, Luhn-valid card numbers and
/// `password=...`-style pairs with redaction markers.
pub fn scrub(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut token = String::new();

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !token.is_empty() {
                out.push_str(&scrub_token(&token));
                token.clear();
            }
            out.push(ch);
        } else {
            token.push(ch);
        }
    }
    if !token.is_empty() {
        out.push_str(&scrub_token(&token));
    }
    out
}

fn scrub_token(token: &str) -> String {
    let leading: String = token
        .chars()
        .take_while(|c| is_edge_punct(*c))
        .collect();
    let trailing: String = token
        .chars()
        .rev()
        .take_while(|c| is_edge_punct(*c))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let core = &token[leading.len()..token.len() - trailing.len().min(token.len() - leading.len())];

    if core.is_empty() {
        return token.to_string();
    }

    let replacement = if is_email(core) {
        Some("[EMAIL]".to_string())
    } else if is_ipv4(core) {
        Some("[IP]".to_string())
    } else if is_card_number(core) {
        Some("[CARD]".to_string())
    } else {
        credential_pair(core)
    };

    match replacement {
        Some(r) => format!("{}{}{}", leading, r, trailing),
        None => token.to_string(),
    }
}

fn is_edge_punct(c: char) -> bool {
    matches!(c, ',' | '.' | ';' | ':' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\'' | '<' | '>')
}

fn is_email(token: &str) -> bool {
    let Some(at) = token.find('@') else {
        return false;
    };
    let (local, domain) = token.split_at(at);
    let domain = &domain[1..];
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn is_ipv4(token: &str) -> bool {
    let octets: Vec<&str> = token.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty() && o.len() <= 3 && o.chars().all(|c| c.is_ascii_digit()) && o.parse::<u16>().map(|n| n <= 255).unwrap_or(false)
        })
}

/// Card-shaped: 13-19 digits, optionally grouped by dashes or spaces within
/// the token, passing the Luhn check.
fn is_card_number(token: &str) -> bool {
    if !token.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return false;
    }
    let digits: Vec<u32> = token.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    luhn_valid(&digits)
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// `password=hunter2` style pairs keep the key, lose the value.
fn credential_pair(token: &str) -> Option<String> {
    let (key, _value) = token.split_once('=').or_else(|| token.split_once(':'))?;
    let normalized = key.trim().to_lowercase();
    if CREDENTIAL_KEYS.contains(&normalized.as_str()) {
        let sep = if token[key.len()..].starts_with('=') { '=' } else { ':' };
        Some(format!("{}{}[REDACTED]", key, sep))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_email() {
        assert_eq!(scrub("contact alice@example.com now"), "contact [EMAIL] now");
        assert_eq!(scrub("(bob@site.org)"), "([EMAIL])");
    }

    #[test]
    fn test_scrub_ipv4() {
        assert_eq!(scrub("server at 192.168.1.10 responded"), "server at [IP] responded");
        // Not an IP: octet out of range
        assert_eq!(scrub("version 1.2.3.999"), "version 1.2.3.999");
    }

    #[test]
    fn test_scrub_card_number() {
        // Standard Luhn-valid test number
        assert_eq!(scrub("card 4111111111111111 on file"), "card [CARD] on file");
        assert_eq!(scrub("card 4111-1111-1111-1111."), "card [CARD].");
        // Luhn-invalid digits pass through
        assert_eq!(scrub("order 4111111111111112"), "order 4111111111111112");
        // Too short to be a card
        assert_eq!(scrub("code 123456"), "code 123456");
    }

    #[test]
    fn test_scrub_credential_pairs() {
        assert_eq!(scrub("password=hunter2"), "password=[REDACTED]");
        assert_eq!(scrub("api_key=sk-abc123 ok"), "api_key=[REDACTED] ok");
        assert_eq!(scrub("Token:abc"), "Token:[REDACTED]");
        // Unrelated pairs untouched
        assert_eq!(scrub("page=2"), "page=2");
    }

    #[test]
    fn test_scrub_preserves_whitespace_layout() {
        let input = "line one\n  a@b.co\tend";
        assert_eq!(scrub(input), "line one\n  [EMAIL]\tend");
    }

    #[test]
    fn test_scrub_plain_text_untouched() {
        let input = "The quick brown fox jumps over 13 lazy dogs.";
        assert_eq!(scrub(input), input);
    }
}
