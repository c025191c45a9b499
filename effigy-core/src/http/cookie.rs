//! Cookie header parsing and formatting.

/// A cookie as sent by the server or presented by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Decoded cookie value.
    pub value: String,
}

impl Cookie {
    /// Create a cookie.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parse a `Set-Cookie` header value.
///
/// The name is everything before the first `=`; the value is everything
/// after it up to the first `;`, URL-decoded. Attributes after the first
/// `;` (`Path`, `HttpOnly`, ...) are dropped.
pub fn parse_set_cookie(header: &str) -> Cookie {
    let (name, rest) = match header.split_once('=') {
        Some((name, rest)) => (name, rest),
        None => (header, ""),
    };
    let raw_value = rest.split(';').next().unwrap_or("");
    Cookie::new(name.trim(), percent_decode(raw_value.trim()))
}

/// Parse a request `Cookie` header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            Some((name.trim().to_string(), percent_decode(value.trim())))
        })
        .collect()
}

/// Format name/value pairs into a request `Cookie` header.
pub fn format_cookie_header(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={}", percent_encode(value)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decode `%XX` escapes and `+` as space.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &input[i + 1..i + 3];
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode characters outside the cookie-safe set as `%XX`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_drops_attributes() {
        let cookie = parse_set_cookie("sess_id=abc123; Path=/; HttpOnly");
        assert_eq!(cookie.name, "sess_id");
        assert_eq!(cookie.value, "abc123");
    }

    #[test]
    fn set_cookie_decodes_value() {
        let cookie = parse_set_cookie("name=hello%20world%21");
        assert_eq!(cookie.value, "hello world!");
    }

    #[test]
    fn set_cookie_without_equals_has_empty_value() {
        let cookie = parse_set_cookie("bare");
        assert_eq!(cookie.name, "bare");
        assert_eq!(cookie.value, "");
    }

    #[test]
    fn cookie_header_roundtrip() {
        let pairs = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two words".to_string()),
        ];
        let header = format_cookie_header(&pairs);
        assert_eq!(header, "a=1; b=two%20words");
        assert_eq!(parse_cookie_header(&header), pairs);
    }

    #[test]
    fn malformed_escape_is_kept_literal() {
        assert_eq!(percent_decode("50%"), "50%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
    }
}
