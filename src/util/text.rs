use std::borrow::Cow;

use html_escape::decode_html_entities;

/// Characters that change the meaning of a plain YAML scalar.
const FRONT_MATTER_SPECIALS: &[char] = &[
    ':', '#', '"', '\'', '[', ']', '{', '}', ',', '&', '*', '!', '|', '>', '%', '@', '`',
];

/// Plain scalars a YAML reader resolves to null, booleans or special floats.
const FRONT_MATTER_KEYWORDS: &[&str] = &[
    "~", "null", "true", "false", "yes", "no", "on", "off", "y", "n", ".inf", "-.inf", "+.inf",
    ".nan",
];

/// Resolves named and numeric HTML character references.
///
/// Unknown references are left as written, so `&bogus;` survives untouched.
///
/// # Examples
///
/// ```
/// use feedport::util::unescape_html;
///
/// assert_eq!(unescape_html("Tom &amp; Jerry&#8217;s"), "Tom & Jerry\u{2019}s");
/// assert_eq!(unescape_html("&lt;p&gt;hi&lt;/p&gt;"), "<p>hi</p>");
/// ```
pub fn unescape_html(s: &str) -> Cow<'_, str> {
    decode_html_entities(s)
}

/// Escapes a title so it can be embedded as a single-line front matter value.
///
/// Plain titles are returned borrowed. Titles that a YAML reader would
/// misinterpret (colons, quotes, flow indicators, leading dashes, padding
/// whitespace) or read as something other than a string (`null`, `yes`,
/// `2012`, `2012-01-01`) are wrapped in double quotes with `\` and `"`
/// escaped.
/// Line breaks are folded into spaces since front matter values are
/// single-line.
pub fn escape_front_matter(s: &str) -> Cow<'_, str> {
    let needs_quotes = s.is_empty()
        || s.contains(FRONT_MATTER_SPECIALS)
        || s.contains(['\n', '\r', '\t'])
        || s.starts_with(['-', '?', ' '])
        || s.ends_with(' ')
        || resolves_to_non_string(s);

    if !needs_quotes {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' | '\t' => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    Cow::Owned(out)
}

fn resolves_to_non_string(s: &str) -> bool {
    if FRONT_MATTER_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(s))
    {
        return true;
    }

    let number = s.replace('_', "");
    if number.parse::<f64>().is_ok() {
        return true;
    }
    let digits = number.trim_start_matches(['+', '-']);
    let radix = [("0x", 16), ("0o", 8), ("0b", 2)]
        .into_iter()
        .find_map(|(prefix, radix)| digits.strip_prefix(prefix).map(|rest| (rest, radix)));
    if let Some((rest, radix)) = radix {
        if !rest.is_empty() && rest.chars().all(|c| c.is_digit(radix)) {
            return true;
        }
    }

    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Builds a URL-safe slug from a title.
///
/// Alphanumeric characters are lowercased and kept; every run of anything
/// else becomes a single `-`. Leading and trailing separators are dropped.
///
/// # Examples
///
/// ```
/// use feedport::util::slugify;
///
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// assert_eq!(slugify("  Rust 1.80 -- released  "), "rust-1-80-released");
/// ```
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;

    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
