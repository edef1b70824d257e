//! URL tokenization: turns a URL string into the [`TokenSequence`] that the
//! prefix tree keys on.
//!
//! Grounded on the host/path splitting in `url_parser`'s `UrlRef::from_str`
//! (manual substring extraction backed by the `url` crate for validation)
//! and on the character-scanning digit-collapsing behavior of the original
//! `tokenize_url_path` scanner. Authority extraction (host, explicit port)
//! is done on the raw string rather than via `Url::port()`, because the
//! `url` crate normalizes away a port that matches its scheme's default —
//! `http://host:80/` would otherwise silently lose the `:80` token.

use crate::token::{Token, TokenSequence};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Hosts whose first path segment is an opaque identifier and must survive
/// tokenization as a single literal token rather than being split char by
/// char (DOIs and handles: `/10.1234/x.y` means nothing split apart).
const IDENTIFIER_HOSTS: &[&str] = &["dx.doi.org", "doi.org", "hdl.handle.net"];

static TRACKING_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^utm_|sess(ion)?id").unwrap());

/// Tokenizes a URL into the sequence a [`crate::tree::PrefTree`] inserts.
///
/// A null or empty URL passes through unchanged, yielding an empty sequence
/// (the tree layer is the one that turns that into a hard error on
/// insertion, since an empty key can never occupy a position in the trie).
/// A scheme-relative URL (`//host/path`) is accepted the same as an
/// absolute one. Scheme and fragment are dropped, session/tracking query
/// parameters are stripped, the host is lowercased and reversed into
/// `.`-prefixed labels (most specific first) with an explicit port kept as
/// its own `:N` token, and the path is tokenized one character at a time
/// with runs of digits collapsed into a single marker token. A URL that
/// can't be parsed at all (no scheme, no scheme-relative marker, or
/// genuinely malformed) degrades to an empty sequence rather than an
/// error — the tokenizer never fails, only the tree does.
pub fn tokenize(url: &str) -> TokenSequence {
    if url.is_empty() {
        return TokenSequence::default();
    }
    let without_fragment = url.split('#').next().unwrap_or("");
    if without_fragment.is_empty() {
        return TokenSequence::default();
    }

    let Ok(parsed) = Url::parse(&parseable_form(without_fragment)) else {
        return TokenSequence::default();
    };
    let host = parsed.host_str().unwrap_or("").to_lowercase();

    let mut tokens = host_tokens(&host);
    if let Some(port) = explicit_port(without_fragment) {
        tokens.push(Token::literal(format!(":{port}")));
    }

    let identifier_host = IDENTIFIER_HOSTS.contains(&host.as_str());
    let rest = path_and_filtered_query(&parsed);
    tokens.extend(tokenize_path(&rest, identifier_host));

    TokenSequence::new(tokens)
}

/// `Url::parse` requires an explicit scheme; a scheme-relative URL only
/// needs one supplied so the authority/path split can happen.
fn parseable_form(raw: &str) -> String {
    if raw.starts_with("//") {
        format!("http:{raw}")
    } else {
        raw.to_string()
    }
}

/// The raw `host[:port]` substring between `//` and the next `/`, `?`, or
/// end of string, read straight off the input rather than through `Url`.
fn authority_str(raw: &str) -> Option<&str> {
    let start = raw.find("//")? + 2;
    let rest = &raw[start..];
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// The literal port digits following the last `:` in the authority, after
/// skipping past a bracketed IPv6 literal if present.
fn explicit_port(raw: &str) -> Option<&str> {
    let authority = authority_str(raw)?;
    let after_host = match authority.rfind(']') {
        Some(close) => &authority[close + 1..],
        None => authority,
    };
    let colon = after_host.rfind(':')?;
    let port = &after_host[colon + 1..];
    (!port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())).then_some(port)
}

/// Splits a lowercased host into `.`-prefixed labels, most specific first:
/// `dissem.in` -> `[".in", ".dissem"]`.
fn host_tokens(host: &str) -> Vec<Token> {
    host.split('.')
        .filter(|label| !label.is_empty())
        .map(|label| Token::literal(format!(".{label}")))
        .rev()
        .collect()
}

/// Reassembles the path with tracking query parameters removed, without
/// reordering or re-serializing whatever parameters survive.
fn path_and_filtered_query(parsed: &Url) -> String {
    let mut out = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| {
                let name = pair.split('=').next().unwrap_or(pair);
                !TRACKING_PARAM.is_match(name)
            })
            .collect();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept.join("&"));
        }
    }
    out
}

/// Per-character path tokenizer: every character is its own [`Token::Literal`]
/// except consecutive digit runs, which collapse to one [`Token::DigitRun`].
/// When `keep_first_segment_literal` is set (DOI/handle hosts), the first
/// `/`-delimited path segment is emitted as a single literal token instead.
fn tokenize_path(path: &str, keep_first_segment_literal: bool) -> Vec<Token> {
    let path = path.to_lowercase();
    let mut chars = path.chars().peekable();
    let mut tokens = Vec::new();

    if keep_first_segment_literal {
        if chars.peek() == Some(&'/') {
            tokens.push(Token::literal("/"));
            chars.next();
        }
        let segment: String = std::iter::from_fn(|| chars.next_if(|&c| c != '/')).collect();
        if !segment.is_empty() {
            tokens.push(Token::literal(segment));
        }
    }

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            while chars.next_if(|d| d.is_ascii_digit()).is_some() {}
            tokens.push(Token::DigitRun);
        } else {
            tokens.push(Token::literal(c.to_string()));
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn literal_strs(seq: &TokenSequence) -> Vec<String> {
        seq.as_slice().iter().map(|t| t.to_string()).collect()
    }

    #[rstest]
    #[case("http://dissem.in/faq", &[".in", ".dissem", "/", "f", "a", "q"])]
    #[case("//gnu.org/?utm_source=twitter&jsessionid=e452fb1", &[".org", ".gnu", "/"])]
    fn tokenizes_simple_path(#[case] url: &str, #[case] expected: &[&str]) {
        let seq = tokenize(url);
        assert_eq!(literal_strs(&seq), expected);
    }

    #[test]
    fn empty_url_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn keeps_explicit_default_port() {
        // 80 is http's default port, which the `url` crate would otherwise
        // normalize away — the literal `:80` written in the URL must survive.
        let seq = tokenize("http://umas.edu:80/abs");
        assert_eq!(
            literal_strs(&seq),
            [".edu", ".umas", ":80", "/", "a", "b", "s"]
        );
    }

    #[test]
    fn no_port_token_when_none_given() {
        let seq = tokenize("http://umas.edu/abs");
        assert!(!literal_strs(&seq).iter().any(|t| t.starts_with(':')));
    }

    #[test]
    fn collapses_digit_runs() {
        let seq = tokenize("http://arxiv.org/pdf/2340.0124");
        let rendered = literal_strs(&seq);
        assert!(rendered.contains(&"<digit>".to_string()));
        assert!(!rendered.iter().any(|t| t == "2" || t == "3"));
    }

    #[test]
    fn strips_tracking_query_params() {
        let a = tokenize("http://example.com/x?utm_source=foo&id=1");
        let b = tokenize("http://example.com/x?id=1");
        assert_eq!(a, b);
    }

    #[test]
    fn keeps_doi_identifier_literal() {
        let seq = tokenize("http://dx.doi.org/10.1234/abc");
        let rendered = literal_strs(&seq);
        assert_eq!(rendered[0], ".org");
        assert_eq!(rendered[1], ".doi");
        assert_eq!(rendered[2], ".dx");
        assert_eq!(rendered[3], "/");
        assert_eq!(rendered[4], "10.1234");
    }

    #[test]
    fn handle_net_identifier_literal() {
        let seq = tokenize("http://hdl.handle.net/1234/5678");
        let rendered = literal_strs(&seq);
        assert!(rendered.contains(&"1234".to_string()));
    }
}
