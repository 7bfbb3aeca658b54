//! `List-Unsubscribe` header parsing (RFC 2369).
//!
//! The header carries a comma separated list of URIs in angle brackets, e.g.
//! `<mailto:leave@example.com?subject=unsubscribe>, <https://example.com/u/123>`.
//! Only `http`, `https` and `mailto` URIs are kept.

use serde::{Deserialize, Serialize};
use url::Url;

/// How an unsubscribe link is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Web endpoint (GET or one-click POST).
    Http,
    /// Email to a list manager.
    Mailto,
}

/// A single unsubscribe target extracted from a header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnsubscribeLink {
    pub kind: LinkKind,
    pub url: String,
}

/// Parses a `List-Unsubscribe` header value.
///
/// Malformed entries and unsupported schemes are skipped. Duplicates are
/// dropped and header order is preserved.
pub fn parse_list_unsubscribe(header: &str) -> Vec<UnsubscribeLink> {
    let candidates: Vec<&str> = if header.contains('<') {
        header
            .split('<')
            .skip(1)
            .filter_map(|part| part.split_once('>').map(|(uri, _)| uri))
            .collect()
    } else {
        header.split(',').collect()
    };

    let mut links: Vec<UnsubscribeLink> = Vec::new();
    for candidate in candidates {
        let Some(link) = parse_candidate(candidate) else {
            continue;
        };
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

fn parse_candidate(raw: &str) -> Option<UnsubscribeLink> {
    // Folded headers may leave whitespace inside the brackets.
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }

    let url = Url::parse(&cleaned).ok()?;
    let kind = match url.scheme() {
        "http" | "https" => {
            url.host_str()?;
            LinkKind::Http
        }
        "mailto" => {
            if url.path().is_empty() {
                return None;
            }
            LinkKind::Mailto
        }
        _ => return None,
    };

    Some(UnsubscribeLink {
        kind,
        url: url.to_string(),
    })
}

/// Picks the link to try first: HTTP before mailto.
pub fn preferred_link(links: &[UnsubscribeLink]) -> Option<&UnsubscribeLink> {
    links
        .iter()
        .find(|link| link.kind == LinkKind::Http)
        .or_else(|| links.first())
}

/// Encodes links for the `unsubscribe_links` JSON column.
pub fn links_to_json(links: &[UnsubscribeLink]) -> serde_json::Value {
    serde_json::Value::Array(
        links
            .iter()
            .map(|link| {
                serde_json::json!({
                    "kind": link.kind,
                    "url": link.url,
                })
            })
            .collect(),
    )
}

/// Decodes links from the `unsubscribe_links` JSON column.
///
/// Non-array values decode to nothing; entries of the wrong shape are skipped.
pub fn links_from_json(value: &serde_json::Value) -> Vec<UnsubscribeLink> {
    match value {
        serde_json::Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_bracketed_list() {
        let links = parse_list_unsubscribe(
            "<mailto:leave@lists.example.com?subject=unsubscribe>, <https://example.com/u/123>",
        );

        assert_eq!(
            links,
            vec![
                UnsubscribeLink {
                    kind: LinkKind::Mailto,
                    url: "mailto:leave@lists.example.com?subject=unsubscribe".to_string(),
                },
                UnsubscribeLink {
                    kind: LinkKind::Http,
                    url: "https://example.com/u/123".to_string(),
                },
            ]
        );
    }

    #[test]
    fn skips_unsupported_and_malformed_entries() {
        let links = parse_list_unsubscribe(
            "<ftp://example.com/x>, <not a url>, <https://ok.example.com/>, <mailto:>",
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://ok.example.com/");
    }

    #[test]
    fn drops_duplicates_and_folded_whitespace() {
        let links = parse_list_unsubscribe(
            "<https://example.com/u/1>,\r\n <https://example.com/\r\n u/1>",
        );
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn accepts_unbracketed_values() {
        let links = parse_list_unsubscribe("https://example.com/u, mailto:x@example.com");
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn empty_header_yields_nothing() {
        assert!(parse_list_unsubscribe("").is_empty());
        assert!(parse_list_unsubscribe("   ").is_empty());
    }

    #[test]
    fn prefers_http() {
        let links = parse_list_unsubscribe("<mailto:x@example.com>, <https://example.com/u>");
        assert_eq!(preferred_link(&links).unwrap().kind, LinkKind::Http);

        let mail_only = parse_list_unsubscribe("<mailto:x@example.com>");
        assert_eq!(preferred_link(&mail_only).unwrap().kind, LinkKind::Mailto);

        assert!(preferred_link(&[]).is_none());
    }

    #[test]
    fn json_conversion() {
        let links = parse_list_unsubscribe("<https://example.com/u>, <mailto:x@example.com>");
        let json = links_to_json(&links);

        assert_eq!(json[0]["kind"], "http");
        assert_eq!(json[1]["kind"], "mailto");
        assert_eq!(links_from_json(&json), links);
    }

    #[test]
    fn json_decoding_skips_foreign_shapes() {
        let value = serde_json::json!([
            {"kind": "http", "url": "https://example.com/u"},
            {"unexpected": true},
            "https://bare.example.com"
        ]);
        assert_eq!(links_from_json(&value).len(), 1);
        assert!(links_from_json(&serde_json::json!({"kind": "http"})).is_empty());
    }
}
