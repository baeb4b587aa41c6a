//! Relation kinds and work-item id extraction from relation URLs.
//!
//! Relation URLs look like
//! `http://server/tfs/DefaultCollection/_apis/wit/workItems/42`. The id is
//! the path segment right after the last `workItems` segment. The marker is
//! case-sensitive, so a collection named `workitems` does not confuse it.

use url::Url;

/// Path segment that precedes the id in a work-item resource URL.
pub const WORK_ITEMS_MARKER: &str = "workItems";

/// The fixed set of link kinds this layer creates and traverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Hierarchy-Reverse: the destination becomes the parent.
    Parent,
    /// Hierarchy-Forward: the destination becomes a child.
    Child,
    /// Affects-Forward.
    Affects,
    /// Affects-Reverse.
    AffectedBy,
}

impl LinkKind {
    /// Full reference name of the relation type.
    pub fn rel(self) -> &'static str {
        match self {
            LinkKind::Parent => "System.LinkTypes.Hierarchy-Reverse",
            LinkKind::Child => "System.LinkTypes.Hierarchy-Forward",
            LinkKind::Affects => "Microsoft.VSTS.Common.Affects-Forward",
            LinkKind::AffectedBy => "Microsoft.VSTS.Common.Affects-Reverse",
        }
    }

    /// Category suffix used when enumerating relations.
    pub fn category(self) -> &'static str {
        match self {
            LinkKind::Parent => "Hierarchy-Reverse",
            LinkKind::Child => "Hierarchy-Forward",
            LinkKind::Affects => "Affects-Forward",
            LinkKind::AffectedBy => "Affects-Reverse",
        }
    }

    pub fn matches(self, rel: &str) -> bool {
        rel.ends_with(self.category())
    }
}

/// Extract the work-item id from a relation URL.
///
/// Absolute URLs are split into path segments and the id is the segment
/// after the last `workItems` one. Anything else falls back to a substring
/// search for `workItems/`, which must sit past the first two characters.
/// Returns `None` when there is no marker or the id is not an integer.
pub fn parse_item_id(url: &str) -> Option<i64> {
    match Url::parse(url) {
        Ok(parsed) if !parsed.cannot_be_a_base() => {
            let segments: Vec<&str> = parsed.path_segments()?.collect();
            let marker = segments.iter().rposition(|s| *s == WORK_ITEMS_MARKER)?;
            segments.get(marker + 1)?.parse().ok()
        }
        _ => id_after_marker(url),
    }
}

fn id_after_marker(url: &str) -> Option<i64> {
    let needle = format!("{WORK_ITEMS_MARKER}/");
    let at = url.rfind(&needle).filter(|at| *at > 1)?;
    let rest = &url[at + needle.len()..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Lenient form of [`parse_item_id`]: malformed URLs yield `0`.
///
/// Real ids start at 1, so `0` never collides with an existing item.
pub fn item_id_or_zero(url: &str) -> i64 {
    parse_item_id(url).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_id() {
        assert_eq!(
            parse_item_id("http://tfs:8080/tfs/DefaultCollection/_apis/wit/workItems/42"),
            Some(42)
        );
    }

    #[test]
    fn trailing_slash_and_query_are_ignored() {
        assert_eq!(parse_item_id("https://dev.azure.com/org/_apis/wit/workItems/9/?x=1"), Some(9));
    }

    #[test]
    fn marker_is_case_sensitive() {
        assert_eq!(item_id_or_zero("http://tfs/c/_apis/wit/workitems/5"), 0);
    }

    #[test]
    fn collection_named_like_the_marker() {
        assert_eq!(
            item_id_or_zero("http://tfs:8080/tfs/workitems/_apis/wit/workItems/42"),
            42
        );
        assert_eq!(parse_item_id("http://tfs/workItems/_apis/wit/workItems/7"), Some(7));
    }

    #[test]
    fn relative_url_with_marker_past_start() {
        assert_eq!(item_id_or_zero("tfs/_apis/wit/workItems/42"), 42);
        assert_eq!(parse_item_id("tfs/_apis/wit/workItems/42?x=1"), Some(42));
    }

    #[test]
    fn missing_marker_degrades_to_zero() {
        assert_eq!(item_id_or_zero("http://tfs/c/_apis/wit/attachments/abc"), 0);
    }

    #[test]
    fn marker_at_start_degrades_to_zero() {
        assert_eq!(item_id_or_zero("workItems/42"), 0);
        assert_eq!(item_id_or_zero("/workItems/42"), 0);
    }

    #[test]
    fn non_numeric_segment_degrades_to_zero() {
        assert_eq!(item_id_or_zero("http://tfs/c/_apis/wit/workItems/latest"), 0);
    }

    #[test]
    fn marker_as_last_segment_degrades_to_zero() {
        assert_eq!(item_id_or_zero("http://tfs/c/_apis/wit/workItems"), 0);
    }

    #[test]
    fn kinds_match_their_category_only() {
        assert!(LinkKind::Child.matches("System.LinkTypes.Hierarchy-Forward"));
        assert!(!LinkKind::Child.matches("System.LinkTypes.Hierarchy-Reverse"));
        assert!(LinkKind::AffectedBy.matches(LinkKind::AffectedBy.rel()));
        assert!(!LinkKind::Affects.matches("System.LinkTypes.Related"));
    }
}
