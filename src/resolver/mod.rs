//! Turning parsed items into durable articles, and diffing them against
//! what is already stored.
//!
//! Feeds routinely resend every item on every fetch. The resolver keeps
//! those refetches cheap: an unchanged item produces no change set, and
//! a changed one produces a diff naming only the columns to rewrite.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Article, ArticleStatus, ChangeSet, ParsedItem};

/// Upper bound for believable item dates. Feeds with broken clocks or
/// placeholder dates routinely claim publication far in the future;
/// a day of slack covers legitimate timezone skew.
pub fn max_allowed_date(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(24)
}

/// Build the durable article for a parsed item.
///
/// Dates after `cutoff` are treated as absent. `status` is the already
/// ensured status row for this article id.
pub fn resolve_article(
    item: &ParsedItem,
    account_id: &str,
    feed_id: &str,
    status: ArticleStatus,
    cutoff: DateTime<Utc>,
) -> Article {
    let article_id = item.article_id(feed_id);
    Article {
        account_id: account_id.to_string(),
        article_id,
        feed_id: feed_id.to_string(),
        unique_id: item.unique_id.clone(),
        title: item.title.clone(),
        content_html: item.content_html.clone(),
        content_text: item.content_text.clone(),
        url: item.url.clone(),
        external_url: item.external_url.clone(),
        summary: item.summary.clone(),
        image_url: item.image_url.clone(),
        banner_image_url: item.banner_image_url.clone(),
        date_published: validated_date(item.date_published, cutoff),
        date_modified: validated_date(item.date_modified, cutoff),
        authors: item
            .authors
            .iter()
            .filter(|author| !author.is_empty())
            .cloned()
            .collect(),
        tags: item.tags.clone(),
        status,
    }
}

fn validated_date(
    date: Option<DateTime<Utc>>,
    cutoff: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    date.filter(|date| *date <= cutoff)
}

/// Diff `incoming` against `existing`. Returns `None` when nothing
/// changed.
///
/// String fields record the new value, with a cleared field recorded as
/// the empty string. Date fields are write-only: a feed that stops
/// sending a date it used to send does not erase the stored one.
pub fn changes(existing: &Article, incoming: &Article) -> Option<ChangeSet> {
    let mut set = ChangeSet::default();

    string_change(&unique_id_opt(existing), &unique_id_opt(incoming), &mut set.unique_id);
    string_change(&existing.title, &incoming.title, &mut set.title);
    string_change(&existing.content_html, &incoming.content_html, &mut set.content_html);
    string_change(&existing.content_text, &incoming.content_text, &mut set.content_text);
    string_change(&existing.url, &incoming.url, &mut set.url);
    string_change(&existing.external_url, &incoming.external_url, &mut set.external_url);
    string_change(&existing.summary, &incoming.summary, &mut set.summary);
    string_change(&existing.image_url, &incoming.image_url, &mut set.image_url);
    string_change(
        &existing.banner_image_url,
        &incoming.banner_image_url,
        &mut set.banner_image_url,
    );
    date_change(existing.date_published, incoming.date_published, &mut set.date_published);
    date_change(existing.date_modified, incoming.date_modified, &mut set.date_modified);

    if set.is_empty() {
        None
    } else {
        Some(set)
    }
}

fn string_change(existing: &Option<String>, incoming: &Option<String>, slot: &mut Option<String>) {
    if existing != incoming {
        *slot = Some(incoming.clone().unwrap_or_default());
    }
}

fn date_change(
    existing: Option<DateTime<Utc>>,
    incoming: Option<DateTime<Utc>>,
    slot: &mut Option<DateTime<Utc>>,
) {
    if let Some(incoming) = incoming {
        if existing != Some(incoming) {
            *slot = Some(incoming);
        }
    }
}

fn unique_id_opt(article: &Article) -> Option<String> {
    if article.unique_id.is_empty() {
        None
    } else {
        Some(article.unique_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(unique_id: &str) -> ParsedItem {
        let mut item = ParsedItem::new("https://example.com/feed.xml", unique_id);
        item.title = Some("Title".into());
        item.content_html = Some("<p>Body</p>".into());
        item
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap()
    }

    fn status(article_id: &str) -> ArticleStatus {
        ArticleStatus::new(article_id.into(), false, now())
    }

    fn resolve(item: &ParsedItem) -> Article {
        let article_id = item.article_id("feed-1");
        resolve_article(item, "acct", "feed-1", status(&article_id), max_allowed_date(now()))
    }

    #[test]
    fn test_resolves_identity_and_fields() {
        let parsed = item("entry-1");
        let article = resolve(&parsed);
        assert_eq!(article.article_id, parsed.article_id("feed-1"));
        assert_eq!(article.feed_id, "feed-1");
        assert_eq!(article.title, Some("Title".into()));
        assert_eq!(article.content_html, Some("<p>Body</p>".into()));
    }

    #[test]
    fn test_future_dates_rejected() {
        let mut parsed = item("entry-1");
        parsed.date_published = Some(now() + Duration::hours(25));
        parsed.date_modified = Some(now() + Duration::hours(2));
        let article = resolve(&parsed);
        assert_eq!(article.date_published, None);
        // Inside the one-day window: believable.
        assert_eq!(article.date_modified, Some(now() + Duration::hours(2)));
    }

    #[test]
    fn test_empty_authors_filtered() {
        let mut parsed = item("entry-1");
        parsed.authors.push(Default::default());
        parsed.authors.push(crate::domain::ParsedAuthor {
            name: Some("Real".into()),
            ..Default::default()
        });
        let article = resolve(&parsed);
        assert_eq!(article.authors.len(), 1);
    }

    #[test]
    fn test_no_changes_for_identical_articles() {
        let parsed = item("entry-1");
        let existing = resolve(&parsed);
        let incoming = resolve(&parsed);
        assert_eq!(changes(&existing, &incoming), None);
    }

    #[test]
    fn test_title_change_only_names_title() {
        let parsed = item("entry-1");
        let existing = resolve(&parsed);
        let mut updated = parsed.clone();
        updated.title = Some("Better title".into());
        let incoming = resolve(&updated);

        let set = changes(&existing, &incoming).unwrap();
        assert_eq!(set.title, Some("Better title".into()));
        assert_eq!(set.content_html, None);
        assert_eq!(set.url, None);
    }

    #[test]
    fn test_cleared_string_recorded_as_empty() {
        let mut parsed = item("entry-1");
        parsed.summary = Some("A summary".into());
        let existing = resolve(&parsed);

        let mut updated = parsed.clone();
        updated.summary = None;
        let incoming = resolve(&updated);

        let set = changes(&existing, &incoming).unwrap();
        assert_eq!(set.summary, Some(String::new()));
    }

    #[test]
    fn test_dates_never_regress_to_none() {
        let mut parsed = item("entry-1");
        parsed.date_published = Some(now() - Duration::days(3));
        let existing = resolve(&parsed);

        let mut updated = parsed.clone();
        updated.date_published = None;
        let incoming = resolve(&updated);

        // The dropped date is not a change.
        assert_eq!(changes(&existing, &incoming), None);
    }

    #[test]
    fn test_date_update_recorded() {
        let mut parsed = item("entry-1");
        parsed.date_published = Some(now() - Duration::days(3));
        let existing = resolve(&parsed);

        let mut updated = parsed.clone();
        updated.date_published = Some(now() - Duration::days(1));
        let incoming = resolve(&updated);

        let set = changes(&existing, &incoming).unwrap();
        assert_eq!(set.date_published, Some(now() - Duration::days(1)));
    }
}
