use std::collections::HashSet;

use regex::Regex;

use crate::models::{CapturedItem, Item};

/// Decides whether a comment body contains the pattern we are collecting.
pub trait BodyPredicate: Send + Sync {
    fn matches(&self, body: &str) -> bool;
}

impl BodyPredicate for Regex {
    fn matches(&self, body: &str) -> bool {
        self.is_match(body)
    }
}

impl<F> BodyPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, body: &str) -> bool {
        self(body)
    }
}

/// Body predicate plus the author and community exclusions.
pub struct Matcher {
    predicate: Box<dyn BodyPredicate>,
    excluded_authors: HashSet<String>,
    excluded_origins: HashSet<String>,
}

impl Matcher {
    pub fn new(
        predicate: impl BodyPredicate + 'static,
        excluded_authors: &[String],
        excluded_origins: &[String],
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            excluded_authors: lowercase_set(excluded_authors),
            excluded_origins: lowercase_set(excluded_origins),
        }
    }

    /// Returns the record to store for `item`, or `None` if it is filtered out.
    ///
    /// Items with no author or body (deleted or removed content) are skipped.
    pub fn capture(&self, item: &Item) -> Option<CapturedItem> {
        let author = item.author.as_deref()?;
        let body = item.body.as_deref()?;

        if self.excluded_authors.contains(&author.to_lowercase())
            || self.excluded_origins.contains(&item.origin.to_lowercase())
            || !self.predicate.matches(body)
        {
            return None;
        }

        CapturedItem::from_item(item)
    }
}

fn lowercase_set(names: &[String]) -> HashSet<String> {
    names.iter().map(|n| n.to_lowercase()).collect()
}
