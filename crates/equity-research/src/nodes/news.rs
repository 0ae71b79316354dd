//! News fetching and rendering shared by the headline, industry and peer nodes

use crate::error::TransientTaskError;
use crate::sources::{DataSource, FetchQuery, NewsArticle, NewsTopic, decode};

/// Summary characters kept per article in a prompt
const SUMMARY_CHARS: usize = 280;

pub(crate) async fn fetch(
    source: &dyn DataSource,
    symbol: &str,
    topic: NewsTopic,
    days: u32,
) -> Result<Vec<NewsArticle>, TransientTaskError> {
    let query = FetchQuery::News {
        symbol: symbol.to_string(),
        topic,
        days,
    };
    let payload = source.fetch(&query).await?;
    Ok(decode(source.name(), payload)?)
}

/// One numbered block per article, with the citation the model must reuse
pub(crate) fn render(articles: &[NewsArticle]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(i, article)| {
            let mut block = format!("{}. {} ({}, {})", i + 1, article.headline, article.source, article.published);
            if let Some(related) = &article.related {
                block.push_str(&format!(" [{related}]"));
            }
            let summary = article.summary.trim();
            if !summary.is_empty() {
                block.push_str("\n   ");
                block.extend(summary.chars().take(SUMMARY_CHARS));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}
