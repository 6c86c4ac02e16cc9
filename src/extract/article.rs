//! Article content extraction
//!
//! Article pages are ordinary HTML. The title comes from the page's article
//! heading (falling back to `<title>`), the body from the text of the
//! configured content selector, preserving document order.

use crate::extract::{Extraction, ParseError};
use crate::state::Record;
use scraper::{Html, Selector};

/// Extractor for one article content page
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    pub account: String,
    pub content_selector: String,
}

impl ArticleExtractor {
    /// Extracts the article's title and body text into a single record
    pub fn extract(&self, url: &str, body: &str) -> Result<Extraction, ParseError> {
        let selector = Selector::parse(&self.content_selector)
            .map_err(|_| ParseError::Selector(self.content_selector.clone()))?;

        let document = Html::parse_document(body);

        let title = extract_title(&document)
            .ok_or(ParseError::MissingField("title"))?;

        let mut paragraphs = Vec::new();
        for element in document.select(&selector) {
            let text = element.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                paragraphs.push(text.to_string());
            }
        }

        if paragraphs.is_empty() {
            return Err(ParseError::EmptyDocument);
        }

        let record = Record::new(
            self.account.clone(),
            title,
            url.to_string(),
            None,
            Some(paragraphs.join("\n")),
        );

        Ok(Extraction {
            records: vec![record],
            discovered: Vec::new(),
        })
    }
}

/// Pulls the article title from the heading the platform renders, with
/// `<title>` as fallback
fn extract_title(document: &Html) -> Option<String> {
    for css in ["#activity-name", "h1.rich_media_title", "title"] {
        let selector = Selector::parse(css).ok()?;
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ArticleExtractor {
        ArticleExtractor {
            account: "daily-news".to_string(),
            content_selector: "p".to_string(),
        }
    }

    const ARTICLE_URL: &str = "https://mp.weixin.qq.com/s/abc123";

    #[test]
    fn test_extract_article() {
        let html = r#"<html><head><title>Fallback</title></head><body>
            <h1 class="rich_media_title" id="activity-name"> The Headline </h1>
            <p>First paragraph.</p>
            <p>  </p>
            <p>Second paragraph.</p>
        </body></html>"#;

        let extraction = extractor().extract(ARTICLE_URL, html).unwrap();
        assert_eq!(extraction.records.len(), 1);
        assert!(extraction.discovered.is_empty());

        let record = &extraction.records[0];
        assert_eq!(record.title, "The Headline");
        assert_eq!(record.url, ARTICLE_URL);
        assert_eq!(
            record.body.as_deref(),
            Some("First paragraph.\nSecond paragraph.")
        );
    }

    #[test]
    fn test_extract_title_fallback() {
        let html = r#"<html><head><title>Only Title</title></head><body>
            <p>Body text.</p>
        </body></html>"#;

        let extraction = extractor().extract(ARTICLE_URL, html).unwrap();
        assert_eq!(extraction.records[0].title, "Only Title");
    }

    #[test]
    fn test_extract_no_title() {
        let html = r#"<html><body><p>Text without any title.</p></body></html>"#;
        assert!(matches!(
            extractor().extract(ARTICLE_URL, html).unwrap_err(),
            ParseError::MissingField("title")
        ));
    }

    #[test]
    fn test_extract_empty_body() {
        let html = r#"<html><head><title>Title</title></head><body>
            <div>Not a paragraph.</div>
        </body></html>"#;
        assert!(matches!(
            extractor().extract(ARTICLE_URL, html).unwrap_err(),
            ParseError::EmptyDocument
        ));
    }

    #[test]
    fn test_extract_invalid_selector() {
        let bad = ArticleExtractor {
            account: "a".to_string(),
            content_selector: ":::".to_string(),
        };
        let html = r#"<html><head><title>T</title></head><body><p>x</p></body></html>"#;
        assert!(matches!(
            bad.extract(ARTICLE_URL, html).unwrap_err(),
            ParseError::Selector(_)
        ));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let html = r#"<html><head><title>T</title></head><body>
            <p>alpha</p><p>beta</p>
        </body></html>"#;

        let first = extractor().extract(ARTICLE_URL, html).unwrap();
        let second = extractor().extract(ARTICLE_URL, html).unwrap();
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn test_custom_selector() {
        let custom = ArticleExtractor {
            account: "a".to_string(),
            content_selector: "section span".to_string(),
        };
        let html = r#"<html><head><title>T</title></head><body>
            <section><span>inside</span></section>
            <p>ignored</p>
        </body></html>"#;

        let extraction = custom.extract(ARTICLE_URL, html).unwrap();
        assert_eq!(extraction.records[0].body.as_deref(), Some("inside"));
    }
}
