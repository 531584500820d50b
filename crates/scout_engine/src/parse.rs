use scout_core::ListingRecord;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid {field} selector {selector:?}: {message}")]
    InvalidSelector {
        field: &'static str,
        selector: String,
        message: String,
    },
    #[error("found {cards} listing cards but none had a title")]
    NoUsableCards { cards: usize },
}

/// Turns a result page into listing records.
pub trait ListingParser: Send + Sync {
    fn parse(&self, html: &str, page_url: &Url) -> Result<Vec<ListingRecord>, ParseError>;
}

/// CSS selectors for one listing card and its fields, relative to the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    pub card: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub snippet: String,
    pub link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            card: "div.base-search-card, div.job-search-card".to_string(),
            title: ".base-search-card__title".to_string(),
            company: ".base-search-card__subtitle".to_string(),
            location: ".job-search-card__location".to_string(),
            snippet: ".job-search-card__snippet".to_string(),
            link: "a.base-card__full-link, a[href]".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectorListingParser {
    card: Selector,
    title: Selector,
    company: Selector,
    location: Selector,
    snippet: Selector,
    link: Selector,
}

impl SelectorListingParser {
    pub fn new(selectors: &ListingSelectors) -> Result<Self, ParseError> {
        Ok(Self {
            card: compile("card", &selectors.card)?,
            title: compile("title", &selectors.title)?,
            company: compile("company", &selectors.company)?,
            location: compile("location", &selectors.location)?,
            snippet: compile("snippet", &selectors.snippet)?,
            link: compile("link", &selectors.link)?,
        })
    }

    fn parse_card(&self, card: ElementRef, page_url: &Url) -> Option<ListingRecord> {
        let title = first_text(card, &self.title)?;
        let link = card
            .select(&self.link)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| resolve_link(href, page_url))
            .unwrap_or_default();
        Some(ListingRecord::new(
            title,
            first_text(card, &self.company).unwrap_or_default(),
            first_text(card, &self.location).unwrap_or_default(),
            first_text(card, &self.snippet).unwrap_or_default(),
            link,
        ))
    }
}

impl ListingParser for SelectorListingParser {
    fn parse(&self, html: &str, page_url: &Url) -> Result<Vec<ListingRecord>, ParseError> {
        let document = Html::parse_document(html);
        let cards: Vec<_> = document.select(&self.card).collect();
        let records: Vec<_> = cards
            .iter()
            .filter_map(|card| self.parse_card(*card, page_url))
            .collect();
        if records.is_empty() && !cards.is_empty() {
            return Err(ParseError::NoUsableCards { cards: cards.len() });
        }
        Ok(records)
    }
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|err| ParseError::InvalidSelector {
        field,
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

fn first_text(card: ElementRef, selector: &Selector) -> Option<String> {
    card.select(selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let trimmed = href.trim();
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.is_empty() || lower.starts_with('#') || lower.starts_with("javascript:") {
        return None;
    }
    base.join(trimmed).ok().map(String::from)
}
