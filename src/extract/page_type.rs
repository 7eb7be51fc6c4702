use crate::extract::structured::{find_product, open_graph};
use crate::records::PageType;
use crate::template::{generalize_url, guess_page_type};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

static PRODUCT_CARDS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[itemtype*='schema.org/Product'], .product-card, .product-item, li.product")
        .expect("product card selector")
});
static ADD_TO_CART: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("form[action*='cart'] button, button[name='add'], .add-to-cart, #add-to-cart")
        .expect("add to cart selector")
});

/// Guesses the page type of a fetched page
///
/// The URL rule table decides first; DOM markers only classify pages whose
/// URL says nothing.
pub fn guess_page(url: &str, document: Option<&Html>, structured: Option<&Value>) -> PageType {
    let from_url = generalize_url(url)
        .map(|template| guess_page_type(&template))
        .unwrap_or(PageType::Unknown);
    if from_url != PageType::Unknown {
        return from_url;
    }
    guess_from_markers(document, structured).unwrap_or(PageType::Unknown)
}

fn guess_from_markers(document: Option<&Html>, structured: Option<&Value>) -> Option<PageType> {
    if let Some(structured) = structured {
        if find_product(structured).is_some() || open_graph(structured, "og:type") == Some("product") {
            return Some(PageType::ProductDetail);
        }
    }
    let document = document?;
    let cards = document.select(&PRODUCT_CARDS).count();
    if cards > 1 {
        return Some(PageType::ProductListing);
    }
    if cards == 1 || document.select(&ADD_TO_CART).next().is_some() {
        return Some(PageType::ProductDetail);
    }
    None
}
