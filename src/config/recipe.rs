//! Typed extraction recipe
//!
//! A recipe maps page types and URL templates to an ordered list of field
//! rules. Every CSS selector and JSON path is compiled when the recipe is
//! loaded, so a malformed recipe fails before any network work starts.

use crate::extract::json::JsonPath;
use crate::records::PageType;
use crate::ConfigError;
use scraper::Selector;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// How a field's raw value is turned into an extracted value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Collapsed element text (falls back to the `content` attribute)
    #[default]
    Text,
    /// Numeric price parsed from text or `content`
    Price,
    /// `src` / `data-src` of every matched image
    Images,
    /// A named attribute of the first matching element
    Attr,
    /// Inner HTML of the first matching element
    Html,
    /// Text of every matching element (e.g. breadcrumbs)
    List,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FieldSpec {
    name: String,
    #[serde(default)]
    kind: FieldKind,
    #[serde(default)]
    selectors: Vec<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    attr: Option<String>,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FieldSetSpec {
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RecipeSpec {
    render: bool,
    page_types: BTreeMap<String, FieldSetSpec>,
    templates: BTreeMap<String, FieldSetSpec>,
}

/// A compiled field rule with its ordered candidates
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    pub selectors: Vec<Selector>,
    pub paths: Vec<JsonPath>,
    pub attr: Option<String>,
    pub required: bool,
}

/// The fields extracted for one page type or template
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    pub fields: Vec<FieldRule>,
}

impl FieldSet {
    /// Fields that take part in the coverage gate
    ///
    /// Required fields when any are marked, otherwise every field.
    pub fn gated_fields(&self) -> Vec<&FieldRule> {
        let required: Vec<&FieldRule> = self.fields.iter().filter(|f| f.required).collect();
        if required.is_empty() {
            self.fields.iter().collect()
        } else {
            required
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// A validated extraction recipe
#[derive(Debug, Clone)]
pub struct Recipe {
    /// The target pages need script rendering
    pub render: bool,
    page_types: BTreeMap<PageType, FieldSet>,
    templates: BTreeMap<String, FieldSet>,
}

impl Recipe {
    /// Loads a recipe from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads the recipe at `path` if it exists, the built-in recipe otherwise
    pub fn load_or_builtin(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            tracing::info!("Loading extraction recipe from {}", path.display());
            Self::load(path)
        } else {
            tracing::info!("No recipe at {}, using built-in recipe", path.display());
            Ok(Self::builtin())
        }
    }

    /// Parses and compiles a recipe from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let spec: RecipeSpec = toml::from_str(content)?;

        let mut page_types = BTreeMap::new();
        for (key, set) in spec.page_types {
            let page_type: PageType = key
                .parse()
                .map_err(|e: String| ConfigError::Validation(e))?;
            page_types.insert(page_type, compile_set(set)?);
        }

        let mut templates = BTreeMap::new();
        for (pattern, set) in spec.templates {
            if !pattern.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "template pattern '{}' must start with '/'",
                    pattern
                )));
            }
            templates.insert(pattern, compile_set(set)?);
        }

        Ok(Self {
            render: spec.render,
            page_types,
            templates,
        })
    }

    /// The recipe used when none is configured
    pub fn builtin() -> Self {
        // The literals below are known-good selectors and paths.
        match Self::from_toml_str(BUILTIN_RECIPE) {
            Ok(recipe) => recipe,
            Err(e) => unreachable!("built-in recipe is invalid: {}", e),
        }
    }

    /// Picks the field set for a page
    ///
    /// A template-specific set wins, then the page type's set, then the
    /// product detail set.
    pub fn field_set(&self, template: Option<&str>, page_type: PageType) -> &FieldSet {
        if let Some(set) = template.and_then(|t| self.templates.get(t)) {
            return set;
        }
        self.page_types
            .get(&page_type)
            .or_else(|| self.page_types.get(&PageType::ProductDetail))
            .unwrap_or(&EMPTY_SET)
    }

    pub fn has_template(&self, pattern: &str) -> bool {
        self.templates.contains_key(pattern)
    }
}

static EMPTY_SET: FieldSet = FieldSet { fields: Vec::new() };

fn compile_set(spec: FieldSetSpec) -> Result<FieldSet, ConfigError> {
    let mut fields = Vec::with_capacity(spec.fields.len());
    for field in spec.fields {
        fields.push(compile_field(field)?);
    }
    Ok(FieldSet { fields })
}

fn compile_field(spec: FieldSpec) -> Result<FieldRule, ConfigError> {
    if spec.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "recipe field name cannot be empty".to_string(),
        ));
    }
    if spec.selectors.is_empty() && spec.paths.is_empty() {
        return Err(ConfigError::Validation(format!(
            "field '{}' needs at least one selector or path",
            spec.name
        )));
    }
    if spec.kind == FieldKind::Attr && spec.attr.is_none() {
        return Err(ConfigError::Validation(format!(
            "field '{}' has kind 'attr' but no attr name",
            spec.name
        )));
    }

    let mut selectors = Vec::with_capacity(spec.selectors.len());
    for raw in &spec.selectors {
        let selector = Selector::parse(raw).map_err(|_| ConfigError::InvalidSelector {
            field: spec.name.clone(),
            selector: raw.clone(),
        })?;
        selectors.push(selector);
    }

    let mut paths = Vec::with_capacity(spec.paths.len());
    for raw in &spec.paths {
        let path = JsonPath::parse(raw).map_err(|reason| ConfigError::InvalidPath {
            field: spec.name.clone(),
            path: raw.clone(),
            reason,
        })?;
        paths.push(path);
    }

    Ok(FieldRule {
        name: spec.name,
        kind: spec.kind,
        selectors,
        paths,
        attr: spec.attr,
        required: spec.required,
    })
}

const BUILTIN_RECIPE: &str = r##"
render = false

[page-types.product_detail]
fields = [
    { name = "title", required = true, selectors = ["h1", "[itemprop='name']", "meta[property='og:title']", "title"], paths = ["name", "title", "product.name", "product.title", "data.product.name"] },
    { name = "price", kind = "price", required = true, selectors = ["[itemprop='price']", "meta[property='product:price:amount']", ".price", "[class*='price']"], paths = ["price", "offers.price", "product.price", "data.product.price", "variants[0].price"] },
    { name = "description", selectors = ["[itemprop='description']", ".product-description", "#description", "meta[name='description']"], paths = ["description", "product.description", "body_html"] },
    { name = "images", kind = "images", selectors = ["[itemprop='image']", ".product-image img", ".gallery img", "meta[property='og:image']"], paths = ["images", "image", "product.images", "media"] },
    { name = "sku", selectors = ["[itemprop='sku']", ".sku"], paths = ["sku", "id", "product.sku", "variants[0].sku"] },
    { name = "brand", selectors = ["[itemprop='brand']", ".brand"], paths = ["brand", "brand.name", "vendor", "product.brand"] },
    { name = "availability", selectors = ["[itemprop='availability']", ".availability", ".stock"], paths = ["availability", "offers.availability", "available", "stock_status"] },
    { name = "category", kind = "list", selectors = [".breadcrumb a", "nav.breadcrumbs a", "[itemprop='itemListElement'] [itemprop='name']"], paths = ["category", "product_type", "categories"] },
    { name = "rating", selectors = ["[itemprop='ratingValue']", ".rating"], paths = ["rating", "aggregateRating.ratingValue", "reviews.average"] },
    { name = "reviews_count", selectors = ["[itemprop='reviewCount']", ".review-count"], paths = ["reviews_count", "aggregateRating.reviewCount", "reviews.count"] },
]

[page-types.product_listing]
fields = [
    { name = "title", required = true, selectors = ["h1", "title"], paths = ["title", "name"] },
    { name = "description", selectors = ["meta[name='description']"], paths = ["description"] },
]
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_recipe_compiles() {
        let recipe = Recipe::builtin();
        let set = recipe.field_set(None, PageType::ProductDetail);
        assert!(set.fields.iter().any(|f| f.name == "price"));
        let gated: Vec<&str> = set.gated_fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(gated, vec!["title", "price"]);
    }

    #[test]
    fn test_template_set_wins_over_page_type() {
        let recipe = Recipe::from_toml_str(
            r#"
[page-types.product_detail]
fields = [{ name = "title", selectors = ["h1"] }]

[templates."/item/{id}"]
fields = [{ name = "name", selectors = [".name"] }]
"#,
        )
        .unwrap();

        let set = recipe.field_set(Some("/item/{id}"), PageType::ProductDetail);
        assert_eq!(set.field_names(), vec!["name".to_string()]);
        let set = recipe.field_set(Some("/other"), PageType::ProductDetail);
        assert_eq!(set.field_names(), vec!["title".to_string()]);
    }

    #[test]
    fn test_unknown_page_type_falls_back_to_detail() {
        let recipe = Recipe::builtin();
        let set = recipe.field_set(None, PageType::SearchResults);
        assert!(set.fields.iter().any(|f| f.name == "price"));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let result = Recipe::from_toml_str(
            r#"
[page-types.product_detail]
fields = [{ name = "title", selectors = ["h1[[["] }]
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_invalid_path_rejected() {
        let result = Recipe::from_toml_str(
            r#"
[page-types.product_detail]
fields = [{ name = "price", paths = ["offers[x].price"] }]
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidPath { .. })));
    }

    #[test]
    fn test_field_without_candidates_rejected() {
        let result = Recipe::from_toml_str(
            r#"
[page-types.product_detail]
fields = [{ name = "title" }]
"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_page_type_key_rejected() {
        let result = Recipe::from_toml_str(
            r#"
[page-types.landing]
fields = [{ name = "title", selectors = ["h1"] }]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_attr_kind_requires_attr_name() {
        let result = Recipe::from_toml_str(
            r#"
[page-types.product_detail]
fields = [{ name = "sku", kind = "attr", selectors = ["[data-sku]"] }]
"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
