//! Declarative extraction rules and their compiled form.
//!
//! A target names one `item` selector and a [`FieldRule`] per field. Rules
//! compile once per run; an invalid selector is a [`ConfigError`] raised
//! before anything is fetched.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{item::truncate_chars, page::RawPage, ScrapedItem};

/// Item fields a rule can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Url,
    Product,
    Category,
    Issue,
    Solution,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Url,
        Field::Product,
        Field::Category,
        Field::Issue,
        Field::Solution,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Url => "url",
            Field::Product => "product",
            Field::Category => "category",
            Field::Issue => "issue",
            Field::Solution => "solution",
        }
    }
}

fn default_of() -> Field {
    Field::Url
}

/// How one field is read from an item element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// Whitespace-collapsed text of the first match, or of the item itself.
    Text {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        default: Option<String>,
        #[serde(default)]
        max_len: Option<usize>,
        /// Drop the item when nothing matches and there is no default.
        #[serde(default)]
        required: bool,
    },
    /// Attribute of the first match, or of the item itself.
    Attr {
        #[serde(default)]
        selector: Option<String>,
        name: String,
        #[serde(default)]
        default: Option<String>,
        #[serde(default)]
        max_len: Option<usize>,
        #[serde(default)]
        required: bool,
    },
    /// Last path segment of another field's URL, without its extension.
    FileStem {
        #[serde(default = "default_of")]
        of: Field,
        #[serde(default)]
        max_len: Option<usize>,
    },
    Constant { value: String },
    /// Text with `{url}`, `{product}`, `{category}`, `{issue}` placeholders.
    Template {
        value: String,
        #[serde(default)]
        max_len: Option<usize>,
    },
}

/// Per-target extraction rules as written in the target file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRules {
    /// Selector list naming each result element.
    pub item: String,
    #[serde(default)]
    pub url: Option<FieldRule>,
    #[serde(default)]
    pub product: Option<FieldRule>,
    #[serde(default)]
    pub category: Option<FieldRule>,
    #[serde(default)]
    pub issue: Option<FieldRule>,
    #[serde(default)]
    pub solution: Option<FieldRule>,
    /// Keep only items whose URL contains one of these substrings.
    #[serde(default)]
    pub url_contains: Vec<String>,
}

impl ExtractionRules {
    pub fn rule(&self, field: Field) -> Option<&FieldRule> {
        match field {
            Field::Url => self.url.as_ref(),
            Field::Product => self.product.as_ref(),
            Field::Category => self.category.as_ref(),
            Field::Issue => self.issue.as_ref(),
            Field::Solution => self.solution.as_ref(),
        }
    }

    pub fn compile(&self) -> ConfigResult<CompiledRules> {
        let item = parse_selector(&self.item)?;
        let mut fields = Vec::new();
        for field in Field::ALL {
            if let Some(rule) = self.rule(field) {
                fields.push((field, CompiledField::compile(rule)?));
            }
        }
        Ok(CompiledRules {
            item,
            fields,
            url_contains: self.url_contains.clone(),
        })
    }
}

/// Compile a CSS selector, mapping failures to [`ConfigError::Selector`].
pub fn parse_selector(selector: &str) -> ConfigResult<Selector> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone)]
enum CompiledField {
    Text {
        selector: Option<Selector>,
        default: Option<String>,
        max_len: Option<usize>,
        required: bool,
    },
    Attr {
        selector: Option<Selector>,
        name: String,
        default: Option<String>,
        max_len: Option<usize>,
        required: bool,
    },
    FileStem {
        of: Field,
        max_len: Option<usize>,
    },
    Constant(String),
    Template {
        value: String,
        max_len: Option<usize>,
    },
}

impl CompiledField {
    fn compile(rule: &FieldRule) -> ConfigResult<Self> {
        let sel = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(match rule {
            FieldRule::Text {
                selector,
                default,
                max_len,
                required,
            } => CompiledField::Text {
                selector: sel(selector)?,
                default: default.clone(),
                max_len: *max_len,
                required: *required,
            },
            FieldRule::Attr {
                selector,
                name,
                default,
                max_len,
                required,
            } => CompiledField::Attr {
                selector: sel(selector)?,
                name: name.clone(),
                default: default.clone(),
                max_len: *max_len,
                required: *required,
            },
            FieldRule::FileStem { of, max_len } => CompiledField::FileStem {
                of: *of,
                max_len: *max_len,
            },
            FieldRule::Constant { value } => CompiledField::Constant(value.clone()),
            FieldRule::Template { value, max_len } => CompiledField::Template {
                value: value.clone(),
                max_len: *max_len,
            },
        })
    }

    /// Derived fields read other fields, so they run after the direct ones.
    fn is_derived(&self) -> bool {
        matches!(
            self,
            CompiledField::FileStem { .. } | CompiledField::Template { .. }
        )
    }
}

/// Rules ready to run against pages.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    item: Selector,
    fields: Vec<(Field, CompiledField)>,
    url_contains: Vec<String>,
}

impl CompiledRules {
    /// Extract every item on a page. A selector that matches nothing yields
    /// an empty list.
    pub fn extract(&self, page: &RawPage) -> Vec<ScrapedItem> {
        let base = Url::parse(&page.final_url)
            .or_else(|_| Url::parse(&page.url))
            .ok();
        let document = Html::parse_document(&page.html);

        let mut items = Vec::new();
        for element in document.select(&self.item) {
            match self.extract_item(element, base.as_ref(), page) {
                Some(item) if self.url_allowed(&item.url) => items.push(item),
                Some(item) => {
                    debug!(url = %item.url, "Item URL filtered out");
                }
                None => {
                    debug!(page = %page.final_url, "Item missing a required field");
                }
            }
        }
        items
    }

    fn url_allowed(&self, url: &str) -> bool {
        self.url_contains.is_empty() || self.url_contains.iter().any(|s| url.contains(s.as_str()))
    }

    fn extract_item(
        &self,
        element: ElementRef<'_>,
        base: Option<&Url>,
        page: &RawPage,
    ) -> Option<ScrapedItem> {
        let mut item = ScrapedItem::default().with_depth(page.depth);

        for (field, rule) in self.fields.iter().filter(|(_, r)| !r.is_derived()) {
            let value = match rule {
                CompiledField::Text {
                    selector,
                    default,
                    max_len,
                    required,
                } => {
                    let found = target_element(element, selector.as_ref()).map(collapsed_text);
                    resolve(found, default, *required, *max_len)?
                }
                CompiledField::Attr {
                    selector,
                    name,
                    default,
                    max_len,
                    required,
                } => {
                    let found = target_element(element, selector.as_ref())
                        .and_then(|el| el.value().attr(name))
                        .map(|v| v.trim().to_string());
                    resolve(found, default, *required, *max_len)?
                }
                CompiledField::Constant(value) => value.clone(),
                _ => continue,
            };
            set(&mut item, *field, value);
        }

        item.url = absolute_url(&item.url, base).unwrap_or_else(|| page.final_url.clone());

        for (field, rule) in self.fields.iter().filter(|(_, r)| r.is_derived()) {
            let value = match rule {
                CompiledField::FileStem { of, max_len } => {
                    clip(file_stem(get(&item, *of)), *max_len)
                }
                CompiledField::Template { value, max_len } => {
                    clip(render_template(value, &item), *max_len)
                }
                _ => continue,
            };
            set(&mut item, *field, value);
        }

        Some(item.cleaned())
    }
}

fn target_element<'a>(element: ElementRef<'a>, selector: Option<&Selector>) -> Option<ElementRef<'a>> {
    match selector {
        Some(sel) => element.select(sel).next(),
        None => Some(element),
    }
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Found value (if non-blank), else the default. `None` drops the item.
fn resolve(
    found: Option<String>,
    default: &Option<String>,
    required: bool,
    max_len: Option<usize>,
) -> Option<String> {
    match found.filter(|v| !v.trim().is_empty()).or_else(|| default.clone()) {
        Some(value) => Some(clip(value, max_len)),
        None if required => None,
        None => Some(String::new()),
    }
}

fn clip(value: String, max_len: Option<usize>) -> String {
    match max_len {
        Some(max) => truncate_chars(&value, max).to_string(),
        None => value,
    }
}

fn absolute_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(raw).ok().map(String::from),
        None => Url::parse(raw).ok().map(String::from),
    }
}

fn file_stem(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let segment = path
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 5 => stem.to_string(),
        _ => segment.to_string(),
    }
}

fn render_template(template: &str, item: &ScrapedItem) -> String {
    Field::ALL.iter().fold(template.to_string(), |acc, field| {
        acc.replace(&format!("{{{}}}", field.name()), get(item, *field))
    })
}

fn get(item: &ScrapedItem, field: Field) -> &str {
    match field {
        Field::Url => &item.url,
        Field::Product => &item.product,
        Field::Category => &item.category,
        Field::Issue => &item.issue,
        Field::Solution => &item.solution,
    }
}

fn set(item: &mut ScrapedItem, field: Field, value: String) {
    match field {
        Field::Url => item.url = value,
        Field::Product => item.product = value,
        Field::Category => item.category = value,
        Field::Issue => item.issue = value,
        Field::Solution => item.solution = value,
    }
}
