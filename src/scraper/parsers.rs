use crate::models::{FieldError, FieldId, FieldRead, RawFieldMap};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ── Selectors ─────────────────────────────────────────────────────────────────

/// Where a field lives on the page. Reads element text unless `attr` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub css: String,
    #[serde(default)]
    pub attr: Option<String>,
}

impl FieldSelector {
    pub fn text(css: impl Into<String>) -> Self {
        Self { css: css.into(), attr: None }
    }

    pub fn attr(css: impl Into<String>, attr: impl Into<String>) -> Self {
        Self { css: css.into(), attr: Some(attr.into()) }
    }
}

/// VNDirect HOSE board, market summary panel under `#charts-wrapper`.
pub fn default_selectors() -> BTreeMap<FieldId, FieldSelector> {
    let panel = "#charts-wrapper > div > div > div:nth-of-type(1) > div:nth-of-type(2)";
    let at = |p: u32, span: u32| format!("{} > p:nth-of-type({}) > span:nth-of-type({})", panel, p, span);

    BTreeMap::from([
        (FieldId::IndexValue, FieldSelector::text(at(1, 3))),
        (FieldId::Direction, FieldSelector::attr(at(1, 2), "class")),
        (FieldId::Spread, FieldSelector::text(at(1, 4))),
        (FieldId::TradedValue, FieldSelector::text(at(2, 3))),
        (FieldId::TradedVolume, FieldSelector::text(at(2, 1))),
        (FieldId::CountUp, FieldSelector::text(at(3, 2))),
        (FieldId::CountDown, FieldSelector::text(at(3, 7))),
        (FieldId::CountUnchanged, FieldSelector::text(at(3, 5))),
    ])
}

// ── Page reader ───────────────────────────────────────────────────────────────

/// Reads configured fields out of one parsed HTML document.
pub struct HtmlPageReader<'a> {
    doc: Html,
    selectors: &'a BTreeMap<FieldId, FieldSelector>,
}

impl<'a> HtmlPageReader<'a> {
    pub fn new(html: &str, selectors: &'a BTreeMap<FieldId, FieldSelector>) -> Self {
        Self {
            doc: Html::parse_document(html),
            selectors,
        }
    }

    pub fn read(&self, field: FieldId) -> FieldRead {
        let spec = self.selectors.get(&field).ok_or(FieldError::NotConfigured)?;

        let sel = Selector::parse(&spec.css).map_err(|e| FieldError::InvalidSelector {
            selector: spec.css.clone(),
            reason: format!("{:?}", e),
        })?;

        let el = self
            .doc
            .select(&sel)
            .next()
            .ok_or_else(|| FieldError::NotFound { selector: spec.css.clone() })?;

        let value = match &spec.attr {
            Some(attr) => el
                .value()
                .attr(attr)
                .ok_or_else(|| FieldError::MissingAttribute {
                    selector: spec.css.clone(),
                    attr: attr.clone(),
                })?
                .trim()
                .to_string(),
            // nested spans ("<b>16.55</b><i>1.55%</i>") keep a gap between them
            None => el.text().collect::<Vec<_>>().join(" ").trim().to_string(),
        };

        if value.is_empty() {
            return Err(FieldError::Empty);
        }
        debug!("{} = {:?}", field, value);
        Ok(value)
    }

    /// One entry per configured field, failures included.
    pub fn read_all(&self) -> RawFieldMap {
        let mut raw = RawFieldMap::new();
        for field in self.selectors.keys() {
            raw.insert(*field, self.read(*field));
        }
        raw
    }
}
