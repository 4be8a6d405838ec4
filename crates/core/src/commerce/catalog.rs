use crate::domain::product::{CatalogProduct, ProductId};

/// A merchant's product list with fuzzy name resolution.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: Vec<CatalogProduct>,
}

impl Catalog {
    pub fn new(products: Vec<CatalogProduct>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[CatalogProduct] {
        &self.products
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&CatalogProduct> {
        self.products.iter().find(|product| &product.id == product_id)
    }

    /// Resolves a free-text product name. Rules are tried in order and the first hit wins:
    /// exact match, query as a whole word inside a catalog name, catalog name as a whole
    /// word inside the query, then plain substring containment either way.
    pub fn match_name(&self, query: &str) -> Option<&CatalogProduct> {
        let query = normalize(query);
        if query.is_empty() {
            return None;
        }

        let names = self
            .products
            .iter()
            .map(|product| (product, normalize(&product.name)))
            .filter(|(_, name)| !name.is_empty())
            .collect::<Vec<_>>();

        let rules: [&dyn Fn(&str) -> bool; 4] = [
            &|name| name == query,
            &|name| contains_word(name, &query),
            &|name| contains_word(&query, name),
            &|name| name.contains(query.as_str()) || query.contains(name),
        ];

        rules.iter().find_map(|rule| {
            names.iter().find(|(_, name)| rule(name.as_str())).map(|(product, _)| *product)
        })
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn is_word_char(ch: char) -> bool {
    !(ch.is_whitespace() || ch.is_ascii_punctuation() || ch == '।')
}

/// True when `needle` occurs in `haystack` with no word characters directly around it.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}
