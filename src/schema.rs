//! Header-to-field resolution.
//!
//! Maps arbitrary, localized column headers onto the seven
//! [`CanonicalField`]s. Headers are normalized (lowercase, accents folded,
//! punctuation collapsed) and a header matches a field when its normalized
//! form equals or is a prefix of one of the field's synonyms.
//!
//! Resolution scans fields in declaration order and, for each field, headers
//! left to right. The first unassigned header that matches wins, so a column
//! is never claimed by two fields and an ambiguous header always goes to the
//! earliest field that accepts it.

use crate::models::CanonicalField;

const REFERENCE_SYNONYMS: &[&str] = &[
    "reference",
    "references",
    "ref",
    "repere",
    "reperes",
    "rep",
    "code",
    "item",
    "numero",
    "no",
    "n",
    "mark",
];

const DIMENSION_SYNONYMS: &[&str] = &[
    "dimension",
    "dimensions",
    "dim",
    "dims",
    "taille",
    "format",
    "cote",
    "cotes",
    "lxh",
    "l x h",
    "size",
];

const TYPOLOGY_SYNONYMS: &[&str] = &[
    "typologie",
    "typologies",
    "typology",
    "type",
    "types",
    "designation",
    "designations",
    "description",
    "libelle",
    "intitule",
    "ouvrage",
    "article",
    "produit",
    "modele",
];

const PERFORMANCE_SYNONYMS: &[&str] = &[
    "performance",
    "performances",
    "perf",
    "perfs",
    "caracteristiques",
    "acoustique",
    "thermique",
    "uw",
];

const QUANTITY_SYNONYMS: &[&str] = &[
    "quantite",
    "quantites",
    "qte",
    "qtes",
    "qt",
    "qty",
    "quantity",
    "nombre",
    "nb",
    "nbre",
];

const INSTALL_MODE_SYNONYMS: &[&str] = &[
    "mode de pose",
    "pose",
    "mise en oeuvre",
    "installation",
    "install",
    "montage",
];

const COMMENT_SYNONYMS: &[&str] = &[
    "commentaire",
    "commentaires",
    "comment",
    "comments",
    "observation",
    "observations",
    "obs",
    "remarque",
    "remarques",
    "note",
    "notes",
];

/// Header prefixes that identify a free-text designation column.
pub const DESIGNATION_PREFIXES: &[&str] = &["designation", "description", "libelle", "intitule"];

/// Header prefixes that identify a quantity column.
pub const QUANTITY_PREFIXES: &[&str] = &["quantite", "qte", "qty", "quantity", "nombre", "nb"];

fn synonyms(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Reference => REFERENCE_SYNONYMS,
        CanonicalField::Dimension => DIMENSION_SYNONYMS,
        CanonicalField::Typology => TYPOLOGY_SYNONYMS,
        CanonicalField::Performance => PERFORMANCE_SYNONYMS,
        CanonicalField::Quantity => QUANTITY_SYNONYMS,
        CanonicalField::InstallMode => INSTALL_MODE_SYNONYMS,
        CanonicalField::Comment => COMMENT_SYNONYMS,
    }
}

/// Maps a lowercase accented letter to its unaccented base.
fn fold_char(c: char, out: &mut String) {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
        'æ' => out.push_str("ae"),
        'ç' | 'ć' | 'č' => out.push('c'),
        'ď' => out.push('d'),
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => out.push('e'),
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => out.push('i'),
        'ł' | 'ľ' => out.push('l'),
        'ñ' | 'ń' | 'ň' => out.push('n'),
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => out.push('o'),
        'œ' => out.push_str("oe"),
        'ŕ' | 'ř' => out.push('r'),
        'ś' | 'š' | 'ş' => out.push('s'),
        'ß' => out.push_str("ss"),
        'ť' | 'ţ' => out.push('t'),
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => out.push('u'),
        'ý' | 'ÿ' => out.push('y'),
        'ź' | 'ż' | 'ž' => out.push('z'),
        other => out.push(other),
    }
}

/// Lowercases and strips diacritics, keeping every other character.
pub fn fold_accents(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        fold_char(c, &mut out);
    }
    out
}

/// Lowercase, strip diacritics, collapse non-alphanumeric runs to one space, trim.
pub fn normalize_header(text: &str) -> String {
    let folded = fold_accents(text);
    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

fn matches_synonym(normalized: &str, synonyms: &[&str]) -> bool {
    // An empty header is a prefix of every synonym.
    !normalized.is_empty() && synonyms.iter().any(|s| s.starts_with(normalized))
}

/// Canonical field → source column index.
///
/// Built once per table by [`resolve_headers`]; immutable afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: [Option<usize>; CanonicalField::COUNT],
}

impl HeaderMap {
    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.columns[field.index()]
    }

    pub fn is_mapped(&self, field: CanonicalField) -> bool {
        self.get(field).is_some()
    }

    /// The field assigned to a column, if any.
    pub fn field_for_column(&self, column: usize) -> Option<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .find(|f| self.get(*f) == Some(column))
    }

    pub fn mapped_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// Fields left unmapped, in canonical order.
    pub fn missing(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| !self.is_mapped(*f))
            .collect()
    }
}

/// Resolve a raw header row into a [`HeaderMap`].
pub fn resolve_headers<S: AsRef<str>>(headers: &[S]) -> HeaderMap {
    let normalized: Vec<String> = headers
        .iter()
        .map(|h| normalize_header(h.as_ref()))
        .collect();
    let mut claimed = vec![false; normalized.len()];
    let mut map = HeaderMap::default();

    for field in CanonicalField::ALL {
        let synonyms = synonyms(field);
        let hit = normalized
            .iter()
            .enumerate()
            .find(|(col, header)| !claimed[*col] && matches_synonym(header, synonyms));
        if let Some((col, _)) = hit {
            claimed[col] = true;
            map.columns[field.index()] = Some(col);
        }
    }
    map
}

/// First column whose normalized header starts with one of `prefixes`.
pub fn fallback_column<S: AsRef<str>>(headers: &[S], prefixes: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let normalized = normalize_header(h.as_ref());
        prefixes.iter().any(|p| normalized.starts_with(p))
    })
}

/// Whether a header row exposes both a designation-like and a quantity-like column,
/// either through direct mapping or through the prefix fallbacks.
pub fn has_designation_and_quantity<S: AsRef<str>>(headers: &[S]) -> bool {
    let map = resolve_headers(headers);
    let typology = map.is_mapped(CanonicalField::Typology)
        || fallback_column(headers, DESIGNATION_PREFIXES).is_some();
    let quantity = map.is_mapped(CanonicalField::Quantity)
        || fallback_column(headers, QUANTITY_PREFIXES).is_some();
    typology && quantity
}
