//! View resolution: map a [`ViewId`] onto a page of the exported PDF.
//!
//! The office suite exports spreadsheets one visible sheet per page and
//! presentations one visible slide per page, so a named sheet or numbered
//! slide becomes a 0-based page index. Sheet names and slide visibility are
//! read straight out of the document container (OOXML or ODF zip) before the
//! export runs, which lets an unknown sheet fail fast with the list of real
//! names instead of after a two-minute export.
//!
//! Slide numbers are deck positions: `{"slide": 3}` is the third slide of
//! the deck even when slide 2 is hidden and therefore missing from the
//! export. A hidden slide cannot be captured.
//!
//! Legacy binary formats (`.xls`, `.ppt`) are not inspected: positional
//! views work, name lookup does not.

use crate::error::JobError;
use crate::job::ViewId;
use crate::pipeline::input::{DocumentFormat, DocumentKind, ResolvedDocument};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

static XLSX_SHEET_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?sheet\b[^>]*>").unwrap());
static NAME_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bname="([^"]*)""#).unwrap());
static STATE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bstate="([^"]*)""#).unwrap());
static ODS_TABLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<table:table(?:\s[^>]*)?>").unwrap());
static ODS_TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\btable:name="([^"]*)""#).unwrap());
static ODS_TABLE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\btable:style-name="([^"]*)""#).unwrap());
static ODF_STYLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<style:style\b[^>]*>").unwrap());
static ODF_STYLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bstyle:name="([^"]*)""#).unwrap());
static ODF_HIDDEN_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:table:display="false"|presentation:visibility="hidden")"#).unwrap()
});
static PPTX_SLIDE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());
static PPTX_SLIDE_ID_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?sldId\b[^>]*>").unwrap());
static PREFIXED_ID_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b\w+:id="([^"]*)""#).unwrap());
static RELATIONSHIP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Relationship\b[^>]*>").unwrap());
static REL_ID_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bId="([^"]*)""#).unwrap());
static REL_TARGET_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bTarget="([^"]*)""#).unwrap());
static PPTX_HIDDEN_SLIDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<p:sld\b[^>]*\bshow="(?:0|false)""#).unwrap());
static ODP_PAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<draw:page(?:\s[^>]*)?>").unwrap());
static DRAW_STYLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bdraw:style-name="([^"]*)""#).unwrap());

/// Where a view lands in the exported PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewPlan {
    /// 0-based page index.
    pub page_index: usize,
    /// Page count the export should produce, when the container told us.
    pub expected_pages: Option<usize>,
}

/// Enumerated views of a document, as reported by inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentViews {
    /// Visible sheet names in export order.
    Sheets(Vec<String>),
    /// Slides in deck order.
    Slides(SlideDeck),
    /// The container could not be enumerated (legacy binary, PDF, image).
    Unknown,
}

/// Visibility of each slide of a presentation, in deck order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlideDeck {
    visible: Vec<bool>,
}

impl SlideDeck {
    pub fn new(visible: Vec<bool>) -> Self {
        Self { visible }
    }

    /// Number of slides in the deck, hidden ones included.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Number of slides the export produces.
    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }

    /// 1-based deck numbers of hidden slides.
    pub fn hidden_numbers(&self) -> Vec<usize> {
        self.numbers_where(false)
    }

    fn numbers_where(&self, visible: bool) -> Vec<usize> {
        self.visible
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == visible)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Exported page of deck slide `number`; `None` if hidden or absent.
    pub fn page_of(&self, number: usize) -> Option<usize> {
        let index = number.checked_sub(1)?;
        if !*self.visible.get(index)? {
            return None;
        }
        Some(self.visible[..index].iter().filter(|v| **v).count())
    }
}

/// Enumerate views without running the office suite.
pub fn list_views(doc: &ResolvedDocument) -> Result<DocumentViews, JobError> {
    let views = match doc.format {
        DocumentFormat::Xlsx => DocumentViews::Sheets(xlsx_sheet_names(&doc.path)?),
        DocumentFormat::Ods => DocumentViews::Sheets(ods_sheet_names(&doc.path)?),
        DocumentFormat::Pptx => DocumentViews::Slides(pptx_slide_deck(&doc.path)?),
        DocumentFormat::Odp => DocumentViews::Slides(odp_slide_deck(&doc.path)?),
        _ => DocumentViews::Unknown,
    };
    Ok(views)
}

/// Decide which exported page a job's view refers to.
pub fn plan_view(doc: &ResolvedDocument, view: &ViewId) -> Result<ViewPlan, JobError> {
    let not_found = |available: String| JobError::ViewNotFound {
        path: doc.path.clone(),
        view: view.to_string(),
        available,
    };

    match (doc.kind(), view) {
        (DocumentKind::Image, ViewId::First) => Ok(ViewPlan {
            page_index: 0,
            expected_pages: Some(1),
        }),
        (DocumentKind::Image, _) => Err(not_found("first (image documents have a single view)".into())),

        (DocumentKind::Spreadsheet, ViewId::Sheet(name)) => match list_views(doc)? {
            DocumentViews::Sheets(names) => {
                let index = names
                    .iter()
                    .position(|n| n == name)
                    .or_else(|| names.iter().position(|n| n.eq_ignore_ascii_case(name)))
                    .ok_or_else(|| not_found(quote_list(&names)))?;
                debug!("Sheet '{}' is page {} of {}", name, index + 1, names.len());
                Ok(ViewPlan {
                    page_index: index,
                    expected_pages: Some(names.len()),
                })
            }
            _ => Err(not_found(
                "sheet names cannot be read from legacy .xls files; use \"first\" or {\"page\": n}"
                    .into(),
            )),
        },

        (_, ViewId::Sheet(_)) => Err(not_found(
            "sheet views apply only to spreadsheets; use \"first\", {\"slide\": n} or {\"page\": n}"
                .into(),
        )),

        (kind, positional) => {
            let number = positional.page_number().unwrap_or(1) as usize;
            let views = list_views(doc)?;
            if let (DocumentViews::Slides(deck), ViewId::Slide(_)) = (&views, positional) {
                return plan_slide(deck, number).map_err(not_found);
            }
            let expected = match views {
                DocumentViews::Sheets(names) => Some(names.len()),
                DocumentViews::Slides(deck) => Some(deck.visible_count()),
                DocumentViews::Unknown => None,
            };
            if let Some(total) = expected {
                if number > total {
                    let available = match kind {
                        DocumentKind::Spreadsheet => format!("{total} visible sheets"),
                        _ => format!("pages 1-{total}"),
                    };
                    return Err(not_found(available));
                }
            }
            Ok(ViewPlan {
                page_index: number - 1,
                expected_pages: expected,
            })
        }
    }
}

fn plan_slide(deck: &SlideDeck, number: usize) -> Result<ViewPlan, String> {
    if number == 0 || number > deck.len() {
        return Err(match deck.len() {
            0 => "no slides".into(),
            n => format!("slides 1-{n}"),
        });
    }
    let page_index = deck.page_of(number).ok_or_else(|| {
        let visible = deck
            .numbers_where(true)
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("slide {number} is hidden and not exported; visible slides: {visible}")
    })?;
    debug!("Slide {} is page {} of {}", number, page_index + 1, deck.visible_count());
    Ok(ViewPlan {
        page_index,
        expected_pages: Some(deck.visible_count()),
    })
}

// ── Container readers ───────────────────────────────────────────────────

fn open_zip(path: &Path) -> Result<zip::ZipArchive<File>, JobError> {
    let file = File::open(path).map_err(|_| JobError::DocumentNotFound {
        path: path.to_path_buf(),
    })?;
    zip::ZipArchive::new(file).map_err(|e| JobError::UnsupportedDocument {
        path: path.to_path_buf(),
        detail: format!("not a readable zip container: {e}"),
    })
}

fn read_entry(archive: &mut zip::ZipArchive<File>, path: &Path, name: &str) -> Result<String, JobError> {
    let mut entry = archive.by_name(name).map_err(|e| JobError::UnsupportedDocument {
        path: path.to_path_buf(),
        detail: format!("missing '{name}': {e}"),
    })?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| JobError::UnsupportedDocument {
            path: path.to_path_buf(),
            detail: format!("reading '{name}': {e}"),
        })?;
    Ok(text)
}

/// Visible sheet names of an `.xlsx` workbook in tab order.
pub fn xlsx_sheet_names(path: &Path) -> Result<Vec<String>, JobError> {
    let mut archive = open_zip(path)?;
    let workbook = read_entry(&mut archive, path, "xl/workbook.xml")?;
    Ok(parse_workbook_sheets(&workbook))
}

fn parse_workbook_sheets(xml: &str) -> Vec<String> {
    XLSX_SHEET_TAG
        .find_iter(xml)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let hidden = STATE_ATTR
                .captures(tag)
                .is_some_and(|c| &c[1] != "visible");
            if hidden {
                return None;
            }
            NAME_ATTR.captures(tag).map(|c| unescape_xml(&c[1]))
        })
        .collect()
}

/// Visible sheet names of an `.ods` spreadsheet.
pub fn ods_sheet_names(path: &Path) -> Result<Vec<String>, JobError> {
    let mut archive = open_zip(path)?;
    let content = read_entry(&mut archive, path, "content.xml")?;
    Ok(parse_ods_tables(&content))
}

fn parse_ods_tables(content: &str) -> Vec<String> {
    let hidden = odf_hidden_styles(content);
    ODS_TABLE_TAG
        .find_iter(content)
        .filter_map(|tag| {
            let tag = tag.as_str();
            if ODS_TABLE_STYLE
                .captures(tag)
                .is_some_and(|c| hidden.contains(&c[1]))
            {
                return None;
            }
            ODS_TABLE_NAME.captures(tag).map(|c| unescape_xml(&c[1]))
        })
        .collect()
}

/// Names of ODF automatic styles that hide a table or a drawing page.
fn odf_hidden_styles(xml: &str) -> HashSet<String> {
    ODF_STYLE_TAG
        .find_iter(xml)
        .filter(|tag| !tag.as_str().ends_with("/>"))
        .filter_map(|tag| {
            let rest = &xml[tag.end()..];
            let body = &rest[..rest.find("</style:style>")?];
            if !ODF_HIDDEN_PROPERTY.is_match(body) {
                return None;
            }
            ODF_STYLE_NAME.captures(tag.as_str()).map(|c| c[1].to_string())
        })
        .collect()
}

/// Slides of a `.pptx` in presentation order.
pub fn pptx_slide_deck(path: &Path) -> Result<SlideDeck, JobError> {
    let mut archive = open_zip(path)?;
    let parts = pptx_slide_parts(&mut archive, path);

    let mut visible = Vec::with_capacity(parts.len());
    for name in &parts {
        let xml = read_entry(&mut archive, path, name)?;
        visible.push(!PPTX_HIDDEN_SLIDE.is_match(&xml));
    }
    let deck = SlideDeck::new(visible);
    debug!(
        "{}: {} slides, {} visible",
        path.display(),
        deck.len(),
        deck.visible_count()
    );
    Ok(deck)
}

/// Slide part names in deck order.
///
/// The deck order lives in `ppt/presentation.xml` (`sldIdLst`) and may differ
/// from the part numbering after slides are reordered. Without it, fall back
/// to the part numbers.
fn pptx_slide_parts(archive: &mut zip::ZipArchive<File>, path: &Path) -> Vec<String> {
    let presentation = read_entry(archive, path, "ppt/presentation.xml");
    let rels = read_entry(archive, path, "ppt/_rels/presentation.xml.rels");
    if let (Ok(presentation), Ok(rels)) = (presentation, rels) {
        if let Some(parts) = deck_order(&presentation, &rels) {
            return parts;
        }
    }

    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|n| {
            let number = PPTX_SLIDE_ENTRY.captures(n)?[1].parse().ok()?;
            Some((number, n.to_owned()))
        })
        .collect();
    numbered.sort();
    numbered.into_iter().map(|(_, n)| n).collect()
}

fn deck_order(presentation: &str, rels: &str) -> Option<Vec<String>> {
    let targets: HashMap<&str, &str> = RELATIONSHIP_TAG
        .find_iter(rels)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let id = REL_ID_ATTR.captures(tag)?.get(1)?.as_str();
            let target = REL_TARGET_ATTR.captures(tag)?.get(1)?.as_str();
            Some((id, target))
        })
        .collect();

    let parts: Option<Vec<String>> = PPTX_SLIDE_ID_TAG
        .find_iter(presentation)
        .map(|tag| {
            let rid = PREFIXED_ID_ATTR.captures(tag.as_str())?.get(1)?.as_str();
            let target = targets.get(rid)?;
            Some(match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("ppt/{target}"),
            })
        })
        .collect();
    parts.filter(|p| !p.is_empty())
}

/// Slides of an `.odp` presentation in deck order.
pub fn odp_slide_deck(path: &Path) -> Result<SlideDeck, JobError> {
    let mut archive = open_zip(path)?;
    let content = read_entry(&mut archive, path, "content.xml")?;
    Ok(parse_odp_pages(&content))
}

fn parse_odp_pages(content: &str) -> SlideDeck {
    let hidden = odf_hidden_styles(content);
    SlideDeck::new(
        ODP_PAGE_TAG
            .find_iter(content)
            .map(|tag| {
                !DRAW_STYLE_NAME
                    .captures(tag.as_str())
                    .is_some_and(|c| hidden.contains(&c[1]))
            })
            .collect(),
    )
}

fn quote_list(names: &[String]) -> String {
    if names.is_empty() {
        return "no visible sheets".into();
    }
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode the five predefined XML entities and numeric character references.
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
