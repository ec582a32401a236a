//! Per-book defect map XML
//!
//! ```xml
//! <book barcode="B123">
//!   <page number="0001" patch_width="400" patch_height="600">
//!     <patch x="120" y="80"/>
//!   </page>
//! </book>
//! ```
//!
//! The page carries the size of its first rectangle. Left and right halves
//! of a spread are scaled separately, so a patch whose size differs from the
//! page's carries its own `width`/`height` attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::types::{AggregateError, Result};
use crate::geometry::ScanId;
use crate::retry::{Attempt, RetryPolicy};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// A defect rectangle in original-scan pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefectRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DefectRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "book")]
struct BookXml {
    #[serde(rename = "@barcode")]
    barcode: String,
    #[serde(rename = "page", default)]
    pages: Vec<PageXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageXml {
    #[serde(rename = "@number")]
    number: String,
    #[serde(rename = "@patch_width")]
    patch_width: u32,
    #[serde(rename = "@patch_height")]
    patch_height: u32,
    #[serde(rename = "patch", default)]
    patches: Vec<PatchXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatchXml {
    #[serde(rename = "@x")]
    x: u32,
    #[serde(rename = "@y")]
    y: u32,
    #[serde(rename = "@width", default, skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(rename = "@height", default, skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
}

impl PatchXml {
    fn for_rect(rect: &DefectRect, page_width: u32, page_height: u32) -> Self {
        let same = rect.width == page_width && rect.height == page_height;
        Self {
            x: rect.x,
            y: rect.y,
            width: (!same).then_some(rect.width),
            height: (!same).then_some(rect.height),
        }
    }
}

/// Defect rectangles of one book, grouped by scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefectMap {
    pub barcode: String,
    pages: BTreeMap<ScanId, Vec<DefectRect>>,
}

impl DefectMap {
    pub fn new(barcode: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            pages: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, scan: ScanId, rect: DefectRect) {
        self.pages.entry(scan).or_default().push(rect);
    }

    pub fn rects(&self, scan: &ScanId) -> &[DefectRect] {
        self.pages.get(scan).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pages(&self) -> impl Iterator<Item = (&ScanId, &[DefectRect])> {
        self.pages.iter().map(|(id, rects)| (id, rects.as_slice()))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_rects(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn to_xml(&self) -> Result<String> {
        let doc = BookXml {
            barcode: self.barcode.clone(),
            pages: self
                .pages
                .iter()
                .filter(|(_, rects)| !rects.is_empty())
                .map(|(id, rects)| {
                    let (width, height) = (rects[0].width, rects[0].height);
                    PageXml {
                        number: id.to_string(),
                        patch_width: width,
                        patch_height: height,
                        patches: rects
                            .iter()
                            .map(|r| PatchXml::for_rect(r, width, height))
                            .collect(),
                    }
                })
                .collect(),
        };
        let body =
            quick_xml::se::to_string(&doc).map_err(|e| AggregateError::DefectMap(e.to_string()))?;
        Ok(format!("{}{}", XML_DECLARATION, body))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc: BookXml =
            quick_xml::de::from_str(xml).map_err(|e| AggregateError::DefectMap(e.to_string()))?;
        let mut map = Self::new(doc.barcode);
        for page in doc.pages {
            let id = ScanId::parse(&page.number)
                .map_err(|e| AggregateError::DefectMap(e.to_string()))?;
            for patch in page.patches {
                map.insert(
                    id.clone(),
                    DefectRect::new(
                        patch.x,
                        patch.y,
                        patch.width.unwrap_or(page.patch_width),
                        patch.height.unwrap_or(page.patch_height),
                    ),
                );
            }
        }
        Ok(map)
    }

    pub fn save(&self, path: &Path, retry: &RetryPolicy) -> Result<()> {
        let xml = self.to_xml()?;
        if let Some(parent) = path.parent() {
            retry.create_dir_all(parent)?;
        }
        retry.run(&format!("write {}", path.display()), || {
            std::fs::write(path, xml.as_bytes())
                .map_err(|e| Attempt::Transient(AggregateError::IoError(e)))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_xml(&std::fs::read_to_string(path)?)
    }
}
