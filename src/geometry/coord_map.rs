//! Coordinate map XML
//!
//! Written by batch cutting next to the normalized pages, read by the
//! aggregator to place patches back into scan coordinates.
//!
//! ```xml
//! <frames>
//!   <frame>
//!     <basename>0001_left.png</basename>
//!     <top_left x="12" y="40"/>
//!     <bottom_right x="2410" y="3300"/>
//!   </frame>
//! </frames>
//! ```
//!
//! Corners are written as `x`/`y` attributes of `top_left` and
//! `bottom_right`. Maps from the older inspection client carry both corners
//! in one `<coords>` text node instead, e.g. `([12, 40], [2410, 3300])`;
//! those are still read, but never written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::types::{GeometryError, Page, PageGeometry, PixelPoint, Result};
use crate::retry::{Attempt, RetryPolicy};

/// Coordinate map file name inside a book's temp directory
pub const COORD_MAP_FILE: &str = "coord_map.xml";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "frames")]
struct FramesXml {
    #[serde(rename = "frame", default)]
    frames: Vec<FrameXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameXml {
    basename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top_left: Option<PointXml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bottom_right: Option<PointXml>,
    /// Older single-node layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coords: Option<String>,
}

impl FrameXml {
    fn corners(self) -> Result<(String, FrameCoords)> {
        let coords = match (self.top_left, self.bottom_right, self.coords) {
            (Some(top_left), Some(bottom_right), _) => FrameCoords {
                top_left: top_left.into(),
                bottom_right: bottom_right.into(),
            },
            (_, _, Some(text)) => parse_coords_text(&text).ok_or_else(|| {
                GeometryError::CoordMap(format!("bad coords '{}' for {}", text, self.basename))
            })?,
            _ => {
                return Err(GeometryError::CoordMap(format!(
                    "no corners for {}",
                    self.basename
                )))
            }
        };
        Ok((self.basename, coords))
    }
}

/// `([x0, y0], [x1, y1])` or any bracketing of exactly four integers
fn parse_coords_text(text: &str) -> Option<FrameCoords> {
    let numbers: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match numbers[..] {
        [x0, y0, x1, y1] => Some(FrameCoords {
            top_left: PixelPoint::new(x0, y0),
            bottom_right: PixelPoint::new(x1, y1),
        }),
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PointXml {
    #[serde(rename = "@x")]
    x: u32,
    #[serde(rename = "@y")]
    y: u32,
}

impl From<PixelPoint> for PointXml {
    fn from(p: PixelPoint) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<PointXml> for PixelPoint {
    fn from(p: PointXml) -> Self {
        PixelPoint::new(p.x, p.y)
    }
}

/// Crop corners of one normalized page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCoords {
    pub top_left: PixelPoint,
    pub bottom_right: PixelPoint,
}

/// Page basename to crop corners.
///
/// Serialized with attribute corners (`<top_left x=".." y=".."/>`), not the
/// single `<coords>` text node older maps use; see the module docs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordMap {
    frames: BTreeMap<String, FrameCoords>,
}

impl CoordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a page's crop corners
    pub fn insert_page(&mut self, page: &Page) {
        self.insert(
            page.basename.clone(),
            FrameCoords {
                top_left: page.top_left(),
                bottom_right: page.bottom_right,
            },
        );
    }

    pub fn insert(&mut self, basename: String, coords: FrameCoords) {
        self.frames.insert(basename, coords);
    }

    pub fn get(&self, basename: &str) -> Option<&FrameCoords> {
        self.frames.get(basename)
    }

    /// Remap geometry for a page normalized to `square_size`
    pub fn geometry(&self, basename: &str, square_size: u32) -> Option<PageGeometry> {
        self.get(basename)
            .map(|c| PageGeometry::from_corners(c.top_left, c.bottom_right, square_size))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serialize to an XML document
    pub fn to_xml(&self) -> Result<String> {
        let doc = FramesXml {
            frames: self
                .frames
                .iter()
                .map(|(basename, c)| FrameXml {
                    basename: basename.clone(),
                    top_left: Some(c.top_left.into()),
                    bottom_right: Some(c.bottom_right.into()),
                    coords: None,
                })
                .collect(),
        };
        let body = quick_xml::se::to_string(&doc)
            .map_err(|e| GeometryError::CoordMap(e.to_string()))?;
        Ok(format!("{}{}", XML_DECLARATION, body))
    }

    /// Parse an XML document
    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc: FramesXml =
            quick_xml::de::from_str(xml).map_err(|e| GeometryError::CoordMap(e.to_string()))?;
        let mut map = Self::new();
        for frame in doc.frames {
            let (basename, coords) = frame.corners()?;
            map.insert(basename, coords);
        }
        Ok(map)
    }

    /// Write to `path`, retrying transient failures
    pub fn save(&self, path: &Path, retry: &RetryPolicy) -> Result<()> {
        let xml = self.to_xml()?;
        retry.run(&format!("write {}", path.display()), || {
            std::fs::write(path, xml.as_bytes())
                .map_err(|e| Attempt::Transient(GeometryError::IoError(e)))
        })
    }

    /// Read from `path`, retrying transient failures
    pub fn load(path: &Path, retry: &RetryPolicy) -> Result<Self> {
        let xml = retry.run(&format!("read {}", path.display()), || {
            std::fs::read_to_string(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Attempt::Fatal(GeometryError::IoError(e)),
                _ => Attempt::Transient(GeometryError::IoError(e)),
            })
        })?;
        Self::from_xml(&xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CoordMap {
        let mut map = CoordMap::new();
        map.insert(
            "0001_left.png".to_string(),
            FrameCoords {
                top_left: PixelPoint::new(12, 40),
                bottom_right: PixelPoint::new(2012, 3040),
            },
        );
        map.insert(
            "0001_right.png".to_string(),
            FrameCoords {
                top_left: PixelPoint::new(2410, 38),
                bottom_right: PixelPoint::new(4410, 3038),
            },
        );
        map
    }

    #[test]
    fn test_xml_round_trip() {
        let map = sample();
        let xml = map.to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<basename>0001_left.png</basename>"));
        assert_eq!(CoordMap::from_xml(&xml).unwrap(), map);
    }

    #[test]
    fn test_attribute_layout() {
        let xml = sample().to_xml().unwrap();
        assert!(xml.contains(r#"<top_left x="12" y="40""#));
        assert!(xml.contains(r#"<bottom_right x="2012" y="3040""#));
        assert!(!xml.contains("<coords>"));
    }

    #[test]
    fn test_reads_single_node_layout() {
        let xml = r#"<?xml version='1.0' encoding='UTF-8'?>
<frames>
  <frame><basename>0001_left.png</basename><coords>([12, 40], [2012, 3040])</coords></frame>
  <frame><basename>0001_right.png</basename><coords>((2410, 38), (4410, 3038))</coords></frame>
</frames>"#;
        assert_eq!(CoordMap::from_xml(xml).unwrap(), sample());

        let bad = "<frames><frame><basename>a.png</basename><coords>(1, 2)</coords></frame></frames>";
        assert!(matches!(CoordMap::from_xml(bad), Err(GeometryError::CoordMap(_))));
        let bare = "<frames><frame><basename>a.png</basename></frame></frames>";
        assert!(CoordMap::from_xml(bare).is_err());
    }

    #[test]
    fn test_geometry_scale() {
        let geometry = sample().geometry("0001_left.png", 1000).unwrap();
        assert_eq!(geometry.origin, PixelPoint::new(12, 40));
        assert_eq!(geometry.scale_x, 2.0);
        assert_eq!(geometry.scale_y, 3.0);
        assert!(sample().geometry("missing.png", 1000).is_none());
    }

    #[test]
    fn test_empty_map() {
        let xml = CoordMap::new().to_xml().unwrap();
        assert!(CoordMap::from_xml(&xml).unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COORD_MAP_FILE);
        sample().save(&path, &RetryPolicy::no_retry()).unwrap();
        let loaded = CoordMap::load(&path, &RetryPolicy::no_retry()).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_load_missing_is_not_retried() {
        let policy = RetryPolicy::new(10, std::time::Duration::from_secs(5));
        let result = CoordMap::load(Path::new("/nonexistent/coord_map.xml"), &policy);
        assert!(matches!(result, Err(GeometryError::IoError(_))));
    }
}
