//! Page partitioning
//!
//! Turns an ordered list of cut boundaries into independent sub-documents.
//!
//! Two strategies are available:
//! - [`partition`]: positional. Boundary `i` selects page `i`, one page per
//!   sub-document. Pages past the last boundary are dropped.
//! - [`partition_spatial`]: each boundary is located on the page containing
//!   it and the document is split into contiguous page ranges there. Every
//!   page ends up in exactly one sub-document.

use crate::error::SegmentError;
use crate::layout::DocumentLayout;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// How cut boundaries are mapped onto pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionMode {
    /// One page per boundary, taken from the start of the document
    #[default]
    Positional,
    /// Split at the page containing each boundary, keeping every page
    Spatial,
}

impl std::str::FromStr for PartitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positional" | "legacy" => Ok(PartitionMode::Positional),
            "spatial" => Ok(PartitionMode::Spatial),
            other => Err(format!(
                "Invalid mode '{}'. Must be 'positional' or 'spatial'",
                other
            )),
        }
    }
}

/// One independently servable output unit
#[derive(Debug, Clone, PartialEq)]
pub struct SubDocument {
    /// 0-indexed position in the output sequence
    pub index: usize,
    /// 1-indexed page numbers taken from the original document
    pub pages: Vec<u32>,
    /// Serialized PDF
    pub bytes: Vec<u8>,
}

/// Positional partition: one single-page sub-document per boundary
///
/// Produces `min(boundaries.len(), page_count)` sub-documents holding pages
/// 1, 2, ... in order. Surplus boundaries are ignored.
pub fn partition(doc: &Document, boundaries: &[f64]) -> Result<Vec<SubDocument>, SegmentError> {
    partition_cancellable(doc, boundaries, &NOT_CANCELLED)
}

/// Spatial partition: split before the page holding each boundary
///
/// `boundaries` are stacked coordinates (see [`DocumentLayout::stacked`]).
/// A boundary on the first page cannot start a new range and is ignored, as
/// are repeated boundaries on the same page.
pub fn partition_spatial(
    doc: &Document,
    layout: &DocumentLayout,
    boundaries: &[f64],
) -> Result<Vec<SubDocument>, SegmentError> {
    partition_spatial_cancellable(doc, layout, boundaries, &NOT_CANCELLED)
}

static NOT_CANCELLED: AtomicBool = AtomicBool::new(false);

pub(crate) fn partition_cancellable(
    doc: &Document,
    boundaries: &[f64],
    cancel: &AtomicBool,
) -> Result<Vec<SubDocument>, SegmentError> {
    let source = PageSource::new(doc)?;
    let page_count = source.page_count() as usize;
    let count = boundaries.len().min(page_count);

    if boundaries.len() > page_count {
        debug!(
            "{} boundaries for {} pages, ignoring the surplus",
            boundaries.len(),
            page_count
        );
    }

    (0..count)
        .map(|index| {
            check_cancelled(cancel)?;
            let page = index as u32 + 1;
            Ok(SubDocument {
                index,
                pages: vec![page],
                bytes: source.extract(&[page])?,
            })
        })
        .collect()
}

pub(crate) fn partition_spatial_cancellable(
    doc: &Document,
    layout: &DocumentLayout,
    boundaries: &[f64],
    cancel: &AtomicBool,
) -> Result<Vec<SubDocument>, SegmentError> {
    let source = PageSource::new(doc)?;
    let page_count = source.page_count();
    if page_count == 0 {
        return Ok(Vec::new());
    }

    let ranges = page_ranges(layout, boundaries, page_count);
    debug!("Spatial partition into {} ranges", ranges.len());

    ranges
        .into_iter()
        .enumerate()
        .map(|(index, pages)| {
            check_cancelled(cancel)?;
            let bytes = source.extract(&pages)?;
            Ok(SubDocument {
                index,
                pages,
                bytes,
            })
        })
        .collect()
}

fn check_cancelled(cancel: &AtomicBool) -> Result<(), SegmentError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(SegmentError::Cancelled);
    }
    Ok(())
}

/// Contiguous 1-indexed page ranges covering `1..=page_count`
fn page_ranges(layout: &DocumentLayout, boundaries: &[f64], page_count: u32) -> Vec<Vec<u32>> {
    let starts: BTreeSet<u32> = boundaries
        .iter()
        .filter_map(|&y| layout.page_for_stacked(y))
        .filter(|&page| page > 1 && page <= page_count)
        .collect();

    let mut ranges = Vec::with_capacity(starts.len() + 1);
    let mut first = 1;
    for start in starts {
        ranges.push((first..start).collect());
        first = start;
    }
    ranges.push((first..=page_count).collect());
    ranges
}

/// Build a standalone PDF holding only `pages` (1-indexed)
pub fn extract_pages(doc: &Document, pages: &[u32]) -> Result<Vec<u8>, SegmentError> {
    PageSource::new(doc)?.extract(pages)
}

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page tree nesting bound while resolving inherited attributes
const MAX_TREE_DEPTH: usize = 32;

/// A source document with its page tree resolved once, shared by every
/// extraction from it
struct PageSource<'a> {
    doc: &'a Document,
    page_ids: Vec<ObjectId>,
    pages_root: ObjectId,
}

impl<'a> PageSource<'a> {
    fn new(doc: &'a Document) -> Result<Self, SegmentError> {
        let pages_root = doc
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|e| SegmentError::OperationError(format!("No page tree root: {}", e)))?;

        Ok(Self {
            doc,
            page_ids: doc.get_pages().into_values().collect(),
            pages_root,
        })
    }

    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    /// Copy the objects reachable from the kept pages into a fresh document
    ///
    /// The page tree is flattened: the root's `Kids` lists exactly the kept
    /// pages, each kept page points straight at the root and carries its
    /// inherited attributes. Other pages and intermediate tree nodes are never
    /// copied, so work is proportional to the output, not the source.
    fn extract(&self, pages: &[u32]) -> Result<Vec<u8>, SegmentError> {
        if pages.is_empty() {
            return Err(SegmentError::OperationError("No pages specified".into()));
        }

        let page_count = self.page_count();
        if let Some(&page) = pages.iter().find(|&&p| p == 0 || p > page_count) {
            return Err(SegmentError::OperationError(format!(
                "Page {} does not exist (document has {} pages)",
                page, page_count
            )));
        }

        let kept: Vec<ObjectId> = pages
            .iter()
            .map(|&p| self.page_ids[p as usize - 1])
            .collect();
        let kept_set: HashSet<ObjectId> = kept.iter().copied().collect();

        let mut out = Document::with_version(self.doc.version.clone());
        let mut queue = VecDeque::new();
        for key in [&b"Root"[..], &b"Info"[..], &b"ID"[..]] {
            if let Ok(value) = self.doc.trailer.get(key) {
                collect_references(value, &mut queue);
                out.trailer.set(key.to_vec(), value.clone());
            }
        }

        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Ok(source) = self.doc.get_object(id) else {
                continue;
            };

            let object = if id == self.pages_root {
                self.flattened_root(source, &kept)?
            } else if kept_set.contains(&id) {
                self.detached_page(id, source)?
            } else if is_page_tree_node(source) {
                continue;
            } else {
                source.clone()
            };

            collect_references(&object, &mut queue);
            out.objects.insert(id, object);
        }

        out.max_id = self.doc.max_id;
        out.compress();

        let mut buffer = Vec::new();
        out.save_to(&mut buffer)
            .map_err(|e| SegmentError::OperationError(format!("Save failed: {}", e)))?;

        Ok(buffer)
    }

    fn flattened_root(&self, source: &Object, kept: &[ObjectId]) -> Result<Object, SegmentError> {
        let mut root = source
            .as_dict()
            .map_err(|_| SegmentError::OperationError("Invalid pages dictionary".into()))?
            .clone();

        let kids = kept.iter().map(|&id| Object::Reference(id)).collect();
        root.set("Kids", Object::Array(kids));
        root.set("Count", Object::Integer(kept.len() as i64));
        Ok(Object::Dictionary(root))
    }

    fn detached_page(&self, id: ObjectId, source: &Object) -> Result<Object, SegmentError> {
        let mut page = source
            .as_dict()
            .map_err(|_| SegmentError::OperationError(format!("Invalid page object {:?}", id)))?
            .clone();

        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = self.inherited(&page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.set("Parent", Object::Reference(self.pages_root));
        Ok(Object::Dictionary(page))
    }

    fn inherited(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        for _ in 0..MAX_TREE_DEPTH {
            let node = self.doc.get_dictionary(parent?).ok()?;
            if let Ok(value) = node.get(key) {
                return Some(value.clone());
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    matches!(
        object
            .as_dict()
            .and_then(|dict| dict.get(b"Type"))
            .and_then(Object::as_name),
        Ok(b"Page") | Ok(b"Pages")
    )
}

fn collect_references(object: &Object, queue: &mut VecDeque<ObjectId>) {
    match object {
        Object::Reference(id) => queue.push_back(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, queue)),
        Object::Dictionary(dict) => dict
            .iter()
            .for_each(|(_, value)| collect_references(value, queue)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .for_each(|(_, value)| collect_references(value, queue)),
        _ => {}
    }
}
