//! Vertical layout extraction
//!
//! Walks each page's content stream with lopdf and records the vertical
//! position of every text-showing operation, in page order.
//!
//! ## Coordinates
//!
//! Positions are reported top-down: `0.0` is the top edge of the page's
//! MediaBox and values grow towards the bottom, so reading order and
//! coordinate order agree. Only the text matrix, the CTM and text rise are
//! tracked; glyph advances never move the baseline for horizontal text, so
//! every glyph of one operation shares the recorded position.
//!
//! Form XObjects painted with `Do` are walked in place, with their `/Matrix`
//! applied on top of the current CTM.

use crate::error::SegmentError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Form XObject nesting bound; also stops self-referencing forms
const MAX_FORM_DEPTH: usize = 8;

/// Vertical glyph positions of a single page
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// 1-indexed page number
    pub page_number: u32,
    pub height: f64,
    /// Top-down positions in content stream order
    pub y_positions: Vec<f64>,
}

/// Layout of a whole document, pages in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
}

impl DocumentLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page-local positions of every page, concatenated in page order
    pub fn flattened(&self) -> Vec<f64> {
        self.pages
            .iter()
            .flat_map(|p| p.y_positions.iter().copied())
            .collect()
    }

    /// Document-global positions: each page is shifted down by the heights
    /// of all pages above it
    pub fn stacked(&self) -> Vec<f64> {
        self.pages
            .iter()
            .zip(self.page_offsets())
            .flat_map(|(page, offset)| page.y_positions.iter().map(move |y| offset + y))
            .collect()
    }

    /// Page number containing a stacked coordinate
    ///
    /// Positions above the first page belong to it; positions past a page's
    /// bottom edge belong to the last page starting above them.
    pub fn page_for_stacked(&self, y: f64) -> Option<u32> {
        let mut found = self.pages.first()?.page_number;
        for (page, offset) in self.pages.iter().zip(self.page_offsets()) {
            if offset <= y {
                found = page.page_number;
            } else {
                break;
            }
        }
        Some(found)
    }

    fn page_offsets(&self) -> Vec<f64> {
        self.pages
            .iter()
            .scan(0.0, |acc, page| {
                let offset = *acc;
                *acc += page.height;
                Some(offset)
            })
            .collect()
    }
}

/// Extract the vertical layout of every page
pub fn extract_layout(doc: &Document) -> Result<DocumentLayout, SegmentError> {
    let mut pages = Vec::new();

    for (&page_number, &page_id) in doc.get_pages().iter() {
        let [_, lly, _, ury] = media_box(doc, page_id);
        let content = doc.get_page_content(page_id).map_err(|e| {
            SegmentError::InvalidDocument(format!("Page {} content: {}", page_number, e))
        })?;
        let operations = Content::decode(&content)
            .map(|c| c.operations)
            .unwrap_or_else(|e| {
                debug!("Page {} content stream not decodable: {}", page_number, e);
                Vec::new()
            });

        let y_positions = TextWalker::new(doc, page_resources(doc, page_id))
            .walk(&operations)
            .into_iter()
            .map(|y| ury - y)
            .collect::<Vec<_>>();

        debug!(
            "Page {}: {} glyph positions",
            page_number,
            y_positions.len()
        );

        pages.push(PageLayout {
            page_number,
            height: (ury - lly).abs(),
            y_positions,
        });
    }

    Ok(DocumentLayout { pages })
}

/// Page MediaBox, following inherited attributes up the page tree
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut current = doc.get_dictionary(page_id).ok();
    // Page trees are shallow; the bound guards against reference cycles
    for _ in 0..32 {
        let Some(dict) = current else { break };
        if let Ok(arr) = dict.get(b"MediaBox").and_then(|o| resolve(doc, o).as_array()) {
            let values: Vec<f64> = arr.iter().filter_map(|o| number(resolve(doc, o))).collect();
            if values.len() >= 4 {
                return [values[0], values[1], values[2], values[3]];
            }
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    DEFAULT_MEDIA_BOX
}

/// Resources dictionary of a page, direct or referenced, possibly inherited
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let (direct, referenced) = doc.get_page_resources(page_id);
    direct.or_else(|| {
        referenced
            .into_iter()
            .find_map(|id| doc.get_dictionary(id).ok())
    })
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Affine transform `[a b c d e f]` as used by PDF operators
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`
    fn then(self, other: Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply_y(self, x: f64, y: f64) -> f64 {
        let [_, b, _, d, _, f] = self.0;
        b * x + d * y + f
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        let values: Vec<f64> = operands.iter().filter_map(number).collect();
        (values.len() == 6).then(|| {
            Matrix([
                values[0], values[1], values[2], values[3], values[4], values[5],
            ])
        })
    }
}

/// Minimal text state machine over a decoded content stream
#[derive(Debug)]
struct TextWalker<'a> {
    doc: &'a Document,
    /// Resources of the stream being walked, for `Do` lookups
    resources: Option<&'a Dictionary>,
    form_depth: usize,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f64,
    rise: f64,
    positions: Vec<f64>,
}

impl<'a> TextWalker<'a> {
    fn new(doc: &'a Document, resources: Option<&'a Dictionary>) -> Self {
        Self {
            doc,
            resources,
            form_depth: 0,
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            leading: 0.0,
            rise: 0.0,
            positions: Vec::new(),
        }
    }

    /// Returns bottom-up user space positions
    fn walk(mut self, operations: &[Operation]) -> Vec<f64> {
        for op in operations {
            self.step(op);
        }
        self.positions
    }

    fn step(&mut self, op: &Operation) {
        let args = &op.operands;
        let arg = |i: usize| args.get(i).and_then(number);

        match op.operator.as_str() {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(args) {
                    self.ctm = m.then(self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "TL" => {
                if let Some(tl) = arg(0) {
                    self.leading = tl;
                }
            }
            "Ts" => {
                if let Some(ts) = arg(0) {
                    self.rise = ts;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (arg(0), arg(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (arg(0), arg(1)) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(args) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.move_line(0.0, -self.leading),
            "Tj" | "TJ" => self.show(args),
            "'" => {
                self.move_line(0.0, -self.leading);
                self.show(args);
            }
            "\"" => {
                self.move_line(0.0, -self.leading);
                self.show(args.get(2..).unwrap_or_default());
            }
            "Do" => {
                if let Some(name) = args.first().and_then(|o| o.as_name().ok()) {
                    self.paint_form(name);
                }
            }
            _ => {}
        }
    }

    /// Walk a form XObject named in the current resources
    fn paint_form(&mut self, name: &[u8]) {
        if self.form_depth >= MAX_FORM_DEPTH {
            debug!("Form XObject nesting deeper than {}, skipping", MAX_FORM_DEPTH);
            return;
        }
        let Some(form) = self.form_xobject(name) else {
            return;
        };

        let content = form
            .decompressed_content()
            .unwrap_or_else(|_| form.content.clone());
        let operations = match Content::decode(&content) {
            Ok(content) => content.operations,
            Err(e) => {
                debug!("Form XObject content not decodable: {}", e);
                return;
            }
        };

        let matrix = form
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|m| resolve(self.doc, m).as_array().ok())
            .and_then(|values| Matrix::from_operands(values))
            .unwrap_or(Matrix::IDENTITY);
        let form_resources = form
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(self.doc, r).as_dict().ok());

        // A form runs as if bracketed by q/Q
        let ctm = self.ctm;
        let saved_len = self.saved.len();
        let (text_matrix, line_matrix) = (self.text_matrix, self.line_matrix);
        let resources = self.resources;

        self.ctm = matrix.then(self.ctm);
        self.resources = form_resources.or(resources);
        self.form_depth += 1;
        for op in &operations {
            self.step(op);
        }
        self.form_depth -= 1;

        self.ctm = ctm;
        self.saved.truncate(saved_len);
        self.text_matrix = text_matrix;
        self.line_matrix = line_matrix;
        self.resources = resources;
    }

    fn form_xobject(&self, name: &[u8]) -> Option<&'a Stream> {
        let doc = self.doc;
        let xobjects = resolve(doc, self.resources?.get(b"XObject").ok()?)
            .as_dict()
            .ok()?;
        let stream = resolve(doc, xobjects.get(name).ok()?).as_stream().ok()?;
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|subtype| subtype == b"Form")
            .unwrap_or(false);
        is_form.then_some(stream)
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).then(self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show(&mut self, operands: &[Object]) {
        if operands.iter().any(shows_glyphs) {
            let y = self.text_matrix.then(self.ctm).apply_y(0.0, self.rise);
            self.positions.push(y);
        }
    }
}

fn shows_glyphs(obj: &Object) -> bool {
    match obj {
        Object::String(bytes, _) => !bytes.is_empty(),
        Object::Array(items) => items.iter().any(shows_glyphs),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pdf_from_operations, pdf_with_form, pdf_with_lines};
    use pretty_assertions::assert_eq;

    fn int(v: i64) -> Object {
        Object::Integer(v)
    }

    fn layout_of(bytes: &[u8]) -> DocumentLayout {
        let doc = Document::load_mem(bytes).unwrap();
        extract_layout(&doc).unwrap()
    }

    #[test]
    fn test_positions_are_top_down() {
        let pdf = pdf_with_lines(&[&[700.0, 650.0, 400.0]]);
        let layout = layout_of(&pdf);

        assert_eq!(layout.page_count(), 1);
        assert_eq!(layout.pages[0].height, 792.0);
        assert_eq!(layout.pages[0].y_positions, vec![92.0, 142.0, 392.0]);
    }

    #[test]
    fn test_pages_reported_in_order() {
        let pdf = pdf_with_lines(&[&[700.0], &[500.0], &[300.0]]);
        let layout = layout_of(&pdf);

        let numbers: Vec<u32> = layout.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(layout.flattened(), vec![92.0, 292.0, 492.0]);
        assert_eq!(layout.stacked(), vec![92.0, 792.0 + 292.0, 1584.0 + 492.0]);
    }

    #[test]
    fn test_page_for_stacked() {
        let pdf = pdf_with_lines(&[&[700.0], &[700.0], &[700.0]]);
        let layout = layout_of(&pdf);

        assert_eq!(layout.page_for_stacked(-5.0), Some(1));
        assert_eq!(layout.page_for_stacked(10.0), Some(1));
        assert_eq!(layout.page_for_stacked(792.0), Some(2));
        assert_eq!(layout.page_for_stacked(2000.0), Some(3));
        assert_eq!(DocumentLayout::default().page_for_stacked(1.0), None);
    }

    #[test]
    fn test_text_operators_move_baseline() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tm",
                vec![int(1), int(0), int(0), int(1), int(72), int(700)],
            ),
            Operation::new("TL", vec![int(20)]),
            Operation::new("Tj", vec![Object::string_literal("first")]),
            Operation::new("T*", vec![]),
            Operation::new("Tj", vec![Object::string_literal("second")]),
            Operation::new("TD", vec![int(0), int(-30)]),
            Operation::new("'", vec![Object::string_literal("third")]),
            Operation::new("ET", vec![]),
        ];
        let layout = layout_of(&pdf_from_operations(ops));

        // 700, 680, 650 after TD, then ' moves by the new leading (30) to 620
        assert_eq!(layout.pages[0].y_positions, vec![92.0, 112.0, 172.0]);
    }

    #[test]
    fn test_ctm_and_rise_applied() {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![int(1), int(0), int(0), int(1), int(0), int(100)],
            ),
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(10), int(500)]),
            Operation::new("Ts", vec![int(5)]),
            Operation::new("Tj", vec![Object::string_literal("raised")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(10), int(500)]),
            Operation::new("Ts", vec![int(0)]),
            Operation::new("Tj", vec![Object::string_literal("plain")]),
            Operation::new("ET", vec![]),
        ];
        let layout = layout_of(&pdf_from_operations(ops));

        // 500 + 5 + 100 = 605, then CTM restored: 500
        assert_eq!(layout.pages[0].y_positions, vec![187.0, 292.0]);
    }

    #[test]
    fn test_empty_strings_not_recorded() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(0), int(700)]),
            Operation::new("Tj", vec![Object::string_literal("")]),
            Operation::new("TJ", vec![Object::Array(vec![Object::Integer(-250)])]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("A"),
                    Object::Integer(-250),
                    Object::string_literal("B"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let layout = layout_of(&pdf_from_operations(ops));

        assert_eq!(layout.pages[0].y_positions, vec![92.0]);
    }

    fn text_at(y: i64) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(72), int(y)]),
            Operation::new("Tj", vec![Object::string_literal("text")]),
            Operation::new("ET", vec![]),
        ]
    }

    fn paint(name: &str) -> Operation {
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())])
    }

    #[test]
    fn test_form_xobject_text_recorded() {
        let form = [text_at(700), text_at(300)].concat();
        let pdf = pdf_with_form(None, form, vec![paint("Fm0")]);

        assert_eq!(layout_of(&pdf).pages[0].y_positions, vec![92.0, 492.0]);
    }

    #[test]
    fn test_form_matrix_and_ctm_compose() {
        let page = [
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![int(1), int(0), int(0), int(1), int(0), int(50)],
                ),
                paint("Fm0"),
                Operation::new("Q", vec![]),
            ],
            text_at(100),
        ]
        .concat();
        let pdf = pdf_with_form(Some([1.0, 0.0, 0.0, 1.0, 0.0, -100.0]), text_at(700), page);

        // 700 - 100 + 50 = 650 inside the form, then the page CTM is back to identity
        assert_eq!(layout_of(&pdf).pages[0].y_positions, vec![142.0, 692.0]);
    }

    #[test]
    fn test_unknown_xobject_ignored() {
        let page = [vec![paint("Missing")], text_at(700)].concat();
        let pdf = pdf_with_form(None, text_at(300), page);

        assert_eq!(layout_of(&pdf).pages[0].y_positions, vec![92.0]);
    }

    #[test]
    fn test_matrix_composition() {
        let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let shift = Matrix::translate(0.0, 10.0);
        // scale then shift: y=5 -> 10 -> 20
        assert_eq!(scale.then(shift).apply_y(0.0, 5.0), 20.0);
        // shift then scale: y=5 -> 15 -> 30
        assert_eq!(shift.then(scale).apply_y(0.0, 5.0), 30.0);
    }
}
