//! Synthetic PDFs for tests
//!
//! Available to this crate's unit tests and, through the `testing` feature,
//! to dependent crates.

use lopdf::{content::Content, content::Operation, Dictionary, Document, Object, Stream};

/// Build a PDF where page `i` holds one line of text at each baseline in
/// `pages[i]` (PDF user space, bottom-up, on a 612x792 MediaBox)
pub fn pdf_with_lines(pages: &[&[f64]]) -> Vec<u8> {
    let page_ops = pages
        .iter()
        .enumerate()
        .map(|(page, baselines)| line_operations(page, baselines))
        .collect();
    build_pdf(page_ops)
}

/// Build a PDF with `num_pages` pages, each holding a single line of text
pub fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    let pages: Vec<Vec<f64>> = (0..num_pages).map(|_| vec![700.0]).collect();
    let refs: Vec<&[f64]> = pages.iter().map(Vec::as_slice).collect();
    pdf_with_lines(&refs)
}

/// Build a single-page PDF from raw content stream operations
pub fn pdf_from_operations(operations: Vec<Operation>) -> Vec<u8> {
    build_pdf(vec![operations])
}

/// Build a single-page PDF whose resources hold a form XObject named `Fm0`
///
/// `form_matrix` becomes the form's `/Matrix` entry when given.
pub fn pdf_with_form(
    form_matrix: Option<[f64; 6]>,
    form_operations: Vec<Operation>,
    page_operations: Vec<Operation>,
) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let font_resources_id = add_font_resources(&mut doc);

    let mut form_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Form".to_vec())),
        ("BBox", rect(0, 0, 612, 792)),
        ("Resources", Object::Reference(font_resources_id)),
    ]);
    if let Some(matrix) = form_matrix {
        form_dict.set(
            "Matrix",
            Object::Array(matrix.iter().map(|&v| Object::Real(v as _)).collect()),
        );
    }
    let form_content = Content {
        operations: form_operations,
    };
    let form_id = doc.add_object(Stream::new(
        form_dict,
        form_content.encode().expect("form content encodes"),
    ));

    let page_resources_id = doc.add_object(Dictionary::from_iter(vec![
        ("Font", font_map(&doc, font_resources_id)),
        (
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Fm0",
                Object::Reference(form_id),
            )])),
        ),
    ]));

    finish_pdf(doc, page_resources_id, vec![page_operations])
}

/// Build a PDF whose pages inherit MediaBox and Resources from intermediate
/// page tree nodes, two pages per node
pub fn pdf_with_nested_page_tree(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let resources_id = add_font_resources(&mut doc);
    let root_id = doc.new_object_id();

    let mut node_ids = Vec::new();
    for chunk in (0..num_pages).collect::<Vec<_>>().chunks(2) {
        let node_id = doc.new_object_id();
        let mut kids = Vec::new();
        for &page in chunk {
            let operations = line_operations(page as usize, &[700.0]);
            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                Content { operations }.encode().expect("content encodes"),
            ));
            kids.push(Object::Reference(doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(node_id)),
                ("Contents", Object::Reference(content_id)),
            ]))));
        }
        let node = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Parent", Object::Reference(root_id)),
            ("Count", Object::Integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
            ("MediaBox", rect(0, 0, 612, 792)),
            ("Resources", Object::Reference(resources_id)),
        ]);
        doc.objects.insert(node_id, Object::Dictionary(node));
        node_ids.push(node_id);
    }

    let root = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(node_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(root_id, Object::Dictionary(root));
    save_with_catalog(doc, root_id)
}

fn line_operations(page: usize, baselines: &[f64]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for (line, &y) in baselines.iter().enumerate() {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
        ));
        ops.push(Operation::new(
            "Td",
            vec![Object::Integer(72), Object::Real(y as _)],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(format!(
                "Page {} line {}",
                page + 1,
                line + 1
            ))],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

fn rect(llx: i64, lly: i64, urx: i64, ury: i64) -> Object {
    Object::Array(vec![
        Object::Integer(llx),
        Object::Integer(lly),
        Object::Integer(urx),
        Object::Integer(ury),
    ])
}

/// Helvetica as `F1`, returning the id of a resources dictionary holding it
fn add_font_resources(doc: &mut Document) -> lopdf::ObjectId {
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    doc.add_object(Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![(
            "F1",
            Object::Reference(font_id),
        )])),
    )]))
}

fn font_map(doc: &Document, resources_id: lopdf::ObjectId) -> Object {
    doc.get_dictionary(resources_id)
        .and_then(|d| d.get(b"Font"))
        .cloned()
        .expect("font resources present")
}

fn build_pdf(pages: Vec<Vec<Operation>>) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let resources_id = add_font_resources(&mut doc);
    finish_pdf(doc, resources_id, pages)
}

fn finish_pdf(
    mut doc: Document,
    resources_id: lopdf::ObjectId,
    pages: Vec<Vec<Operation>>,
) -> Vec<u8> {
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("content encodes"),
        ));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("MediaBox", rect(0, 0, 612, 792)),
            ("Resources", Object::Reference(resources_id)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    save_with_catalog(doc, pages_id)
}

fn save_with_catalog(mut doc: Document, pages_id: lopdf::ObjectId) -> Vec<u8> {
    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("test PDF serializes");
    buffer
}
