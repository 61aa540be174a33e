//! PDF concatenation
//!
//! Merges rendered PDF buffers into a single document, preserving input
//! order. The in-process path rebuilds the page tree with lopdf; a legacy
//! path shells out to the external `pdftk` tool for callers that already
//! have files on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use crate::error::RenderError;

/// Merge multiple in-memory PDF documents into one.
///
/// Pages appear in the output in input order, and the output page count is
/// the sum of the input page counts. Passing no documents is an error; a
/// single document is returned unchanged.
pub fn merge_documents(documents: &[Vec<u8>]) -> Result<Vec<u8>, RenderError> {
    if documents.is_empty() {
        return Err(RenderError::MergeFailed(
            "no documents to merge".to_string(),
        ));
    }

    if documents.len() == 1 {
        return Ok(documents[0].clone());
    }

    let mut max_id: u32 = 1;
    let mut collected_pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut collected_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut merged = Document::with_version("1.5");

    for (index, bytes) in documents.iter().enumerate() {
        let mut doc = Document::load_mem(bytes).map_err(|e| {
            RenderError::MergeFailed(format!("failed to load document {}: {}", index + 1, e))
        })?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // BTreeMap keyed by (renumbered) object id keeps the pages in input order.
        let source_pages = doc.get_pages();
        for &page_id in source_pages.values() {
            if let Ok(page_obj) = doc.get_object(page_id) {
                collected_pages.insert(page_id, page_obj.clone());
            }
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    collected_objects.insert(object_id, object);
                }
            }
        }
    }

    for (object_id, object) in collected_objects {
        merged.objects.insert(object_id, object);
    }

    let pages_id = merged.new_object_id();

    for (obj_id, object) in &collected_pages {
        if let Object::Dictionary(dict) = object {
            let mut new_dict = dict.clone();
            new_dict.set("Parent", Object::Reference(pages_id));
            merged.objects.insert(*obj_id, Object::Dictionary(new_dict));
        }
    }

    let kids: Vec<Object> = collected_pages
        .keys()
        .map(|&id| Object::Reference(id))
        .collect();
    let total_pages = collected_pages.len() as u32;

    let pages_dict = lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(i64::from(total_pages))),
    ]);
    merged.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = merged.new_object_id();
    let catalog_dict = lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = merged.objects.len() as u32;

    merged.renumber_objects();
    merged.compress();

    let mut output = Vec::new();
    merged
        .save_to(&mut output)
        .map_err(|e| RenderError::MergeFailed(format!("failed to save merged PDF: {e}")))?;

    debug!(
        "Merged {} documents into {} pages ({} bytes)",
        documents.len(),
        total_pages,
        output.len()
    );

    Ok(output)
}

/// Page count of an in-memory PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, RenderError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| RenderError::MergeFailed(format!("failed to load document: {e}")))?;
    Ok(doc.get_pages().len())
}

/// Merge PDF files on disk by invoking the external `pdftk` tool.
///
/// Legacy path kept for deployments that already standardize on pdftk;
/// `merge_documents` is the default and has no external dependency.
pub async fn merge_files_with_pdftk(
    inputs: &[PathBuf],
    output: &Path,
) -> Result<(), RenderError> {
    if inputs.is_empty() {
        return Err(RenderError::MergeFailed("no input files".to_string()));
    }

    let pdftk = which::which("pdftk")
        .map_err(|e| RenderError::MergeFailed(format!("pdftk not found: {e}")))?;

    let status = tokio::process::Command::new(pdftk)
        .args(inputs)
        .arg("cat")
        .arg("output")
        .arg(output)
        .status()
        .await
        .map_err(|e| RenderError::MergeFailed(format!("failed to run pdftk: {e}")))?;

    if !status.success() {
        return Err(RenderError::MergeFailed(format!(
            "pdftk exited with {status}"
        )));
    }

    Ok(())
}

/// Build a minimal one-page PDF with the given text, for tests.
#[cfg(test)]
pub(crate) fn create_test_pdf(page_text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let font_id = doc.add_object(lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let resources_id = doc.add_object(lopdf::Dictionary::from_iter([(
        "Font",
        Object::Dictionary(lopdf::Dictionary::from_iter([(
            "F1",
            Object::Reference(font_id),
        )])),
    )]));

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(page_text)]),
            Operation::new("ET", vec![]),
        ],
    };

    let content_bytes = content.encode().unwrap_or_default();
    let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content_bytes));

    let page_id = doc.add_object(lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(page_tree_id)),
        ("Contents", Object::Reference(content_id)),
        ("Resources", Object::Reference(resources_id)),
        (
            "MediaBox",
            Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
        ),
    ]));

    let page_tree = lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(vec![Object::Reference(page_id)])),
        ("Count", Object::Integer(1)),
    ]);
    doc.objects
        .insert(page_tree_id, Object::Dictionary(page_tree));

    let catalog_id = doc.add_object(lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap_or_default();
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_empty_input() {
        let result = merge_documents(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_single_document() {
        let pdf = create_test_pdf("Page 1");
        let result = merge_documents(std::slice::from_ref(&pdf));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), pdf);
    }

    #[test]
    fn test_merge_page_count_is_sum() {
        let pdf1 = create_test_pdf("Page 1");
        let pdf2 = create_test_pdf("Page 2");
        let pdf3 = create_test_pdf("Page 3");

        let merged = merge_documents(&[pdf1.clone(), pdf2.clone(), pdf3.clone()]).unwrap();

        let total: usize = [&pdf1, &pdf2, &pdf3]
            .iter()
            .map(|pdf| page_count(pdf).unwrap())
            .sum();
        assert_eq!(page_count(&merged).unwrap(), total);
    }

    #[test]
    fn test_merge_output_has_pdf_signature() {
        let pdf1 = create_test_pdf("A");
        let pdf2 = create_test_pdf("B");

        let merged = merge_documents(&[pdf1, pdf2]).unwrap();
        assert!(merged.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_merge_preserves_input_order() {
        let pdf1 = create_test_pdf("First");
        let pdf2 = create_test_pdf("Second");

        let merged = merge_documents(&[pdf1, pdf2]).unwrap();
        let doc = Document::load_mem(&merged).unwrap();

        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let texts: Vec<String> = pages
            .keys()
            .map(|&number| doc.extract_text(&[number]).unwrap_or_default())
            .collect();
        assert!(texts[0].contains("First"));
        assert!(texts[1].contains("Second"));
    }

    #[test]
    fn test_page_count_rejects_garbage() {
        assert!(page_count(b"not a pdf").is_err());
    }
}
