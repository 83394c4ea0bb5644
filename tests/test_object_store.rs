//! Object store tests: resolution, caching and stream lengths.

mod common;

use common::{init_logging, PdfBuilder};
use pdf_engine::object::{Dict, Object, ObjectRef};
use pdf_engine::{Error, ObjectStore, ParserOptions, PdfDocument};

fn store_with(objects: &[(u32, Object)]) -> ObjectStore {
    let store = ObjectStore::in_memory(ParserOptions::default());
    for (id, object) in objects {
        store.add_object(ObjectRef::new(*id, 0), object.clone());
    }
    store
}

fn reference(id: u32) -> Object {
    Object::Reference(ObjectRef::new(id, 0))
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_resolve_follows_reference_chains() {
    let store = store_with(&[(1, reference(2)), (2, reference(3)), (3, Object::Integer(7))]);
    let value = store.resolve_reference(ObjectRef::new(1, 0)).unwrap().unwrap();
    assert_eq!(*value, Object::Integer(7));
}

#[test]
fn test_resolve_detects_cycles() {
    let store = store_with(&[(1, reference(2)), (2, reference(1))]);
    let result = store.resolve_reference(ObjectRef::new(1, 0));
    assert!(matches!(result, Err(Error::CircularReference(_))));
}

#[test]
fn test_null_and_missing_resolve_to_none() {
    let store = store_with(&[(1, Object::Null), (2, reference(99))]);
    assert!(store.resolve_reference(ObjectRef::new(1, 0)).unwrap().is_none());
    assert!(store.resolve_reference(ObjectRef::new(2, 0)).unwrap().is_none());
    assert!(store.resolve(&Object::Null).unwrap().is_none());
}

#[test]
fn test_direct_values_resolve_borrowed() {
    let store = store_with(&[]);
    let direct = Object::Name("Direct".to_string());
    let handle = store.resolve(&direct).unwrap().unwrap();
    assert_eq!(handle.as_name(), Some("Direct"));
}

#[test]
fn test_resolve_dict_entry() {
    let store = store_with(&[(4, Object::Array(vec![Object::Integer(1), Object::Integer(2)]))]);
    let mut dict = Dict::new();
    dict.insert("Kids".to_string(), reference(4));
    dict.insert("Count".to_string(), Object::Integer(2));

    let kids = store.resolve_dict_entry(&dict, "Kids").unwrap().unwrap();
    assert_eq!(kids.as_array().map(Vec::len), Some(2));
    let count = store.resolve_dict_entry(&dict, "Count").unwrap().unwrap();
    assert_eq!(count.as_integer(), Some(2));
    assert!(store.resolve_dict_entry(&dict, "Missing").unwrap().is_none());
}

#[test]
fn test_add_and_remove_objects() {
    let store = store_with(&[(1, Object::Boolean(true))]);
    assert_eq!(store.cached_len(), 1);
    store.add_object(ObjectRef::new(1, 0), Object::Boolean(false));
    assert_eq!(
        store.get_object(ObjectRef::new(1, 0)).unwrap().as_deref(),
        Some(&Object::Boolean(false))
    );
    assert!(store.remove_object(ObjectRef::new(1, 0)).is_some());
    assert!(store.get_object(ObjectRef::new(1, 0)).unwrap().is_none());
}

// ============================================================================
// File-backed stores
// ============================================================================

fn document_with(extra: impl FnOnce(&mut PdfBuilder)) -> PdfDocument {
    init_logging();
    let mut pdf = PdfBuilder::new("1.4");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    extra(&mut pdf);
    pdf.xref_table("/Size 10 /Root 1 0 R");
    PdfDocument::from_bytes(pdf.finish()).unwrap()
}

#[test]
fn test_indirect_stream_length() {
    let doc = document_with(|pdf| {
        pdf.object(3, "<< /Length 4 0 R >>\nstream\nfive!\nendstream");
        pdf.object(4, "5");
    });
    let stream = doc.store().get_object(ObjectRef::new(3, 0)).unwrap().unwrap();
    let data = stream.decode_stream_data_with_options(doc.store().options()).unwrap();
    assert_eq!(data, b"five!");
}

#[test]
fn test_wrong_stream_length_scans_for_endstream() {
    let doc = document_with(|pdf| {
        pdf.object(3, "<< /Length 2 >>\nstream\nlonger body\nendstream");
    });
    let stream = doc.store().get_object(ObjectRef::new(3, 0)).unwrap().unwrap();
    let data = stream.decode_stream_data_with_options(doc.store().options()).unwrap();
    assert_eq!(data, b"longer body");
}

#[test]
fn test_generation_mismatch_still_resolves() {
    let doc = document_with(|pdf| {
        pdf.object_with_gen(3, 2, "(regenerated)");
    });
    let object = doc.store().get_object(ObjectRef::new(3, 0)).unwrap().unwrap();
    assert_eq!(object.as_string(), Some(&b"regenerated"[..]));
}

#[test]
fn test_unparseable_object_is_absent() {
    let doc = document_with(|pdf| {
        pdf.object(3, "<< /Broken [ >>");
    });
    assert!(doc.store().get_object(ObjectRef::new(3, 0)).unwrap().is_none());
}

#[test]
fn test_objects_are_cached_once_loaded() {
    let doc = document_with(|pdf| {
        pdf.object(3, "[1 2 3]");
    });
    let reference = ObjectRef::new(3, 0);
    assert!(doc.store().cached(reference).is_none());
    let first = doc.store().get_object(reference).unwrap().unwrap();
    let second = doc.store().get_object(reference).unwrap().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    doc.reduce_memory();
    assert_eq!(doc.store().cached_len(), 0);
    assert_eq!(doc.store().get_object(reference).unwrap().unwrap(), first);
}

#[test]
fn test_store_is_shared_across_threads() {
    let doc = document_with(|pdf| {
        for id in 3..9 {
            pdf.object(id, &format!("<< /Id {} >>", id));
        }
    });

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for id in 3..9u32 {
                    let object = doc.store().get_object(ObjectRef::new(id, 0)).unwrap().unwrap();
                    assert_eq!(object.get("Id").and_then(Object::as_integer), Some(i64::from(id)));
                }
            });
        }
    });
}

#[test]
fn test_file_backed_store_from_disk() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.pdf");
    std::fs::write(&path, common::single_page_pdf(b"BT /F1 9 Tf (On disk) Tj ET")).unwrap();

    let doc = PdfDocument::open(&path).unwrap();
    let page = doc.page(0).unwrap();
    assert_eq!(doc.extract_text(page).unwrap(), "On disk");
}
