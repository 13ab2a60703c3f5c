//! Fully-qualified field names in the document index.

use pdf_graft::document::Document;
use pdf_graft::error::Error;
use pdf_graft::fields::Field;
use pdf_graft::writer::SaveOptions;

#[test]
fn test_attach_registers_qualified_names() {
    let doc = Document::new();
    let address = Field::new("address");
    address.kids().push(&Field::text("street")).unwrap();
    address.kids().push(&Field::text("city")).unwrap();
    doc.fields().push(&address).unwrap();

    assert!(doc.field("address").is_some());
    assert!(doc.field("address.city").is_some());
    assert_eq!(doc.field("address.city").unwrap().full_name(), "address.city");
    assert_eq!(doc.field_names().len(), 3);
}

#[test]
fn test_removal_unregisters() {
    let doc = Document::new();
    let address = doc.fields().push(&Field::new("address")).unwrap();
    address.kids().push(&Field::text("zip")).unwrap();
    assert!(doc.field("address.zip").is_some());

    address.kids().remove_at(0).unwrap();
    assert!(doc.field("address.zip").is_none());
    doc.fields().remove_at(0).unwrap();
    assert!(doc.field_names().is_empty());
}

#[test]
fn test_duplicate_name_rejected() {
    let doc = Document::new();
    doc.fields().push(&Field::text("name")).unwrap();
    let err = doc.fields().push(&Field::text("name")).unwrap_err();
    assert!(matches!(err, Error::DuplicateFieldName(_)));
    assert_eq!(doc.fields().len(), 1);
}

#[test]
fn test_loaded_fields_are_indexed() {
    let doc = Document::new();
    let person = doc.fields().push(&Field::new("person")).unwrap();
    person.kids().push(&Field::text("first")).unwrap();
    person.kids().push(&Field::text("last")).unwrap();
    doc.field("person.last").unwrap().set_value(pdf_graft::Object::text("Doe"));

    let reread = Document::load(doc.to_bytes(&SaveOptions::default()).unwrap()).unwrap();
    let last = reread.field("person.last").unwrap();
    assert_eq!(last.value().and_then(|v| v.as_string().map(|s| s.to_text())), Some("Doe".into()));
    assert_eq!(last.parent().unwrap().full_name(), "person");
}
