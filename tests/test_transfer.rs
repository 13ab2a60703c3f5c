//! Cross-document transfer: `clone_to` attaches templates and copies owned
//! wrappers.

use pdf_graft::annotations::Annotation;
use pdf_graft::document::Document;
use pdf_graft::object::{Object, PdfDictionary};
use pdf_graft::outline::Outline;
use pdf_graft::ownership::Owned;
use pdf_graft::pages::Page;

#[test]
fn test_template_is_attached_not_copied() {
    let a = Document::new();
    let template = Outline::new("x");
    assert!(template.current_owner().is_none());

    let attached = template.clone_to(a.owner());
    assert!(attached.ptr_eq(&template));
    assert_eq!(attached.current_owner(), Some(a.owner().clone()));
}

#[test]
fn test_owned_item_is_copied() {
    let a = Document::new();
    let b = Document::new();
    let original = a.outlines().push(&Outline::new("chapter")).unwrap();
    original.kids().push(&Outline::new("section")).unwrap();

    let copy = original.clone_to(b.owner());
    assert!(!copy.ptr_eq(&original));
    assert_eq!(copy.current_owner(), Some(b.owner().clone()));
    assert_eq!(original.current_owner(), Some(a.owner().clone()));
    assert_eq!(copy.kids().len(), 1);
    assert_eq!(copy.kids().get(0).unwrap().title(), "section");

    assert!(!copy.underlying().contains_key("Parent"));
    copy.set_title("renamed");
    copy.underlying().insert("Next", PdfDictionary::new());
    assert_eq!(original.title(), "chapter");
    assert!(!original.underlying().contains_key("Next"));
}

#[test]
fn test_copied_page_keeps_annotations() {
    let a = Document::new();
    let b = Document::new();
    let page = a.pages().push(&Page::new([0.0, 0.0, 300.0, 300.0])).unwrap();
    page.annotations().push(&Annotation::text([10.0, 10.0, 20.0, 20.0], "note")).unwrap();

    let copy = b.pages().push(&page.clone_to(b.owner())).unwrap();
    assert_eq!(b.pages().len(), 1);
    assert_eq!(a.pages().len(), 1);
    let note = copy.annotations().get(0).unwrap();
    assert_eq!(note.contents(), Some("note".to_string()));
    assert!(note.underlying().get_dict("P").unwrap().ptr_eq(&copy.underlying()));

    let source_note = page.annotations().get(0).unwrap();
    assert!(source_note.underlying().get_dict("P").unwrap().ptr_eq(&page.underlying()));
}

#[test]
fn test_pushing_owned_item_into_other_document_copies_it() {
    let a = Document::new();
    let b = Document::new();
    let original = a.pages().push(&Page::new([0.0, 0.0, 1.0, 1.0])).unwrap();
    let pushed = b.pages().push(&original).unwrap();
    assert!(!pushed.ptr_eq(&original));
    assert_eq!(pushed.current_owner(), Some(b.owner().clone()));
    let tree = b.catalog().get_dict("Pages").unwrap();
    assert!(pushed.underlying().get_dict("Parent").unwrap().ptr_eq(&tree));
    assert_eq!(original.underlying().get("Type"), Some(Object::name("Page")));
}

#[test]
fn test_attached_template_is_emptied_with_its_document() {
    let template = Outline::new("kept?");
    let spare = Outline::new("spare");
    {
        let doc = Document::new();
        let pushed = doc.outlines().push(&template).unwrap();
        assert!(pushed.ptr_eq(&template));
        doc.outlines().push(&spare.copy(doc.owner())).unwrap();
    }
    // The attached dictionary went down with the document; the copied
    // template's original did not.
    assert!(template.underlying().is_empty());
    assert_eq!(template.title(), "");
    assert_eq!(spare.title(), "spare");
}
