//! Name escaping: whatever the writer emits, the lexer reads back.

use pdf_graft::lexer::{Token, token};
use pdf_graft::object::Object;
use pdf_graft::writer::ObjectSerializer;
use proptest::prelude::*;

fn write_and_relex(name: &str) -> String {
    let written = ObjectSerializer::new().serialize(&Object::name(name)).unwrap();
    match token(&written) {
        Ok((rest, Token::Name(read))) => {
            assert!(rest.is_empty(), "trailing bytes after {:?}", written);
            read
        },
        other => panic!("expected a name token, got {:?}", other),
    }
}

#[test]
fn test_space_and_hash_are_escaped() {
    let written = ObjectSerializer::new().serialize_to_string(&Object::name("A B#C")).unwrap();
    assert_eq!(written, "/A#20B#23C");
    assert_eq!(write_and_relex("A B#C"), "A B#C");
}

#[test]
fn test_delimiters_round_trip() {
    for name in ["a/b", "(x)", "<<>>", "[1]", "{f}", "50%"] {
        assert_eq!(write_and_relex(name), name);
    }
}

#[test]
fn test_non_ascii_round_trip() {
    assert_eq!(write_and_relex("Caf\u{e9}"), "Caf\u{e9}");
}

proptest! {
    #[test]
    fn prop_printable_names_round_trip(name in "[ -~]{1,24}") {
        prop_assert_eq!(write_and_relex(&name), name);
    }

    #[test]
    fn prop_unicode_names_round_trip(name in "\\PC{1,12}") {
        prop_assert_eq!(write_and_relex(&name), name);
    }
}
