//! Stream filter chains: a failing stage leaves the stream untouched.

use pdf_graft::decoders::{Compressor, DecoderRegistry, FlateCompressor};
use pdf_graft::error::Error;
use pdf_graft::object::{Object, PdfArray, PdfDictionary, PdfStream};

fn stream_with(filters: &[&str], data: &[u8]) -> PdfStream {
    let names: PdfArray = filters.iter().map(|f| Object::name(*f)).collect();
    let params = PdfArray::from_vec(vec![Object::Null, PdfDictionary::new().into()]);
    let dict = PdfDictionary::new()
        .with("Filter", names)
        .with("DecodeParms", params)
        .with("Length", data.len());
    PdfStream::new(dict, data.to_vec())
}

#[test]
fn test_failing_second_stage_leaves_stream_unchanged() {
    // ASCIIHex succeeds, DCT has no codec here.
    let stream = stream_with(&["ASCIIHexDecode", "DCTDecode"], b"48656C6C6F>");
    let filter_before = stream.dict().get("Filter");
    let params_before = stream.dict().get("DecodeParms");

    let err = stream.decode(&DecoderRegistry::new()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFilter(_)));
    assert_eq!(stream.data(), b"48656C6C6F>");
    assert_eq!(stream.dict().get("Filter"), filter_before);
    assert_eq!(stream.dict().get("DecodeParms"), params_before);
    assert_eq!(stream.dict().get_integer("Length"), Some(11));
}

#[test]
fn test_successful_chain_replaces_data() {
    let stream = stream_with(&["ASCIIHexDecode", "ASCII85Decode"], b"4643664E387E3E>");
    stream.decode(&DecoderRegistry::new()).unwrap();
    assert_eq!(stream.data(), b"test");
    assert!(!stream.dict().contains_key("Filter"));
    assert!(!stream.dict().contains_key("DecodeParms"));
    assert_eq!(stream.dict().get_integer("Length"), Some(4));
}

#[test]
fn test_flate_round_trip_through_compress() {
    let stream = PdfStream::from_bytes(b"BT /F1 12 Tf (Hello) Tj ET".to_vec());
    assert!(stream.compress(&FlateCompressor::default()).unwrap());
    assert_eq!(stream.filters(), vec!["FlateDecode".to_string()]);
    assert_ne!(stream.data(), b"BT /F1 12 Tf (Hello) Tj ET");

    let decoded = stream.decoded_data(&DecoderRegistry::new()).unwrap();
    assert_eq!(decoded, b"BT /F1 12 Tf (Hello) Tj ET");
}

#[test]
fn test_size_limit_aborts_chain() {
    let stream = stream_with(&["ASCIIHexDecode"], b"414243444546>");
    let registry = DecoderRegistry::new().with_max_decompressed_size(2);
    assert!(matches!(stream.decode(&registry), Err(Error::Decode(_))));
    assert_eq!(stream.data(), b"414243444546>");
}

#[test]
fn test_truncated_flate_leaves_stream_unchanged() {
    let original: Vec<u8> = (0..20000u32).map(|i| (i * 31 % 253) as u8).collect();
    let compressed = FlateCompressor::default().compress(&original).unwrap();
    let truncated = compressed[..compressed.len() * 2 / 3].to_vec();
    let dict = PdfDictionary::new()
        .with("Filter", Object::name("FlateDecode"))
        .with("Length", truncated.len());
    let stream = PdfStream::new(dict, truncated.clone());

    let err = stream.decode(&DecoderRegistry::new()).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
    assert_eq!(stream.data(), truncated);
    assert_eq!(stream.filters(), vec!["FlateDecode".to_string()]);
    assert_eq!(stream.dict().get_integer("Length"), Some(truncated.len() as i64));
}
