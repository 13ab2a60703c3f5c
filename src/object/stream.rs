//! Stream handle: a dictionary plus a raw byte buffer.

use std::cell::RefCell;
use std::rc::Rc;

use super::{NodeHeader, NodeKey, Object, ObjectRef, PdfDictionary};
use crate::decoders::{Compressor, DecoderRegistry};
use crate::error::Result;

/// Shared handle to a PDF stream.
///
/// The bytes are kept exactly as stored (still encoded by the filters the
/// dictionary names) until [`PdfStream::decode`] succeeds.
#[derive(Clone)]
pub struct PdfStream(Rc<StreamNode>);

struct StreamNode {
    header: NodeHeader,
    dict: PdfDictionary,
    data: RefCell<Vec<u8>>,
}

impl PdfStream {
    /// Create a stream from a dictionary and raw (encoded) bytes.
    pub fn new(dict: PdfDictionary, data: impl Into<Vec<u8>>) -> Self {
        Self::with_header(NodeHeader::new(), dict, data.into())
    }

    /// Create an unfiltered stream with an empty dictionary.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(PdfDictionary::new(), data)
    }

    fn with_header(header: NodeHeader, dict: PdfDictionary, data: Vec<u8>) -> Self {
        PdfStream(Rc::new(StreamNode {
            header,
            dict,
            data: RefCell::new(data),
        }))
    }

    /// The stream dictionary.
    pub fn dict(&self) -> &PdfDictionary {
        &self.0.dict
    }

    /// Copy of the raw bytes.
    pub fn data(&self) -> Vec<u8> {
        self.0.data.borrow().clone()
    }

    /// Length of the raw bytes.
    pub fn data_len(&self) -> usize {
        self.0.data.borrow().len()
    }

    /// Replace the raw bytes. The filter entries are left untouched.
    pub fn set_data(&self, data: impl Into<Vec<u8>>) {
        *self.0.data.borrow_mut() = data.into();
    }

    /// Filter names in application order.
    pub fn filters(&self) -> Vec<String> {
        match self.0.dict.get("Filter") {
            Some(Object::Name(name)) => vec![name],
            Some(Object::Array(arr)) => arr
                .to_vec()
                .iter()
                .filter_map(|obj| obj.as_name().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Decode parameters aligned with [`filters`](Self::filters).
    ///
    /// `DecodeParms` may be a single dictionary (for a single filter) or an
    /// array whose entries are dictionaries or null.
    pub fn decode_params(&self) -> Vec<Option<PdfDictionary>> {
        let count = self.filters().len();
        let mut params = match self.0.dict.get("DecodeParms") {
            Some(Object::Dictionary(d)) => vec![Some(d)],
            Some(Object::Array(arr)) => arr
                .to_vec()
                .into_iter()
                .map(|obj| match obj {
                    Object::Dictionary(d) => Some(d),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        params.resize(count, None);
        params
    }

    /// True if the stream carries DCT (JPEG) data.
    pub fn is_dct_image(&self) -> bool {
        self.filters()
            .iter()
            .any(|f| f == "DCTDecode" || f == "DCT")
    }

    /// Run the filter chain without modifying the stream.
    pub fn decoded_data(&self, registry: &DecoderRegistry) -> Result<Vec<u8>> {
        let filters = self.filters();
        let data = self.0.data.borrow();
        if filters.is_empty() {
            return Ok(data.clone());
        }
        registry.decode_chain(&data, &filters, &self.decode_params())
    }

    /// Decode in place.
    ///
    /// Either every filter succeeds, in which case the bytes are replaced and
    /// `Filter`/`DecodeParms` are removed, or the stream is left exactly as it
    /// was and the first error is returned.
    pub fn decode(&self, registry: &DecoderRegistry) -> Result<()> {
        if self.filters().is_empty() {
            return Ok(());
        }
        let decoded = self.decoded_data(registry)?;
        log::debug!(
            "Decoded stream {:?}: {} -> {} bytes",
            self.identity(),
            self.data_len(),
            decoded.len()
        );
        self.0.dict.remove("Filter");
        self.0.dict.remove("DecodeParms");
        if self.0.dict.contains_key("Length") {
            self.0.dict.insert("Length", decoded.len());
        }
        self.set_data(decoded);
        Ok(())
    }

    /// Compress unfiltered data in place. Returns `false` when the stream
    /// already carries a filter and was left alone.
    pub fn compress(&self, compressor: &dyn Compressor) -> Result<bool> {
        if !self.filters().is_empty() {
            return Ok(false);
        }
        let compressed = compressor.compress(&self.0.data.borrow())?;
        self.0.dict.insert("Filter", Object::name(compressor.filter_name()));
        if self.0.dict.contains_key("Length") {
            self.0.dict.insert("Length", compressed.len());
        }
        self.set_data(compressed);
        Ok(true)
    }

    /// New stream node with a shallow copy of the dictionary and a copy of the bytes.
    pub fn shallow_clone(&self) -> Self {
        Self::with_header(self.0.header.sibling(), self.0.dict.shallow_clone(), self.data())
    }

    /// Process-unique node key.
    pub fn key(&self) -> NodeKey {
        self.0.header.key()
    }

    /// Identity assigned by a save pass or by loading.
    pub fn identity(&self) -> Option<ObjectRef> {
        self.0.header.identity()
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &PdfStream) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn header(&self) -> &NodeHeader {
        &self.0.header
    }
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for PdfStream {}

impl std::fmt::Debug for PdfStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfStream")
            .field("node", &self.key().value())
            .field("identity", &self.identity())
            .field("dict", &self.0.dict)
            .field("data_len", &self.data_len())
            .finish()
    }
}
